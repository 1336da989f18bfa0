use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::events::{QueueMemberStatus, QueueParams, QueueSummary};

/// One queue member (agent interface) as last reported by the switch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMember {
    pub status_code: u32,
    pub paused: bool,
    pub calls_taken: u32,
    pub last_call_at: Option<DateTime<Utc>>,
}

/// Live counters for one queue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueState {
    pub waiting: u32,
    pub completed: u32,
    pub abandoned: u32,
    pub service_level_percent: f64,
    pub avg_wait_seconds: u32,
    pub members: HashMap<String, QueueMember>,
}

impl QueueState {
    /// Abandon rate over completed + abandoned, one decimal place. Derived,
    /// never stored.
    pub fn abandon_rate(&self) -> f64 {
        let total = self.completed + self.abandoned;
        if total == 0 {
            return 0.0;
        }
        let rate = f64::from(self.abandoned) / f64::from(total) * 100.0;
        (rate * 10.0).round() / 10.0
    }
}

/// Copy-out view of one queue for snapshot consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub name: String,
    pub waiting: u32,
    pub completed: u32,
    pub abandoned: u32,
    pub abandon_rate: f64,
    pub service_level_percent: f64,
    pub avg_wait_seconds: u32,
    pub members: HashMap<String, QueueMember>,
}

/// Owner of all per-queue state. Mutated only from the engine's event
/// pipeline; snapshot readers copy out.
pub struct QueueAggregator {
    queues: DashMap<String, QueueState>,
}

impl QueueAggregator {
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
        }
    }

    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// Total callers waiting across all queues.
    pub fn total_waiting(&self) -> u32 {
        self.queues.iter().map(|q| q.waiting).sum()
    }

    /// Wholesale counter replacement from a periodic parameter snapshot.
    pub fn apply_params(&self, event: &QueueParams) {
        let mut state = self.queues.entry(event.queue.clone()).or_default();
        state.completed = event.completed;
        state.abandoned = event.abandoned;
        state.service_level_percent = event.service_level_percent;
        state.avg_wait_seconds = event.avg_wait_seconds;
        debug!(
            "📋 Queue {} params: completed={} abandoned={} sl={:.1}%",
            event.queue, event.completed, event.abandoned, event.service_level_percent
        );
    }

    /// Waiting-depth/wait-time replacement from a periodic summary snapshot.
    pub fn apply_summary(&self, event: &QueueSummary) {
        let mut state = self.queues.entry(event.queue.clone()).or_default();
        state.waiting = event.waiting;
        if let Some(avg) = event.avg_wait_seconds {
            state.avg_wait_seconds = avg;
        }
    }

    /// Caller joined the queue.
    pub fn caller_joined(&self, queue: &str) {
        let mut state = self.queues.entry(queue.to_string()).or_default();
        state.waiting += 1;
    }

    /// Caller stopped waiting. Clamped at zero: leave events arriving ahead
    /// of (or without) their join must never drive the count negative.
    pub fn caller_left(&self, queue: &str) {
        let mut state = self.queues.entry(queue.to_string()).or_default();
        if state.waiting == 0 {
            warn!("📋 Queue {} waiting count already zero on leave", queue);
        }
        state.waiting = state.waiting.saturating_sub(1);
    }

    /// Member status upsert.
    pub fn member_status(&self, event: &QueueMemberStatus) {
        let mut state = self.queues.entry(event.queue.clone()).or_default();
        state.members.insert(
            event.member.clone(),
            QueueMember {
                status_code: event.status_code,
                paused: event.paused,
                calls_taken: event.calls_taken,
                last_call_at: event.last_call_at,
            },
        );
    }

    /// Outcome increment: a queued call completed with an agent. Keeps the
    /// counter live between parameter snapshots.
    pub fn record_completed(&self, queue: &str) {
        let mut state = self.queues.entry(queue.to_string()).or_default();
        state.completed += 1;
    }

    /// Outcome increment: a queued caller gave up before answer.
    pub fn record_abandoned(&self, queue: &str) {
        let mut state = self.queues.entry(queue.to_string()).or_default();
        state.abandoned += 1;
    }

    /// Copy-out view of every queue, including the derived abandon rate.
    pub fn snapshot(&self) -> Vec<QueueSnapshot> {
        self.queues
            .iter()
            .map(|entry| QueueSnapshot {
                name: entry.key().clone(),
                waiting: entry.waiting,
                completed: entry.completed,
                abandoned: entry.abandoned,
                abandon_rate: entry.abandon_rate(),
                service_level_percent: entry.service_level_percent,
                avg_wait_seconds: entry.avg_wait_seconds,
                members: entry.members.clone(),
            })
            .collect()
    }

    /// Copy of one queue's state, if known.
    pub fn get_copy(&self, queue: &str) -> Option<QueueState> {
        self.queues.get(queue).map(|q| q.value().clone())
    }
}

impl Default for QueueAggregator {
    fn default() -> Self {
        Self::new()
    }
}
