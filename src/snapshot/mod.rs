//! Consolidated statistics snapshots.
//!
//! A snapshot is a pure projection over the session table, the queue state,
//! presence, and the CDR store's windowed aggregates. It has no identity of
//! its own and is safe to discard and recompute at any time.

pub mod broadcast;
pub mod builder;

pub use broadcast::SnapshotBroadcaster;
pub use builder::SnapshotBuilder;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cdr::{CallVolume, HourlyBucket};
use crate::presence::AgentPresence;
use crate::queue::QueueSnapshot;
use crate::session::{CallDirection, CallSession, SessionStatus};

/// Copied fields of one live call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveCallSummary {
    pub id: String,
    pub source: String,
    pub destination: String,
    pub direction: CallDirection,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub queue_name: Option<String>,
    pub queue_position: Option<u32>,
    pub caller_number: Option<String>,
}

impl From<&CallSession> for ActiveCallSummary {
    fn from(session: &CallSession) -> Self {
        Self {
            id: session.id.to_string(),
            source: session.source.clone(),
            destination: session.destination.clone(),
            direction: session.direction,
            status: session.status,
            started_at: session.started_at,
            answered_at: session.answered_at,
            queue_name: session.queue_name.clone(),
            queue_position: session.queue_position,
            caller_number: session.resolved_caller_number.clone(),
        }
    }
}

/// Derived presence of one monitored extension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentPresenceEntry {
    pub extension: String,
    pub presence: AgentPresence,
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// Time-bucketed rollups pulled from the CDR store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoricalStats {
    pub today: CallVolume,
    pub this_week: CallVolume,
    pub this_month: CallVolume,
    pub hourly: Vec<HourlyBucket>,
}

/// One consolidated view of "what is happening right now".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub id: uuid::Uuid,
    pub generated_at: DateTime<Utc>,
    pub active_calls: Vec<ActiveCallSummary>,
    pub queues: Vec<QueueSnapshot>,
    pub agents: Vec<AgentPresenceEntry>,
    pub history: HistoricalStats,
}

impl StatsSnapshot {
    pub fn active_call_count(&self) -> usize {
        self.active_calls.len()
    }

    pub fn queue(&self, name: &str) -> Option<&QueueSnapshot> {
        self.queues.iter().find(|q| q.name == name)
    }
}
