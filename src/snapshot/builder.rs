use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::cdr::CdrStore;
use crate::presence::{AgentPresence, PresenceDirectory};
use crate::queue::QueueAggregator;
use crate::session::SessionTracker;

use super::{ActiveCallSummary, AgentPresenceEntry, HistoricalStats, StatsSnapshot};

/// Builds snapshots by reading (never mutating) the live tables, the CDR
/// store, and the presence collaborator. Collaborator failures degrade the
/// snapshot instead of failing it.
pub struct SnapshotBuilder {
    sessions: Arc<SessionTracker>,
    queues: Arc<QueueAggregator>,
    store: Arc<dyn CdrStore>,
    presence: Arc<dyn PresenceDirectory>,
    monitored_extensions: Vec<String>,
    history_hours: u32,
}

impl SnapshotBuilder {
    pub fn new(
        sessions: Arc<SessionTracker>,
        queues: Arc<QueueAggregator>,
        store: Arc<dyn CdrStore>,
        presence: Arc<dyn PresenceDirectory>,
        monitored_extensions: Vec<String>,
        history_hours: u32,
    ) -> Self {
        Self {
            sessions,
            queues,
            store,
            presence,
            monitored_extensions,
            history_hours,
        }
    }

    /// Compute a fresh snapshot.
    pub async fn build(&self) -> StatsSnapshot {
        let now = Utc::now();

        let active_calls: Vec<ActiveCallSummary> = self
            .sessions
            .snapshot_sessions()
            .iter()
            .map(ActiveCallSummary::from)
            .collect();

        let mut queues = self.queues.snapshot();
        queues.sort_by(|a, b| a.name.cmp(&b.name));

        StatsSnapshot {
            id: Uuid::new_v4(),
            generated_at: now,
            active_calls,
            queues,
            agents: self.agent_presence().await,
            history: self.history(now).await,
        }
    }

    async fn history(&self, now: DateTime<Utc>) -> HistoricalStats {
        let today = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        let week_start = today - Duration::days(i64::from(now.weekday().num_days_from_monday()));
        let month_start = now
            .date_naive()
            .with_day(1)
            .unwrap_or(now.date_naive())
            .and_time(NaiveTime::MIN)
            .and_utc();
        let histogram_start = now - Duration::hours(i64::from(self.history_hours));

        let mut history = HistoricalStats::default();

        match self.store.call_volume_since(today).await {
            Ok(volume) => history.today = volume,
            Err(e) => warn!("📊 Today volume query failed: {}", e),
        }
        match self.store.call_volume_since(week_start).await {
            Ok(volume) => history.this_week = volume,
            Err(e) => warn!("📊 Week volume query failed: {}", e),
        }
        match self.store.call_volume_since(month_start).await {
            Ok(volume) => history.this_month = volume,
            Err(e) => warn!("📊 Month volume query failed: {}", e),
        }
        match self.store.hourly_histogram(histogram_start).await {
            Ok(buckets) => history.hourly = buckets,
            Err(e) => warn!("📊 Histogram query failed: {}", e),
        }

        history
    }

    async fn agent_presence(&self) -> Vec<AgentPresenceEntry> {
        let mut agents = Vec::with_capacity(self.monitored_extensions.len());

        for extension in &self.monitored_extensions {
            let registration = match self.presence.registration_status(extension).await {
                Ok(status) => status,
                Err(e) => {
                    warn!("👤 Presence lookup failed for {}: {}", extension, e);
                    Default::default()
                }
            };

            let on_live_call =
                registration.registered && self.sessions.involves_extension(extension);

            agents.push(AgentPresenceEntry {
                extension: extension.clone(),
                presence: AgentPresence::derive(registration.registered, on_live_call),
                last_seen_at: registration.last_seen_at,
            });
        }

        agents
    }
}
