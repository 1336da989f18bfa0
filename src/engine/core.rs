use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::billing::{BillingGateway, BillingTrigger};
use crate::cdr::reconciler::is_billable;
use crate::cdr::{CdrReconciler, CdrStore};
use crate::config::MonitorConfig;
use crate::error::Result;
use crate::events::{Hangup, QueueCallerLeave, RawEvent, SwitchEvent};
use crate::presence::PresenceDirectory;
use crate::queue::QueueAggregator;
use crate::session::{CallDirection, QueueLeaveOutcome, SessionTracker};
use crate::snapshot::{SnapshotBroadcaster, SnapshotBuilder, StatsSnapshot};

use super::QueueStatusRequester;

/// Lightweight operational counters for health checks and tests.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct EngineStats {
    pub active_calls: usize,
    pub waiting_callers: u32,
    pub monitored_queues: usize,
}

/// Call state reconciliation & monitoring engine.
///
/// Owns the session and queue tables through a single event-processing
/// pipeline: one event is fully applied before the next is accepted, and all
/// I/O triggered by an event (CDR upsert, billing, snapshot broadcast) runs
/// on spawned tasks over copied state.
pub struct MonitorEngine {
    config: MonitorConfig,
    sessions: Arc<SessionTracker>,
    queues: Arc<QueueAggregator>,
    reconciler: Arc<CdrReconciler>,
    billing: Option<BillingTrigger>,
    builder: Arc<SnapshotBuilder>,
    snapshots: SnapshotBroadcaster,
    refresh: Arc<dyn QueueStatusRequester>,
    shutdown_tx: watch::Sender<bool>,
}

impl MonitorEngine {
    /// Wire up the engine against its collaborators.
    pub fn new(
        config: MonitorConfig,
        store: Arc<dyn CdrStore>,
        billing_gateway: Arc<dyn BillingGateway>,
        presence: Arc<dyn PresenceDirectory>,
        refresh: Arc<dyn QueueStatusRequester>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let sessions = Arc::new(SessionTracker::new());
        let queues = Arc::new(QueueAggregator::new());

        let reconciler = Arc::new(CdrReconciler::new(
            store.clone(),
            config.general.fallback_start_window_secs,
        ));

        let billing = config.billing.enabled.then(|| {
            let (trigger, _worker) =
                BillingTrigger::spawn(billing_gateway, config.billing.queue_capacity);
            trigger
        });

        let builder = Arc::new(SnapshotBuilder::new(
            sessions.clone(),
            queues.clone(),
            store,
            presence,
            config.general.monitored_extensions.clone(),
            config.snapshot.history_hours,
        ));
        let snapshots = SnapshotBroadcaster::new(builder.clone(), config.snapshot.channel_capacity);

        let (shutdown_tx, _) = watch::channel(false);

        info!("🚀 Monitor engine wired up");
        Ok(Arc::new(Self {
            config,
            sessions,
            queues,
            reconciler,
            billing,
            builder,
            snapshots,
            refresh,
            shutdown_tx,
        }))
    }

    /// Spawn the event pipeline. Returns the event sender the source adapter
    /// feeds and the pipeline task handle. The pipeline stops when the sender
    /// side is dropped or [`MonitorEngine::shutdown`] is called.
    pub fn start(self: &Arc<Self>) -> (mpsc::Sender<RawEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(self.config.general.event_channel_capacity);
        let engine = self.clone();
        let handle = tokio::spawn(async move { engine.run(rx).await });
        (tx, handle)
    }

    /// Subscribe to the snapshot broadcast.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Arc<StatsSnapshot>> {
        self.snapshots.subscribe()
    }

    /// Compute a snapshot on demand, outside the broadcast cadence.
    pub async fn build_snapshot(&self) -> StatsSnapshot {
        self.builder.build().await
    }

    /// Current operational counters.
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            active_calls: self.sessions.active_count(),
            waiting_callers: self.queues.total_waiting(),
            monitored_queues: self.queues.queue_count(),
        }
    }

    /// Signal the pipeline (and with it both periodic timers) to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<RawEvent>) {
        let mut broadcast_tick = tokio::time::interval(self.config.snapshot.broadcast_interval);
        broadcast_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut refresh_tick = tokio::time::interval(self.config.queues.refresh_interval);
        refresh_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        info!("📡 Event pipeline running");

        loop {
            tokio::select! {
                maybe_event = rx.recv() => match maybe_event {
                    Some(raw) => self.handle_raw(raw),
                    None => {
                        info!("📡 Event source closed, stopping pipeline");
                        break;
                    }
                },
                _ = broadcast_tick.tick() => {
                    self.snapshots.publish_now().await;
                }
                _ = refresh_tick.tick() => {
                    debug!("📋 Requesting fresh queue status");
                    self.refresh.request_queue_status();
                }
                _ = shutdown_rx.changed() => {
                    info!("🛑 Shutdown requested, stopping pipeline");
                    break;
                }
            }
        }
        // Both periodic timers are dropped here, together.
    }

    fn handle_raw(&self, raw: RawEvent) {
        match SwitchEvent::from_raw(&raw) {
            Some(event) => {
                if self.apply_event(event) {
                    self.snapshots.trigger();
                }
            }
            None => debug!("📨 Ignoring event kind {:?}", raw.name),
        }
    }

    /// Apply one typed event to the live tables. Returns true when observable
    /// state changed and a snapshot broadcast is due.
    fn apply_event(&self, event: SwitchEvent) -> bool {
        match event {
            SwitchEvent::NewChannel(e) => {
                let direction = if self.is_external_context(e.context.as_deref()) {
                    CallDirection::Inbound
                } else {
                    CallDirection::Outbound
                };
                self.sessions.observe_new_channel(&e, direction)
            }

            SwitchEvent::ChannelStateChange(e) => {
                if e.is_up() {
                    match self
                        .sessions
                        .observe_answer(&e.unique_id, e.linked_id.as_deref(), None)
                    {
                        Some(update) => {
                            if let Some(queue) = &update.dequeued_from {
                                self.queues.caller_left(queue);
                            }
                            update.newly_answered || update.dequeued_from.is_some()
                        }
                        None => false,
                    }
                } else {
                    self.sessions.observe_identity_signals(
                        &e.unique_id,
                        e.linked_id.as_deref(),
                        e.connected_line.as_deref(),
                        e.caller_id.as_deref(),
                    );
                    false
                }
            }

            SwitchEvent::BridgeEnter(e) => {
                match self
                    .sessions
                    .observe_answer(&e.unique_id, e.linked_id.as_deref(), Some(&e))
                {
                    Some(update) => {
                        if let Some(queue) = &update.dequeued_from {
                            self.queues.caller_left(queue);
                        }
                        update.newly_answered || update.dequeued_from.is_some()
                    }
                    None => false,
                }
            }

            SwitchEvent::Hangup(e) => {
                self.handle_hangup(e);
                true
            }

            SwitchEvent::QueueCallerJoin(e) => {
                self.queues.caller_joined(&e.queue);
                self.sessions.observe_queue_join(&e);
                true
            }

            SwitchEvent::QueueCallerLeave(e) => self.handle_queue_leave(e),

            SwitchEvent::QueueMemberStatus(e) => {
                self.queues.member_status(&e);
                true
            }

            SwitchEvent::QueueParams(e) => {
                self.queues.apply_params(&e);
                true
            }

            SwitchEvent::QueueSummary(e) => {
                self.queues.apply_summary(&e);
                true
            }
        }
    }

    fn handle_hangup(&self, event: Hangup) {
        let session = self.sessions.terminate(&event);

        if let Some(session) = &session {
            if let Some(queue) = &session.queue_name {
                if session.counted_waiting {
                    self.queues.caller_left(queue);
                }
                if session.answered_at.is_some() {
                    self.queues.record_completed(queue);
                } else {
                    self.queues.record_abandoned(queue);
                }
            }
        } else {
            warn!(
                "📞 Hangup for unknown call {}, synthesizing record",
                event.unique_id
            );
        }

        let external = session
            .as_ref()
            .map(|s| s.direction == CallDirection::Inbound)
            .unwrap_or_else(|| self.is_external_context(event.context.as_deref()));
        let direction = session
            .as_ref()
            .map(|s| s.direction)
            .unwrap_or(if external {
                CallDirection::Inbound
            } else {
                CallDirection::Outbound
            });

        self.spawn_reconcile(session, event, external, direction);
    }

    fn handle_queue_leave(&self, event: QueueCallerLeave) -> bool {
        match self.sessions.observe_queue_leave(&event) {
            QueueLeaveOutcome::Ignored => {
                // No session to consult: best-effort decrement, clamped.
                self.queues.caller_left(&event.queue);
                true
            }
            QueueLeaveOutcome::Connected { queue, was_waiting } => {
                if was_waiting {
                    self.queues.caller_left(&queue);
                }
                was_waiting
            }
            QueueLeaveOutcome::Abandoned {
                session,
                was_waiting,
            } => {
                if was_waiting {
                    self.queues.caller_left(&event.queue);
                }
                self.queues.record_abandoned(&event.queue);

                // No hangup will follow; reconcile from the session copy.
                let synthetic = Hangup {
                    unique_id: session.id.to_string(),
                    ..Default::default()
                };
                let external = session.direction == CallDirection::Inbound;
                let direction = session.direction;
                self.spawn_reconcile(Some(session), synthetic, external, direction);
                true
            }
        }
    }

    fn spawn_reconcile(
        &self,
        session: Option<crate::session::CallSession>,
        event: Hangup,
        external: bool,
        direction: CallDirection,
    ) {
        let reconciler = self.reconciler.clone();
        let billing = self.billing.clone();

        tokio::spawn(async move {
            match reconciler.reconcile(session.as_ref(), &event, external).await {
                Ok(outcome) => {
                    // Only the first completion may bill; a replayed
                    // termination re-reconciles but must not re-charge.
                    if let Some(billing) = billing {
                        if outcome.first_completion && is_billable(&outcome.record, direction) {
                            billing.submit(outcome.record);
                        }
                    }
                }
                Err(e) => {
                    // The session is already cleaned up; the call's history
                    // entry is what degrades.
                    error!("🗄️ CDR reconciliation failed for {}: {}", event.unique_id, e);
                }
            }
        });
    }

    fn is_external_context(&self, context: Option<&str>) -> bool {
        context.is_some_and(|ctx| {
            self.config
                .general
                .external_contexts
                .iter()
                .any(|external| external.eq_ignore_ascii_case(ctx))
        })
    }
}
