use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, info};

use crate::error::Result;
use crate::events::Hangup;
use crate::identity::{resolve_caller_number, CallerSignals};
use crate::session::{CallDirection, CallSession};

use super::store::CdrStore;
use super::{classify_cause, CallDetailRecord, CdrUpdate, Disposition};

/// Result of one reconciliation pass.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub record: CallDetailRecord,
    /// True the first time this call's record reached its terminal state:
    /// the pass created the row, or widened a row that had no end yet.
    /// False for replayed terminations, which leave the row's timestamps
    /// untouched.
    pub first_completion: bool,
}

/// Derives/repairs the durable record for a call at termination time.
///
/// Runs off the event pipeline, over a copied session. Replays converge
/// without corruption: the store lookup plus the conflict-tolerant create
/// mean a duplicated termination event can never produce a second row, and a
/// row that already carries an end keeps its end/duration/billable fields.
pub struct CdrReconciler {
    store: Arc<dyn CdrStore>,
    /// Start-time fallback for records synthesized with no session evidence.
    fallback_start_window: Duration,
}

impl CdrReconciler {
    pub fn new(store: Arc<dyn CdrStore>, fallback_start_window_secs: u64) -> Self {
        Self {
            store,
            fallback_start_window: Duration::seconds(fallback_start_window_secs as i64),
        }
    }

    /// Upsert the record for a terminated call.
    ///
    /// `session` is the copy handed out of the live table, when one existed;
    /// a hangup for an unseen id still synthesizes a best-effort record from
    /// the event's own fields. `externally_originated` is the routing-context
    /// classification used when the session carries no direction of its own.
    pub async fn reconcile(
        &self,
        session: Option<&CallSession>,
        hangup: &Hangup,
        externally_originated: bool,
    ) -> Result<ReconcileOutcome> {
        let now = Utc::now();
        let disposition = classify_cause(hangup.cause);

        let source = session
            .map(|s| s.source.clone())
            .filter(|s| !s.is_empty())
            .or_else(|| hangup.source.clone())
            .unwrap_or_default();
        let destination = session
            .map(|s| s.destination.clone())
            .filter(|d| !d.is_empty())
            .or_else(|| hangup.destination.clone())
            .unwrap_or_default();

        let external = session
            .map(|s| s.direction == CallDirection::Inbound)
            .unwrap_or(externally_originated);

        let existing = self.store.find_by_unique_id(&hangup.unique_id).await?;

        // The stored caller number ranks as an already-resolved signal, so a
        // replay arriving with fewer signals cannot downgrade it.
        let caller_number = resolve_caller_number(&CallerSignals {
            resolved: session
                .and_then(|s| s.resolved_caller_number.as_deref())
                .or_else(|| existing.as_ref().and_then(|r| r.caller_number.as_deref())),
            connected_line: hangup.connected_line.as_deref(),
            caller_id: hangup.caller_id.as_deref(),
            source: (!source.is_empty()).then_some(source.as_str()),
            destination: (!destination.is_empty()).then_some(destination.as_str()),
            externally_originated: external,
        });

        let answer = session.and_then(|s| s.answered_at);

        match existing {
            Some(existing) if existing.end.is_some() => {
                // Already reconciled: end/duration/billable stay as recorded.
                let caller_update = (existing.caller_number.as_deref()
                    != Some(caller_number.as_str()))
                .then(|| caller_number.clone());

                if caller_update.is_some() {
                    self.store
                        .update(
                            &hangup.unique_id,
                            CdrUpdate {
                                caller_number: caller_update,
                                ..Default::default()
                            },
                        )
                        .await?;
                }

                debug!(
                    "🗄️ CDR {} already reconciled, leaving timestamps",
                    hangup.unique_id
                );

                Ok(ReconcileOutcome {
                    record: CallDetailRecord {
                        caller_number: Some(caller_number),
                        ..existing
                    },
                    first_completion: false,
                })
            }
            Some(existing) => {
                let duration = (now - existing.start).num_seconds().max(0);
                let billable = existing
                    .answer
                    .or(answer)
                    .map(|a| (now - a).num_seconds().max(0))
                    .unwrap_or(0);

                let caller_update = (existing.caller_number.as_deref()
                    != Some(caller_number.as_str()))
                .then(|| caller_number.clone());

                let completed = self
                    .store
                    .update(
                        &hangup.unique_id,
                        CdrUpdate {
                            end: Some(now),
                            disposition: Some(disposition),
                            duration_seconds: Some(duration),
                            billable_seconds: Some(billable),
                            caller_number: caller_update,
                        },
                    )
                    .await?;

                if !completed {
                    // A concurrent reconcile recorded the teardown between
                    // the lookup and the update; its row stands.
                    debug!(
                        "🗄️ CDR {} completed concurrently, leaving timestamps",
                        hangup.unique_id
                    );
                    let record = self
                        .store
                        .find_by_unique_id(&hangup.unique_id)
                        .await?
                        .unwrap_or(existing);
                    return Ok(ReconcileOutcome {
                        record,
                        first_completion: false,
                    });
                }

                debug!(
                    "🗄️ Widened CDR {} ({}, {}s)",
                    hangup.unique_id, disposition, duration
                );

                Ok(ReconcileOutcome {
                    record: CallDetailRecord {
                        end: Some(now),
                        disposition,
                        duration_seconds: duration,
                        billable_seconds: billable,
                        caller_number: Some(caller_number),
                        ..existing
                    },
                    first_completion: true,
                })
            }
            None => {
                let start = session
                    .map(|s| s.started_at)
                    .unwrap_or_else(|| now - self.fallback_start_window);
                let duration = (now - start).num_seconds().max(0);
                let billable = answer.map(|a| (now - a).num_seconds().max(0)).unwrap_or(0);

                let record = CallDetailRecord {
                    unique_id: hangup.unique_id.clone(),
                    start,
                    answer,
                    end: Some(now),
                    source,
                    destination,
                    context: session
                        .map(|s| s.context.clone())
                        .filter(|c| !c.is_empty())
                        .or_else(|| hangup.context.clone())
                        .unwrap_or_default(),
                    channel: session
                        .map(|s| s.channel.clone())
                        .filter(|c| !c.is_empty())
                        .or_else(|| hangup.channel.clone())
                        .unwrap_or_default(),
                    peer_channel: session.and_then(|s| s.peer_channel.clone()),
                    last_application: None,
                    last_application_data: None,
                    duration_seconds: duration,
                    billable_seconds: billable,
                    disposition,
                    account_code: None,
                    caller_number: Some(caller_number),
                };

                let inserted = self.store.create(&record).await?;

                if !inserted {
                    // A concurrent reconcile created the row first; it owns
                    // the completion.
                    let record = self
                        .store
                        .find_by_unique_id(&hangup.unique_id)
                        .await?
                        .unwrap_or(record);
                    return Ok(ReconcileOutcome {
                        record,
                        first_completion: false,
                    });
                }

                if session.is_none() {
                    info!(
                        "🗄️ Synthesized CDR {} from hangup alone (cause {})",
                        hangup.unique_id, hangup.cause
                    );
                }

                Ok(ReconcileOutcome {
                    record,
                    first_completion: true,
                })
            }
        }
    }
}

/// Whether a completed call qualifies for the billing hand-off.
pub fn is_billable(record: &CallDetailRecord, direction: CallDirection) -> bool {
    record.disposition == Disposition::Answered
        && record.billable_seconds > 0
        && direction == CallDirection::Outbound
}
