//! Billing hand-off.
//!
//! Billing correctness is lower priority than reconciliation correctness:
//! the hand-off is a one-way send into a bounded channel drained by a worker
//! task, so a slow or failing billing collaborator can never stall the event
//! pipeline or delay CDR upserts. Every failure in this path is logged and
//! swallowed.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cdr::CallDetailRecord;
use crate::error::Result;

/// Outbound trunk/account a billable call was carried on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrunkAccount {
    pub account: String,
}

/// Cost computed for one completed call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostRecord {
    pub call_id: String,
    pub account: String,
    pub duration_seconds: i64,
    pub cost: f64,
}

/// Billing collaborator port.
#[async_trait]
pub trait BillingGateway: Send + Sync {
    /// Look up the trunk/account the call's source is associated with.
    async fn find_trunk(&self, source: &str) -> Result<Option<TrunkAccount>>;

    /// Compute the cost record for a completed call. `None` means the call is
    /// not billable under the account's plan.
    async fn record_cost(
        &self,
        record: &CallDetailRecord,
        trunk: &TrunkAccount,
    ) -> Result<Option<CostRecord>>;

    /// Apply the balance delta for a computed cost.
    async fn apply_balance_delta(
        &self,
        account: &str,
        duration_seconds: i64,
        cost: f64,
    ) -> Result<()>;
}

/// Fire-and-forget entry point into the billing worker.
#[derive(Clone)]
pub struct BillingTrigger {
    tx: mpsc::Sender<CallDetailRecord>,
}

impl BillingTrigger {
    /// Spawn the billing worker and return the trigger plus its task handle.
    /// The worker exits when the last trigger handle is dropped.
    pub fn spawn(
        gateway: Arc<dyn BillingGateway>,
        queue_capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<CallDetailRecord>(queue_capacity);

        let handle = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                Self::process(gateway.as_ref(), record).await;
            }
            debug!("💰 Billing worker stopped");
        });

        (Self { tx }, handle)
    }

    /// Submit a completed call for billing. Never blocks: a full queue drops
    /// the job with a warning.
    pub fn submit(&self, record: CallDetailRecord) {
        let unique_id = record.unique_id.clone();
        match self.tx.try_send(record) {
            Ok(()) => debug!("💰 Billing job queued for {}", unique_id),
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("💰 Billing queue full, dropping job for {}", unique_id);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("💰 Billing worker gone, dropping job for {}", unique_id);
            }
        }
    }

    async fn process(gateway: &dyn BillingGateway, record: CallDetailRecord) {
        let trunk = match gateway.find_trunk(&record.source).await {
            Ok(Some(trunk)) => trunk,
            Ok(None) => {
                debug!("💰 No trunk for source {}, skipping", record.source);
                return;
            }
            Err(e) => {
                warn!("💰 Trunk lookup failed for {}: {}", record.unique_id, e);
                return;
            }
        };

        let cost = match gateway.record_cost(&record, &trunk).await {
            Ok(Some(cost)) => cost,
            Ok(None) => {
                debug!("💰 Call {} not billable for {}", record.unique_id, trunk.account);
                return;
            }
            Err(e) => {
                warn!("💰 Cost computation failed for {}: {}", record.unique_id, e);
                return;
            }
        };

        match gateway
            .apply_balance_delta(&cost.account, cost.duration_seconds, cost.cost)
            .await
        {
            Ok(()) => info!(
                "💰 Billed call {} to {} ({:.4})",
                record.unique_id, cost.account, cost.cost
            ),
            Err(e) => warn!("💰 Balance update failed for {}: {}", record.unique_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdr::Disposition;
    use crate::error::MonitorError;
    use chrono::Utc;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingGateway {
        trunks: Vec<(String, String)>,
        fail_balance: bool,
        applied: Mutex<Vec<CostRecord>>,
    }

    #[async_trait]
    impl BillingGateway for RecordingGateway {
        async fn find_trunk(&self, source: &str) -> Result<Option<TrunkAccount>> {
            Ok(self
                .trunks
                .iter()
                .find(|(s, _)| s == source)
                .map(|(_, account)| TrunkAccount {
                    account: account.clone(),
                }))
        }

        async fn record_cost(
            &self,
            record: &CallDetailRecord,
            trunk: &TrunkAccount,
        ) -> Result<Option<CostRecord>> {
            Ok(Some(CostRecord {
                call_id: record.unique_id.clone(),
                account: trunk.account.clone(),
                duration_seconds: record.billable_seconds,
                cost: record.billable_seconds as f64 * 0.01,
            }))
        }

        async fn apply_balance_delta(
            &self,
            account: &str,
            duration_seconds: i64,
            cost: f64,
        ) -> Result<()> {
            if self.fail_balance {
                return Err(MonitorError::billing("balance service unavailable"));
            }
            self.applied.lock().push(CostRecord {
                call_id: String::new(),
                account: account.to_string(),
                duration_seconds,
                cost,
            });
            Ok(())
        }
    }

    fn answered_record(unique_id: &str, source: &str) -> CallDetailRecord {
        CallDetailRecord {
            unique_id: unique_id.to_string(),
            start: Utc::now(),
            answer: Some(Utc::now()),
            end: Some(Utc::now()),
            source: source.to_string(),
            destination: "5550123".to_string(),
            context: "outbound".to_string(),
            channel: "PJSIP/1001-0003".to_string(),
            peer_channel: None,
            last_application: None,
            last_application_data: None,
            duration_seconds: 70,
            billable_seconds: 60,
            disposition: Disposition::Answered,
            account_code: None,
            caller_number: None,
        }
    }

    #[tokio::test]
    async fn billable_call_reaches_balance_update() {
        let gateway = Arc::new(RecordingGateway {
            trunks: vec![("1001".to_string(), "acct-main".to_string())],
            ..Default::default()
        });
        let (trigger, handle) = BillingTrigger::spawn(gateway.clone(), 8);

        trigger.submit(answered_record("20.1", "1001"));
        drop(trigger);
        handle.await.unwrap();

        let applied = gateway.applied.lock();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].account, "acct-main");
        assert_eq!(applied[0].duration_seconds, 60);
    }

    #[tokio::test]
    async fn missing_trunk_is_swallowed() {
        let gateway = Arc::new(RecordingGateway::default());
        let (trigger, handle) = BillingTrigger::spawn(gateway.clone(), 8);

        trigger.submit(answered_record("20.2", "no-such-source"));
        drop(trigger);
        handle.await.unwrap();

        assert!(gateway.applied.lock().is_empty());
    }

    #[tokio::test]
    async fn balance_failure_is_swallowed() {
        let gateway = Arc::new(RecordingGateway {
            trunks: vec![("1001".to_string(), "acct-main".to_string())],
            fail_balance: true,
            ..Default::default()
        });
        let (trigger, handle) = BillingTrigger::spawn(gateway.clone(), 8);

        trigger.submit(answered_record("20.3", "1001"));
        drop(trigger);
        handle.await.unwrap();

        assert!(gateway.applied.lock().is_empty());
    }
}
