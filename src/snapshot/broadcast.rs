use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, trace};

use super::{SnapshotBuilder, StatsSnapshot};

/// Publishes snapshots to all subscribers over a tokio broadcast channel.
///
/// Delivery is best-effort: a slow subscriber lags and drops within its own
/// receiver, never blocking publication to the others. Triggered publishes
/// are at-most-once-per-trigger: a trigger arriving while a build is in
/// flight is swallowed, and the newer state is picked up by the next
/// scheduled tick at the latest.
#[derive(Clone)]
pub struct SnapshotBroadcaster {
    builder: Arc<SnapshotBuilder>,
    tx: broadcast::Sender<Arc<StatsSnapshot>>,
    in_flight: Arc<AtomicBool>,
}

impl SnapshotBroadcaster {
    pub fn new(builder: Arc<SnapshotBuilder>, channel_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(channel_capacity);
        Self {
            builder,
            tx,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribe to all future snapshots.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StatsSnapshot>> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Build and publish one snapshot now. Used by the fixed interval tick.
    pub async fn publish_now(&self) {
        let snapshot = Arc::new(self.builder.build().await);
        // Send only fails when nobody is subscribed.
        if self.tx.send(snapshot).is_err() {
            trace!("📡 Snapshot built with no subscribers");
        }
    }

    /// Publish in response to an observable state change. Spawns off the
    /// event pipeline; coincident triggers collapse into one publish.
    pub fn trigger(&self) {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            trace!("📡 Snapshot build already in flight, skipping trigger");
            return;
        }

        let broadcaster = self.clone();
        tokio::spawn(async move {
            broadcaster.publish_now().await;
            broadcaster.in_flight.store(false, Ordering::Release);
            debug!("📡 Triggered snapshot published");
        });
    }
}
