use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::{CallDetailRecord, CdrUpdate};

/// Aggregate call counts over a time window.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CallVolume {
    pub total: i64,
    pub answered: i64,
}

impl CallVolume {
    /// Calls that never reached an agent (any non-answered disposition).
    pub fn abandoned(&self) -> i64 {
        (self.total - self.answered).max(0)
    }
}

/// One hour of call volume for the snapshot histogram.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HourlyBucket {
    pub hour_start: DateTime<Utc>,
    pub total: i64,
}

/// Durable CDR store port.
///
/// `create` must be conflict-tolerant on the unique-id key, and completion
/// updates must be atomic on it, so the reconciler's find-then-create
/// discipline stays idempotent under replayed termination events.
#[async_trait]
pub trait CdrStore: Send + Sync {
    async fn find_by_unique_id(&self, unique_id: &str) -> Result<Option<CallDetailRecord>>;

    /// Insert a new record. Conflict-tolerant on the unique-id key: returns
    /// true when the row was inserted, false when a row for the id already
    /// existed and was left in place.
    async fn create(&self, record: &CallDetailRecord) -> Result<bool>;

    /// Apply a partial update. An update carrying `end` only applies to rows
    /// that have no end yet (the recorded teardown is write-once). Returns
    /// true when a row was changed.
    async fn update(&self, unique_id: &str, changes: CdrUpdate) -> Result<bool>;

    /// Total/answered counts for calls started at or after `since`.
    async fn call_volume_since(&self, since: DateTime<Utc>) -> Result<CallVolume>;

    /// Per-hour call counts for calls started at or after `since`, ordered by
    /// hour. Empty hours are omitted.
    async fn hourly_histogram(&self, since: DateTime<Utc>) -> Result<Vec<HourlyBucket>>;
}
