//! Call detail records: classification, storage port, and reconciliation.
//!
//! The CDR store is the durable source of truth for completed calls, but the
//! switch does not reliably write it: rows arrive late, incomplete, or not at
//! all. The reconciler repairs the store from in-memory session state at
//! termination time; the store port keeps the engine independent of any one
//! database.

pub mod disposition;
pub mod reconciler;
pub mod sqlite;
pub mod store;

pub use disposition::classify_cause;
pub use reconciler::{CdrReconciler, ReconcileOutcome};
pub use sqlite::SqliteCdrStore;
pub use store::{CallVolume, CdrStore, HourlyBucket};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal outcome classification of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disposition {
    Answered,
    NoAnswer,
    Busy,
    Failed,
}

impl Disposition {
    /// Wire/storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Answered => "ANSWERED",
            Disposition::NoAnswer => "NO_ANSWER",
            Disposition::Busy => "BUSY",
            Disposition::Failed => "FAILED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ANSWERED" => Some(Disposition::Answered),
            "NO_ANSWER" => Some(Disposition::NoAnswer),
            "BUSY" => Some(Disposition::Busy),
            "FAILED" => Some(Disposition::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable call detail record. Rows may be written by the switch itself or
/// synthesized by the reconciler; fields are only ever widened or corrected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallDetailRecord {
    pub unique_id: String,
    pub start: DateTime<Utc>,
    pub answer: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub source: String,
    pub destination: String,
    pub context: String,
    pub channel: String,
    pub peer_channel: Option<String>,
    pub last_application: Option<String>,
    pub last_application_data: Option<String>,
    pub duration_seconds: i64,
    pub billable_seconds: i64,
    pub disposition: Disposition,
    pub account_code: Option<String>,
    /// Free-text carrier for the resolved caller number; the only place the
    /// true caller number survives after the call ends.
    pub caller_number: Option<String>,
}

/// Partial field set for widening an existing record.
#[derive(Debug, Clone, Default)]
pub struct CdrUpdate {
    pub end: Option<DateTime<Utc>>,
    pub disposition: Option<Disposition>,
    pub duration_seconds: Option<i64>,
    pub billable_seconds: Option<i64>,
    pub caller_number: Option<String>,
}
