use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Switch-assigned unique call identifier, stable for the call's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub String);

impl CallId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CallId {
    fn from(value: &str) -> Self {
        CallId(value.to_string())
    }
}

impl From<String> for CallId {
    fn from(value: String) -> Self {
        CallId(value)
    }
}

/// Call direction relative to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDirection {
    Inbound,
    Outbound,
}

/// Session lifecycle status. Terminated sessions leave the live table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Ringing,
    Answered,
    Terminated,
}

/// One call currently in flight.
#[derive(Debug, Clone)]
pub struct CallSession {
    pub id: CallId,
    pub linked_id: Option<CallId>,
    pub source: String,
    pub destination: String,
    pub direction: CallDirection,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub channel: String,
    pub peer_channel: Option<String>,
    pub bridge_id: Option<String>,
    pub context: String,
    pub queue_name: Option<String>,
    pub queue_position: Option<u32>,
    /// Best-effort true caller number; only upgraded, never clobbered.
    pub resolved_caller_number: Option<String>,
    /// Whether this session is currently counted in its queue's waiting
    /// depth. Cleared exactly once, on answer/leave/hangup.
    pub(crate) counted_waiting: bool,
}

impl CallSession {
    pub fn new(id: CallId, direction: CallDirection) -> Self {
        Self {
            id,
            linked_id: None,
            source: String::new(),
            destination: String::new(),
            direction,
            status: SessionStatus::Ringing,
            started_at: Utc::now(),
            answered_at: None,
            channel: String::new(),
            peer_channel: None,
            bridge_id: None,
            context: String::new(),
            queue_name: None,
            queue_position: None,
            resolved_caller_number: None,
            counted_waiting: false,
        }
    }

    /// Whether the session references the given extension as either endpoint.
    pub fn involves_extension(&self, extension: &str) -> bool {
        self.source == extension || self.destination == extension
    }
}
