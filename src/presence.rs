//! Agent presence derivation.
//!
//! Presence is never stored: an extension is `Offline` unless the external
//! registration collaborator says otherwise, and registered extensions are
//! `On Call` exactly when a live session references them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Registration state reported by the external presence collaborator.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RegistrationStatus {
    pub registered: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// Presence collaborator port.
#[async_trait]
pub trait PresenceDirectory: Send + Sync {
    async fn registration_status(&self, extension: &str) -> Result<RegistrationStatus>;
}

/// Derived presence state of one extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentPresence {
    Offline,
    Available,
    OnCall,
}

impl AgentPresence {
    /// Derive presence from registration plus live-session involvement.
    pub fn derive(registered: bool, on_live_call: bool) -> Self {
        match (registered, on_live_call) {
            (false, _) => AgentPresence::Offline,
            (true, true) => AgentPresence::OnCall,
            (true, false) => AgentPresence::Available,
        }
    }
}

impl std::fmt::Display for AgentPresence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentPresence::Offline => write!(f, "Offline"),
            AgentPresence::Available => write!(f, "Available"),
            AgentPresence::OnCall => write!(f, "On Call"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_is_offline_even_on_a_call() {
        assert_eq!(AgentPresence::derive(false, true), AgentPresence::Offline);
        assert_eq!(AgentPresence::derive(false, false), AgentPresence::Offline);
    }

    #[test]
    fn registered_splits_on_live_call() {
        assert_eq!(AgentPresence::derive(true, true), AgentPresence::OnCall);
        assert_eq!(AgentPresence::derive(true, false), AgentPresence::Available);
    }
}
