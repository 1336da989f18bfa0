use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{MonitorError, Result};

/// Monitoring engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// General engine settings
    pub general: GeneralConfig,

    /// Queue monitoring configuration
    pub queues: QueueMonitorConfig,

    /// Snapshot building and broadcasting configuration
    pub snapshot: SnapshotConfig,

    /// Billing hand-off configuration
    pub billing: BillingConfig,
}

/// General engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Extensions whose presence is reported in snapshots
    pub monitored_extensions: Vec<String>,

    /// Routing contexts that mark a call as externally originated
    pub external_contexts: Vec<String>,

    /// Start-time fallback window (seconds) for records synthesized
    /// without any session evidence
    pub fallback_start_window_secs: u64,

    /// Capacity of the inbound event channel
    pub event_channel_capacity: usize,
}

/// Queue monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMonitorConfig {
    /// How often a fresh queue status snapshot is requested from the switch
    pub refresh_interval: Duration,
}

/// Snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Fixed broadcast interval, independent of activity
    pub broadcast_interval: Duration,

    /// Broadcast channel capacity (lagging subscribers drop, never block)
    pub channel_capacity: usize,

    /// Hours of hourly-histogram history included in each snapshot
    pub history_hours: u32,
}

/// Billing hand-off configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Whether completed outbound calls are handed to the billing collaborator
    pub enabled: bool,

    /// Bounded job queue capacity between the pipeline and the billing worker
    pub queue_capacity: usize,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            monitored_extensions: Vec::new(),
            external_contexts: vec![
                "from-trunk".to_string(),
                "from-pstn".to_string(),
                "from-voip".to_string(),
            ],
            fallback_start_window_secs: 60,
            event_channel_capacity: 1024,
        }
    }
}

impl Default for QueueMonitorConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30),
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            broadcast_interval: Duration::from_secs(10),
            channel_capacity: 256,
            history_hours: 6,
        }
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: 256,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            queues: QueueMonitorConfig::default(),
            snapshot: SnapshotConfig::default(),
            billing: BillingConfig::default(),
        }
    }
}

impl MonitorConfig {
    /// Validate the configuration for consistency and correctness
    pub fn validate(&self) -> Result<()> {
        if self.general.event_channel_capacity == 0 {
            return Err(MonitorError::config("event_channel_capacity must be > 0"));
        }

        if self.general.fallback_start_window_secs == 0 {
            return Err(MonitorError::config(
                "fallback_start_window_secs must be > 0",
            ));
        }

        if self.queues.refresh_interval.is_zero() {
            return Err(MonitorError::config("queue refresh_interval must be > 0"));
        }

        if self.snapshot.broadcast_interval.is_zero() {
            return Err(MonitorError::config(
                "snapshot broadcast_interval must be > 0",
            ));
        }

        if self.snapshot.channel_capacity == 0 {
            return Err(MonitorError::config("snapshot channel_capacity must be > 0"));
        }

        if self.snapshot.history_hours == 0 || self.snapshot.history_hours > 48 {
            return Err(MonitorError::config(
                "snapshot history_hours must be between 1 and 48",
            ));
        }

        if self.billing.enabled && self.billing.queue_capacity == 0 {
            return Err(MonitorError::config(
                "billing queue_capacity must be > 0 when billing is enabled",
            ));
        }

        Ok(())
    }
}
