//! # Callwatch
//!
//! A call state reconciliation and monitoring engine for contact-center
//! platforms sitting in front of a PBX/telephony switch. This crate consumes
//! the switch's asynchronous call-control and queue-control event feed,
//! maintains the authoritative in-memory picture of "what is happening right
//! now", repairs the durable call-detail-record store when the switch does
//! not produce a clean record, and broadcasts consistent statistics
//! snapshots to all subscribers.
//!
//! ## Overview
//!
//! The engine keeps three data sources consistent under concurrent,
//! out-of-order, and sometimes-missing event delivery:
//!
//! - **Live events** from the switch (channel created, ringing, bridged,
//!   hung up, queue joins/leaves, queue/member snapshots)
//! - **In-memory state** (the session table and per-queue counters)
//! - **Durable storage** (the CDR store, which lags behind and is sometimes
//!   incomplete or missing entirely for a given call)
//!
//! No single authoritative event is ever guaranteed to arrive, so every
//! handler is defensive: duplicate creates update in place, hangups for
//! never-seen calls still synthesize a record, and leave events for unknown
//! callers are no-ops.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Event Source    │  (external: speaks the switch's manager protocol)
//! └────────┬────────┘
//!          │ RawEvent
//! ┌────────▼────────┐
//! │  MonitorEngine   │  single event-processing pipeline
//! │                  │
//! │  ┌────────────┐  │   ┌──────────────────┐
//! │  │ Session    │  │   │ QueueAggregator   │
//! │  │ Tracker    │  │   │ (per-queue state) │
//! │  └─────┬──────┘  │   └──────────────────┘
//! └────────┼─────────┘
//!          │ termination (copied session)
//! ┌────────▼────────┐    ┌──────────────────┐
//! │  CdrReconciler   │───▶│  CdrStore (sqlx) │
//! └────────┬────────┘    └──────────────────┘
//!          │ answered + billable + outbound
//! ┌────────▼────────┐    ┌──────────────────┐
//! │  BillingTrigger  │───▶│  BillingGateway  │
//! └─────────────────┘    └──────────────────┘
//!
//! SnapshotBuilder reads (never mutates) all of the above plus the
//! PresenceDirectory, and SnapshotBroadcaster fans the result out on a
//! fixed interval and after every observable state change.
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use callwatch::prelude::*;
//!
//! # struct NoBilling;
//! # #[async_trait::async_trait]
//! # impl BillingGateway for NoBilling {
//! #     async fn find_trunk(&self, _: &str) -> callwatch::Result<Option<TrunkAccount>> { Ok(None) }
//! #     async fn record_cost(&self, _: &CallDetailRecord, _: &TrunkAccount) -> callwatch::Result<Option<CostRecord>> { Ok(None) }
//! #     async fn apply_balance_delta(&self, _: &str, _: i64, _: f64) -> callwatch::Result<()> { Ok(()) }
//! # }
//! # struct NoPresence;
//! # #[async_trait::async_trait]
//! # impl PresenceDirectory for NoPresence {
//! #     async fn registration_status(&self, _: &str) -> callwatch::Result<RegistrationStatus> { Ok(Default::default()) }
//! # }
//! # struct NoRefresh;
//! # impl QueueStatusRequester for NoRefresh { fn request_queue_status(&self) {} }
//! # async fn example() -> callwatch::Result<()> {
//! let config = MonitorConfig::default();
//! let store = Arc::new(SqliteCdrStore::connect("sqlite://cdr.db?mode=rwc").await?);
//!
//! let engine = MonitorEngine::new(
//!     config,
//!     store,
//!     Arc::new(NoBilling),
//!     Arc::new(NoPresence),
//!     Arc::new(NoRefresh),
//! )?;
//!
//! // Feed events from the switch, watch snapshots come back.
//! let (events, _pipeline) = engine.start();
//! let mut snapshots = engine.subscribe();
//!
//! events
//!     .send(RawEvent::new("Newchannel")
//!         .with("Uniqueid", "1700000000.1")
//!         .with("Channel", "PJSIP/trunk-0001")
//!         .with("Src", "5550100")
//!         .with("Exten", "2001")
//!         .with("Context", "from-trunk"))
//!     .await
//!     .ok();
//!
//! let snapshot = snapshots.recv().await.expect("snapshot");
//! println!("active calls: {}", snapshot.active_call_count());
//! # Ok(())
//! # }
//! ```
//!
//! ## Key Modules
//!
//! - [`engine`]: the [`MonitorEngine`] pipeline and timers
//! - [`session`]: authoritative in-memory session tracking
//! - [`queue`]: per-queue statistics aggregation
//! - [`identity`]: ranked caller-number resolution
//! - [`cdr`]: disposition classification, the store port, and reconciliation
//! - [`billing`]: fire-and-forget billing hand-off
//! - [`presence`]: derived agent presence
//! - [`snapshot`]: snapshot building and broadcasting
//! - [`events`]: the typed event set and boundary normalization
//! - [`config`]: configuration management and validation
//! - [`error`]: error handling and result types

// Core modules
pub mod config;
pub mod error;

// Event boundary
pub mod events;

// Live state
pub mod queue;
pub mod session;

// Reconciliation and downstream hand-offs
pub mod billing;
pub mod cdr;
pub mod identity;

// Read-side projections
pub mod presence;
pub mod snapshot;

// Pipeline wiring
pub mod engine;

// Re-exports for convenience
pub use config::MonitorConfig;
pub use engine::MonitorEngine;
pub use error::{MonitorError, Result};

/// Prelude module for convenient imports
///
/// ```
/// use callwatch::prelude::*;
/// ```
pub mod prelude {
    //! Commonly used types for applications embedding the engine.

    pub use crate::config::{
        BillingConfig, GeneralConfig, MonitorConfig, QueueMonitorConfig, SnapshotConfig,
    };
    pub use crate::engine::{EngineStats, MonitorEngine, QueueStatusRequester};
    pub use crate::error::{MonitorError, Result};

    pub use crate::events::{RawEvent, SwitchEvent};
    pub use crate::session::{CallDirection, CallId, CallSession, SessionStatus};

    pub use crate::cdr::{
        CallDetailRecord, CallVolume, CdrReconciler, CdrStore, Disposition, ReconcileOutcome,
        SqliteCdrStore,
    };

    pub use crate::billing::{BillingGateway, BillingTrigger, CostRecord, TrunkAccount};
    pub use crate::identity::{resolve_caller_number, CallerSignals};
    pub use crate::presence::{AgentPresence, PresenceDirectory, RegistrationStatus};
    pub use crate::queue::{QueueAggregator, QueueSnapshot, QueueState};
    pub use crate::snapshot::{SnapshotBroadcaster, SnapshotBuilder, StatsSnapshot};

    // Common external types
    pub use chrono::{DateTime, Utc};
    pub use uuid::Uuid;
}
