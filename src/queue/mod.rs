//! Per-queue statistics aggregation.
//!
//! Counters come from two places: periodic wholesale snapshots emitted by the
//! switch (authoritative when they arrive) and per-event increments that keep
//! the numbers live in between. Stale queue data is acceptable; missing queue
//! data is not, so nothing here ever blocks on the refresh side effect.

pub mod aggregator;

pub use aggregator::{QueueAggregator, QueueMember, QueueSnapshot, QueueState};
