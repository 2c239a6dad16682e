//! Delivery guarantees and consumer offset management for Kafka pipelines.
//!
//! [`producer`] publishes batches with at-least-once or exactly-once
//! semantics, reconciling ambiguous failures against partition watermarks.
//! [`consumer`] tracks what a group member has read, commits offsets through a
//! cache that skips unchanged values, and rebuilds its state on every
//! rebalance.

pub mod broker;
pub mod config;
pub mod consumer;
pub mod kafka;
pub mod metrics_consts;
pub mod producer;
pub mod test_utils;
pub mod types;
