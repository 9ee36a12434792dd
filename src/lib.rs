//! Pipeline Coordinator Library
//!
//! Coordination layer for multi-agent pipelines: a dependency-aware work
//! queue, an event bus, point-to-point messaging, quality gates with human
//! approval, and an audit trail. The HTTP API and Postgres audit sink are
//! adapters around it.

pub mod agents;
pub mod api;
pub mod config;
pub mod domain;
pub mod infrastructure;
