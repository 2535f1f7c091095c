//! Stack-oriented snapshots of a container host.
//!
//! Containers are grouped into stacks (compose project label, or the name
//! prefix), their state and resource usage formatted for display, and the
//! results served from a two-tier TTL cache. A background task keeps the
//! fleet-wide summary warm; per-stack detail is rebuilt on demand.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod error;
pub mod format;
pub mod inspector;
pub mod metric_registry;
pub mod model;
pub mod refresher;
pub mod router;
pub mod routes;
pub mod snapshot;
pub mod state;

pub use config::Config;
pub use error::{Result, StackwatchError};
pub use snapshot::SnapshotService;
