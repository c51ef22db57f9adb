//! # SignalBridge
//!
//! Bridges a delta-style telemetry stream (JSON over a persistent WebSocket)
//! to a device-management protocol addressed by object/instance/resource
//! triples. The subscription manager owns the upstream connection lifecycle
//! and feeds raw deltas, in arrival order, to the dispatch engine, which
//! resolves each path through the mapping table, runs conversions and
//! mandatory-resource validation, and emits one textual command per
//! forwarded value.

pub mod dispatch;
pub mod extract;
pub mod helper;
pub mod mapping;
pub mod sink;
pub mod subscription;
pub mod template;
pub mod validation;

pub use dispatch::DispatchEngine;
pub use mapping::{MappingEntry, MappingTable};
pub use sink::{ChannelSink, CommandSink, LineSink};
pub use subscription::{ConnectionState, SubscriptionManager};
pub use validation::{MandatoryResourceCache, ValidationReport};
