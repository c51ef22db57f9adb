// Common types and utilities shared across the SignalBridge crates

pub mod config;
pub mod error;
pub mod metrics;
pub mod types;

pub use config::{
    BridgeConfig, CacheConfig, MappingConfig, SubscriptionDefaults, UpstreamConfig,
    ValidationPolicy,
};
pub use error::{BridgeError, Result};
pub use metrics::BridgeMetrics;
pub use types::{
    Command, PathSubscription, SubscribeRequest, TelemetryDelta, TelemetryUpdate, TelemetryValue,
    UnsubscribePattern, UnsubscribeRequest,
};
