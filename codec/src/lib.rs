//! # SignalBridge Codec
//!
//! Pure value transforms sitting between the telemetry stream and the
//! downstream command protocol:
//!
//! - [`conversion`] — the closed registry of named unit conversions applied
//!   by the dispatch engine.
//! - [`gad`] — the fixed-layout binary velocity structure and its hex text
//!   rendering.
//!
//! Everything in this crate is total: inputs are clamped or passed through,
//! never rejected, so a conversion can run on the per-delta hot path without
//! an error branch.

pub mod conversion;
pub mod gad;

pub use conversion::Conversion;
pub use gad::GadVelocity;
