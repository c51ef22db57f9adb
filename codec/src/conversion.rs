//! Named value conversions.
//!
//! The mapping file refers to conversions by name; the set itself is closed,
//! so dispatch is an enum match rather than a string-keyed table. Every
//! conversion is total: input that does not fit the expected shape passes
//! through unchanged with a warning.

use crate::gad::GadVelocity;
use serde_json::Value;
use tracing::warn;

/// A pure value transform applied before a converted value is forwarded
/// downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// Pass the value through unchanged
    Identity,
    /// Numeric m/s to km/h
    MetersPerSecondToKmPerHour,
    /// Numeric radians to degrees
    RadiansToDegrees,
    /// Ground speed in m/s to the packed GAD velocity hex string
    GadVelocity,
}

impl Conversion {
    /// Resolve a mapping-file conversion name. Unknown names yield `None`;
    /// the caller decides how loudly to complain.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "identity" => Some(Conversion::Identity),
            "mpsToKmph" => Some(Conversion::MetersPerSecondToKmPerHour),
            "radToDeg" => Some(Conversion::RadiansToDegrees),
            "gadVelocity" => Some(Conversion::GadVelocity),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Conversion::Identity => "identity",
            Conversion::MetersPerSecondToKmPerHour => "mpsToKmph",
            Conversion::RadiansToDegrees => "radToDeg",
            Conversion::GadVelocity => "gadVelocity",
        }
    }

    /// Apply the conversion to an incoming telemetry value.
    pub fn apply(&self, value: &Value) -> Value {
        match self {
            Conversion::Identity => value.clone(),
            Conversion::MetersPerSecondToKmPerHour => numeric(value, self.name(), |v| v * 3.6),
            Conversion::RadiansToDegrees => numeric(value, self.name(), |v| v.to_degrees()),
            Conversion::GadVelocity => match value.as_f64() {
                Some(speed) => {
                    Value::String(GadVelocity::from_navigation(speed, None, 0.0).to_hex())
                }
                None => {
                    warn!("gadVelocity conversion expects a numeric speed, got {}", value);
                    value.clone()
                }
            },
        }
    }
}

fn numeric(value: &Value, name: &str, f: impl Fn(f64) -> f64) -> Value {
    match value.as_f64() {
        Some(v) => serde_json::Number::from_f64(f(v))
            .map(Value::Number)
            .unwrap_or_else(|| value.clone()),
        None => {
            warn!("{} conversion expects a numeric value, got {}", name, value);
            value.clone()
        }
    }
}
