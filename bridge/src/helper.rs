//! Helper/derived values.
//!
//! Some downstream resources are synthesized from several separately-arriving
//! signals rather than received on the wire. The accumulator keeps the
//! last-seen value of every incoming path; each helper kind declares which
//! accumulated inputs it needs and computes its synthetic value whenever a
//! required input updates and the sufficiency rule holds.

use serde_json::Value;
use signalbridge_codec::GadVelocity;
use std::collections::HashMap;

/// Last-seen value per path, updated for every incoming value regardless of
/// whether the path has a direct mapping.
#[derive(Debug, Default)]
pub struct HelperAccumulator {
    values: HashMap<String, Value>,
}

impl HelperAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, path: &str, value: &Value) {
        self.values.insert(path.to_string(), value.clone());
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        self.values.get(path)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Accumulator path carrying ground speed in m/s.
pub const SPEED_PATH: &str = "Vehicle.Speed";
/// Accumulator path carrying course over ground in radians. Optional for the
/// velocity helper; bearing defaults to 0 while it has not been seen.
pub const COURSE_PATH: &str = "Vehicle.Navigation.CourseOverGround";

/// The closed set of derived-value computations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperKind {
    /// Combined GAD velocity from accumulated speed and course
    GadVelocity,
}

impl HelperKind {
    pub const ALL: [HelperKind; 1] = [HelperKind::GadVelocity];

    /// The synthetic path this helper publishes under; the mapping table
    /// decides where (and whether) it is forwarded.
    pub fn synthetic_path(&self) -> &'static str {
        match self {
            HelperKind::GadVelocity => "Vehicle.Navigation.Velocity",
        }
    }

    /// Inputs that must be present before the helper may fire, and whose
    /// updates trigger it.
    pub fn required_inputs(&self) -> &'static [&'static str] {
        match self {
            HelperKind::GadVelocity => &[SPEED_PATH],
        }
    }

    /// Inputs consulted when present but neither required nor triggering.
    pub fn optional_inputs(&self) -> &'static [&'static str] {
        match self {
            HelperKind::GadVelocity => &[COURSE_PATH],
        }
    }

    /// All accumulator paths this helper reads; the subscription manager
    /// subscribes to these in addition to the mapped paths.
    pub fn input_paths(&self) -> Vec<&'static str> {
        let mut paths = self.required_inputs().to_vec();
        paths.extend_from_slice(self.optional_inputs());
        paths
    }

    /// True when an update of `path` should re-run this helper.
    pub fn triggered_by(&self, path: &str) -> bool {
        self.required_inputs().contains(&path)
    }

    /// Compute the synthetic value from the accumulator, or `None` while the
    /// sufficiency rule is not met.
    pub fn compute(&self, accumulator: &HelperAccumulator) -> Option<Value> {
        match self {
            HelperKind::GadVelocity => {
                // Speed alone is sufficient; course is optional
                let speed = accumulator.get(SPEED_PATH)?.as_f64()?;
                let course = accumulator.get(COURSE_PATH).and_then(Value::as_f64);
                Some(Value::String(
                    GadVelocity::from_navigation(speed, course, 0.0).to_hex(),
                ))
            }
        }
    }
}

/// Every input path any helper needs, for subscription building.
pub fn all_helper_input_paths() -> Vec<&'static str> {
    let mut paths = Vec::new();
    for kind in HelperKind::ALL {
        for path in kind.input_paths() {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
    }
    paths
}
