//! Dispatch engine.
//!
//! Single consumer of the delta channel. Every `(path, value)` pair feeds the
//! helper accumulator, may fire derived-value helpers, and is then routed
//! through the mapping table — template families first, exact matches second.
//! Per-message errors are isolated: one bad value never stops the stream.

use crate::helper::{HelperAccumulator, HelperKind};
use crate::mapping::{MappingEntry, MappingTable, Route};
use crate::sink::CommandSink;
use crate::template;
use crate::validation::MandatoryResourceCache;
use serde_json::Value;
use signalbridge_codec::Conversion;
use signalbridge_common::{BridgeMetrics, Command, Result, TelemetryDelta};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct DispatchEngine {
    mapping: Arc<MappingTable>,
    cache: Arc<MandatoryResourceCache>,
    metrics: Arc<BridgeMetrics>,
    accumulator: HelperAccumulator,
    /// When true, a failed single-resource validation suppresses the command
    /// instead of merely warning (template updates always block).
    strict_single_resource: bool,
}

impl DispatchEngine {
    pub fn new(
        mapping: Arc<MappingTable>,
        cache: Arc<MandatoryResourceCache>,
        metrics: Arc<BridgeMetrics>,
        strict_single_resource: bool,
    ) -> Self {
        Self {
            mapping,
            cache,
            metrics,
            accumulator: HelperAccumulator::new(),
            strict_single_resource,
        }
    }

    /// Consume deltas until the channel closes, forwarding the resulting
    /// commands to the sink in order.
    pub async fn run<S: CommandSink>(
        mut self,
        mut rx: tokio::sync::mpsc::Receiver<TelemetryDelta>,
        sink: &mut S,
    ) -> Result<()> {
        info!("Dispatch engine started");

        while let Some(delta) = rx.recv().await {
            self.metrics.record_delta();
            for command in self.process_delta(&delta) {
                self.metrics.record_command();
                if let Err(e) = sink.send(command).await {
                    // Keep the stream alive; the sink owner decides when to stop
                    warn!("Failed to forward command downstream: {}", e);
                }
            }
        }

        info!("Delta channel closed, dispatch engine stopping");
        Ok(())
    }

    /// Process one delta, preserving the arrival order of its values.
    pub fn process_delta(&mut self, delta: &TelemetryDelta) -> Vec<Command> {
        let mut commands = Vec::new();
        for update in &delta.updates {
            for value in &update.values {
                self.metrics.record_value();
                commands.extend(self.process_value(&value.path, &value.value));
            }
        }
        commands
    }

    /// Route a single path/value pair.
    pub fn process_value(&mut self, path: &str, value: &Value) -> Vec<Command> {
        let mut commands = Vec::new();

        // Every value feeds the accumulator, mapped or not
        self.accumulator.record(path, value);

        for kind in HelperKind::ALL {
            if kind.triggered_by(path) {
                if let Some(derived) = kind.compute(&self.accumulator) {
                    commands.extend(self.forward_helper(kind, &derived));
                }
            }
        }

        match self.mapping.route(path) {
            Route::Template(entry) => {
                commands.extend(template::process(entry, path, value, &self.cache));
            }
            Route::Exact(entry) => {
                let converted = self.convert(entry, value);
                commands.extend(self.emit_single(entry, converted));
            }
            Route::None => {
                debug!("Value for {} is not of interest", path);
            }
        }

        commands
    }

    // Helper output is forwarded under its synthetic path with the same
    // rules as any other single-resource update. The helper already ran its
    // conversion; the mapping entry only contributes the target ids.
    fn forward_helper(&self, kind: HelperKind, derived: &Value) -> Vec<Command> {
        match self.mapping.exact(kind.synthetic_path()) {
            Some(entry) => self.emit_single(entry, derived.clone()),
            None => Vec::new(),
        }
    }

    fn convert(&self, entry: &MappingEntry, value: &Value) -> Value {
        match entry.conversion.as_deref() {
            None => value.clone(),
            Some(name) => match Conversion::from_name(name) {
                Some(conversion) => conversion.apply(value),
                None => {
                    warn!(
                        "Unknown conversion '{}' for {}, passing value through",
                        name, entry.signal_path
                    );
                    value.clone()
                }
            },
        }
    }

    fn emit_single(&self, entry: &MappingEntry, value: Value) -> Vec<Command> {
        let Some((object_id, instance_id, resource_id)) = entry.target() else {
            debug!("{} is collect-only, not forwarded", entry.signal_path);
            return Vec::new();
        };

        let resources = BTreeMap::from([(resource_id.to_string(), value.clone())]);
        let report = self.cache.validate(object_id, &resources);
        if !report.valid {
            self.metrics.record_validation_failure();
            for missing in &report.missing_mandatory_ids {
                warn!(
                    "Mandatory resource {} missing on {} update for {}",
                    missing, report.object_name, entry.signal_path
                );
            }
            if self.strict_single_resource {
                return Vec::new();
            }
            // Advisory by default: the update still proceeds
        }

        vec![Command::change(object_id, instance_id, resource_id, value)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::{COURSE_PATH, SPEED_PATH};
    use crate::validation::MandatoryResourceInfo;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::{BTreeSet, HashMap};

    fn entry(path: &str, target: Option<(u16, u16, u16)>) -> MappingEntry {
        MappingEntry {
            signal_path: path.to_string(),
            object_id: target.map(|t| t.0),
            instance_id: target.map(|t| t.1),
            resource_id: target.map(|t| t.2),
            conversion: None,
            template_mapping: false,
            instance_mapping: None,
            resources: None,
            subscription_overrides: None,
        }
    }

    fn engine(entries: Vec<MappingEntry>, strict: bool) -> DispatchEngine {
        DispatchEngine::new(
            Arc::new(MappingTable::from_entries(entries)),
            Arc::new(MandatoryResourceCache::default()),
            Arc::new(BridgeMetrics::new()),
            strict,
        )
    }

    fn location_cache() -> MandatoryResourceCache {
        let mut objects = HashMap::new();
        objects.insert(
            3336,
            MandatoryResourceInfo {
                object_id: 3336,
                object_name: "Location".to_string(),
                mandatory_resources: BTreeSet::from(["6051".to_string(), "6052".to_string()]),
                last_updated: Utc::now(),
            },
        );
        MandatoryResourceCache::from_objects(objects)
    }

    #[test]
    fn test_exact_match_emits_converted_command() {
        let mut speed = entry("Vehicle.OdometerSpeed", Some((3347, 0, 5700)));
        speed.conversion = Some("mpsToKmph".to_string());
        let mut engine = engine(vec![speed], false);

        let commands = engine.process_value("Vehicle.OdometerSpeed", &json!(10.0));
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].to_string(), "change /3347/0/5700 36.0");
    }

    #[test]
    fn test_unmapped_value_still_accumulates() {
        let mut engine = engine(vec![], false);
        let commands = engine.process_value("Vehicle.Unmapped", &json!(1));
        assert!(commands.is_empty());
        assert_eq!(engine.accumulator.get("Vehicle.Unmapped"), Some(&json!(1)));
    }

    #[test]
    fn test_collect_only_entry_emits_nothing_but_accumulates() {
        let mut engine = engine(vec![entry("Vehicle.Odometer", None)], false);
        let commands = engine.process_value("Vehicle.Odometer", &json!(1234));
        assert!(commands.is_empty());
        assert_eq!(engine.accumulator.get("Vehicle.Odometer"), Some(&json!(1234)));
    }

    #[test]
    fn test_unknown_conversion_passes_value_through() {
        let mut e = entry("Vehicle.Speed2", Some((3303, 0, 5700)));
        e.conversion = Some("foo".to_string());
        let mut engine = engine(vec![e], false);

        let commands = engine.process_value("Vehicle.Speed2", &json!(5));
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].to_string(), "change /3303/0/5700 5");
    }

    #[test]
    fn test_template_takes_precedence_and_stops() {
        let mut template_entry = entry("Vehicle.Events", Some((3336, 0, 0)));
        template_entry.template_mapping = true;
        template_entry.instance_id = None;
        template_entry.resource_id = None;
        template_entry.instance_mapping = Some(HashMap::from([("Collision".to_string(), 4)]));
        template_entry.resources = Some(HashMap::from([("5750".to_string(), "$id".to_string())]));

        // Exact entry for the very same path must not fire
        let exact_shadow = entry("Vehicle.Events.Collision.ev-1", Some((9999, 9, 9)));

        let mut engine = DispatchEngine::new(
            Arc::new(MappingTable::from_entries(vec![exact_shadow, template_entry])),
            Arc::new(MandatoryResourceCache::default()),
            Arc::new(BridgeMetrics::new()),
            false,
        );

        let commands = engine.process_value("Vehicle.Events.Collision.ev-1", &json!({}));
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].to_string(), "change /3336/4/5750 ev-1");
    }

    #[test]
    fn test_helper_fires_on_speed_update() {
        let velocity = entry("Vehicle.Navigation.Velocity", Some((3336, 0, 6053)));
        let mut engine = engine(vec![velocity], false);

        // Course arrives first: not a required input, nothing fires
        assert!(engine
            .process_value(COURSE_PATH, &json!(std::f64::consts::FRAC_PI_2))
            .is_empty());

        // Speed update makes the helper sufficient
        let commands = engine.process_value(SPEED_PATH, &json!(10.0));
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].to_string(), "change /3336/0/6053 0485A0080000");
    }

    #[test]
    fn test_helper_without_mapping_entry_stays_silent() {
        let mut engine = engine(vec![], false);
        assert!(engine.process_value(SPEED_PATH, &json!(10.0)).is_empty());
    }

    #[test]
    fn test_helper_and_exact_mapping_both_fire_in_order() {
        let velocity = entry("Vehicle.Navigation.Velocity", Some((3336, 0, 6053)));
        let mut speed = entry(SPEED_PATH, Some((3347, 0, 5700)));
        speed.conversion = Some("mpsToKmph".to_string());
        let mut engine = engine(vec![velocity, speed], false);

        let commands = engine.process_value(SPEED_PATH, &json!(10.0));
        let lines: Vec<String> = commands.iter().map(|c| c.to_string()).collect();
        // Helper output first, then the direct mapping of the same path
        assert_eq!(
            lines,
            ["change /3336/0/6053 0485A0080000", "change /3347/0/5700 36.0"]
        );
    }

    #[test]
    fn test_single_resource_validation_is_advisory_by_default() {
        // Object 3336 requires 6051+6052; a lone 6051 update fails validation
        // but is forwarded anyway
        let position = entry("Vehicle.Latitude", Some((3336, 0, 6051)));
        let mut engine = DispatchEngine::new(
            Arc::new(MappingTable::from_entries(vec![position])),
            Arc::new(location_cache()),
            Arc::new(BridgeMetrics::new()),
            false,
        );

        let commands = engine.process_value("Vehicle.Latitude", &json!(48.1));
        assert_eq!(commands.len(), 1);
        assert_eq!(
            engine
                .metrics
                .validation_failures
                .load(std::sync::atomic::Ordering::Relaxed),
            1
        );
    }

    #[test]
    fn test_strict_policy_suppresses_invalid_single_resource() {
        let position = entry("Vehicle.Latitude", Some((3336, 0, 6051)));
        let mut engine = DispatchEngine::new(
            Arc::new(MappingTable::from_entries(vec![position])),
            Arc::new(location_cache()),
            Arc::new(BridgeMetrics::new()),
            true,
        );

        assert!(engine.process_value("Vehicle.Latitude", &json!(48.1)).is_empty());
    }

    #[test]
    fn test_values_processed_in_arrival_order() {
        let a = entry("Vehicle.A", Some((3303, 0, 1)));
        let b = entry("Vehicle.B", Some((3303, 0, 2)));
        let mut engine = engine(vec![a, b], false);

        let delta = TelemetryDelta {
            context: "vehicle-7".to_string(),
            updates: vec![signalbridge_common::TelemetryUpdate {
                source: "gateway".to_string(),
                timestamp: 0,
                values: vec![
                    signalbridge_common::TelemetryValue {
                        path: "Vehicle.B".to_string(),
                        value: json!(2),
                    },
                    signalbridge_common::TelemetryValue {
                        path: "Vehicle.A".to_string(),
                        value: json!(1),
                    },
                ],
            }],
        };

        let lines: Vec<String> = engine
            .process_delta(&delta)
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(lines, ["change /3303/0/2 2", "change /3303/0/1 1"]);
    }
}
