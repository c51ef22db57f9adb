//! Mapping table: ordered path→(object, instance, resource) rules loaded
//! once at startup from the JSON mapping file.

use serde::{Deserialize, Serialize};
use signalbridge_common::{
    BridgeError, PathSubscription, Result, SubscriptionDefaults,
};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::info;

/// Per-path delivery overrides; unset fields fall back to the configured
/// defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionOverrides {
    #[serde(default)]
    pub period: Option<u32>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub policy: Option<String>,
    #[serde(default)]
    pub min_period: Option<u32>,
}

/// One rule of the mapping configuration.
///
/// An entry that omits any of object/instance/resource is collect-only: its
/// values feed the helper accumulator but produce no downstream command.
/// Template entries match a family of event paths by prefix and carry the
/// instance table and per-resource extraction paths instead of a single
/// resource id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingEntry {
    pub signal_path: String,
    #[serde(default)]
    pub object_id: Option<u16>,
    #[serde(default)]
    pub instance_id: Option<u16>,
    #[serde(default)]
    pub resource_id: Option<u16>,
    #[serde(default)]
    pub conversion: Option<String>,
    #[serde(default)]
    pub template_mapping: bool,
    #[serde(default)]
    pub instance_mapping: Option<HashMap<String, u16>>,
    #[serde(default)]
    pub resources: Option<HashMap<String, String>>,
    #[serde(default)]
    pub subscription_overrides: Option<SubscriptionOverrides>,
}

impl MappingEntry {
    /// Forwarding target, present only when all three ids are configured.
    pub fn target(&self) -> Option<(u16, u16, u16)> {
        match (self.object_id, self.instance_id, self.resource_id) {
            (Some(o), Some(i), Some(r)) => Some((o, i, r)),
            _ => None,
        }
    }

    /// True when a template entry's path family contains `path`.
    pub fn matches_template(&self, path: &str) -> bool {
        self.template_mapping
            && path.len() > self.signal_path.len()
            && path.starts_with(self.signal_path.as_str())
            && path.as_bytes()[self.signal_path.len()] == b'.'
    }

    fn resolved_subscription(&self, path: &str, defaults: &SubscriptionDefaults) -> PathSubscription {
        let overrides = self.subscription_overrides.clone().unwrap_or_default();
        PathSubscription {
            path: path.to_string(),
            period: overrides.period.unwrap_or(defaults.period),
            format: overrides.format.unwrap_or_else(|| defaults.format.clone()),
            policy: overrides.policy.unwrap_or_else(|| defaults.policy.clone()),
            min_period: overrides.min_period.unwrap_or(defaults.min_period),
        }
    }
}

/// On-disk shape of the mapping configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingFile {
    pub version: u32,
    #[serde(default)]
    pub description: String,
    pub mappings: Vec<MappingEntry>,
}

/// The result of routing one incoming path through the table.
#[derive(Debug, Clone, Copy)]
pub enum Route<'a> {
    /// Matched a template entry's path family
    Template(&'a MappingEntry),
    /// Matched an entry path exactly
    Exact(&'a MappingEntry),
    /// Not of interest
    None,
}

/// Ordered mapping rules plus the derived subscription path set.
#[derive(Debug, Clone)]
pub struct MappingTable {
    entries: Vec<MappingEntry>,
}

impl MappingTable {
    pub fn from_entries(entries: Vec<MappingEntry>) -> Self {
        Self { entries }
    }

    /// Load the table from the JSON mapping file. Unreadable or invalid
    /// configuration is fatal at startup.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Config(format!("cannot read mapping file {:?}: {}", path, e))
        })?;
        let file: MappingFile = serde_json::from_str(&content).map_err(|e| {
            BridgeError::Config(format!("invalid mapping file {:?}: {}", path, e))
        })?;

        info!(
            "Loaded {} mapping entries (version {}) from {:?}",
            file.mappings.len(),
            file.version,
            path
        );
        Ok(Self::from_entries(file.mappings))
    }

    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    /// Route an incoming path. Template families take precedence over exact
    /// matches, in table order within each class.
    pub fn route(&self, path: &str) -> Route<'_> {
        if let Some(entry) = self
            .entries
            .iter()
            .find(|e| e.matches_template(path))
        {
            return Route::Template(entry);
        }
        if let Some(entry) = self
            .entries
            .iter()
            .find(|e| !e.template_mapping && e.signal_path == path)
        {
            return Route::Exact(entry);
        }
        Route::None
    }

    /// Exact-entry lookup, used for helper synthetic paths.
    pub fn exact(&self, path: &str) -> Option<&MappingEntry> {
        self.entries
            .iter()
            .find(|e| !e.template_mapping && e.signal_path == path)
    }

    /// The distinct subscription list: every entry path plus any extra paths
    /// the caller needs (helper inputs), each with resolved delivery
    /// settings. Order follows the table, extras appended.
    pub fn subscriptions(
        &self,
        defaults: &SubscriptionDefaults,
        extra_paths: &[&str],
    ) -> Vec<PathSubscription> {
        let mut seen = HashSet::new();
        let mut subs = Vec::new();

        for entry in &self.entries {
            if seen.insert(entry.signal_path.clone()) {
                subs.push(entry.resolved_subscription(&entry.signal_path, defaults));
            }
        }

        for path in extra_paths {
            if seen.insert((*path).to_string()) {
                subs.push(PathSubscription {
                    path: (*path).to_string(),
                    period: defaults.period,
                    format: defaults.format.clone(),
                    policy: defaults.policy.clone(),
                    min_period: defaults.min_period,
                });
            }
        }

        subs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str) -> MappingEntry {
        MappingEntry {
            signal_path: path.to_string(),
            object_id: Some(3303),
            instance_id: Some(0),
            resource_id: Some(5700),
            conversion: None,
            template_mapping: false,
            instance_mapping: None,
            resources: None,
            subscription_overrides: None,
        }
    }

    fn template_entry(path: &str) -> MappingEntry {
        MappingEntry {
            template_mapping: true,
            instance_mapping: Some(HashMap::from([("Collision".to_string(), 0)])),
            resources: Some(HashMap::new()),
            ..entry(path)
        }
    }

    #[test]
    fn test_mapping_file_parses_wire_names() {
        let raw = r#"{
            "version": 1,
            "description": "test table",
            "mappings": [{
                "signalPath": "Vehicle.Speed",
                "objectId": 3336,
                "instanceId": 0,
                "resourceId": 6052,
                "conversion": "mpsToKmph",
                "subscriptionOverrides": {"period": 250, "minPeriod": 50}
            }, {
                "signalPath": "Vehicle.Events",
                "templateMapping": true,
                "objectId": 3340,
                "instanceMapping": {"Collision": 0},
                "resources": {"5750": "$id"}
            }]
        }"#;

        let file: MappingFile = serde_json::from_str(raw).unwrap();
        assert_eq!(file.mappings.len(), 2);
        assert_eq!(file.mappings[0].target(), Some((3336, 0, 6052)));
        assert_eq!(
            file.mappings[0]
                .subscription_overrides
                .as_ref()
                .unwrap()
                .period,
            Some(250)
        );
        assert!(file.mappings[1].template_mapping);
        assert_eq!(file.mappings[1].target(), None);
    }

    #[test]
    fn test_template_takes_precedence_over_exact() {
        // A path that matches both a template family and an exact entry must
        // route through the template exclusively.
        let table = MappingTable::from_entries(vec![
            entry("Vehicle.Events.Collision.abc"),
            template_entry("Vehicle.Events"),
        ]);

        match table.route("Vehicle.Events.Collision.abc") {
            Route::Template(e) => assert_eq!(e.signal_path, "Vehicle.Events"),
            other => panic!("expected template route, got {:?}", other),
        }
    }

    #[test]
    fn test_template_prefix_must_be_segment_aligned() {
        let table = MappingTable::from_entries(vec![template_entry("Vehicle.Events")]);

        assert!(matches!(
            table.route("Vehicle.Events.Collision.abc"),
            Route::Template(_)
        ));
        // A longer sibling name is not part of the family
        assert!(matches!(table.route("Vehicle.EventsArchive.X.y"), Route::None));
        // The family root itself is not an occurrence
        assert!(matches!(table.route("Vehicle.Events"), Route::None));
    }

    #[test]
    fn test_unmapped_path_routes_nowhere() {
        let table = MappingTable::from_entries(vec![entry("Vehicle.Speed")]);
        assert!(matches!(table.route("Vehicle.UnknownSignal"), Route::None));
    }

    #[test]
    fn test_subscriptions_are_distinct_with_resolved_settings() {
        let mut speed = entry("Vehicle.Speed");
        speed.subscription_overrides = Some(SubscriptionOverrides {
            period: Some(250),
            ..Default::default()
        });
        // Second entry for the same path must not duplicate the subscription
        let table = MappingTable::from_entries(vec![
            speed,
            entry("Vehicle.Speed"),
            entry("Vehicle.Odometer"),
        ]);

        let defaults = SubscriptionDefaults::default();
        let subs = table.subscriptions(&defaults, &["Vehicle.Course"]);

        let paths: Vec<&str> = subs.iter().map(|s| s.path.as_str()).collect();
        assert_eq!(paths, ["Vehicle.Speed", "Vehicle.Odometer", "Vehicle.Course"]);

        // Override applied, fallback for the rest
        assert_eq!(subs[0].period, 250);
        assert_eq!(subs[0].min_period, defaults.min_period);
        assert_eq!(subs[1].period, defaults.period);
        // Helper input path gets pure defaults
        assert_eq!(subs[2].policy, defaults.policy);
    }
}
