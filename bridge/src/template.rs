//! Template / notification processing.
//!
//! Event paths of the form `<family>.<type>.<identifier>` are routed here by
//! the dispatch engine when a template mapping's family contains the path.
//! The event type resolves to an instance id through the entry's instance
//! table, the declared resources are extracted from the event payload, and
//! the whole update is validated against the mandatory-resource cache before
//! anything is forwarded. Validation is blocking on this path: a notification
//! with missing mandatory resources is discarded in full.

use crate::extract::extract;
use crate::mapping::MappingEntry;
use crate::validation::MandatoryResourceCache;
use serde_json::Value;
use signalbridge_common::Command;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Extraction path that resolves to the occurrence identifier rather than a
/// payload field.
pub const IDENTIFIER_SENTINEL: &str = "$id";

/// Latitude/longitude resource ids that mark an entry as geolocated.
pub const LATITUDE_RESOURCE: &str = "6051";
pub const LONGITUDE_RESOURCE: &str = "6052";

/// Process one templated event. Returns the commands to forward, or an empty
/// vector when the update is discarded.
pub fn process(
    entry: &MappingEntry,
    path: &str,
    payload: &Value,
    cache: &MandatoryResourceCache,
) -> Vec<Command> {
    let Some(object_id) = entry.object_id else {
        warn!(
            "Template mapping for {} has no object id, discarding {}",
            entry.signal_path, path
        );
        return Vec::new();
    };

    // <family>.<type>.<identifier>
    let Some(rest) = path
        .strip_prefix(entry.signal_path.as_str())
        .and_then(|r| r.strip_prefix('.'))
    else {
        warn!(
            "Path {} is not part of the {} family, discarding",
            path, entry.signal_path
        );
        return Vec::new();
    };
    let Some((event_type, identifier)) = rest.rsplit_once('.') else {
        warn!("Event path {} carries no occurrence identifier, discarding", path);
        return Vec::new();
    };

    let instance_id = match entry
        .instance_mapping
        .as_ref()
        .and_then(|m| m.get(event_type))
    {
        Some(id) => *id,
        None => {
            warn!(
                "Unknown event type '{}' under {}, discarding {}",
                event_type, entry.signal_path, path
            );
            return Vec::new();
        }
    };

    let mut values = extract_resources(entry, identifier, payload);
    apply_geo_fallback(entry, &mut values);

    let report = cache.validate(object_id, &values);
    if !report.valid {
        for missing in &report.missing_mandatory_ids {
            warn!(
                "Discarding {} update for {}: mandatory resource {} missing",
                report.object_name, path, missing
            );
        }
        return Vec::new();
    }

    debug!(
        "Forwarding {} resources for event {} to instance {}",
        values.len(),
        path,
        instance_id
    );

    values
        .into_iter()
        .filter_map(|(resource_id, value)| match resource_id.parse::<u16>() {
            Ok(rid) => Some(Command::change(object_id, instance_id, rid, value)),
            Err(_) => {
                warn!(
                    "Non-numeric resource id '{}' in template mapping for {}",
                    resource_id, entry.signal_path
                );
                None
            }
        })
        .collect()
}

fn extract_resources(
    entry: &MappingEntry,
    identifier: &str,
    payload: &Value,
) -> BTreeMap<String, Value> {
    let mut values = BTreeMap::new();
    let Some(resources) = entry.resources.as_ref() else {
        return values;
    };

    for (resource_id, extraction_path) in resources {
        if extraction_path == IDENTIFIER_SENTINEL {
            values.insert(
                resource_id.clone(),
                Value::String(identifier.to_string()),
            );
            continue;
        }

        match extract(payload, extraction_path) {
            Some(v) if !v.is_null() => {
                values.insert(resource_id.clone(), v.clone());
            }
            _ => {
                debug!(
                    "Extraction path {} absent in payload for resource {}",
                    extraction_path, resource_id
                );
            }
        }
    }

    values
}

// Geolocated safety-critical notifications must never be blocked by missing
// position data: absent or null coordinates become the (0.0, 0.0) sentinel.
fn apply_geo_fallback(entry: &MappingEntry, values: &mut BTreeMap<String, Value>) {
    let Some(resources) = entry.resources.as_ref() else {
        return;
    };
    if !resources.contains_key(LATITUDE_RESOURCE) && !resources.contains_key(LONGITUDE_RESOURCE) {
        return;
    }

    for coordinate in [LATITUDE_RESOURCE, LONGITUDE_RESOURCE] {
        if resources.contains_key(coordinate) && !values.contains_key(coordinate) {
            warn!(
                "Coordinate resource {} missing for {}, filling sentinel 0.0",
                coordinate, entry.signal_path
            );
            values.insert(coordinate.to_string(), Value::from(0.0));
        }
    }
}
