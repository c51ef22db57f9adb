//! Mandatory-resource validation.
//!
//! The cache holds, per object type, the set of resource ids the object's
//! schema declares mandatory. It is built once from the schema directory,
//! persisted as a single JSON snapshot for fast reload, and regenerated from
//! the schemas whenever the snapshot is absent or unreadable. After
//! construction it is read-only; validation is a pure lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use signalbridge_common::{BridgeError, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::{info, warn};

pub const CACHE_VERSION: u32 = 1;

/// One resource declaration in an object schema file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSchema {
    pub resource_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mandatory: bool,
}

/// One object schema file in the schema directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSchema {
    pub object_id: u16,
    pub object_name: String,
    #[serde(default)]
    pub resources: Vec<ResourceSchema>,
}

/// Precomputed mandatory-resource set for one object type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MandatoryResourceInfo {
    pub object_id: u16,
    pub object_name: String,
    pub mandatory_resources: BTreeSet<String>,
    pub last_updated: DateTime<Utc>,
}

/// On-disk snapshot: the whole cache as one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CacheSnapshot {
    version: u32,
    generated_at: DateTime<Utc>,
    objects: BTreeMap<String, MandatoryResourceInfo>,
}

/// Result of validating one outgoing resource set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub missing_mandatory_ids: Vec<String>,
    pub object_name: String,
}

#[derive(Debug, Default)]
pub struct MandatoryResourceCache {
    objects: HashMap<u16, MandatoryResourceInfo>,
}

impl MandatoryResourceCache {
    pub fn from_objects(objects: HashMap<u16, MandatoryResourceInfo>) -> Self {
        Self { objects }
    }

    /// Load the persisted snapshot, or regenerate from the schema directory
    /// when the snapshot is missing or fails to parse. The regenerated cache
    /// is persisted before serving.
    pub fn load_or_generate(cache_file: &Path, schema_dir: &Path) -> Result<Self> {
        match Self::load(cache_file) {
            Ok(cache) => {
                info!(
                    "Loaded mandatory resource cache for {} objects from {:?}",
                    cache.objects.len(),
                    cache_file
                );
                Ok(cache)
            }
            Err(e) => {
                info!(
                    "Cache snapshot {:?} unusable ({}), regenerating from {:?}",
                    cache_file, e, schema_dir
                );
                let cache = Self::generate_from_schemas(schema_dir)?;
                if let Err(e) = cache.persist(cache_file) {
                    warn!("Failed to persist regenerated cache: {}", e);
                }
                Ok(cache)
            }
        }
    }

    pub fn load(cache_file: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(cache_file)?;
        let snapshot: CacheSnapshot = serde_json::from_str(&content)?;

        let mut objects = HashMap::new();
        for info in snapshot.objects.into_values() {
            objects.insert(info.object_id, info);
        }
        Ok(Self { objects })
    }

    /// Scan every object schema in the directory and build the complete
    /// cache. The map only becomes visible once the whole scan has finished,
    /// so a partially built cache is never served.
    pub fn generate_from_schemas(schema_dir: &Path) -> Result<Self> {
        let mut paths: Vec<_> = std::fs::read_dir(schema_dir)
            .map_err(|e| {
                BridgeError::Config(format!(
                    "cannot read schema directory {:?}: {}",
                    schema_dir, e
                ))
            })?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|p| p.extension().map(|ext| ext == "json").unwrap_or(false))
            .collect();
        paths.sort();

        let generated_at = Utc::now();
        let mut objects: HashMap<u16, MandatoryResourceInfo> = HashMap::new();

        for path in &paths {
            let schema: ObjectSchema = match std::fs::read_to_string(path)
                .map_err(BridgeError::from)
                .and_then(|content| serde_json::from_str(&content).map_err(BridgeError::from))
            {
                Ok(schema) => schema,
                Err(e) => {
                    warn!("Skipping unreadable object schema {:?}: {}", path, e);
                    continue;
                }
            };

            if objects.contains_key(&schema.object_id) {
                warn!(
                    "Duplicate schema for object {} in {:?}, keeping the first",
                    schema.object_id, path
                );
                continue;
            }

            let mandatory: BTreeSet<String> = schema
                .resources
                .iter()
                .filter(|r| r.mandatory)
                .map(|r| r.resource_id.clone())
                .collect();

            objects.insert(
                schema.object_id,
                MandatoryResourceInfo {
                    object_id: schema.object_id,
                    object_name: schema.object_name,
                    mandatory_resources: mandatory,
                    last_updated: generated_at,
                },
            );
        }

        info!(
            "Generated mandatory resource cache for {} objects from {} schema files",
            objects.len(),
            paths.len()
        );
        Ok(Self { objects })
    }

    /// Write the whole cache as one snapshot. Written to a temporary sibling
    /// first and renamed into place, so readers never see a partial file.
    pub fn persist(&self, cache_file: &Path) -> Result<()> {
        if let Some(parent) = cache_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let snapshot = CacheSnapshot {
            version: CACHE_VERSION,
            generated_at: Utc::now(),
            objects: self
                .objects
                .values()
                .map(|info| (info.object_id.to_string(), info.clone()))
                .collect(),
        };

        let content = serde_json::to_string_pretty(&snapshot)?;
        let tmp = cache_file.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, cache_file)?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Check an outgoing resource set against the object's mandatory ids.
    ///
    /// Unknown object ids pass trivially (permissive default) with a warning.
    /// Missing ids are reported in sorted order.
    pub fn validate(&self, object_id: u16, resources: &BTreeMap<String, Value>) -> ValidationReport {
        match self.objects.get(&object_id) {
            None => {
                warn!(
                    "No mandatory resource info for object {}, validation passes trivially",
                    object_id
                );
                ValidationReport {
                    valid: true,
                    missing_mandatory_ids: Vec::new(),
                    object_name: String::new(),
                }
            }
            Some(info) => {
                let missing: Vec<String> = info
                    .mandatory_resources
                    .iter()
                    .filter(|id| !resources.contains_key(id.as_str()))
                    .cloned()
                    .collect();
                ValidationReport {
                    valid: missing.is_empty(),
                    missing_mandatory_ids: missing,
                    object_name: info.object_name.clone(),
                }
            }
        }
    }
}
