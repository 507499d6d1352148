//! Content-addressed snapshots of virtual environment data.
//!
//! A snapshot freezes the merged variables a release runs with. Its name
//! carries a checksum of the data, and an existing snapshot of the same
//! source state, or of the same data under that name, is reused instead of
//! creating a new one.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cluster::{Orchestrator, Resource, ResourceKind, labels, selector};
use crate::deadline::Deadline;
use crate::error::{Error, Result};
use crate::names::{clean_name, label_value};

/// Checksum characters kept in a snapshot name.
const NAME_CHECKSUM_LEN: usize = 10;

/// The object a snapshot was taken from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSource {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub resource_version: String,
    pub data_checksum: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnvSnapshot {
    pub name: String,
    pub source: SnapshotSource,
    pub data: Value,
}

/// Sort object keys recursively so equal data always serializes the same.
fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), canonical(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

/// Hex blake3 digest of the canonical JSON form of `data`.
pub fn data_checksum(data: &Value) -> Result<String> {
    let bytes = serde_json::to_vec(&canonical(data))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

pub fn snapshot_name(virtual_env: &str, checksum: &str) -> String {
    let short = &checksum[..checksum.len().min(NAME_CHECKSUM_LEN)];
    clean_name(&format!("{virtual_env}-{short}"))
}

impl EnvSnapshot {
    /// Snapshot of `data` as merged for `virtual_env`.
    pub fn of_virtual_env(virtual_env: &Resource, data: Value) -> Result<Self> {
        let checksum = data_checksum(&data)?;
        Ok(Self {
            name: snapshot_name(virtual_env.name(), &checksum),
            source: SnapshotSource {
                kind: ResourceKind::VirtualEnv.kind().to_string(),
                name: virtual_env.name().to_string(),
                resource_version: virtual_env.resource_version().unwrap_or_default().to_string(),
                data_checksum: checksum,
            },
            data,
        })
    }

    pub fn from_resource(resource: &Resource) -> Result<Self> {
        let source = resource
            .fields
            .get("spec")
            .and_then(|s| s.get("source"))
            .cloned()
            .ok_or_else(|| {
                Error::Config(format!("snapshot '{}' has no source", resource.key()))
            })?;
        Ok(Self {
            name: resource.name().to_string(),
            source: serde_json::from_value(source)?,
            data: resource.fields.get("data").cloned().unwrap_or(Value::Null),
        })
    }

    pub fn to_resource(&self, namespace: &str) -> Result<Resource> {
        Ok(Resource::virtual_env_snapshot(
            namespace,
            &self.name,
            serde_json::to_value(&self.source)?,
            self.data.clone(),
        )
        .with_label(labels::VIRTUAL_ENV, label_value(&self.source.name))
        .with_label(
            labels::SOURCE_RESOURCE_VERSION,
            label_value(&self.source.resource_version),
        ))
    }
}

/// Return the name of a snapshot equal to `snapshot`, creating it if needed.
pub async fn ensure_snapshot(
    orchestrator: &Arc<dyn Orchestrator>,
    namespace: &str,
    snapshot: &EnvSnapshot,
    dry_run: bool,
    deadline: &Deadline,
) -> Result<String> {
    tracing::debug!(
        "Checking for an existing snapshot of '{}' at resourceVersion '{}'",
        snapshot.source.name,
        snapshot.source.resource_version
    );
    let by_source = selector([
        (labels::VIRTUAL_ENV, label_value(&snapshot.source.name).as_str()),
        (
            labels::SOURCE_RESOURCE_VERSION,
            label_value(&snapshot.source.resource_version).as_str(),
        ),
    ]);
    let existing = deadline
        .run(orchestrator.list(ResourceKind::VirtualEnvSnapshot, Some(namespace), &by_source))
        .await?;
    for candidate in &existing {
        if let Ok(found) = EnvSnapshot::from_resource(candidate)
            && found.source == snapshot.source
        {
            tracing::info!("Reusing snapshot '{}'", found.name);
            return Ok(found.name);
        }
    }

    // Every bind moves the source resourceVersion; fall back to the name.
    let by_name = Error::ignore_not_found(
        deadline
            .run(orchestrator.get(ResourceKind::VirtualEnvSnapshot, Some(namespace), &snapshot.name))
            .await,
    )?;
    if let Some(existing) = by_name {
        let found = EnvSnapshot::from_resource(&existing)?;
        if found.source.name == snapshot.source.name
            && found.source.data_checksum == snapshot.source.data_checksum
        {
            tracing::info!("Reusing snapshot '{}' with equal data", found.name);
            return Ok(found.name);
        }
        return Err(Error::ApplyConflict {
            kind: ResourceKind::VirtualEnvSnapshot.to_string(),
            name: snapshot.name.clone(),
            message: "a snapshot with this name holds different data".to_string(),
        });
    }

    tracing::info!("Creating snapshot '{}'", snapshot.name);
    let resource = snapshot.to_resource(namespace)?;
    let created = deadline
        .run(orchestrator.create(&resource, dry_run))
        .await?;
    Ok(created.name().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn checksum_ignores_key_order() {
        let a = json!({"vars": {"a": 1, "b": {"x": true, "y": [1, 2]}}});
        let b = json!({"vars": {"b": {"y": [1, 2], "x": true}, "a": 1}});
        assert_eq!(data_checksum(&a).unwrap(), data_checksum(&b).unwrap());
        assert_ne!(
            data_checksum(&a).unwrap(),
            data_checksum(&json!({"vars": {"a": 2}})).unwrap()
        );
    }

    #[test]
    fn name_carries_short_checksum() {
        let checksum = "0123456789abcdef";
        assert_eq!(snapshot_name("prod", checksum), "prod-0123456789");
    }

    #[test]
    fn resource_round_trip_keeps_source() {
        let mut venv = Resource::virtual_env("kf", "prod", "production", json!({}));
        venv.metadata.resource_version = Some("42".into());
        let snapshot = EnvSnapshot::of_virtual_env(&venv, json!({"vars": {"a": 1}})).unwrap();
        let resource = snapshot.to_resource("kf").unwrap();
        assert_eq!(resource.metadata.labels[labels::SOURCE_RESOURCE_VERSION], "42");
        assert_eq!(EnvSnapshot::from_resource(&resource).unwrap(), snapshot);
    }
}
