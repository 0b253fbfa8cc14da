use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use tagsight_3d::Pose;
use uuid::Uuid;

use crate::error::AnchorError;

/// Key the anchor collection is stored under.
pub const ANCHORS_KEY: &str = "tagsight.anchors";

/// One placed anchor as persisted between sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorRecord {
    /// Tag the anchor was placed for.
    pub tag_id: u32,
    /// Anchor identifier in the host store.
    pub uuid: Uuid,
    /// World position at placement.
    pub position: [f32; 3],
    /// World rotation at placement, `[x, y, z, w]`.
    pub rotation: [f32; 4],
}

impl AnchorRecord {
    /// Record for an anchor at `pose`.
    pub fn new(tag_id: u32, uuid: Uuid, pose: &Pose) -> Self {
        Self {
            tag_id,
            uuid,
            position: pose.position.to_array(),
            rotation: pose.rotation.to_array(),
        }
    }

    /// The stored pose.
    pub fn pose(&self) -> Pose {
        Pose::new(
            Vec3::from_array(self.position),
            Quat::from_array(self.rotation).normalize(),
        )
    }
}

/// Every persisted anchor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnchorCollection {
    /// The records, in placement order.
    pub anchors: Vec<AnchorRecord>,
}

impl AnchorCollection {
    /// Encode as JSON.
    pub fn to_json(&self) -> Result<String, AnchorError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decode from JSON.
    pub fn from_json(json: &str) -> Result<Self, AnchorError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Host string key-value persistence.
pub trait KeyValueStore {
    /// Value under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<String>, AnchorError>;

    /// Store `value` under `key`.
    fn set(&mut self, key: &str, value: &str) -> Result<(), AnchorError>;

    /// Remove `key`.
    fn remove(&mut self, key: &str) -> Result<(), AnchorError>;
}

/// Volatile key-value store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: BTreeMap<String, String>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, AnchorError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), AnchorError> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), AnchorError> {
        self.values.remove(key);
        Ok(())
    }
}

/// Key-value store backed by a JSON object in a single file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Use the file at `path`. It is created on the first write.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, AnchorError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_all(&self, values: &BTreeMap<String, String>) -> Result<(), AnchorError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(&self.path, serde_json::to_string_pretty(values)?)?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, AnchorError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), AnchorError> {
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values)
    }

    fn remove(&mut self, key: &str) -> Result<(), AnchorError> {
        let mut values = self.read_all()?;
        if values.remove(key).is_some() {
            self.write_all(&values)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_record_layout() -> Result<(), AnchorError> {
        let uuid = Uuid::new_v4();
        let pose = Pose::new(Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_y(0.5));
        let collection = AnchorCollection {
            anchors: vec![AnchorRecord::new(42, uuid, &pose)],
        };

        let json = collection.to_json()?;
        let value: serde_json::Value = serde_json::from_str(&json)?;
        let record = &value["anchors"][0];
        assert_eq!(record["tag_id"], 42);
        assert_eq!(record["uuid"], uuid.to_string());
        assert_eq!(record["position"].as_array().map(|a| a.len()), Some(3));
        assert_eq!(record["rotation"].as_array().map(|a| a.len()), Some(4));

        let back = AnchorCollection::from_json(&json)?;
        let restored = back.anchors[0].pose();
        assert_relative_eq!(restored.position.distance(pose.position), 0.0);
        assert_relative_eq!(restored.rotation.dot(pose.rotation).abs(), 1.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn test_json_file_store() -> Result<(), AnchorError> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("anchors.json");

        let mut store = JsonFileStore::new(&path);
        assert_eq!(store.get("missing")?, None);

        store.set("a", "1")?;
        store.set("b", "2")?;
        store.remove("a")?;

        let reopened = JsonFileStore::new(&path);
        assert_eq!(reopened.get("a")?, None);
        assert_eq!(reopened.get("b")?.as_deref(), Some("2"));
        Ok(())
    }

    #[test]
    fn test_memory_store() -> Result<(), AnchorError> {
        let mut store = MemoryStore::new();
        store.set(ANCHORS_KEY, "{}")?;
        assert_eq!(store.get(ANCHORS_KEY)?.as_deref(), Some("{}"));
        store.remove(ANCHORS_KEY)?;
        assert_eq!(store.get(ANCHORS_KEY)?, None);
        Ok(())
    }
}
