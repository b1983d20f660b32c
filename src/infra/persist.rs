//! Durable zone-class overrides
//!
//! The persisted record is a flat JSON object `{"zone1": "door", ...}`
//! written atomically (temp file + rename) so a crash or power loss
//! mid-write never corrupts the previous good record. Load walks an
//! ordered candidate list and takes the first parseable file; anything
//! else degrades to the configured defaults, never a startup failure.

use crate::domain::ZoneClass;
use crate::infra::config::Config;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, warn};

pub struct PersistenceStore {
    dirs: Vec<PathBuf>,
    filename: String,
}

impl PersistenceStore {
    pub fn new(dirs: Vec<PathBuf>, filename: impl Into<String>) -> Self {
        Self { dirs, filename: filename.into() }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.persistence_dirs().to_vec(),
            format!("{}_zones.json", config.device_id()),
        )
    }

    /// Load the persisted zone→class mapping
    ///
    /// First existing and parseable candidate wins. Entries with invalid
    /// class names are skipped individually; a corrupt file is skipped
    /// whole. Always returns a mapping, possibly empty.
    pub fn load(&self) -> HashMap<String, ZoneClass> {
        for dir in &self.dirs {
            let path = dir.join(&self.filename);
            let content = match fs::read_to_string(&path) {
                Ok(c) => c,
                Err(_) => continue,
            };

            let raw: HashMap<String, String> = match serde_json::from_str(&content) {
                Ok(r) => r,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "persisted_classes_unparseable");
                    continue;
                }
            };

            let mut mapping = HashMap::new();
            for (key, value) in raw {
                match value.parse::<ZoneClass>() {
                    Ok(class) => {
                        mapping.insert(key.trim().to_string(), class);
                    }
                    Err(_) => {
                        warn!(zone = %key, class = %value, "persisted_class_invalid_skipped");
                    }
                }
            }
            debug!(path = %path.display(), count = mapping.len(), "persisted_classes_loaded");
            return mapping;
        }

        debug!("no_persisted_classes_found");
        HashMap::new()
    }

    /// Atomically write the full mapping to the first writable candidate
    pub fn save(&self, mapping: &HashMap<String, ZoneClass>) -> anyhow::Result<()> {
        // Sorted keys keep the file diff-stable across saves
        let ordered: BTreeMap<&str, &ZoneClass> =
            mapping.iter().map(|(k, v)| (k.as_str(), v)).collect();
        let json = serde_json::to_string_pretty(&ordered)?;

        for dir in &self.dirs {
            if fs::create_dir_all(dir).is_err() {
                continue;
            }
            let path = dir.join(&self.filename);
            let tmp = dir.join(format!("{}.tmp", self.filename));

            match fs::write(&tmp, &json).and_then(|_| fs::rename(&tmp, &path)) {
                Ok(()) => {
                    debug!(path = %path.display(), count = mapping.len(), "persisted_classes_saved");
                    return Ok(());
                }
                Err(e) => {
                    let _ = fs::remove_file(&tmp);
                    debug!(dir = %dir.display(), error = %e, "persistence_dir_unwritable");
                }
            }
        }

        anyhow::bail!("no writable persistence directory among {:?}", self.dirs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> PersistenceStore {
        PersistenceStore::new(vec![dir.path().to_path_buf()], "test_zones.json")
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        let mut mapping = HashMap::new();
        mapping.insert("zone1".to_string(), ZoneClass::Door);
        mapping.insert("zone3".to_string(), ZoneClass::OutputTap);
        store.save(&mapping).unwrap();

        assert_eq!(store.load(), mapping);
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_corrupt_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(dir.path().join("test_zones.json"), "{not json").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_load_skips_invalid_class_entries() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        fs::write(
            dir.path().join("test_zones.json"),
            r#"{"zone1": "door", "zone2": "dimmer"}"#,
        )
        .unwrap();

        let mapping = store.load();
        assert_eq!(mapping.len(), 1);
        assert_eq!(mapping.get("zone1"), Some(&ZoneClass::Door));
    }

    #[test]
    fn test_save_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&HashMap::from([("zone1".to_string(), ZoneClass::Window)])).unwrap();
        assert!(!dir.path().join("test_zones.json.tmp").exists());
    }

    #[test]
    fn test_save_falls_through_to_writable_dir() {
        let dir = TempDir::new().unwrap();
        let store = PersistenceStore::new(
            vec![PathBuf::from("/proc/definitely/not/writable"), dir.path().to_path_buf()],
            "test_zones.json",
        );
        store.save(&HashMap::from([("zone2".to_string(), ZoneClass::Door)])).unwrap();
        assert_eq!(store.load().get("zone2"), Some(&ZoneClass::Door));
    }

    #[test]
    fn test_save_overwrites_previous_record() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        store.save(&HashMap::from([("zone1".to_string(), ZoneClass::Door)])).unwrap();
        store.save(&HashMap::from([("zone1".to_string(), ZoneClass::OutputToggle)])).unwrap();
        assert_eq!(store.load().get("zone1"), Some(&ZoneClass::OutputToggle));
    }

    #[test]
    fn test_first_parseable_candidate_wins() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        fs::write(a.path().join("test_zones.json"), "garbage").unwrap();
        fs::write(b.path().join("test_zones.json"), r#"{"zone4": "window"}"#).unwrap();

        let store = PersistenceStore::new(
            vec![a.path().to_path_buf(), b.path().to_path_buf()],
            "test_zones.json",
        );
        assert_eq!(store.load().get("zone4"), Some(&ZoneClass::Window));
    }
}
