//! Client-persisted preferences
//!
//! Exactly two durable values exist: whether built-in noise suppression is
//! disabled, and the last applied virtual-background preset.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{SessionError, SessionResult};

pub const NOISE_SUPPRESSION_DISABLED_KEY: &str = "noise-suppression-disabled";
pub const VIRTUAL_BACKGROUND_PRESET_KEY: &str = "virtual-background-preset";

/// Durable string key/value storage
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> SessionResult<Option<String>>;

    fn set(&self, key: &str, value: &str) -> SessionResult<()>;

    fn remove(&self, key: &str) -> SessionResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: RwLock<BTreeMap<String, String>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> SessionResult<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> SessionResult<()> {
        self.values.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> SessionResult<()> {
        self.values.write().remove(key);
        Ok(())
    }
}

/// Flat JSON object on disk, rewritten on every change
#[derive(Debug)]
pub struct JsonFilePreferences {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl JsonFilePreferences {
    /// Open the file, starting empty if it does not exist yet
    pub fn open(path: impl AsRef<Path>) -> SessionResult<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read_to_string(&path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(SessionError::PreferenceError {
                    reason: format!("{}: {}", path.display(), e),
                })
            }
        };
        debug!(path = %path.display(), entries = values.len(), "Loaded preferences");
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> SessionResult<()> {
        let text = serde_json::to_string_pretty(values)?;
        std::fs::write(&self.path, text).map_err(|e| SessionError::PreferenceError {
            reason: format!("{}: {}", self.path.display(), e),
        })
    }
}

impl PreferenceStore for JsonFilePreferences {
    fn get(&self, key: &str) -> SessionResult<Option<String>> {
        Ok(self.values.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> SessionResult<()> {
        let mut values = self.values.write();
        values.insert(key.to_string(), value.to_string());
        self.persist(&values)
    }

    fn remove(&self, key: &str) -> SessionResult<()> {
        let mut values = self.values.write();
        if values.remove(key).is_some() {
            self.persist(&values)?;
        }
        Ok(())
    }
}

/// Typed access to the two persisted preferences
#[derive(Clone)]
pub struct Preferences {
    store: Arc<dyn PreferenceStore>,
}

impl Preferences {
    pub fn new(store: Arc<dyn PreferenceStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryPreferences::new()))
    }

    /// Unreadable or malformed values read as "not disabled"
    pub fn noise_suppression_disabled(&self) -> bool {
        match self.store.get(NOISE_SUPPRESSION_DISABLED_KEY) {
            Ok(Some(value)) => value == "true",
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "Failed to read noise suppression preference");
                false
            }
        }
    }

    pub fn set_noise_suppression_disabled(&self, disabled: bool) -> SessionResult<()> {
        self.store
            .set(NOISE_SUPPRESSION_DISABLED_KEY, if disabled { "true" } else { "false" })
    }

    pub fn virtual_background_preset(&self) -> Option<String> {
        match self.store.get(VIRTUAL_BACKGROUND_PRESET_KEY) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(error = %e, "Failed to read virtual background preference");
                None
            }
        }
    }

    pub fn set_virtual_background_preset(&self, preset: Option<&str>) -> SessionResult<()> {
        match preset {
            Some(id) => self.store.set(VIRTUAL_BACKGROUND_PRESET_KEY, id),
            None => self.store.remove(VIRTUAL_BACKGROUND_PRESET_KEY),
        }
    }
}

impl Default for Preferences {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_wrapper_round_trips() {
        let prefs = Preferences::in_memory();
        assert!(!prefs.noise_suppression_disabled());
        prefs.set_noise_suppression_disabled(true).unwrap();
        assert!(prefs.noise_suppression_disabled());

        prefs.set_virtual_background_preset(Some("blur")).unwrap();
        assert_eq!(prefs.virtual_background_preset().as_deref(), Some("blur"));
        prefs.set_virtual_background_preset(None).unwrap();
        assert_eq!(prefs.virtual_background_preset(), None);
    }

    #[test]
    fn json_file_persists_across_reopen() {
        let path = std::env::temp_dir().join(format!("prefs-{}.json", uuid::Uuid::new_v4()));
        {
            let store = JsonFilePreferences::open(&path).unwrap();
            store.set(NOISE_SUPPRESSION_DISABLED_KEY, "true").unwrap();
            store.set(VIRTUAL_BACKGROUND_PRESET_KEY, "beach").unwrap();
        }
        let reopened = JsonFilePreferences::open(&path).unwrap();
        assert_eq!(
            reopened.get(VIRTUAL_BACKGROUND_PRESET_KEY).unwrap().as_deref(),
            Some("beach")
        );
        reopened.remove(VIRTUAL_BACKGROUND_PRESET_KEY).unwrap();
        assert_eq!(JsonFilePreferences::open(&path).unwrap().get(VIRTUAL_BACKGROUND_PRESET_KEY).unwrap(), None);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn malformed_file_is_a_preference_error() {
        let path = std::env::temp_dir().join(format!("prefs-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            JsonFilePreferences::open(&path),
            Err(SessionError::PreferenceError { .. })
        ));
        let _ = std::fs::remove_file(&path);
    }
}
