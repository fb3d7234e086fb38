//! File-backed Durable Store
//!
//! Keeps every client key in one JSON object on disk. Writes go to a sibling
//! temp file that is then renamed over the original, so a crash mid-write
//! leaves either the old or the new state, never a torn file.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use photo_core::{DurableStore, StudioError, error::Result};

type Entries = BTreeMap<String, String>;

/// JSON file store that survives process restarts
#[derive(Debug)]
pub struct FileDurableStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileDurableStore {
    /// Use `path`, creating its parent directory if needed
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        tracing::debug!(path = %path.display(), "Opened state file");
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Entries> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Entries::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(Entries::new());
        }
        match serde_json::from_str(&raw) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "State file unreadable, starting empty");
                Ok(Entries::new())
            }
        }
    }

    fn save(&self, entries: &Entries) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            StudioError::Storage(format!("failed to replace {}: {e}", self.path.display()))
        })
    }
}

impl DurableStore for FileDurableStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use photo_core::{
        ClientPreferences, PaymentProvider, PersistedIntentRecord, PersistentIntentStore,
        SystemClock, Theme,
    };
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> FileDurableStore {
        FileDurableStore::open(dir.path().join("state").join("client.json")).unwrap()
    }

    #[test]
    fn values_survive_reopening() {
        let dir = TempDir::new().unwrap();
        store(&dir).set("buyer_id", "42").unwrap();

        let reopened = store(&dir);
        assert_eq!(reopened.get("buyer_id").unwrap().as_deref(), Some("42"));
        assert_eq!(reopened.get("theme").unwrap(), None);
    }

    #[test]
    fn remove_only_touches_its_key() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();

        store.remove("a").unwrap();
        store.remove("never-set").unwrap();

        assert_eq!(store.get("a").unwrap(), None);
        assert_eq!(store.get("b").unwrap().as_deref(), Some("2"));
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        fs::write(store.path(), "{not json").unwrap();

        assert_eq!(store.get("buyer_id").unwrap(), None);
        store.set("buyer_id", "7").unwrap();
        assert_eq!(store.get("buyer_id").unwrap().as_deref(), Some("7"));
    }

    #[test]
    fn pending_intent_survives_restart() {
        let dir = TempDir::new().unwrap();
        let record = PersistedIntentRecord::new(
            PaymentProvider::HostedRedirect,
            "standard".into(),
            Some("av1".into()),
            Utc::now(),
        )
        .with_payment_id("p1".into());

        PersistentIntentStore::new(Arc::new(store(&dir)), Arc::new(SystemClock))
            .write(&record)
            .unwrap();

        let after_restart = PersistentIntentStore::new(Arc::new(store(&dir)), Arc::new(SystemClock));
        assert_eq!(after_restart.read().unwrap(), Some(record));
    }

    #[test]
    fn preferences_share_the_file() {
        let dir = TempDir::new().unwrap();
        let prefs = ClientPreferences::new(Arc::new(store(&dir)));
        prefs.set_theme(Theme::Dark).unwrap();
        prefs.set_onboarding_complete(true).unwrap();

        let reopened = ClientPreferences::new(Arc::new(store(&dir)));
        assert_eq!(reopened.theme().unwrap(), Theme::Dark);
        assert!(reopened.onboarding_complete().unwrap());
    }

    #[test]
    fn pro_credit_survives_restart_until_taken() {
        let dir = TempDir::new().unwrap();
        ClientPreferences::new(Arc::new(store(&dir)))
            .grant_pro_credit()
            .unwrap();

        let after_restart = ClientPreferences::new(Arc::new(store(&dir)));
        assert!(after_restart.take_pro_credit().unwrap());

        let later = ClientPreferences::new(Arc::new(store(&dir)));
        assert!(!later.has_pro_credit().unwrap());
    }
}
