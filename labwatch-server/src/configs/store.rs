use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use labwatch_api::{AlarmConfig, AlarmUpdate, Contact, SensorConfig, SensorId};

use crate::errors::StoreError;

/// Single-document store for the alarm configuration.
///
/// Every operation reads the whole document and writes it back; concurrent
/// writers resolve as last-writer-wins.
pub trait ConfigStore: Send + Sync {
    fn get(&self) -> Result<AlarmConfig, StoreError>;

    fn put(&self, document: &AlarmConfig) -> Result<(), StoreError>;

    fn update(&self, update: &AlarmUpdate) -> Result<(), StoreError> {
        let mut document = self.get()?;
        document.apply(update);
        self.put(&document)
    }

    /// Adds unknown sensors with default settings, returns how many were new
    fn register_sensors(&self, sensor_ids: &[SensorId]) -> Result<usize, StoreError> {
        let mut document = self.get()?;
        let mut added = 0;

        for sensor_id in sensor_ids {
            if !document.sensors.contains_key(sensor_id) {
                document
                    .sensors
                    .insert(sensor_id.clone(), SensorConfig::discovered(sensor_id));
                added += 1;
            }
        }

        if added > 0 {
            self.put(&document)?;
        }

        Ok(added)
    }

    fn update_sensor(&self, sensor_id: &str, name: &str, trigger: f64) -> Result<(), StoreError> {
        let mut document = self.get()?;
        let sensor = document
            .sensors
            .get_mut(sensor_id)
            .ok_or_else(|| StoreError::SensorNotFound(sensor_id.to_string()))?;

        sensor.name = name.to_string();
        sensor.trigger = trigger;

        self.put(&document)
    }

    fn add_contact(&self, contact: Contact) -> Result<(), StoreError> {
        let mut document = self.get()?;
        let contact = Contact {
            phone_number: labwatch_api::normalize_phone_number(&contact.phone_number),
            ..contact
        };

        match document
            .contacts
            .iter_mut()
            .find(|existing| existing.phone_number == contact.phone_number)
        {
            Some(existing) => *existing = contact,
            None => document.contacts.push(contact),
        }

        self.put(&document)
    }

    fn remove_contact(&self, index: usize) -> Result<Contact, StoreError> {
        let mut document = self.get()?;
        if index >= document.contacts.len() {
            return Err(StoreError::ContactNotFound(index));
        }

        let removed = document.contacts.remove(index);
        self.put(&document)?;

        Ok(removed)
    }
}

/// [`ConfigStore`] backed by a JSON file
pub struct JsonConfigStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonConfigStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for JsonConfigStore {
    fn get(&self) -> Result<AlarmConfig, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;

        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(AlarmConfig::default()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!("config document {:?} missing, using defaults", self.path);
                Ok(AlarmConfig::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn put(&self, document: &AlarmConfig) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;

        write_atomically(&self.path, &serde_json::to_vec_pretty(document)?)
    }
}

/// Replaces `path` through a sibling temp file so readers never see a torn document
pub(crate) fn write_atomically(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, content)?;
    fs::rename(&temp_path, path)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, JsonConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonConfigStore::new(dir.path().join("config.json"));
        (dir, store)
    }

    #[test]
    fn test_missing_document_yields_defaults() {
        let (_dir, store) = store();

        assert_eq!(store.get().unwrap(), AlarmConfig::default());
    }

    #[test]
    fn test_update_round_trips_through_file() {
        let (_dir, store) = store();

        store
            .update(&AlarmUpdate {
                repeat_alerts: Some(true),
                location: Some("Rack room".to_string()),
                ..Default::default()
            })
            .unwrap();

        let reopened = JsonConfigStore::new(store.path());
        let document = reopened.get().unwrap();
        assert!(document.repeat_alerts);
        assert_eq!(document.location, "Rack room");
    }

    #[test]
    fn test_register_sensors_keeps_existing_entries() {
        let (_dir, store) = store();
        store.register_sensors(&["28-a".to_string()]).unwrap();
        store.update_sensor("28-a", "Freezer", -18.0).unwrap();

        let added = store
            .register_sensors(&["28-a".to_string(), "28-b".to_string()])
            .unwrap();

        let document = store.get().unwrap();
        assert_eq!(added, 1);
        assert_eq!(document.sensors["28-a"].name, "Freezer");
        assert_eq!(document.sensors["28-b"].trigger, SensorConfig::DEFAULT_TRIGGER);
    }

    #[test]
    fn test_update_unknown_sensor_fails() {
        let (_dir, store) = store();

        assert!(matches!(
            store.update_sensor("28-x", "Ghost", 10.0),
            Err(StoreError::SensorNotFound(_))
        ));
    }

    #[test]
    fn test_contacts_are_normalized_and_deduplicated() {
        let (_dir, store) = store();
        store.add_contact(Contact::new("4155550100", "Ada")).unwrap();
        store
            .add_contact(Contact {
                phone_number: "(415) 555-0100".to_string(),
                name: "Ada L.".to_string(),
                wants_daily_report: true,
                is_admin: true,
            })
            .unwrap();

        let document = store.get().unwrap();
        assert_eq!(document.contacts.len(), 1);
        assert_eq!(document.contacts[0].name, "Ada L.");

        let removed = store.remove_contact(0).unwrap();
        assert_eq!(removed.phone_number, "+14155550100");
        assert!(matches!(store.remove_contact(0), Err(StoreError::ContactNotFound(0))));
    }
}
