use std::sync::Arc;

use labwatch_api::{AlarmConfig, AlarmUpdate};
use tokio::sync::watch;

use crate::configs::ConfigStore;
use crate::errors::StoreError;

/// In-memory copy of the alarm document shared by both loops.
///
/// Readers always get a complete `Arc<AlarmConfig>`; a reload swaps the whole
/// value at once.
#[derive(Clone)]
pub struct ConfigCache {
    store: Arc<dyn ConfigStore>,
    sender: Arc<watch::Sender<Arc<AlarmConfig>>>,
}

impl ConfigCache {
    pub fn load(store: Arc<dyn ConfigStore>) -> Result<Self, StoreError> {
        let document = Arc::new(store.get()?);
        let (sender, _receiver) = watch::channel(document);

        Ok(Self {
            store,
            sender: Arc::new(sender),
        })
    }

    pub fn current(&self) -> Arc<AlarmConfig> {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<AlarmConfig>> {
        self.sender.subscribe()
    }

    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    /// Re-reads the store and publishes the new snapshot
    pub fn reload(&self) -> Result<Arc<AlarmConfig>, StoreError> {
        let document = Arc::new(self.store.get()?);
        self.sender.send_replace(document.clone());

        tracing::debug!("configuration reloaded");

        Ok(document)
    }

    /// Writes through to the store, then reloads
    pub fn update(&self, update: &AlarmUpdate) -> Result<Arc<AlarmConfig>, StoreError> {
        self.store.update(update)?;
        self.reload()
    }
}
