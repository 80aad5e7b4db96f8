//! Process-local registries: upstream targets and the global relay settings.
//!
//! Both are owned objects with their own reader/writer lock; callers only
//! ever receive clones.

use service_core::error::AppError;
use std::collections::BTreeMap;
use std::sync::RwLock;
use thiserror::Error;

use crate::models::{RelayConfig, RelayConfigPatch, UpstreamPatch, UpstreamTarget};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Upstream not found")]
    NotFound,

    #[error("Upstream {0} already exists")]
    AlreadyExists(String),

    #[error("Registry lock poisoned")]
    Poisoned,
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound => AppError::NotFound(anyhow::anyhow!(err.to_string())),
            RegistryError::AlreadyExists(_) => AppError::Conflict(anyhow::anyhow!(err.to_string())),
            RegistryError::Poisoned => AppError::InternalError(anyhow::anyhow!(err.to_string())),
        }
    }
}

#[derive(Default)]
pub struct UpstreamRegistry {
    targets: RwLock<BTreeMap<String, UpstreamTarget>>,
}

impl UpstreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Result<Option<UpstreamTarget>, RegistryError> {
        let targets = self.targets.read().map_err(|_| RegistryError::Poisoned)?;
        Ok(targets.get(id).cloned())
    }

    /// All targets ordered by id.
    pub fn list(&self) -> Result<Vec<UpstreamTarget>, RegistryError> {
        let targets = self.targets.read().map_err(|_| RegistryError::Poisoned)?;
        Ok(targets.values().cloned().collect())
    }

    /// Add a new target; ids are unique.
    pub fn insert(&self, target: UpstreamTarget) -> Result<UpstreamTarget, RegistryError> {
        let mut targets = self.targets.write().map_err(|_| RegistryError::Poisoned)?;
        if targets.contains_key(&target.id) {
            return Err(RegistryError::AlreadyExists(target.id));
        }
        targets.insert(target.id.clone(), target.clone());
        Ok(target)
    }

    /// Insert or replace, used for startup registration.
    pub fn upsert(&self, target: UpstreamTarget) -> Result<(), RegistryError> {
        let mut targets = self.targets.write().map_err(|_| RegistryError::Poisoned)?;
        targets.insert(target.id.clone(), target);
        Ok(())
    }

    pub fn update(&self, id: &str, patch: UpstreamPatch) -> Result<UpstreamTarget, RegistryError> {
        let mut targets = self.targets.write().map_err(|_| RegistryError::Poisoned)?;
        let target = targets.get_mut(id).ok_or(RegistryError::NotFound)?;
        target.apply(patch);
        Ok(target.clone())
    }

    pub fn remove(&self, id: &str) -> Result<UpstreamTarget, RegistryError> {
        let mut targets = self.targets.write().map_err(|_| RegistryError::Poisoned)?;
        targets.remove(id).ok_or(RegistryError::NotFound)
    }
}

pub struct RelaySettings {
    config: RwLock<RelayConfig>,
}

impl RelaySettings {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }

    pub fn snapshot(&self) -> Result<RelayConfig, RegistryError> {
        let config = self.config.read().map_err(|_| RegistryError::Poisoned)?;
        Ok(config.clone())
    }

    /// Apply a patch as one atomic update and return the result.
    pub fn apply(&self, patch: RelayConfigPatch) -> Result<RelayConfig, RegistryError> {
        let mut config = self.config.write().map_err(|_| RegistryError::Poisoned)?;
        config.apply(patch);
        Ok(config.clone())
    }
}
