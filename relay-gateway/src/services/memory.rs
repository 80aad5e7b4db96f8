//! Non-durable Credential Store.
//!
//! Every relation lives behind one reader/writer lock. No lock is held
//! across an await point.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

use super::store::{CredentialStore, StoreError};
use crate::models::{Identity, Policy, Role, Token};
use crate::utils::SecretHash;

#[derive(Default)]
struct MemoryState {
    identities: HashMap<Uuid, Identity>,
    credentials: HashMap<Uuid, SecretHash>,
    roles: HashMap<String, Role>,
    assignments: HashSet<(Uuid, Uuid)>,
    policies: Vec<Policy>,
    tokens: HashMap<String, Token>,
}

#[derive(Default)]
pub struct MemoryCredentialStore {
    state: RwLock<MemoryState>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>, StoreError> {
        self.state
            .read()
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("Lock poisoned: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>, StoreError> {
        self.state
            .write()
            .map_err(|e| StoreError::Backend(anyhow::anyhow!("Lock poisoned: {}", e)))
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    fn is_durable(&self) -> bool {
        false
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.read().map(|_| ())
    }

    async fn create_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if state.identities.values().any(|i| i.email == identity.email) {
            return Err(StoreError::DuplicateEmail);
        }
        state.identities.insert(identity.id, identity.clone());
        Ok(())
    }

    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self
            .read()?
            .identities
            .values()
            .find(|i| i.email == email)
            .cloned())
    }

    async fn find_identity_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        Ok(self.read()?.identities.get(&id).cloned())
    }

    async fn set_identity_active(&self, id: Uuid, active: bool) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let identity = state
            .identities
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound("Identity".to_string()))?;
        identity.active = active;
        Ok(())
    }

    async fn set_credential(&self, identity_id: Uuid, hash: &SecretHash) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.identities.contains_key(&identity_id) {
            return Err(StoreError::NotFound("Identity".to_string()));
        }
        state.credentials.insert(identity_id, hash.clone());
        Ok(())
    }

    async fn credential_hash(&self, identity_id: Uuid) -> Result<Option<SecretHash>, StoreError> {
        Ok(self.read()?.credentials.get(&identity_id).cloned())
    }

    async fn ensure_role(&self, name: &str) -> Result<Role, StoreError> {
        let mut state = self.write()?;
        let role = state
            .roles
            .entry(name.to_string())
            .or_insert_with(|| Role::new(name.to_string()));
        Ok(role.clone())
    }

    async fn assign_role(&self, identity_id: Uuid, role_id: Uuid) -> Result<(), StoreError> {
        let mut state = self.write()?;
        if !state.identities.contains_key(&identity_id) {
            return Err(StoreError::NotFound("Identity".to_string()));
        }
        if !state.roles.values().any(|r| r.role_id == role_id) {
            return Err(StoreError::NotFound("Role".to_string()));
        }
        state.assignments.insert((identity_id, role_id));
        Ok(())
    }

    async fn unassign_role(&self, identity_id: Uuid, role_name: &str) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        let Some(role_id) = state.roles.get(role_name).map(|r| r.role_id) else {
            return Ok(false);
        };
        Ok(state.assignments.remove(&(identity_id, role_id)))
    }

    async fn assigned_role_names(&self, identity_id: Uuid) -> Result<Vec<String>, StoreError> {
        let state = self.read()?;
        let names: BTreeSet<String> = state
            .roles
            .values()
            .filter(|r| state.assignments.contains(&(identity_id, r.role_id)))
            .map(|r| r.role_name.clone())
            .collect();
        Ok(names.into_iter().collect())
    }

    async fn list_policies(&self, subject: &str) -> Result<Vec<Policy>, StoreError> {
        Ok(self
            .read()?
            .policies
            .iter()
            .filter(|p| p.subject == subject)
            .cloned()
            .collect())
    }

    async fn list_all_policies(&self) -> Result<Vec<Policy>, StoreError> {
        Ok(self.read()?.policies.clone())
    }

    async fn insert_policy(&self, policy: &Policy) -> Result<(), StoreError> {
        self.write()?.policies.push(policy.clone());
        Ok(())
    }

    async fn ensure_policy(
        &self,
        subject: &str,
        action: &str,
        resource: &str,
    ) -> Result<bool, StoreError> {
        let mut state = self.write()?;
        let exists = state
            .policies
            .iter()
            .any(|p| p.subject == subject && p.action == action && p.resource == resource);
        if exists {
            return Ok(false);
        }
        state.policies.push(Policy::new(
            subject.to_string(),
            action.to_string(),
            resource.to_string(),
        ));
        Ok(true)
    }

    async fn upsert_token(&self, token: &Token) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let revoked = token.revoked
            || state
                .tokens
                .get(&token.id)
                .map_or(false, |existing| existing.revoked);
        state.tokens.insert(
            token.id.clone(),
            Token {
                revoked,
                ..token.clone()
            },
        );
        Ok(())
    }

    async fn get_token(&self, id: &str) -> Result<Option<Token>, StoreError> {
        Ok(self.read()?.tokens.get(id).cloned())
    }

    async fn list_tokens(&self) -> Result<Vec<Token>, StoreError> {
        let mut tokens: Vec<Token> = self.read()?.tokens.values().cloned().collect();
        tokens.sort_by(|a, b| a.created_utc.cmp(&b.created_utc).then(a.id.cmp(&b.id)));
        Ok(tokens)
    }

    async fn count_tokens(&self) -> Result<i64, StoreError> {
        Ok(self.read()?.tokens.len() as i64)
    }
}
