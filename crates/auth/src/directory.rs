//! Principal lookup collaborator.
//!
//! The engine never owns user records. It asks a directory whether a
//! principal still exists and which grants its roles currently carry.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use gatekeep_core::PrincipalId;

use crate::{AuthError, AuthResult, PermissionGrant, Role, RoleTable};

#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn principal_exists(&self, principal_id: PrincipalId) -> AuthResult<bool>;

    /// Current grants; re-read on every rotation.
    async fn principal_grants(&self, principal_id: PrincipalId) -> AuthResult<Vec<PermissionGrant>>;
}

#[derive(Debug, Default)]
struct DirectoryState {
    principals: HashMap<PrincipalId, Vec<Role>>,
    roles: RoleTable,
}

/// In-memory directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryPrincipalDirectory {
    state: RwLock<DirectoryState>,
}

impl InMemoryPrincipalDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roles(roles: RoleTable) -> Self {
        Self {
            state: RwLock::new(DirectoryState {
                principals: HashMap::new(),
                roles,
            }),
        }
    }

    pub fn insert_role(&self, role: Role, grants: Vec<PermissionGrant>) -> AuthResult<()> {
        self.write()?.roles.insert(role, grants);
        Ok(())
    }

    pub fn insert_principal(&self, principal_id: PrincipalId, roles: Vec<Role>) -> AuthResult<()> {
        self.write()?.principals.insert(principal_id, roles);
        Ok(())
    }

    /// Add a role to an existing principal. No-op if already assigned.
    pub fn assign_role(&self, principal_id: PrincipalId, role: Role) -> AuthResult<()> {
        let mut state = self.write()?;
        let roles = state
            .principals
            .get_mut(&principal_id)
            .ok_or(AuthError::PrincipalNotFound(principal_id))?;
        if !roles.contains(&role) {
            roles.push(role);
        }
        Ok(())
    }

    pub fn revoke_role(&self, principal_id: PrincipalId, role: &Role) -> AuthResult<()> {
        let mut state = self.write()?;
        let roles = state
            .principals
            .get_mut(&principal_id)
            .ok_or(AuthError::PrincipalNotFound(principal_id))?;
        roles.retain(|r| r != role);
        Ok(())
    }

    pub fn remove_principal(&self, principal_id: PrincipalId) -> AuthResult<bool> {
        Ok(self.write()?.principals.remove(&principal_id).is_some())
    }

    fn write(&self) -> AuthResult<std::sync::RwLockWriteGuard<'_, DirectoryState>> {
        self.state
            .write()
            .map_err(|_| AuthError::directory("lock poisoned"))
    }

    fn read(&self) -> AuthResult<std::sync::RwLockReadGuard<'_, DirectoryState>> {
        self.state
            .read()
            .map_err(|_| AuthError::directory("lock poisoned"))
    }
}

#[async_trait]
impl PrincipalDirectory for InMemoryPrincipalDirectory {
    async fn principal_exists(&self, principal_id: PrincipalId) -> AuthResult<bool> {
        Ok(self.read()?.principals.contains_key(&principal_id))
    }

    async fn principal_grants(&self, principal_id: PrincipalId) -> AuthResult<Vec<PermissionGrant>> {
        let state = self.read()?;
        let roles = state
            .principals
            .get(&principal_id)
            .ok_or(AuthError::PrincipalNotFound(principal_id))?;
        Ok(state.roles.flatten(roles))
    }
}
