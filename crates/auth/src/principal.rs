use serde::{Deserialize, Serialize};

use gatekeep_core::PrincipalId;

use crate::PermissionGrant;

/// An authenticated principal, as recovered from a valid access credential.
///
/// Immutable for the lifetime of one request; grants are whatever was baked
/// into the credential at rotation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub grants: Vec<PermissionGrant>,
}

impl Principal {
    pub fn new(id: PrincipalId, grants: Vec<PermissionGrant>) -> Self {
        Self { id, grants }
    }
}
