//! Roles and the role → grant table.

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{AuthResult, PermissionGrammar, PermissionGrant};

/// Role identifier.
///
/// Roles never appear in credentials; rotation flattens them into the
/// grants a principal holds at that moment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Grants attached to each role.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleTable {
    roles: HashMap<Role, Vec<PermissionGrant>>,
}

impl RoleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define (or redefine) a role.
    pub fn insert(&mut self, role: Role, grants: Vec<PermissionGrant>) {
        self.roles.insert(role, grants);
    }

    /// Define a role from permission strings.
    pub fn insert_parsed<I, S>(
        &mut self,
        grammar: &PermissionGrammar,
        role: Role,
        grants: I,
    ) -> AuthResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let grants = grants
            .into_iter()
            .map(|g| grammar.parse_grant(g.as_ref()))
            .collect::<AuthResult<Vec<_>>>()?;
        self.insert(role, grants);
        Ok(())
    }

    pub fn remove(&mut self, role: &Role) -> Option<Vec<PermissionGrant>> {
        self.roles.remove(role)
    }

    pub fn grants_of(&self, role: &Role) -> &[PermissionGrant] {
        self.roles.get(role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Union of the grants of `roles`, de-duplicated in first-seen order.
    /// Unknown roles contribute nothing.
    pub fn flatten<'a, I>(&self, roles: I) -> Vec<PermissionGrant>
    where
        I: IntoIterator<Item = &'a Role>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for role in roles {
            for grant in self.grants_of(role) {
                if seen.insert(grant) {
                    out.push(grant.clone());
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RoleTable {
        let grammar = PermissionGrammar::default();
        let mut table = RoleTable::new();
        table
            .insert_parsed(&grammar, Role::new("admin"), ["{all}:{all}:{all}"])
            .unwrap();
        table
            .insert_parsed(&grammar, Role::new("viewer"), ["user:read:{all}"])
            .unwrap();
        table
            .insert_parsed(
                &grammar,
                Role::new("support"),
                ["user:read:{all}", "user:update:{all}"],
            )
            .unwrap();
        table
    }

    #[test]
    fn flatten_dedups_in_order() {
        let table = table();
        let grants = table.flatten(&[Role::new("viewer"), Role::new("support")]);
        let rendered: Vec<String> = grants.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["user:read:{all}", "user:update:{all}"]);
    }

    #[test]
    fn unknown_roles_grant_nothing() {
        let table = table();
        assert!(table.flatten(&[Role::new("ghost")]).is_empty());
        assert!(table.grants_of(&Role::new("ghost")).is_empty());
    }

    #[test]
    fn insert_parsed_rejects_placeholders() {
        let mut table = RoleTable::new();
        let err = table
            .insert_parsed(
                &PermissionGrammar::default(),
                Role::new("self-service"),
                ["user:update:{userID}"],
            )
            .unwrap_err();
        assert!(err.is_caller_bug());
    }

    #[test]
    fn role_display() {
        assert_eq!(Role::new("admin").to_string(), "admin");
        let mut table = table();
        assert!(table.remove(&Role::new("admin")).is_some());
        assert!(table.grants_of(&Role::new("admin")).is_empty());
    }
}
