//! Route-side authorization inputs.
//!
//! Route matching lives in the request-handling layer. This module only
//! carries what a matched route hands to the engine: its required
//! permissions and the path parameters that bind scope placeholders.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::permissions::parse_instance_id;
use crate::{AuthError, AuthResult, PermissionGrammar, PermissionRequirement};

/// Placeholder name → concrete instance id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeBindings(BTreeMap<String, u64>);

impl ScopeBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, name: impl Into<String>, id: u64) -> Self {
        self.insert(name, id);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, id: u64) {
        self.0.insert(name.into(), id);
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.0.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build bindings from raw path parameters (e.g. `userID -> "17"`).
    ///
    /// Every parameter must be a canonical non-negative integer.
    pub fn from_path_params<I, K, V>(params: I) -> AuthResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut bindings = Self::new();
        for (name, value) in params {
            let (name, value) = (name.as_ref(), value.as_ref());
            let id = parse_instance_id(value).ok_or_else(|| AuthError::InvalidBinding {
                name: name.to_string(),
                value: value.to_string(),
            })?;
            bindings.insert(name, id);
        }
        Ok(bindings)
    }
}

impl FromIterator<(String, u64)> for ScopeBindings {
    fn from_iter<T: IntoIterator<Item = (String, u64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Route-side authorization contract (checked before the handler runs).
///
/// Implement this on whatever the request layer resolves a route to.
pub trait RouteAuthorization {
    fn required_permissions(&self) -> &[PermissionRequirement];

    fn scope_bindings(&self) -> &ScopeBindings;
}

/// Parsed requirements plus bindings for one matched request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteAuthSpec {
    required: Vec<PermissionRequirement>,
    bindings: ScopeBindings,
}

impl RouteAuthSpec {
    pub fn new(required: Vec<PermissionRequirement>, bindings: ScopeBindings) -> Self {
        Self { required, bindings }
    }

    /// Parse a route table entry.
    ///
    /// A malformed string is a route-table bug and is logged loudly.
    pub fn parse<I, S>(
        grammar: &PermissionGrammar,
        permissions: I,
        bindings: ScopeBindings,
    ) -> AuthResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let required = grammar.parse_requirements(permissions).inspect_err(|e| {
            tracing::error!(error = %e, "route table contains a malformed permission");
        })?;
        Ok(Self::new(required, bindings))
    }

    pub fn with_bindings(mut self, bindings: ScopeBindings) -> Self {
        self.bindings = bindings;
        self
    }
}

impl RouteAuthorization for RouteAuthSpec {
    fn required_permissions(&self) -> &[PermissionRequirement] {
        &self.required
    }

    fn scope_bindings(&self) -> &ScopeBindings {
        &self.bindings
    }
}
