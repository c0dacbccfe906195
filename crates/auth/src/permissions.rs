//! Permission grammar: `resource:action:scope` triples.
//!
//! - `{all}` in resource/action position matches any concrete value.
//! - `{all}` in scope position means "every instance" on a grant and "no
//!   instance restriction" on a requirement.
//! - `{name}` in scope position is a placeholder, bound late to a concrete
//!   instance id (usually a path parameter). Only requirements carry these.
//!
//! The resource and action vocabularies are configuration; see
//! [`PermissionGrammar::new`].

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{AuthError, AuthResult};

pub const WILDCARD: &str = "{all}";

/// Resource or action component of a permission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Component {
    Any,
    Named(String),
}

impl Component {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Whether a held component covers a required one.
    pub fn covers(&self, required: &Component) -> bool {
        match self {
            Self::Any => true,
            Self::Named(_) => self == required,
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => f.write_str(WILDCARD),
            Self::Named(name) => f.write_str(name),
        }
    }
}

/// Scope of a held grant. Always concrete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GrantScope {
    All,
    Instance(u64),
}

impl fmt::Display for GrantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str(WILDCARD),
            Self::Instance(id) => write!(f, "{id}"),
        }
    }
}

/// Scope of a requirement, possibly still unbound.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RequiredScope {
    All,
    Instance(u64),
    Placeholder(String),
}

impl fmt::Display for RequiredScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str(WILDCARD),
            Self::Instance(id) => write!(f, "{id}"),
            Self::Placeholder(name) => write!(f, "{{{name}}}"),
        }
    }
}

/// A permission held by a principal (baked into an access credential).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub resource: Component,
    pub action: Component,
    pub scope: GrantScope,
}

impl PermissionGrant {
    pub fn new(resource: Component, action: Component, scope: GrantScope) -> Self {
        Self {
            resource,
            action,
            scope,
        }
    }

    /// `{all}:{all}:{all}`.
    pub fn super_admin() -> Self {
        Self::new(Component::Any, Component::Any, GrantScope::All)
    }

    pub fn is_super_admin(&self) -> bool {
        *self == Self::super_admin()
    }
}

impl fmt::Display for PermissionGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.resource, self.action, self.scope)
    }
}

/// A permission a route requires.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionRequirement {
    pub resource: Component,
    pub action: Component,
    pub scope: RequiredScope,
}

impl PermissionRequirement {
    pub fn new(resource: Component, action: Component, scope: RequiredScope) -> Self {
        Self {
            resource,
            action,
            scope,
        }
    }
}

impl fmt::Display for PermissionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.resource, self.action, self.scope)
    }
}

/// Parser for permission strings, parameterized by the known vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionGrammar {
    resources: BTreeSet<String>,
    actions: BTreeSet<String>,
}

impl Default for PermissionGrammar {
    fn default() -> Self {
        Self::new(["user"], ["create", "read", "update", "delete"])
    }
}

impl PermissionGrammar {
    pub fn new<R, A>(resources: R, actions: A) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        A: IntoIterator,
        A::Item: Into<String>,
    {
        Self {
            resources: resources.into_iter().map(Into::into).collect(),
            actions: actions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn resources(&self) -> impl Iterator<Item = &str> {
        self.resources.iter().map(String::as_str)
    }

    pub fn actions(&self) -> impl Iterator<Item = &str> {
        self.actions.iter().map(String::as_str)
    }

    pub fn parse_grant(&self, value: &str) -> AuthResult<PermissionGrant> {
        let (resource, action, scope) = self.split(value)?;
        let scope = match parse_scope(value, scope)? {
            RequiredScope::All => GrantScope::All,
            RequiredScope::Instance(id) => GrantScope::Instance(id),
            RequiredScope::Placeholder(_) => {
                return Err(AuthError::malformed_permission(format!(
                    "{value:?}: a grant cannot carry a scope placeholder"
                )));
            }
        };
        Ok(PermissionGrant::new(resource, action, scope))
    }

    pub fn parse_requirement(&self, value: &str) -> AuthResult<PermissionRequirement> {
        let (resource, action, scope) = self.split(value)?;
        let scope = parse_scope(value, scope)?;
        Ok(PermissionRequirement::new(resource, action, scope))
    }

    /// Parse the space-joined list form used inside access credentials.
    pub fn parse_grant_list(&self, value: &str) -> AuthResult<Vec<PermissionGrant>> {
        value
            .split(' ')
            .filter(|s| !s.is_empty())
            .map(|s| self.parse_grant(s))
            .collect()
    }

    pub fn parse_requirements<I, S>(&self, values: I) -> AuthResult<Vec<PermissionRequirement>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        values
            .into_iter()
            .map(|s| self.parse_requirement(s.as_ref()))
            .collect()
    }

    fn split<'a>(&self, value: &'a str) -> AuthResult<(Component, Component, &'a str)> {
        let parts: Vec<&str> = value.split(':').collect();
        let [resource, action, scope] = parts.as_slice() else {
            return Err(AuthError::malformed_permission(format!(
                "{value:?}: expected resource:action:scope"
            )));
        };
        if resource.is_empty() || action.is_empty() || scope.is_empty() {
            return Err(AuthError::malformed_permission(format!(
                "{value:?}: empty component"
            )));
        }

        let resource = parse_component(value, resource, &self.resources, "resource")?;
        let action = parse_component(value, action, &self.actions, "action")?;
        Ok((resource, action, *scope))
    }
}

/// Render grants in the space-joined list form.
pub fn serialize_grants<'a, I>(grants: I) -> String
where
    I: IntoIterator<Item = &'a PermissionGrant>,
{
    grants
        .into_iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_component(
    whole: &str,
    raw: &str,
    known: &BTreeSet<String>,
    what: &str,
) -> AuthResult<Component> {
    if raw == WILDCARD {
        return Ok(Component::Any);
    }
    if known.contains(raw) {
        return Ok(Component::named(raw));
    }
    Err(AuthError::malformed_permission(format!(
        "{whole:?}: unknown {what} '{raw}'"
    )))
}

fn parse_scope(whole: &str, raw: &str) -> AuthResult<RequiredScope> {
    if raw == WILDCARD {
        return Ok(RequiredScope::All);
    }

    if let Some(name) = raw.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
        if is_placeholder_name(name) {
            return Ok(RequiredScope::Placeholder(name.to_string()));
        }
        return Err(AuthError::malformed_permission(format!(
            "{whole:?}: invalid scope placeholder '{raw}'"
        )));
    }

    parse_instance_id(raw).map(RequiredScope::Instance).ok_or_else(|| {
        AuthError::malformed_permission(format!("{whole:?}: invalid scope '{raw}'"))
    })
}

fn is_placeholder_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Parse a canonical non-negative integer: digits only, no sign, no
/// leading zeros. Canonical form keeps `parse` and `Display` exact inverses.
pub(crate) fn parse_instance_id(raw: &str) -> Option<u64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if raw.len() > 1 && raw.starts_with('0') {
        return None;
    }
    raw.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AuthErrorKind;
    use proptest::prelude::*;

    fn grammar() -> PermissionGrammar {
        PermissionGrammar::default()
    }

    fn assert_malformed(result: AuthResult<impl fmt::Debug>) {
        let err = result.expect_err("expected malformed permission");
        assert_eq!(err.kind(), AuthErrorKind::MalformedPermission, "{err}");
    }

    #[test]
    fn parse_concrete_grant() {
        let grant = grammar().parse_grant("user:update:17").unwrap();
        assert_eq!(grant.resource, Component::named("user"));
        assert_eq!(grant.action, Component::named("update"));
        assert_eq!(grant.scope, GrantScope::Instance(17));
    }

    #[test]
    fn parse_super_admin() {
        let grant = grammar().parse_grant("{all}:{all}:{all}").unwrap();
        assert!(grant.is_super_admin());
        assert_eq!(grant.to_string(), "{all}:{all}:{all}");
    }

    #[test]
    fn parse_requirement_with_placeholder() {
        let req = grammar().parse_requirement("user:read:{userID}").unwrap();
        assert_eq!(req.scope, RequiredScope::Placeholder("userID".to_string()));
        assert_eq!(req.to_string(), "user:read:{userID}");
    }

    #[test]
    fn grant_rejects_placeholder() {
        assert_malformed(grammar().parse_grant("user:read:{userID}"));
    }

    #[test]
    fn rejects_wrong_component_count() {
        assert_malformed(grammar().parse_requirement("user:read"));
        assert_malformed(grammar().parse_requirement("user:read:1:2"));
        assert_malformed(grammar().parse_requirement(""));
    }

    #[test]
    fn rejects_empty_components() {
        assert_malformed(grammar().parse_requirement(":read:1"));
        assert_malformed(grammar().parse_requirement("user::1"));
        assert_malformed(grammar().parse_requirement("user:read:"));
    }

    #[test]
    fn rejects_unknown_vocabulary() {
        assert_malformed(grammar().parse_requirement("invoice:read:1"));
        assert_malformed(grammar().parse_requirement("user:approve:1"));
        // Case matters.
        assert_malformed(grammar().parse_requirement("User:read:1"));
    }

    #[test]
    fn rejects_non_canonical_scopes() {
        for scope in ["-1", "+5", "007", "1.5", "abc", "{}", "{a-b}", "{all", "18446744073709551616"] {
            assert_malformed(grammar().parse_requirement(&format!("user:read:{scope}")));
        }
    }

    #[test]
    fn zero_and_max_are_legal_scopes() {
        let zero = grammar().parse_grant("user:read:0").unwrap();
        assert_eq!(zero.scope, GrantScope::Instance(0));
        let max = grammar()
            .parse_grant("user:read:18446744073709551615")
            .unwrap();
        assert_eq!(max.scope, GrantScope::Instance(u64::MAX));
    }

    #[test]
    fn custom_vocabulary() {
        let grammar = PermissionGrammar::new(["invoice", "user"], ["approve"]);
        assert!(grammar.parse_grant("invoice:approve:{all}").is_ok());
        assert_malformed(grammar.parse_grant("user:read:{all}"));
        assert_eq!(grammar.resources().collect::<Vec<_>>(), vec!["invoice", "user"]);
        assert_eq!(grammar.actions().collect::<Vec<_>>(), vec!["approve"]);
    }

    #[test]
    fn grant_list_roundtrip() {
        let grammar = grammar();
        let grants = grammar
            .parse_grant_list("user:read:{all} user:update:3")
            .unwrap();
        assert_eq!(grants.len(), 2);
        assert_eq!(serialize_grants(&grants), "user:read:{all} user:update:3");
        assert!(grammar.parse_grant_list("").unwrap().is_empty());
    }

    #[test]
    fn grant_list_propagates_first_error() {
        assert_malformed(grammar().parse_grant_list("user:read:1 nope"));
    }

    #[test]
    fn held_component_coverage() {
        assert!(Component::Any.covers(&Component::named("user")));
        assert!(Component::named("user").covers(&Component::named("user")));
        assert!(!Component::named("user").covers(&Component::Any));
    }

    fn component() -> impl Strategy<Value = String> {
        prop_oneof![Just("{all}".to_string()), Just("user".to_string())]
    }

    fn action() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("{all}".to_string()),
            Just("create".to_string()),
            Just("read".to_string()),
            Just("update".to_string()),
            Just("delete".to_string()),
        ]
    }

    fn scope() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("{all}".to_string()),
            any::<u64>().prop_map(|n| n.to_string()),
            "[A-Za-z_][A-Za-z0-9_]{0,12}"
                .prop_filter("not the wildcard", |s| s != "all")
                .prop_map(|s| format!("{{{s}}}")),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: every legal requirement string serializes back to itself.
        #[test]
        fn requirement_string_roundtrip(r in component(), a in action(), s in scope()) {
            let raw = format!("{r}:{a}:{s}");
            let parsed = grammar().parse_requirement(&raw).unwrap();
            prop_assert_eq!(parsed.to_string(), raw);
        }

        /// Property: parse(serialize(grant)) is the identity on grants.
        #[test]
        fn grant_value_roundtrip(
            r in component(),
            a in action(),
            s in prop_oneof![Just(GrantScope::All), any::<u64>().prop_map(GrantScope::Instance)],
        ) {
            let as_component = |raw: &str| {
                if raw == WILDCARD { Component::Any } else { Component::named(raw) }
            };
            let grammar = grammar();
            let grant = PermissionGrant::new(as_component(&r), as_component(&a), s);
            prop_assert_eq!(grammar.parse_grant(&grant.to_string()).unwrap(), grant);
        }
    }
}
