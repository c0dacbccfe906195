use std::fmt;

use serde::Serialize;

use gatekeep_core::PrincipalId;

use crate::{
    AuthError, AuthResult, Component, GrantScope, PermissionGrant, PermissionRequirement,
    Principal, RequiredScope, ScopeBindings,
};

/// A requirement whose scope placeholder has been bound.
///
/// `scope` reuses [`GrantScope`]: `All` here means "no instance restriction"
/// and `Instance(id)` is the concrete instance the route targets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ResolvedRequirement {
    pub resource: Component,
    pub action: Component,
    pub scope: GrantScope,
}

impl ResolvedRequirement {
    /// Whether `grant` covers this requirement.
    pub fn is_covered_by(&self, grant: &PermissionGrant) -> bool {
        if !grant.resource.covers(&self.resource) || !grant.action.covers(&self.action) {
            return false;
        }
        match (self.scope, grant.scope) {
            (GrantScope::All, _) => true,
            (GrantScope::Instance(_), GrantScope::All) => true,
            (GrantScope::Instance(wanted), GrantScope::Instance(held)) => wanted == held,
        }
    }
}

impl fmt::Display for ResolvedRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.resource, self.action, self.scope)
    }
}

/// Bind the scope placeholder of one requirement.
pub fn resolve(
    requirement: &PermissionRequirement,
    bindings: &ScopeBindings,
) -> AuthResult<ResolvedRequirement> {
    let scope = match &requirement.scope {
        RequiredScope::All => GrantScope::All,
        RequiredScope::Instance(id) => GrantScope::Instance(*id),
        RequiredScope::Placeholder(name) => {
            let id = bindings.get(name).ok_or_else(|| AuthError::UnboundScope {
                placeholder: name.clone(),
            })?;
            GrantScope::Instance(id)
        }
    };
    Ok(ResolvedRequirement {
        resource: requirement.resource.clone(),
        action: requirement.action.clone(),
        scope,
    })
}

/// Bind every requirement. Fails on the first unbound placeholder, before
/// any matching happens.
pub fn resolve_all(
    required: &[PermissionRequirement],
    bindings: &ScopeBindings,
) -> AuthResult<Vec<ResolvedRequirement>> {
    required.iter().map(|r| resolve(r, bindings)).collect()
}

/// Requirements no held grant covers.
///
/// - No IO
/// - No panics
/// - Pure policy check
pub fn unmet(
    held: &[PermissionGrant],
    required: &[PermissionRequirement],
    bindings: &ScopeBindings,
) -> AuthResult<Vec<ResolvedRequirement>> {
    let resolved = resolve_all(required, bindings)?;
    Ok(resolved
        .into_iter()
        .filter(|r| !held.iter().any(|g| r.is_covered_by(g)))
        .collect())
}

/// `true` iff every requirement is covered by at least one held grant.
pub fn satisfies(
    held: &[PermissionGrant],
    required: &[PermissionRequirement],
    bindings: &ScopeBindings,
) -> AuthResult<bool> {
    Ok(unmet(held, required, bindings)?.is_empty())
}

/// Authorize an already-authenticated principal against a requirement set.
pub fn authorize(
    principal: &Principal,
    required: &[PermissionRequirement],
    bindings: &ScopeBindings,
) -> AuthResult<()> {
    let missing = unmet(&principal.grants, required, bindings)?;
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AuthError::InsufficientPermission { missing })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Authorization Explanation (Audit Trail)
// ─────────────────────────────────────────────────────────────────────────────

/// Detailed explanation of an authorization decision.
///
/// Answers "why was this request allowed/denied?" for audit logs and
/// operator tooling.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationExplanation {
    pub principal_id: PrincipalId,

    /// Whether every requirement was covered.
    pub granted: bool,

    /// Human-readable reason for the decision.
    pub reason: String,

    /// Per-requirement outcome, in requirement order.
    pub decisions: Vec<RequirementDecision>,

    /// Everything the principal holds, in serialized form.
    pub effective_permissions: Vec<String>,

    pub has_super_admin: bool,
}

/// Outcome for one requirement.
#[derive(Debug, Clone, Serialize)]
pub struct RequirementDecision {
    /// The requirement as written by the route (placeholders intact).
    pub requirement: String,

    /// The requirement after binding.
    pub resolved: String,

    /// The first held grant covering it, if any.
    pub covered_by: Option<String>,
}

/// Explain an authorization decision.
///
/// Unbound placeholders are still an error here: an explanation of a broken
/// route table would be misleading.
pub fn explain(
    principal: &Principal,
    required: &[PermissionRequirement],
    bindings: &ScopeBindings,
) -> AuthResult<AuthorizationExplanation> {
    let resolved = resolve_all(required, bindings)?;

    let decisions: Vec<RequirementDecision> = required
        .iter()
        .zip(&resolved)
        .map(|(requirement, resolved)| RequirementDecision {
            requirement: requirement.to_string(),
            resolved: resolved.to_string(),
            covered_by: principal
                .grants
                .iter()
                .find(|g| resolved.is_covered_by(g))
                .map(ToString::to_string),
        })
        .collect();

    let missing: Vec<&str> = decisions
        .iter()
        .filter(|d| d.covered_by.is_none())
        .map(|d| d.resolved.as_str())
        .collect();
    let granted = missing.is_empty();
    let has_super_admin = principal.grants.iter().any(PermissionGrant::is_super_admin);

    let reason = if required.is_empty() {
        "No permissions required".to_string()
    } else if granted && has_super_admin {
        "Principal holds the super-admin grant '{all}:{all}:{all}'".to_string()
    } else if granted {
        format!("All {} required permission(s) are covered", required.len())
    } else {
        format!("Principal is missing: {}", missing.join(", "))
    };

    Ok(AuthorizationExplanation {
        principal_id: principal.id,
        granted,
        reason,
        decisions,
        effective_permissions: principal.grants.iter().map(ToString::to_string).collect(),
        has_super_admin,
    })
}
