//! `gatekeep-auth`: token-based authorization engine.
//!
//! Issues, rotates and revokes session credentials, and decides whether the
//! holder of an access credential may perform an operation on a resource
//! instance. Transport and storage stay outside: callers plug in a
//! [`RevocationCounter`] and a [`PrincipalDirectory`].

pub mod authorize;
pub mod claims;
pub mod config;
pub mod counter;
pub mod directory;
pub mod error;
pub mod permissions;
pub mod principal;
pub mod roles;
pub mod route;
pub mod service;

pub use authorize::{
    AuthorizationExplanation, RequirementDecision, ResolvedRequirement, explain, satisfies, unmet,
};
pub use claims::{AccessPayload, CredentialCodec, Decoded, RefreshPayload};
pub use config::{ConfigError, TokenConfig};
pub use counter::{InMemoryRevocationCounter, RevocationCounter};
pub use directory::{InMemoryPrincipalDirectory, PrincipalDirectory};
pub use error::{AuthError, AuthErrorKind, AuthResult, CounterError};
pub use permissions::{
    Component, GrantScope, PermissionGrammar, PermissionGrant, PermissionRequirement,
    RequiredScope, WILDCARD, serialize_grants,
};
pub use principal::Principal;
pub use roles::{Role, RoleTable};
pub use route::{RouteAuthSpec, RouteAuthorization, ScopeBindings};
pub use service::TokenService;

pub use gatekeep_core::PrincipalId;
