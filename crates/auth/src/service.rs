//! Credential lifecycle: issue, rotate, authorize, revoke.
//!
//! State lives in two places only: the revocation counter (server side) and
//! the credentials themselves (client side). There is no locking here; the
//! counter's atomic increment is what makes revocation race-free.

use std::sync::Arc;

use tracing::instrument;

use gatekeep_core::{Clock, PrincipalId, SystemClock};

use crate::authorize::{self, AuthorizationExplanation};
use crate::claims::{AccessPayload, CredentialCodec, Decoded, RefreshPayload};
use crate::permissions::serialize_grants;
use crate::{
    AuthError, AuthResult, PermissionGrammar, PermissionRequirement, Principal, PrincipalDirectory,
    RevocationCounter, RouteAuthorization, ScopeBindings, TokenConfig,
};

pub struct TokenService {
    config: TokenConfig,
    access: CredentialCodec,
    refresh: CredentialCodec,
    grammar: PermissionGrammar,
    counter: Arc<dyn RevocationCounter>,
    directory: Arc<dyn PrincipalDirectory>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("config", &self.config)
            .field("grammar", &self.grammar)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(
        config: TokenConfig,
        counter: Arc<dyn RevocationCounter>,
        directory: Arc<dyn PrincipalDirectory>,
    ) -> Self {
        Self {
            access: CredentialCodec::new(&config.access_secret),
            refresh: CredentialCodec::new(&config.refresh_secret),
            config,
            grammar: PermissionGrammar::default(),
            counter,
            directory,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_grammar(mut self, grammar: PermissionGrammar) -> Self {
        self.grammar = grammar;
        self
    }

    pub fn grammar(&self) -> &PermissionGrammar {
        &self.grammar
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    /// Mint a refresh credential, superseding any earlier one.
    #[instrument(skip(self), fields(principal_id = %principal_id), err(level = "warn"))]
    pub async fn issue(&self, principal_id: PrincipalId) -> AuthResult<String> {
        self.ensure_exists(principal_id).await?;

        let cnt = self.counter.increment_and_get(principal_id).await?;
        let payload = RefreshPayload {
            id: principal_id,
            cnt,
        };
        let token = self
            .refresh
            .encode(&payload, self.config.refresh_ttl, self.clock.now())?;

        tracing::info!(counter = cnt, "refresh credential issued");
        Ok(token)
    }

    /// Exchange a refresh credential for a fresh access credential.
    ///
    /// The counter is consulted only after signature and expiry pass.
    #[instrument(skip_all, fields(principal_id = tracing::field::Empty), err(level = "warn"))]
    pub async fn rotate(&self, refresh_token: &str) -> AuthResult<String> {
        let decoded = self.decode_refresh(refresh_token)?;
        let RefreshPayload { id, cnt } = decoded.payload;
        tracing::Span::current().record("principal_id", tracing::field::display(id));

        self.ensure_exists(id).await?;

        let current = self.counter.get(id).await?;
        if cnt != current {
            tracing::info!(
                principal_id = %id,
                presented = cnt,
                current,
                "stale refresh credential rejected"
            );
            return Err(AuthError::StaleCredential);
        }

        let grants = self.directory.principal_grants(id).await?;
        let payload = AccessPayload {
            id,
            perm: serialize_grants(&grants),
        };
        let token = self
            .access
            .encode(&payload, self.config.access_ttl, self.clock.now())?;

        tracing::debug!(principal_id = %id, grants = grants.len(), "access credential minted");
        Ok(token)
    }

    /// Validate an access credential and check it against `required`.
    pub fn authorize(
        &self,
        access_token: &str,
        required: &[PermissionRequirement],
        bindings: &ScopeBindings,
    ) -> AuthResult<Principal> {
        let principal = self.authenticate(access_token)?;
        match authorize::authorize(&principal, required, bindings) {
            Ok(()) => Ok(principal),
            Err(err) => {
                log_denial(&principal, &err);
                Err(err)
            }
        }
    }

    pub fn authorize_route<R>(&self, access_token: &str, route: &R) -> AuthResult<Principal>
    where
        R: RouteAuthorization + ?Sized,
    {
        self.authorize(
            access_token,
            route.required_permissions(),
            route.scope_bindings(),
        )
    }

    /// Explain the decision `authorize` would make, for audit tooling.
    pub fn explain(
        &self,
        access_token: &str,
        required: &[PermissionRequirement],
        bindings: &ScopeBindings,
    ) -> AuthResult<AuthorizationExplanation> {
        let principal = self.authenticate(access_token)?;
        authorize::explain(&principal, required, bindings).inspect_err(|e| log_denial(&principal, e))
    }

    /// Invalidate every outstanding refresh credential of `principal_id`.
    #[instrument(skip(self), fields(principal_id = %principal_id), err(level = "warn"))]
    pub async fn revoke_all(&self, principal_id: PrincipalId) -> AuthResult<()> {
        let cnt = self.counter.increment_and_get(principal_id).await?;
        tracing::info!(counter = cnt, "all refresh credentials revoked");
        Ok(())
    }

    /// Drop counter state of a principal that has been deleted.
    ///
    /// The counter restarts at zero afterwards, so principal ids must never
    /// be reused: a recreated id would see its old, unexpired refresh
    /// credentials become current again once the new counter catches up.
    /// Refuses while the directory still knows the principal.
    #[instrument(skip(self), fields(principal_id = %principal_id), err(level = "warn"))]
    pub async fn forget_principal(&self, principal_id: PrincipalId) -> AuthResult<()> {
        if self.directory.principal_exists(principal_id).await? {
            return Err(AuthError::PrincipalStillExists(principal_id));
        }
        self.counter.remove(principal_id).await?;
        Ok(())
    }

    /// Decode an access credential into the principal it carries.
    pub fn authenticate(&self, access_token: &str) -> AuthResult<Principal> {
        let decoded = self.decode_access(access_token)?;
        let grants = self
            .grammar
            .parse_grant_list(&decoded.payload.perm)
            .map_err(|e| {
                AuthError::malformed_token(format!("unreadable permission claim: {e}"))
            })?;
        Ok(Principal::new(decoded.payload.id, grants))
    }

    pub fn decode_access(&self, token: &str) -> AuthResult<Decoded<AccessPayload>> {
        self.access.decode(token, self.clock.now())
    }

    pub fn decode_refresh(&self, token: &str) -> AuthResult<Decoded<RefreshPayload>> {
        self.refresh.decode(token, self.clock.now())
    }

    async fn ensure_exists(&self, principal_id: PrincipalId) -> AuthResult<()> {
        if self.directory.principal_exists(principal_id).await? {
            Ok(())
        } else {
            tracing::warn!(principal_id = %principal_id, "principal not found");
            Err(AuthError::PrincipalNotFound(principal_id))
        }
    }
}

fn log_denial(principal: &Principal, err: &AuthError) {
    if err.is_caller_bug() {
        tracing::error!(principal_id = %principal.id, error = %err, "route authorization misconfigured");
    } else {
        tracing::warn!(principal_id = %principal.id, error = %err, "authorization denied");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        AuthErrorKind, InMemoryPrincipalDirectory, InMemoryRevocationCounter, Role, RouteAuthSpec,
    };
    use chrono::{Duration, TimeZone, Utc};
    use gatekeep_core::FixedClock;

    struct Harness {
        service: TokenService,
        clock: Arc<FixedClock>,
        directory: Arc<InMemoryPrincipalDirectory>,
        counter: Arc<InMemoryRevocationCounter>,
    }

    fn harness() -> Harness {
        let grammar = PermissionGrammar::default();
        let directory = Arc::new(InMemoryPrincipalDirectory::new());
        directory
            .insert_role(
                Role::new("self"),
                vec![grammar.parse_grant("user:{all}:42").unwrap()],
            )
            .unwrap();
        directory
            .insert_principal(PrincipalId::new(42), vec![Role::new("self")])
            .unwrap();

        let counter = Arc::new(InMemoryRevocationCounter::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        ));
        let service = TokenService::new(
            TokenConfig::new("access-secret", "refresh-secret"),
            counter.clone(),
            directory.clone(),
        )
        .with_clock(clock.clone());

        Harness {
            service,
            clock,
            directory,
            counter,
        }
    }

    #[tokio::test]
    async fn issue_embeds_incremented_counter() {
        let h = harness();
        let token = h.service.issue(PrincipalId::new(42)).await.unwrap();
        let decoded = h.service.decode_refresh(&token).unwrap();
        assert_eq!(decoded.payload.cnt, 1);
        assert_eq!(
            decoded.expires_at - decoded.issued_at,
            Duration::days(30)
        );
    }

    #[tokio::test]
    async fn issue_unknown_principal_does_not_touch_counter() {
        let h = harness();
        let err = h.service.issue(PrincipalId::new(7)).await.unwrap_err();
        assert_eq!(err, AuthError::PrincipalNotFound(PrincipalId::new(7)));
        assert_eq!(h.counter.get(PrincipalId::new(7)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn rotate_mints_short_lived_access() {
        let h = harness();
        let refresh = h.service.issue(PrincipalId::new(42)).await.unwrap();
        let access = h.service.rotate(&refresh).await.unwrap();

        let decoded = h.service.decode_access(&access).unwrap();
        assert_eq!(decoded.payload.id, PrincipalId::new(42));
        assert_eq!(decoded.payload.perm, "user:{all}:42");
        assert_eq!(decoded.expires_at - decoded.issued_at, Duration::minutes(15));
    }

    #[tokio::test]
    async fn access_and_refresh_are_not_interchangeable() {
        let h = harness();
        let refresh = h.service.issue(PrincipalId::new(42)).await.unwrap();
        let access = h.service.rotate(&refresh).await.unwrap();

        assert_eq!(
            h.service.rotate(&access).await.unwrap_err(),
            AuthError::InvalidSignature
        );
        assert_eq!(
            h.service.authenticate(&refresh).unwrap_err(),
            AuthError::InvalidSignature
        );
    }

    #[tokio::test]
    async fn rotate_after_principal_deleted() {
        let h = harness();
        let refresh = h.service.issue(PrincipalId::new(42)).await.unwrap();
        h.directory.remove_principal(PrincipalId::new(42)).unwrap();
        let err = h.service.rotate(&refresh).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::PrincipalNotFound);
    }

    #[tokio::test]
    async fn expired_refresh_never_reaches_counter() {
        let h = harness();
        let refresh = h.service.issue(PrincipalId::new(42)).await.unwrap();
        // Revoked *and* expired: expiry must win, the counter is never compared.
        h.service.revoke_all(PrincipalId::new(42)).await.unwrap();
        h.clock.advance(Duration::days(31));
        assert_eq!(
            h.service.rotate(&refresh).await.unwrap_err(),
            AuthError::ExpiredCredential
        );
    }

    #[tokio::test]
    async fn rotation_picks_up_role_changes() {
        let h = harness();
        let grammar = PermissionGrammar::default();
        h.directory
            .insert_role(
                Role::new("reader"),
                vec![grammar.parse_grant("user:read:{all}").unwrap()],
            )
            .unwrap();
        let refresh = h.service.issue(PrincipalId::new(42)).await.unwrap();

        let before = h.service.rotate(&refresh).await.unwrap();
        // Reading someone else's record needs more than the self grant.
        let route = RouteAuthSpec::parse(h.service.grammar(), ["user:read:7"], ScopeBindings::new())
            .unwrap();
        assert_eq!(
            h.service.authorize_route(&before, &route).unwrap_err().kind(),
            AuthErrorKind::InsufficientPermission
        );

        h.directory
            .assign_role(PrincipalId::new(42), Role::new("reader"))
            .unwrap();
        let after = h.service.rotate(&refresh).await.unwrap();
        let principal = h.service.authorize_route(&after, &route).unwrap();
        assert_eq!(principal.grants.len(), 2);
    }

    #[tokio::test]
    async fn authorize_binds_path_scope() {
        let h = harness();
        let refresh = h.service.issue(PrincipalId::new(42)).await.unwrap();
        let access = h.service.rotate(&refresh).await.unwrap();
        let required = h
            .service
            .grammar()
            .parse_requirements(["user:update:{userID}"])
            .unwrap();

        let own = ScopeBindings::from_path_params([("userID", "42")]).unwrap();
        assert_eq!(
            h.service.authorize(&access, &required, &own).unwrap().id,
            PrincipalId::new(42)
        );

        let other = ScopeBindings::new().bind("userID", 43);
        match h.service.authorize(&access, &required, &other).unwrap_err() {
            AuthError::InsufficientPermission { missing } => {
                assert_eq!(missing.len(), 1);
                assert_eq!(missing[0].to_string(), "user:update:43");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = h
            .service
            .authorize(&access, &required, &ScopeBindings::new())
            .unwrap_err();
        assert!(err.is_caller_bug());
    }

    #[tokio::test]
    async fn explain_reports_decision() {
        let h = harness();
        let refresh = h.service.issue(PrincipalId::new(42)).await.unwrap();
        let access = h.service.rotate(&refresh).await.unwrap();
        let required = h
            .service
            .grammar()
            .parse_requirements(["user:delete:{userID}"])
            .unwrap();

        let explanation = h
            .service
            .explain(&access, &required, &ScopeBindings::new().bind("userID", 42))
            .unwrap();
        assert!(explanation.granted);
        assert_eq!(
            explanation.decisions[0].covered_by.as_deref(),
            Some("user:{all}:42")
        );
    }

    #[tokio::test]
    async fn forget_principal_clears_counter_of_deleted_principal() {
        let h = harness();
        let id = PrincipalId::new(42);
        h.service.issue(id).await.unwrap();
        h.directory.remove_principal(id).unwrap();
        h.service.forget_principal(id).await.unwrap();
        assert_eq!(h.counter.get(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn forget_principal_refuses_live_principal() {
        let h = harness();
        let id = PrincipalId::new(42);
        let first = h.service.issue(id).await.unwrap();
        h.service.revoke_all(id).await.unwrap();

        let err = h.service.forget_principal(id).await.unwrap_err();
        assert_eq!(err, AuthError::PrincipalStillExists(id));
        // Counter untouched, so the revoked credential stays dead through
        // later issues.
        assert_eq!(h.counter.get(id).await.unwrap(), 2);
        h.service.issue(id).await.unwrap();
        assert_eq!(
            h.service.rotate(&first).await.unwrap_err(),
            AuthError::StaleCredential
        );
    }

    #[tokio::test]
    async fn oversized_ttl_fails_instead_of_panicking() {
        let h = harness();
        let service = TokenService::new(
            TokenConfig::new("access-secret", "refresh-secret")
                .with_refresh_ttl(Duration::days(1_000_000_000)),
            h.counter.clone(),
            h.directory.clone(),
        )
        .with_clock(h.clock.clone());
        let err = service.issue(PrincipalId::new(42)).await.unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::MalformedToken);
    }

    #[tokio::test]
    async fn custom_grammar_governs_access_claims() {
        let h = harness();
        let refresh = h.service.issue(PrincipalId::new(42)).await.unwrap();
        let access = h.service.rotate(&refresh).await.unwrap();

        // A verifier whose vocabulary lacks `user` cannot read the claim.
        let narrow = TokenService::new(
            TokenConfig::new("access-secret", "refresh-secret"),
            h.counter.clone(),
            h.directory.clone(),
        )
        .with_clock(h.clock.clone())
        .with_grammar(PermissionGrammar::new(["invoice"], ["read"]));
        let err = narrow.authenticate(&access).unwrap_err();
        assert_eq!(err.kind(), AuthErrorKind::MalformedToken);
    }
}
