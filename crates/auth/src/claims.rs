//! Signed, expiring credentials.
//!
//! Tokens are HS256 compact JWS. The registered `exp`/`iat` claims sit next
//! to a typed payload; see [`AccessPayload`] and [`RefreshPayload`] for the
//! two wire shapes.
//!
//! Validation order is fixed: structure, then signature, then expiry. A
//! forged token never reaches the expiry check (or anything after it).

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use gatekeep_core::PrincipalId;

use crate::{AuthError, AuthResult};

/// Access credential payload: `{ exp, iat, id, perm }`.
///
/// `perm` holds the grants in space-joined grammar form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPayload {
    pub id: PrincipalId,
    pub perm: String,
}

/// Refresh credential payload: `{ exp, iat, id, cnt }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshPayload {
    pub id: PrincipalId,
    pub cnt: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<P> {
    exp: i64,
    iat: i64,
    #[serde(flatten)]
    payload: P,
}

/// A payload whose signature and expiry have been checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded<P> {
    pub payload: P,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// HMAC-SHA256 token codec bound to one secret.
#[derive(Clone)]
pub struct CredentialCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    // Keyless pass: shape only, no signature.
    structure: Validation,
}

impl std::fmt::Debug for CredentialCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialCodec").finish_non_exhaustive()
    }
}

impl CredentialCodec {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against the injected clock after decoding.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.required_spec_claims = HashSet::from(["exp".to_string()]);

        let mut structure = Validation::new(Algorithm::HS256);
        structure.insecure_disable_signature_validation();
        structure.validate_exp = false;
        structure.validate_aud = false;
        structure.required_spec_claims = HashSet::new();

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            structure,
        }
    }

    /// Sign `payload` with `exp = now + ttl`.
    pub fn encode<P: Serialize>(
        &self,
        payload: &P,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> AuthResult<String> {
        let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
            AuthError::malformed_token(format!(
                "expiry out of range: {now} + {}s",
                ttl.num_seconds()
            ))
        })?;
        let envelope = Envelope {
            exp: expires_at.timestamp(),
            iat: now.timestamp(),
            payload,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &envelope, &self.encoding_key)
            .map_err(|e| AuthError::malformed_token(format!("failed to encode credential: {e}")))
    }

    /// Verify and decode a token.
    ///
    /// # Errors
    /// - [`AuthError::MalformedToken`] for structural/encoding failures,
    ///   whatever the key, and for a verified payload of the wrong shape.
    /// - [`AuthError::InvalidSignature`] when the signature does not verify.
    /// - [`AuthError::ExpiredCredential`] when `now > exp`.
    pub fn decode<P: DeserializeOwned>(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Decoded<P>> {
        self.check_structure(token)?;

        let data = jsonwebtoken::decode::<Envelope<P>>(token, &self.decoding_key, &self.validation)
            .map_err(map_jwt_error)?;
        let envelope = data.claims;

        if now.timestamp() > envelope.exp {
            return Err(AuthError::ExpiredCredential);
        }

        Ok(Decoded {
            payload: envelope.payload,
            issued_at: from_timestamp(envelope.iat)?,
            expires_at: from_timestamp(envelope.exp)?,
        })
    }

    /// Three segments, a readable header and a payload that is a JSON
    /// object. Runs before the signature so the outcome does not depend on
    /// the key.
    fn check_structure(&self, token: &str) -> AuthResult<()> {
        if token.split('.').count() != 3 {
            return Err(AuthError::malformed_token("expected three segments"));
        }
        jsonwebtoken::decode_header(token)
            .map_err(|e| AuthError::malformed_token(format!("unreadable header: {e}")))?;
        jsonwebtoken::decode::<serde_json::Map<String, serde_json::Value>>(
            token,
            &self.decoding_key,
            &self.structure,
        )
        .map_err(|e| AuthError::malformed_token(format!("unreadable payload: {e}")))?;
        Ok(())
    }
}

fn from_timestamp(secs: i64) -> AuthResult<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| AuthError::malformed_token(format!("timestamp out of range: {secs}")))
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::ExpiredSignature => AuthError::ExpiredCredential,
        _ => AuthError::malformed_token(err.to_string()),
    }
}
