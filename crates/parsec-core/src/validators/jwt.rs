//! JWT validation against a JWKS-shaped key source.
//!
//! Grounded on the teacher's `verify_jwt`/`extract_jwt_kid` crypto helpers
//! and the gRPC auth layer's JWKS-backed validation, restructured around a
//! pluggable [`JwksSource`] instead of a single hard-coded HTTP fetch so
//! both a live JWKS endpoint and this crate's own signer registry can back
//! the same validator.

use super::Validator;
use crate::credential::{Credential, CredentialType, ValidationResult};
use crate::error::{InvalidCredentialError, ParsecError};
use async_trait::async_trait;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;

/// Maximum allowed JWT size in bytes, checked before any parsing or
/// cryptographic work to bound the cost of an oversized token.
const MAX_JWT_SIZE_BYTES: usize = 4096;

/// One verification key as published in a JWKS document.
#[derive(Debug, Clone)]
pub struct JwkEntry {
    pub kid: String,
    /// Raw Ed25519 public key bytes (32 bytes).
    pub public_key: Vec<u8>,
}

/// A source of current verification keys for [`JwtValidator`].
#[async_trait]
pub trait JwksSource: Send + Sync {
    async fn keys(&self) -> Result<Vec<JwkEntry>, ParsecError>;
}

/// A fixed, in-memory key set — useful for tests and for deployments that
/// pin a small set of trusted issuers' keys out of band.
pub struct StaticJwksSource(Vec<JwkEntry>);

impl StaticJwksSource {
    pub fn new(keys: Vec<JwkEntry>) -> Self {
        Self(keys)
    }
}

#[async_trait]
impl JwksSource for StaticJwksSource {
    async fn keys(&self) -> Result<Vec<JwkEntry>, ParsecError> {
        Ok(self.0.clone())
    }
}

/// Validates `Credential::Jwt` tokens signed with EdDSA against a
/// [`JwksSource`]'s current key set.
pub struct JwtValidator {
    name: String,
    source: Box<dyn JwksSource>,
    expected_issuer: Option<String>,
    expected_audience: Option<String>,
    clock_skew: chrono::Duration,
}

impl JwtValidator {
    pub fn new(name: impl Into<String>, source: Box<dyn JwksSource>) -> Self {
        Self {
            name: name.into(),
            source,
            expected_issuer: None,
            expected_audience: None,
            clock_skew: chrono::Duration::seconds(300),
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.expected_issuer = Some(issuer.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.expected_audience = Some(audience.into());
        self
    }
}

/// Wraps a raw Ed25519 public key (32 bytes) in the minimal
/// SubjectPublicKeyInfo DER structure `jsonwebtoken::DecodingKey::from_ed_der`
/// expects, since JWKS entries and key providers here deal only in raw
/// key bytes.
fn ed25519_spki_der(public_key: &[u8]) -> Vec<u8> {
    let mut der = vec![0x30, 0x2a, 0x30, 0x05, 0x06, 0x03, 0x2b, 0x65, 0x70, 0x03, 0x21, 0x00];
    der.extend_from_slice(public_key);
    der
}

fn build_validation_result(claims: &serde_json::Map<String, Value>) -> ValidationResult {
    let as_string = |key: &str| claims.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
    let audience = match claims.get("aud") {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(values)) => values.iter().filter_map(|v| v.as_str().map(String::from)).collect(),
        _ => Vec::new(),
    };
    let to_time = |key: &str| {
        claims
            .get(key)
            .and_then(Value::as_i64)
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
    };

    let mut extra_claims = HashMap::new();
    for (k, v) in claims {
        if !matches!(k.as_str(), "sub" | "iss" | "aud" | "exp" | "iat" | "scope") {
            extra_claims.insert(k.clone(), v.clone());
        }
    }

    ValidationResult {
        subject: as_string("sub"),
        issuer: as_string("iss"),
        trust_domain: as_string("iss"),
        audience,
        scope: as_string("scope"),
        claims: extra_claims,
        issued_at: to_time("iat"),
        expires_at: to_time("exp"),
    }
}

#[async_trait]
impl Validator for JwtValidator {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepted_types(&self) -> HashSet<CredentialType> {
        HashSet::from([CredentialType::Jwt])
    }

    async fn validate(
        &self,
        _ctx: &CancellationToken,
        credential: &Credential,
    ) -> Result<ValidationResult, ParsecError> {
        let Credential::Jwt { token } = credential else {
            return Err(ParsecError::InvalidCredential(InvalidCredentialError::Malformed(
                "expected jwt credential".into(),
            )));
        };

        if token.len() > MAX_JWT_SIZE_BYTES {
            return Err(ParsecError::InvalidCredential(InvalidCredentialError::Malformed(
                "token exceeds maximum size".into(),
            )));
        }

        let header = decode_header(token)
            .map_err(|_| ParsecError::InvalidCredential(InvalidCredentialError::Malformed("unparsable header".into())))?;
        let kid = header
            .kid
            .ok_or_else(|| ParsecError::InvalidCredential(InvalidCredentialError::Malformed("missing kid".into())))?;

        let keys = self.source.keys().await?;
        let entry = keys
            .iter()
            .find(|k| k.kid == kid)
            .ok_or_else(|| ParsecError::InvalidCredential(InvalidCredentialError::UnknownIssuer(kid.clone())))?;

        let der = ed25519_spki_der(&entry.public_key);
        let decoding_key = DecodingKey::from_ed_der(&der);

        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.validate_exp = true;
        validation.leeway = self.clock_skew.num_seconds().max(0) as u64;
        if let Some(issuer) = &self.expected_issuer {
            validation.set_issuer(&[issuer]);
        }
        if let Some(audience) = &self.expected_audience {
            validation.set_audience(&[audience]);
        } else {
            validation.validate_aud = false;
        }

        let token_data = decode::<serde_json::Map<String, Value>>(token, &decoding_key, &validation).map_err(|e| {
            use jsonwebtoken::errors::ErrorKind;
            match e.kind() {
                ErrorKind::ExpiredSignature => ParsecError::InvalidCredential(InvalidCredentialError::ExpiredToken),
                ErrorKind::InvalidSignature => ParsecError::InvalidCredential(InvalidCredentialError::BadSignature),
                _ => ParsecError::InvalidCredential(InvalidCredentialError::Malformed(e.to_string())),
            }
        })?;

        Ok(build_validation_result(&token_data.claims))
    }
}
