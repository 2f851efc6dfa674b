//! Validation of pre-authenticated JSON identity envelopes.
//!
//! Some deployments sit behind a gateway that has already authenticated
//! the caller and forwards the result as a JSON blob (for example, a
//! decoded `x-forwarded-identity` header). This validator trusts that
//! envelope's shape directly rather than re-verifying a signature —
//! callers that need cryptographic verification should configure
//! [`super::jwt::JwtValidator`] or [`super::mtls::MtlsValidator`] instead.

use super::Validator;
use crate::credential::{Credential, CredentialType, ValidationResult};
use crate::error::{InvalidCredentialError, ParsecError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Deserialize)]
struct JsonIdentityEnvelope {
    subject: String,
    #[serde(default)]
    issuer: String,
    #[serde(default)]
    trust_domain: String,
    #[serde(default)]
    audience: Vec<String>,
    #[serde(default)]
    scope: String,
    #[serde(default)]
    claims: HashMap<String, serde_json::Value>,
    #[serde(default)]
    issued_at: Option<DateTime<Utc>>,
    #[serde(default)]
    expires_at: Option<DateTime<Utc>>,
}

impl From<JsonIdentityEnvelope> for ValidationResult {
    fn from(envelope: JsonIdentityEnvelope) -> Self {
        ValidationResult {
            subject: envelope.subject,
            issuer: envelope.issuer,
            trust_domain: envelope.trust_domain,
            audience: envelope.audience,
            scope: envelope.scope,
            claims: envelope.claims,
            issued_at: envelope.issued_at,
            expires_at: envelope.expires_at,
        }
    }
}

pub struct JsonIdentityValidator {
    name: String,
}

impl JsonIdentityValidator {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Validator for JsonIdentityValidator {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepted_types(&self) -> HashSet<CredentialType> {
        HashSet::from([CredentialType::Json])
    }

    async fn validate(
        &self,
        _ctx: &CancellationToken,
        credential: &Credential,
    ) -> Result<ValidationResult, ParsecError> {
        let Credential::Json { raw } = credential else {
            return Err(ParsecError::InvalidCredential(InvalidCredentialError::Malformed(
                "expected json credential".into(),
            )));
        };

        let envelope: JsonIdentityEnvelope = serde_json::from_slice(raw)
            .map_err(|e| ParsecError::InvalidCredential(InvalidCredentialError::Malformed(e.to_string())))?;

        if envelope.subject.is_empty() {
            return Err(ParsecError::InvalidCredential(InvalidCredentialError::Malformed(
                "missing subject".into(),
            )));
        }

        Ok(envelope.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn well_formed_envelope_validates() {
        let validator = JsonIdentityValidator::new("json");
        let raw = br#"{"subject":"u","trust_domain":"parsec.test"}"#.to_vec();

        let result = validator
            .validate(&CancellationToken::new(), &Credential::Json { raw })
            .await
            .unwrap();
        assert_eq!(result.subject, "u");
        assert_eq!(result.trust_domain, "parsec.test");
    }

    #[tokio::test]
    async fn missing_subject_is_rejected() {
        let validator = JsonIdentityValidator::new("json");
        let raw = br#"{"trust_domain":"parsec.test"}"#.to_vec();

        let result = validator
            .validate(&CancellationToken::new(), &Credential::Json { raw })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn malformed_json_is_rejected() {
        let validator = JsonIdentityValidator::new("json");
        let result = validator
            .validate(&CancellationToken::new(), &Credential::Json { raw: b"not json".to_vec() })
            .await;
        assert!(matches!(
            result,
            Err(ParsecError::InvalidCredential(InvalidCredentialError::Malformed(_)))
        ));
    }
}
