//! Static bearer-token validation.
//!
//! Maps opaque bearer tokens to pre-configured identities. Intended for
//! fixtures, local development, and gateways where the bearer token is
//! itself a pre-shared secret rather than a signed credential (those are
//! handled by [`super::jwt::JwtValidator`] instead).

use super::Validator;
use crate::credential::{Credential, CredentialType, ValidationResult};
use crate::error::{InvalidCredentialError, ParsecError};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio_util::sync::CancellationToken;

/// Validates bearer tokens against a static, in-memory token-to-identity
/// table.
pub struct StaticBearerValidator {
    name: String,
    tokens: HashMap<String, ValidationResult>,
}

impl StaticBearerValidator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tokens: HashMap::new(),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>, result: ValidationResult) -> Self {
        self.tokens.insert(token.into(), result);
        self
    }
}

#[async_trait]
impl Validator for StaticBearerValidator {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepted_types(&self) -> HashSet<CredentialType> {
        HashSet::from([CredentialType::Bearer])
    }

    async fn validate(
        &self,
        _ctx: &CancellationToken,
        credential: &Credential,
    ) -> Result<ValidationResult, ParsecError> {
        let Credential::Bearer { token } = credential else {
            return Err(ParsecError::InvalidCredential(InvalidCredentialError::Malformed(
                "expected bearer credential".into(),
            )));
        };

        self.tokens
            .get(token)
            .cloned()
            .ok_or(ParsecError::InvalidCredential(InvalidCredentialError::BadSignature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_token_resolves_to_configured_identity() {
        let validator = StaticBearerValidator::new("fixture").with_token(
            "t",
            ValidationResult {
                subject: "u".into(),
                trust_domain: "parsec.test".into(),
                ..Default::default()
            },
        );

        let result = validator
            .validate(&CancellationToken::new(), &Credential::Bearer { token: "t".into() })
            .await
            .unwrap();
        assert_eq!(result.subject, "u");
        assert_eq!(result.trust_domain, "parsec.test");
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let validator = StaticBearerValidator::new("fixture");
        let result = validator
            .validate(&CancellationToken::new(), &Credential::Bearer { token: "nope".into() })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn non_bearer_credential_is_malformed() {
        let validator = StaticBearerValidator::new("fixture");
        let result = validator
            .validate(&CancellationToken::new(), &Credential::Jwt { token: "x".into() })
            .await;
        assert!(matches!(
            result,
            Err(ParsecError::InvalidCredential(InvalidCredentialError::Malformed(_)))
        ));
    }
}
