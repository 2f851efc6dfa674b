//! Orchestrates claim mapping and issuance across a request's configured
//! token types.

use crate::claim_mapper::MapperInput;
use crate::error::ParsecError;
use crate::issuer::Token;
use crate::issuer_registry::IssuerRegistry;
use std::sync::Arc;
use tracing::error;

/// A single requested token type: the URN to look up in the issuer
/// registry plus the header an embedder attaches the issued value under.
#[derive(Debug, Clone)]
pub struct TokenTypeSpec {
    pub token_type: String,
    pub header_name: String,
}

pub struct TokenService {
    issuers: Arc<IssuerRegistry>,
}

impl TokenService {
    pub fn new(issuers: Arc<IssuerRegistry>) -> Self {
        Self { issuers }
    }

    /// Issues one token per requested type. A missing issuer fails the
    /// whole call with `IssuerNotFound`; an issuer-level failure during
    /// issuance also fails the whole call (individual issuer failures are
    /// surfaced through the caller's probe events, not swallowed here).
    #[tracing::instrument(skip_all, fields(requested = requested.len()))]
    pub async fn issue(
        &self,
        input: &MapperInput,
        requested: &[TokenTypeSpec],
    ) -> Result<Vec<(TokenTypeSpec, Token)>, ParsecError> {
        let mut results = Vec::with_capacity(requested.len());
        for spec in requested {
            let issuer = self.issuers.get(&spec.token_type)?;
            let token = issuer.issue(input).await.map_err(|e| {
                error!(token_type = %spec.token_type, error = %e, "issuer failed");
                e
            })?;
            results.push((spec.clone(), token));
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim_mapper::ClaimMapper;
    use crate::credential::ValidationResult;
    use crate::data_source::{DataSourceInput, DataSourceRegistry};
    use crate::issuer::stub::StubIssuer;
    use crate::request::RequestAttributes;

    fn input() -> MapperInput {
        MapperInput {
            subject: ValidationResult {
                subject: "alice".into(),
                ..Default::default()
            },
            actor: ValidationResult::anonymous(),
            request: RequestAttributes::default(),
            data_sources: Arc::new(DataSourceRegistry::new()),
            data_source_input: DataSourceInput::default(),
        }
    }

    #[tokio::test]
    async fn issues_one_token_per_requested_type() {
        let mapper = ClaimMapper::compile(r#"{"sub": subject.subject}"#).unwrap();
        let mut issuers = IssuerRegistry::new();
        issuers.register(Arc::new(StubIssuer::new(
            "urn:parsec:token:stub",
            mapper,
            chrono::Duration::minutes(1),
        )));

        let service = TokenService::new(Arc::new(issuers));
        let requested = vec![TokenTypeSpec {
            token_type: "urn:parsec:token:stub".into(),
            header_name: "Transaction-Token".into(),
        }];

        let issued = service.issue(&input(), &requested).await.unwrap();
        assert_eq!(issued.len(), 1);
        assert_eq!(issued[0].0.header_name, "Transaction-Token");
    }

    #[tokio::test]
    async fn missing_issuer_fails_the_whole_call() {
        let service = TokenService::new(Arc::new(IssuerRegistry::new()));
        let requested = vec![TokenTypeSpec {
            token_type: "urn:parsec:token:missing".into(),
            header_name: "X".into(),
        }];

        let result = service.issue(&input(), &requested).await;
        assert!(matches!(result, Err(ParsecError::IssuerNotFound(_))));
    }
}
