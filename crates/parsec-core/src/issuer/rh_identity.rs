//! Produces a base64-encoded `x-rh-identity`-shaped envelope: claims
//! nested under an `identity` object, matching the header format some
//! downstream services in this lineage already expect. Unsigned, like
//! [`super::unsigned::UnsignedIssuer`].

use super::{Issuer, Token};
use crate::claim_mapper::{ClaimMapper, MapperInput};
use crate::error::ParsecError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use serde_json::json;

pub struct RhIdentityIssuer {
    token_type: String,
    mapper: ClaimMapper,
    ttl: chrono::Duration,
}

impl RhIdentityIssuer {
    pub fn new(token_type: impl Into<String>, mapper: ClaimMapper, ttl: chrono::Duration) -> Self {
        Self {
            token_type: token_type.into(),
            mapper,
            ttl,
        }
    }
}

#[async_trait]
impl Issuer for RhIdentityIssuer {
    fn token_type(&self) -> &str {
        &self.token_type
    }

    async fn issue(&self, input: &MapperInput) -> Result<Token, ParsecError> {
        let claims = self.mapper.map(input)?;
        let envelope = json!({ "identity": claims });
        let encoded = serde_json::to_vec(&envelope).map_err(|e| ParsecError::Cel(e.to_string()))?;
        let issued_at = Utc::now();
        Ok(Token {
            token_type: self.token_type.clone(),
            value: STANDARD.encode(encoded),
            issued_at,
            expires_at: Some(issued_at + self.ttl),
            claims,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::ValidationResult;
    use crate::data_source::{DataSourceInput, DataSourceRegistry};
    use crate::request::RequestAttributes;
    use std::sync::Arc;

    #[tokio::test]
    async fn envelope_nests_claims_under_identity() {
        let mapper = ClaimMapper::compile(r#"{"sub": subject.subject}"#).unwrap();
        let issuer = RhIdentityIssuer::new("urn:parsec:token:rh-identity", mapper, chrono::Duration::minutes(1));

        let input = MapperInput {
            subject: ValidationResult {
                subject: "carol".into(),
                ..Default::default()
            },
            actor: ValidationResult::anonymous(),
            request: RequestAttributes::default(),
            data_sources: Arc::new(DataSourceRegistry::new()),
            data_source_input: DataSourceInput::default(),
        };

        let token = issuer.issue(&input).await.unwrap();
        let decoded = STANDARD.decode(&token.value).unwrap();
        let envelope: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(envelope["identity"]["sub"], "carol");
    }
}
