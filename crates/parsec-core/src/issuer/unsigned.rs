//! Produces an unsigned, base64-encoded JSON claim envelope — development
//! and testing use only; never use against a service that expects a
//! verifiable token.

use super::{Issuer, Token};
use crate::claim_mapper::{ClaimMapper, MapperInput};
use crate::error::ParsecError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;

pub struct UnsignedIssuer {
    token_type: String,
    mapper: ClaimMapper,
    ttl: chrono::Duration,
}

impl UnsignedIssuer {
    pub fn new(token_type: impl Into<String>, mapper: ClaimMapper, ttl: chrono::Duration) -> Self {
        Self {
            token_type: token_type.into(),
            mapper,
            ttl,
        }
    }
}

#[async_trait]
impl Issuer for UnsignedIssuer {
    fn token_type(&self) -> &str {
        &self.token_type
    }

    async fn issue(&self, input: &MapperInput) -> Result<Token, ParsecError> {
        let claims = self.mapper.map(input)?;
        let envelope = serde_json::to_vec(&claims).map_err(|e| ParsecError::Cel(e.to_string()))?;
        let issued_at = Utc::now();
        Ok(Token {
            token_type: self.token_type.clone(),
            value: STANDARD.encode(envelope),
            issued_at,
            expires_at: Some(issued_at + self.ttl),
            claims,
        })
    }
}
