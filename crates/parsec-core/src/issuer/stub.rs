//! A fixture issuer for tests and local development: produces a `Token`
//! carrying the mapper's claims verbatim, with no signing or encoding.

use super::{Issuer, Token};
use crate::claim_mapper::{ClaimMapper, MapperInput};
use crate::error::ParsecError;
use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

pub struct StubIssuer {
    token_type: String,
    mapper: ClaimMapper,
    ttl: chrono::Duration,
}

impl StubIssuer {
    pub fn new(token_type: impl Into<String>, mapper: ClaimMapper, ttl: chrono::Duration) -> Self {
        Self {
            token_type: token_type.into(),
            mapper,
            ttl,
        }
    }
}

#[async_trait]
impl Issuer for StubIssuer {
    fn token_type(&self) -> &str {
        &self.token_type
    }

    async fn issue(&self, input: &MapperInput) -> Result<Token, ParsecError> {
        let claims = self.mapper.map(input)?;
        let issued_at = Utc::now();
        Ok(Token {
            token_type: self.token_type.clone(),
            value: format!("stub-{}", Uuid::new_v4()),
            issued_at,
            expires_at: Some(issued_at + self.ttl),
            claims,
        })
    }
}
