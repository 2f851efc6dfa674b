//! Signs claim-mapper output as a JWT using a named rotating signer.

use super::{Issuer, Token};
use crate::claim_mapper::{ClaimMapper, MapperInput};
use crate::error::ParsecError;
use crate::signer_registry::SignerRegistry;
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

/// Issues signed transaction tokens: claims from the mapper, wrapped in a
/// JWT whose header's `kid`/`alg` come from the configured signer's active
/// key, `iss` from this issuer's configured URL, and `iat`/`exp` bracketing
/// the configured TTL.
pub struct TransactionTokenIssuer {
    token_type: String,
    signer_name: String,
    signers: Arc<SignerRegistry>,
    mapper: ClaimMapper,
    issuer_url: String,
    ttl: chrono::Duration,
}

impl TransactionTokenIssuer {
    pub fn new(
        token_type: impl Into<String>,
        signer_name: impl Into<String>,
        signers: Arc<SignerRegistry>,
        mapper: ClaimMapper,
        issuer_url: impl Into<String>,
        ttl: chrono::Duration,
    ) -> Self {
        Self {
            token_type: token_type.into(),
            signer_name: signer_name.into(),
            signers,
            mapper,
            issuer_url: issuer_url.into(),
            ttl,
        }
    }
}

/// Base64url JWT encoding without padding, matching JOSE compact
/// serialisation.
fn b64(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

#[async_trait]
impl Issuer for TransactionTokenIssuer {
    fn token_type(&self) -> &str {
        &self.token_type
    }

    async fn issue(&self, input: &MapperInput) -> Result<Token, ParsecError> {
        let claims = self.mapper.map(input)?;

        let signer = self
            .signers
            .get(&self.signer_name)
            .ok_or_else(|| ParsecError::IssuerNotFound(self.token_type.clone()))?;
        let (kid, alg) = signer.active_key_info().await?;

        let issued_at = Utc::now();
        let expires_at = issued_at + self.ttl;

        let mut body: serde_json::Map<String, Value> = claims.into_iter().collect();
        body.insert("iss".into(), json!(self.issuer_url));
        body.insert("iat".into(), json!(issued_at.timestamp()));
        body.insert("exp".into(), json!(expires_at.timestamp()));

        let header = json!({"alg": alg, "kid": kid, "typ": "JWT"});
        let signing_input = format!(
            "{}.{}",
            b64(serde_json::to_vec(&header).map_err(|e| ParsecError::Cel(e.to_string()))?),
            b64(serde_json::to_vec(&body).map_err(|e| ParsecError::Cel(e.to_string()))?)
        );

        let signature = signer.sign(signing_input.as_bytes()).await?;
        let value = format!("{signing_input}.{}", b64(signature));

        Ok(Token {
            token_type: self.token_type.clone(),
            value,
            issued_at,
            expires_at: Some(expires_at),
            claims: body.into_iter().collect(),
        })
    }
}
