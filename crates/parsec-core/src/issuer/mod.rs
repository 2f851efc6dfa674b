//! Token issuers: turn a claim-mapper's output into a [`Token`] record.
//!
//! Two families, per the design: a *transaction-token* issuer signs claims
//! as a JWT using a named rotating signer; *unsigned*/*rh-identity*/*stub*
//! issuers produce opaque or base64-encoded claim envelopes without
//! signing, for development and testing.

pub mod rh_identity;
pub mod stub;
pub mod transaction_token;
pub mod unsigned;

use crate::claim_mapper::MapperInput;
use crate::error::ParsecError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

/// An issued token, regardless of which issuer family produced it.
#[derive(Debug, Clone)]
pub struct Token {
    /// URN identifying the kind of token this is.
    pub token_type: String,
    /// The opaque or serialised token value (a JWT, base64 envelope, …).
    pub value: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub claims: HashMap<String, Value>,
}

/// Turns a [`MapperInput`] into a [`Token`] for one configured token type.
#[async_trait]
pub trait Issuer: Send + Sync {
    fn token_type(&self) -> &str;

    async fn issue(&self, input: &MapperInput) -> Result<Token, ParsecError>;
}
