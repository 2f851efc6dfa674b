//! Extracted request credentials and the result of validating them.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// The wire shape a credential arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialType {
    Bearer,
    Jwt,
    Json,
    Mtls,
}

/// A credential extracted from an inbound request, not yet validated.
///
/// `Json` and `Mtls` carry raw bytes rather than a parsed structure: parsing
/// is the validator's job, so a validator that rejects malformed input can
/// report a precise [`crate::error::InvalidCredentialError::Malformed`]
/// instead of this type silently discarding detail up front.
#[derive(Debug, Clone)]
pub enum Credential {
    Bearer { token: String },
    Jwt { token: String },
    Json { raw: Vec<u8> },
    Mtls { certificate_chain: Vec<Vec<u8>> },
}

impl Credential {
    pub fn credential_type(&self) -> CredentialType {
        match self {
            Credential::Bearer { .. } => CredentialType::Bearer,
            Credential::Jwt { .. } => CredentialType::Jwt,
            Credential::Json { .. } => CredentialType::Json,
            Credential::Mtls { .. } => CredentialType::Mtls,
        }
    }
}

/// The outcome of successfully validating a [`Credential`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    pub subject: String,
    pub issuer: String,
    pub trust_domain: String,
    pub audience: Vec<String>,
    pub scope: String,
    pub claims: HashMap<String, serde_json::Value>,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ValidationResult {
    /// The zero value: empty trust domain, no subject, no claims. Used when
    /// an actor credential was not supplied and the trust store must still
    /// be narrowed for an unauthenticated caller.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn is_anonymous(&self) -> bool {
        self.trust_domain.is_empty() && self.subject.is_empty()
    }
}
