//! The crate-wide error taxonomy.
//!
//! One variant per error kind named in the design's error handling section.
//! Messages never embed credential or token material; callers that need to
//! surface a denial to a client convert through [`ParsecError::to_status`]
//! rather than forwarding `Display` output verbatim.

use thiserror::Error;
use tonic::{Code, Status};

/// Errors produced by any Parsec subsystem.
#[derive(Debug, Error)]
pub enum ParsecError {
    /// Malformed configuration; embedders should fail fast at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// The trust store has no validator accepting the credential type.
    #[error("no validator accepts credential type {0:?}")]
    NoValidator(crate::credential::CredentialType),

    /// A validator rejected the credential.
    #[error("invalid credential: {0}")]
    InvalidCredential(#[from] InvalidCredentialError),

    /// No validator remained after policy filtering for this (actor, request).
    #[error("no validator survived filtering")]
    FilterDenied,

    /// A token type was requested but no issuer is registered for it.
    #[error("no issuer registered for token type {0}")]
    IssuerNotFound(String),

    /// Key signing failed.
    #[error("signing failed: {0}")]
    SigningFailed(#[from] SigningError),

    /// A data-source fetch failed, or returned an unsupported content type.
    #[error("data source {name} failed: {reason}")]
    DataSourceError { name: String, reason: String },

    /// Optimistic-CAS failure in the slot store. Handled internally and
    /// retried; this variant exists so call sites can distinguish it from a
    /// genuine backend failure, but it should never reach an embedder.
    #[error("slot version mismatch")]
    VersionMismatch,

    /// The caller's context was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// A lower-level JWT encode/decode failure not otherwise classified.
    #[error("jwt error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// A CEL expression failed to compile or evaluate.
    #[error("cel error: {0}")]
    Cel(String),

    /// An I/O failure, typically from the on-disk key provider.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Subclasses of credential rejection.
#[derive(Debug, Error)]
pub enum InvalidCredentialError {
    #[error("token expired")]
    ExpiredToken,
    #[error("bad signature")]
    BadSignature,
    #[error("unknown issuer: {0}")]
    UnknownIssuer(String),
    #[error("malformed credential: {0}")]
    Malformed(String),
}

/// Signing failure subclasses.
#[derive(Debug, Error)]
pub enum SigningError {
    /// The signer's active key handle no longer matches what the caller
    /// expected; retryable by re-fetching the current signer.
    #[error("key mismatch")]
    KeyMismatch,
    /// The signing backend itself failed; fatal for this request.
    #[error("backend failure: {0}")]
    Backend(String),
    /// Stored key material's declared algorithm does not match the
    /// algorithm this scope was configured to use.
    #[error("key type mismatch: expected {expected:?}, found {actual:?}")]
    TypeMismatch {
        expected: crate::key_provider::KeyAlgorithm,
        actual: crate::key_provider::KeyAlgorithm,
    },
}

impl ParsecError {
    /// Maps this error to the gRPC status an `ext_authz` `Check` response
    /// should carry, per the propagation policy: invalid credentials and
    /// filter denials become `Unauthenticated`/`PermissionDenied`; anything
    /// else is sanitised into `Internal` so no credential material leaks.
    pub fn to_status(&self) -> Status {
        match self {
            ParsecError::InvalidCredential(_) | ParsecError::NoValidator(_) => {
                Status::new(Code::Unauthenticated, self.to_string())
            }
            ParsecError::FilterDenied => Status::new(Code::PermissionDenied, self.to_string()),
            ParsecError::Cancelled => Status::new(Code::Cancelled, "request cancelled"),
            ParsecError::IssuerNotFound(_) | ParsecError::DataSourceError { .. } => {
                Status::new(Code::FailedPrecondition, self.to_string())
            }
            _ => Status::new(Code::Internal, "internal error"),
        }
    }
}

pub type Result<T> = std::result::Result<T, ParsecError>;
