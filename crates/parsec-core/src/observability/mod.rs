//! Observability helpers for the Parsec core library.
//!
//! # Privacy by Default
//!
//! Every public async entry point is instrumented with
//! `#[tracing::instrument(skip_all, fields(...))]` and an explicit
//! safe-field allow-list. Fields are categorized as:
//! - **SAFE**: can be logged in plaintext (enums, operation types, validator
//!   names, token types)
//! - **HASHED**: must be HMAC-SHA256 hashed for correlation (subject, client
//!   identifiers)
//! - **NEVER**: must never appear in logs (raw tokens, signing keys, bearer
//!   credentials)
//!
//! ## HMAC-SHA256 Correlation Hashing
//!
//! [`hash_for_correlation`] uses HMAC-SHA256 with a per-deployment key to
//! prevent rainbow-table recovery of the hashed value:
//! - consistent correlation across log entries (same input, same hash)
//! - one-way (not reversible without the secret key)
//! - `h:` prefix distinguishes these from any legacy unkeyed hashes

use ring::hmac;

/// Hash a field value for correlation in logs (HMAC-SHA256, first 8 hex
/// chars). Used for fields like `subject` that need correlation across log
/// entries but should not be stored in plaintext.
pub fn hash_for_correlation(value: &str, secret: &[u8]) -> String {
    let key = hmac::Key::new(hmac::HMAC_SHA256, secret);
    let tag = hmac::sign(&key, value.as_bytes());
    let tag_bytes = tag.as_ref();
    let prefix = tag_bytes.get(..4).unwrap_or(tag_bytes);
    format!("h:{}", hex::encode(prefix))
}

/// Error categories for metrics labels (bounded cardinality).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Credential or validator rejection.
    Validation,
    /// Filter-policy denial.
    Authorization,
    /// Signing, JWT, or CEL failures.
    Cryptographic,
    /// Configuration, data-source, or other internal failures.
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::Authorization => "authorization",
            ErrorCategory::Cryptographic => "cryptographic",
            ErrorCategory::Internal => "internal",
        }
    }
}

impl From<&crate::error::ParsecError> for ErrorCategory {
    fn from(err: &crate::error::ParsecError) -> Self {
        use crate::error::ParsecError;
        match err {
            ParsecError::InvalidCredential(_) | ParsecError::NoValidator(_) => {
                ErrorCategory::Validation
            }
            ParsecError::FilterDenied => ErrorCategory::Authorization,
            ParsecError::SigningFailed(_) | ParsecError::Jwt(_) | ParsecError::Cel(_) => {
                ErrorCategory::Cryptographic
            }
            ParsecError::Config(_)
            | ParsecError::IssuerNotFound(_)
            | ParsecError::DataSourceError { .. }
            | ParsecError::VersionMismatch
            | ParsecError::Cancelled
            | ParsecError::Io(_) => ErrorCategory::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &[u8] = &[0u8; 32];

    #[test]
    fn hash_for_correlation_is_consistent() {
        let value = "test-subject";
        assert_eq!(
            hash_for_correlation(value, TEST_SECRET),
            hash_for_correlation(value, TEST_SECRET)
        );
    }

    #[test]
    fn hash_for_correlation_distinguishes_inputs() {
        assert_ne!(
            hash_for_correlation("subject-a", TEST_SECRET),
            hash_for_correlation("subject-b", TEST_SECRET)
        );
    }

    #[test]
    fn hash_for_correlation_format() {
        let hash = hash_for_correlation("any-value", TEST_SECRET);
        assert_eq!(hash.len(), 10);
        assert!(hash.starts_with("h:"));
        assert!(hash[2..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn error_category_as_str_matches_variant() {
        assert_eq!(ErrorCategory::Validation.as_str(), "validation");
        assert_eq!(ErrorCategory::Authorization.as_str(), "authorization");
        assert_eq!(ErrorCategory::Cryptographic.as_str(), "cryptographic");
        assert_eq!(ErrorCategory::Internal.as_str(), "internal");
    }
}
