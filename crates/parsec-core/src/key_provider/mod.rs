//! Key material creation and rotation.
//!
//! A [`KeyProvider`] creates and rotates cryptographic key material scoped
//! to `(trust_domain, namespace, key_name)`. It hands back a [`KeyHandle`]
//! trait object so the rotating signer never needs to know whether the
//! material lives in a process-local map, on disk, or behind a cloud KMS.
//!
//! Two backends are implemented in full: [`memory::InMemoryKeyProvider`] and
//! [`disk::DiskKeyProvider`]. A KMS-backed provider is specified only by
//! this trait — it needs a live cloud SDK session this crate cannot assume,
//! so no implementation ships here.

pub mod disk;
pub mod memory;

use crate::error::{ParsecError, SigningError};
use async_trait::async_trait;
use std::fmt;

/// The declared key algorithm. Parsec only mints Ed25519 signing keys; the
/// enum exists so a `KeyHandle`'s `metadata()` can report mismatches against
/// configuration without the caller guessing from key length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAlgorithm {
    Ed25519,
}

impl KeyAlgorithm {
    /// The JOSE `alg` string used in JWT headers and JWKS entries.
    pub fn jose_alg(&self) -> &'static str {
        match self {
            KeyAlgorithm::Ed25519 => "EdDSA",
        }
    }
}

/// Public key material plus the metadata needed to build a JWKS entry.
#[derive(Debug, Clone)]
pub struct PublicKeyMaterial {
    pub key_id: String,
    pub algorithm: KeyAlgorithm,
    /// Raw public key bytes (32 bytes for Ed25519).
    pub public_key: Vec<u8>,
}

/// A single version of key material under some (trust_domain, namespace,
/// key_name). Kept internal to providers; exposed to callers only through
/// [`KeyHandle`].
#[derive(Debug, Clone)]
pub(crate) struct KeyVersion {
    pub key_id: String,
    pub algorithm: KeyAlgorithm,
    pub pkcs8_der: Vec<u8>,
    pub public_key: Vec<u8>,
}

/// A live reference to key material under one (trust_domain, namespace,
/// key_name). Signing always uses the current version; `rotate` advances
/// the current version and retires the previous one.
#[async_trait]
pub trait KeyHandle: Send + Sync + fmt::Debug {
    /// Signs a pre-hashed digest with the current key version. Returns the
    /// signature and the internal key identifier actually used, so callers
    /// that cached a `key_id` from a prior `metadata()` call can detect
    /// they've been racing a concurrent rotation.
    async fn sign(&self, digest: &[u8]) -> Result<(Vec<u8>, String), ParsecError>;

    /// The current version's key id and algorithm. Errors if `rotate` has
    /// never been called on this handle.
    async fn metadata(&self) -> Result<(String, KeyAlgorithm), ParsecError>;

    /// The current version's public key material.
    async fn public(&self) -> Result<PublicKeyMaterial, ParsecError>;

    /// Generates a new key version and makes it current. The previous
    /// version remains retrievable as retired material (useful for
    /// providers that want to serve old public keys during a grace period,
    /// though Parsec's own grace-period logic lives in the slot store, not
    /// here).
    async fn rotate(&self) -> Result<(), ParsecError>;
}

/// Creates and looks up [`KeyHandle`]s scoped by identity.
///
/// `algorithm` is the caller's configured key type for this scope. A
/// handle compares it against whatever material is actually stored (or,
/// for a scope with no material yet, the type it will generate) and
/// reports [`SigningError::TypeMismatch`] rather than silently using the
/// stored type if the two disagree.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn get_key_handle(
        &self,
        trust_domain: &str,
        namespace: &str,
        key_name: &str,
        algorithm: KeyAlgorithm,
    ) -> Result<std::sync::Arc<dyn KeyHandle>, ParsecError>;
}

pub(crate) fn key_not_found() -> ParsecError {
    ParsecError::SigningFailed(SigningError::Backend("key not found; call rotate() first".into()))
}
