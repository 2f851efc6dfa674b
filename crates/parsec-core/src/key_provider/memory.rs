//! Process-local key material, generated with `ring` and never persisted.
//!
//! Grounded on the teacher's `generate_signing_key`/`sign_jwt` crypto
//! helpers, restructured as stateful handles behind a registry instead of
//! free functions over a database row.

use super::{key_not_found, KeyAlgorithm, KeyHandle, KeyProvider, KeyVersion, PublicKeyMaterial};
use crate::error::{ParsecError, SigningError};
use async_trait::async_trait;
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

fn generate_key_version(algorithm: KeyAlgorithm) -> Result<KeyVersion, ParsecError> {
    match algorithm {
        KeyAlgorithm::Ed25519 => {
            let rng = SystemRandom::new();
            let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng)
                .map_err(|_| ParsecError::SigningFailed(SigningError::Backend("key generation failed".into())))?;
            let key_pair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref())
                .map_err(|_| ParsecError::SigningFailed(SigningError::Backend("key parsing failed".into())))?;
            let public_key = key_pair.public_key().as_ref().to_vec();
            let key_id = uuid::Uuid::new_v4().to_string();
            Ok(KeyVersion {
                key_id,
                algorithm,
                pkcs8_der: pkcs8.as_ref().to_vec(),
                public_key,
            })
        }
    }
}

/// Checks a loaded or generated version's declared algorithm against what
/// this handle was configured for. The provider never hands back material
/// under a different algorithm than its scope was opened with.
fn check_algorithm(expected: KeyAlgorithm, actual: KeyAlgorithm) -> Result<(), ParsecError> {
    if expected != actual {
        return Err(ParsecError::SigningFailed(SigningError::TypeMismatch { expected, actual }));
    }
    Ok(())
}

#[derive(Debug, Default)]
struct MemoryHandleState {
    current: Option<KeyVersion>,
    retired: Vec<KeyVersion>,
}

#[derive(Debug)]
pub struct InMemoryKeyHandle {
    algorithm: KeyAlgorithm,
    state: RwLock<MemoryHandleState>,
}

impl InMemoryKeyHandle {
    fn new(algorithm: KeyAlgorithm) -> Self {
        Self {
            algorithm,
            state: RwLock::new(MemoryHandleState::default()),
        }
    }
}

#[async_trait]
impl KeyHandle for InMemoryKeyHandle {
    async fn sign(&self, digest: &[u8]) -> Result<(Vec<u8>, String), ParsecError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let current = state.current.as_ref().ok_or_else(key_not_found)?;
        check_algorithm(self.algorithm, current.algorithm)?;
        let key_pair = Ed25519KeyPair::from_pkcs8(&current.pkcs8_der)
            .map_err(|_| ParsecError::SigningFailed(SigningError::Backend("stored key unparsable".into())))?;
        let signature = key_pair.sign(digest).as_ref().to_vec();
        Ok((signature, current.key_id.clone()))
    }

    async fn metadata(&self) -> Result<(String, KeyAlgorithm), ParsecError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let current = state.current.as_ref().ok_or_else(key_not_found)?;
        check_algorithm(self.algorithm, current.algorithm)?;
        Ok((current.key_id.clone(), current.algorithm))
    }

    async fn public(&self) -> Result<PublicKeyMaterial, ParsecError> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let current = state.current.as_ref().ok_or_else(key_not_found)?;
        check_algorithm(self.algorithm, current.algorithm)?;
        Ok(PublicKeyMaterial {
            key_id: current.key_id.clone(),
            algorithm: current.algorithm,
            public_key: current.public_key.clone(),
        })
    }

    async fn rotate(&self) -> Result<(), ParsecError> {
        let new_version = generate_key_version(self.algorithm)?;
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        if let Some(old) = state.current.take() {
            state.retired.push(old);
        }
        state.current = Some(new_version);
        Ok(())
    }
}

/// A [`KeyProvider`] backed by an in-process map, keyed by
/// `(trust_domain, namespace, key_name)`. Suitable for tests and
/// single-replica deployments; state is lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryKeyProvider {
    handles: RwLock<HashMap<(String, String, String), Arc<InMemoryKeyHandle>>>,
}

impl InMemoryKeyProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyProvider for InMemoryKeyProvider {
    async fn get_key_handle(
        &self,
        trust_domain: &str,
        namespace: &str,
        key_name: &str,
        algorithm: KeyAlgorithm,
    ) -> Result<Arc<dyn KeyHandle>, ParsecError> {
        let key = (trust_domain.to_string(), namespace.to_string(), key_name.to_string());
        {
            let handles = self.handles.read().unwrap_or_else(|e| e.into_inner());
            if let Some(handle) = handles.get(&key) {
                check_algorithm(algorithm, handle.algorithm)?;
                return Ok(handle.clone() as Arc<dyn KeyHandle>);
            }
        }
        let mut handles = self.handles.write().unwrap_or_else(|e| e.into_inner());
        let handle = match handles.entry(key) {
            std::collections::hash_map::Entry::Occupied(entry) => {
                check_algorithm(algorithm, entry.get().algorithm)?;
                entry.get().clone()
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(Arc::new(InMemoryKeyHandle::new(algorithm))).clone()
            }
        };
        Ok(handle as Arc<dyn KeyHandle>)
    }
}
