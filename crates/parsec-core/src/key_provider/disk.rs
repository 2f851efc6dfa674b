//! On-disk key material, written atomically (temp file + fsync + rename).
//!
//! Each `(trust_domain, namespace, key_name)` owns a directory under the
//! provider's base path holding `current.json` (the active version) and a
//! `retired/` subdirectory of previously-current versions, kept so a
//! signer's grace-period logic can still serve their public keys after
//! rotation.

use super::{KeyAlgorithm, KeyHandle, KeyProvider, KeyVersion, PublicKeyMaterial};
use crate::error::{ParsecError, SigningError};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use ring::rand::SystemRandom;
use ring::signature::{Ed25519KeyPair, KeyPair};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// The on-disk representation of one key version. Field names are the
/// wire format; changing them breaks the round-trip property this type
/// exists to satisfy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyFileData {
    pub key_id: String,
    pub algorithm: String,
    pub pkcs8_der_base64: String,
    pub public_key_base64: String,
    pub created_at: DateTime<Utc>,
}

impl KeyFileData {
    fn from_version(version: &KeyVersion, created_at: DateTime<Utc>) -> Self {
        Self {
            key_id: version.key_id.clone(),
            algorithm: version.algorithm.jose_alg().to_string(),
            pkcs8_der_base64: STANDARD.encode(&version.pkcs8_der),
            public_key_base64: STANDARD.encode(&version.public_key),
            created_at,
        }
    }

    /// Decodes this file's algorithm and rejects it outright if it doesn't
    /// match `expected` — whether because the string is unrecognized, or
    /// because it decodes fine but names a different algorithm than the
    /// scope this handle was opened with is configured to use.
    fn into_version(self, expected: KeyAlgorithm) -> Result<KeyVersion, ParsecError> {
        let algorithm = match self.algorithm.as_str() {
            "EdDSA" => KeyAlgorithm::Ed25519,
            other => {
                return Err(ParsecError::SigningFailed(SigningError::Backend(format!(
                    "unsupported key algorithm on disk: {other}"
                ))))
            }
        };
        if algorithm != expected {
            return Err(ParsecError::SigningFailed(SigningError::TypeMismatch {
                expected,
                actual: algorithm,
            }));
        }
        let pkcs8_der = STANDARD
            .decode(self.pkcs8_der_base64)
            .map_err(|e| ParsecError::SigningFailed(SigningError::Backend(e.to_string())))?;
        let public_key = STANDARD
            .decode(self.public_key_base64)
            .map_err(|e| ParsecError::SigningFailed(SigningError::Backend(e.to_string())))?;
        Ok(KeyVersion {
            key_id: self.key_id,
            algorithm,
            pkcs8_der,
            public_key,
        })
    }
}

/// Creates `dir` (and its ancestors) if missing, then pins the leaf
/// directory's permissions to `0700` per the persisted-state storage
/// contract — key material directories must not be group/world readable.
fn ensure_private_dir(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
}

fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    ensure_private_dir(dir)?;
    let tmp_path = dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
    {
        let mut tmp_file = std::fs::File::create(&tmp_path)?;
        tmp_file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        tmp_file.write_all(contents)?;
        tmp_file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

fn generate_key_version(algorithm: KeyAlgorithm) -> Result<KeyVersion, ParsecError> {
    match algorithm {
        KeyAlgorithm::Ed25519 => {
            let rng = SystemRandom::new();
            let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng)
                .map_err(|_| ParsecError::SigningFailed(SigningError::Backend("key generation failed".into())))?;
            let key_pair = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref())
                .map_err(|_| ParsecError::SigningFailed(SigningError::Backend("key parsing failed".into())))?;
            let public_key = key_pair.public_key().as_ref().to_vec();
            Ok(KeyVersion {
                key_id: uuid::Uuid::new_v4().to_string(),
                algorithm,
                pkcs8_der: pkcs8.as_ref().to_vec(),
                public_key,
            })
        }
    }
}

#[derive(Debug)]
pub struct DiskKeyHandle {
    dir: PathBuf,
    algorithm: KeyAlgorithm,
    current: RwLock<Option<KeyVersion>>,
}

impl DiskKeyHandle {
    fn current_path(&self) -> PathBuf {
        self.dir.join("current.json")
    }

    fn load_current(&self) -> Result<Option<KeyVersion>, ParsecError> {
        let path = self.current_path();
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read(&path)?;
        let file_data: KeyFileData = serde_json::from_slice(&contents)
            .map_err(|e| ParsecError::SigningFailed(SigningError::Backend(e.to_string())))?;
        Ok(Some(file_data.into_version(self.algorithm)?))
    }

    fn ensure_loaded(&self) -> Result<(), ParsecError> {
        let needs_load = self.current.read().unwrap_or_else(|e| e.into_inner()).is_none();
        if needs_load {
            if let Some(loaded) = self.load_current()? {
                *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(loaded);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl KeyHandle for DiskKeyHandle {
    async fn sign(&self, digest: &[u8]) -> Result<(Vec<u8>, String), ParsecError> {
        self.ensure_loaded()?;
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        let current = guard.as_ref().ok_or_else(super::key_not_found)?;
        let key_pair = Ed25519KeyPair::from_pkcs8(&current.pkcs8_der)
            .map_err(|_| ParsecError::SigningFailed(SigningError::Backend("stored key unparsable".into())))?;
        Ok((key_pair.sign(digest).as_ref().to_vec(), current.key_id.clone()))
    }

    async fn metadata(&self) -> Result<(String, KeyAlgorithm), ParsecError> {
        self.ensure_loaded()?;
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        let current = guard.as_ref().ok_or_else(super::key_not_found)?;
        Ok((current.key_id.clone(), current.algorithm))
    }

    async fn public(&self) -> Result<PublicKeyMaterial, ParsecError> {
        self.ensure_loaded()?;
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        let current = guard.as_ref().ok_or_else(super::key_not_found)?;
        Ok(PublicKeyMaterial {
            key_id: current.key_id.clone(),
            algorithm: current.algorithm,
            public_key: current.public_key.clone(),
        })
    }

    async fn rotate(&self) -> Result<(), ParsecError> {
        let new_version = generate_key_version(self.algorithm)?;
        let file_data = KeyFileData::from_version(&new_version, Utc::now());
        let bytes = serde_json::to_vec_pretty(&file_data)
            .map_err(|e| ParsecError::SigningFailed(SigningError::Backend(e.to_string())))?;

        if let Some(old) = self.load_current()? {
            let retired_dir = self.dir.join("retired");
            let old_file = KeyFileData::from_version(&old, Utc::now());
            let retired_bytes = serde_json::to_vec_pretty(&old_file)
                .map_err(|e| ParsecError::SigningFailed(SigningError::Backend(e.to_string())))?;
            write_atomic(&retired_dir.join(format!("{}.json", old.key_id)), &retired_bytes)?;
        }

        write_atomic(&self.current_path(), &bytes)?;
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(new_version);
        Ok(())
    }
}

/// A [`KeyProvider`] backed by a directory tree, one subdirectory per
/// `(trust_domain, namespace, key_name)`. Survives process restarts;
/// intended for single-replica deployments or as the local cache tier
/// under a coordinating slot store.
#[derive(Debug)]
pub struct DiskKeyProvider {
    base_dir: PathBuf,
    handles: RwLock<HashMap<(String, String, String), Arc<DiskKeyHandle>>>,
}

impl DiskKeyProvider {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            handles: RwLock::new(HashMap::new()),
        }
    }

    fn scope_dir(&self, trust_domain: &str, namespace: &str, key_name: &str) -> PathBuf {
        self.base_dir
            .join(sanitize(trust_domain))
            .join(sanitize(namespace))
            .join(sanitize(key_name))
    }
}

/// Filesystem-safe component; namespaces are often URNs with `:` and `/`.
fn sanitize(component: &str) -> String {
    component.replace(['/', ':'], "_")
}

#[async_trait]
impl KeyProvider for DiskKeyProvider {
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
                if handle.algorithm != algorithm {
                    return Err(ParsecError::SigningFailed(SigningError::TypeMismatch {
                        expected: algorithm,
                        actual: handle.algorithm,
                    }));
                }
                return Ok(handle.clone() as Arc<dyn KeyHandle>);
            }
        }
        let dir = self.scope_dir(trust_domain, namespace, key_name);
        let mut handles = self.handles.write().unwrap_or_else(|e| e.into_inner());
        let handle = match handles.entry(key) {
            std::collections::hash_map::Entry::Occupied(entry) => {
                if entry.get().algorithm != algorithm {
                    return Err(ParsecError::SigningFailed(SigningError::TypeMismatch {
                        expected: algorithm,
                        actual: entry.get().algorithm,
                    }));
                }
                entry.get().clone()
            }
            std::collections::hash_map::Entry::Vacant(entry) => entry
                .insert(Arc::new(DiskKeyHandle {
                    dir,
                    algorithm,
                    current: RwLock::new(None),
                }))
                .clone(),
        };
        Ok(handle as Arc<dyn KeyHandle>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_file_round_trip_is_byte_identical() {
        let version = KeyVersion {
            key_id: "k1".into(),
            algorithm: KeyAlgorithm::Ed25519,
            pkcs8_der: vec![1, 2, 3, 4],
            public_key: vec![9, 9, 9],
        };
        let file_data = KeyFileData::from_version(&version, Utc::now());
        let bytes = serde_json::to_vec(&file_data).unwrap();
        let read_back: KeyFileData = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(file_data, read_back);
    }

    #[tokio::test]
    async fn rotate_persists_across_handle_instances() {
        let tmp = tempfile_dir();
        let provider = DiskKeyProvider::new(&tmp);
        let handle = provider.get_key_handle("d", "n", "k", KeyAlgorithm::Ed25519).await.unwrap();
        handle.rotate().await.unwrap();
        let (key_id, _) = handle.metadata().await.unwrap();

        // A fresh provider pointed at the same directory must load the
        // same current version from disk.
        let provider2 = DiskKeyProvider::new(&tmp);
        let handle2 = provider2.get_key_handle("d", "n", "k", KeyAlgorithm::Ed25519).await.unwrap();
        let (key_id2, _) = handle2.metadata().await.unwrap();
        assert_eq!(key_id, key_id2);

        std::fs::remove_dir_all(&tmp).ok();
    }

    #[tokio::test]
    async fn rotate_retires_previous_version_on_disk() {
        let tmp = tempfile_dir();
        let provider = DiskKeyProvider::new(&tmp);
        let handle = provider.get_key_handle("d", "n", "k", KeyAlgorithm::Ed25519).await.unwrap();
        handle.rotate().await.unwrap();
        let (first_key_id, _) = handle.metadata().await.unwrap();
        handle.rotate().await.unwrap();

        let retired_dir = provider.scope_dir("d", "n", "k").join("retired");
        let retired_path = retired_dir.join(format!("{first_key_id}.json"));
        assert!(retired_path.exists());

        std::fs::remove_dir_all(&tmp).ok();
    }

    #[tokio::test]
    async fn rotate_writes_private_directory_and_file_permissions() {
        let tmp = tempfile_dir();
        let provider = DiskKeyProvider::new(&tmp);
        let handle = provider.get_key_handle("d", "n", "k", KeyAlgorithm::Ed25519).await.unwrap();
        handle.rotate().await.unwrap();

        let scope_dir = provider.scope_dir("d", "n", "k");
        let dir_mode = std::fs::metadata(&scope_dir).unwrap().permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700);

        let file_mode = std::fs::metadata(scope_dir.join("current.json")).unwrap().permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);

        std::fs::remove_dir_all(&tmp).ok();
    }

    #[tokio::test]
    async fn loading_an_unrecognized_on_disk_algorithm_is_rejected() {
        let tmp = tempfile_dir();
        let provider = DiskKeyProvider::new(&tmp);
        let handle = provider.get_key_handle("d", "n", "k", KeyAlgorithm::Ed25519).await.unwrap();
        handle.rotate().await.unwrap();

        // Corrupting the on-disk file to declare an algorithm this build
        // doesn't know how to parse must surface as an error, not a panic
        // or a silent fallback to whatever algorithm was requested.
        let current_path = provider.scope_dir("d", "n", "k").join("current.json");
        let mut file_data: KeyFileData = serde_json::from_slice(&std::fs::read(&current_path).unwrap()).unwrap();
        file_data.algorithm = "RS256".into();
        std::fs::write(&current_path, serde_json::to_vec_pretty(&file_data).unwrap()).unwrap();

        let provider2 = DiskKeyProvider::new(&tmp);
        let handle2 = provider2.get_key_handle("d", "n", "k", KeyAlgorithm::Ed25519).await.unwrap();
        let result = handle2.metadata().await;
        assert!(matches!(
            result,
            Err(ParsecError::SigningFailed(SigningError::Backend(_)))
        ));

        std::fs::remove_dir_all(&tmp).ok();
    }

    fn tempfile_dir() -> PathBuf {
        std::env::temp_dir().join(format!("parsec-test-{}", uuid::Uuid::new_v4()))
    }
}
