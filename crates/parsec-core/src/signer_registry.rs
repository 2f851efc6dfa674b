//! Named registry of rotating signers, started and stopped as a group.
//!
//! Breaks the cyclic dependency between signers and issuers: an issuer
//! needs a signer, but signers are named and started as a group before any
//! issuer is constructed, so issuers reference signers by name rather than
//! by direct ownership.

use crate::error::ParsecError;
use crate::signer::RotatingSigner;
use std::collections::HashMap;
use std::sync::Arc;

/// A name-keyed collection of [`RotatingSigner`]s.
#[derive(Default)]
pub struct SignerRegistry {
    signers: HashMap<String, Arc<RotatingSigner>>,
}

impl SignerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, signer: Arc<RotatingSigner>) {
        self.signers.insert(name.into(), signer);
    }

    pub fn get(&self, name: &str) -> Option<Arc<RotatingSigner>> {
        self.signers.get(name).cloned()
    }

    /// Starts every registered signer. If any signer fails to start, the
    /// signers already started remain running — the caller decides
    /// whether a partial start is acceptable for its deployment.
    pub async fn start_all(&self) -> Result<(), ParsecError> {
        for signer in self.signers.values() {
            signer.start().await?;
        }
        Ok(())
    }

    /// Stops every registered signer's background ticker.
    pub fn stop_all(&self) {
        for signer in self.signers.values() {
            signer.stop();
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.signers.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::key_provider::memory::InMemoryKeyProvider;
    use crate::signer::SignerConfig;
    use crate::slot_store::InMemorySlotStore;

    #[tokio::test]
    async fn registered_signer_is_retrievable_by_name() {
        let mut registry = SignerRegistry::new();
        let signer = RotatingSigner::new(
            "d",
            "urn:x:token",
            "default",
            Arc::new(InMemoryKeyProvider::new()),
            Arc::new(InMemorySlotStore::new()),
            Arc::new(SystemClock),
            SignerConfig::default(),
        );
        registry.register("txn", signer.clone());

        assert!(registry.get("txn").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[tokio::test]
    async fn start_all_starts_every_registered_signer() {
        let mut registry = SignerRegistry::new();
        for name in ["a", "b"] {
            let signer = RotatingSigner::new(
                "d",
                format!("urn:x:{name}"),
                "default",
                Arc::new(InMemoryKeyProvider::new()),
                Arc::new(InMemorySlotStore::new()),
                Arc::new(SystemClock),
                SignerConfig {
                    check_interval: std::time::Duration::from_secs(3600),
                    ..SignerConfig::default()
                },
            );
            registry.register(name, signer);
        }

        registry.start_all().await.unwrap();
        for name in registry.names().map(String::from).collect::<Vec<_>>() {
            let signer = registry.get(&name).unwrap();
            assert!(signer.get_current_signer().await.is_ok());
        }
        registry.stop_all();
    }
}
