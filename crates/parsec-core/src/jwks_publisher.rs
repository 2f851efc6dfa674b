//! Background aggregation of every registered signer's public keys into
//! one cached JWK set, refreshed on a ticker.

use crate::error::ParsecError;
use crate::signer::PublicKey;
use crate::signer_registry::SignerRegistry;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Periodically unions `PublicKeys()` across every signer in a registry
/// and caches the result for the JWKS HTTP handler to serve.
pub struct JwksPublisher {
    signers: Arc<SignerRegistry>,
    refresh_interval: std::time::Duration,
    cache: RwLock<Vec<PublicKey>>,
    cancel: CancellationToken,
}

impl JwksPublisher {
    /// `refresh_interval` defaults to one minute per the design's JWKS
    /// publisher section; callers needing a different cadence pass it
    /// explicitly.
    pub fn new(signers: Arc<SignerRegistry>, refresh_interval: std::time::Duration) -> Arc<Self> {
        Arc::new(Self {
            signers,
            refresh_interval,
            cache: RwLock::new(Vec::new()),
            cancel: CancellationToken::new(),
        })
    }

    async fn refresh(&self) -> Result<(), ParsecError> {
        let mut aggregated = Vec::new();
        for name in self.signers.names().map(String::from).collect::<Vec<_>>() {
            let Some(signer) = self.signers.get(&name) else { continue };
            aggregated.extend(signer.public_keys().await);
        }
        *self.cache.write().await = aggregated;
        Ok(())
    }

    /// Populates the cache once, then launches a background ticker that
    /// refreshes it at `refresh_interval`. Refresh failures are logged and
    /// retried on the next tick; the stale cache keeps serving in the
    /// meantime.
    pub async fn start(self: &Arc<Self>) -> Result<(), ParsecError> {
        self.refresh().await?;

        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.refresh_interval);
            loop {
                tokio::select! {
                    _ = this.cancel.cancelled() => {
                        debug!("jwks publisher stopped");
                        return;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = this.refresh().await {
                            warn!(error = %e, "jwks refresh failed, serving stale cache");
                        }
                    }
                }
            }
        });

        Ok(())
    }

    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// The currently cached, aggregated key set.
    pub async fn current(&self) -> Vec<PublicKey> {
        self.cache.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::key_provider::memory::InMemoryKeyProvider;
    use crate::signer::{RotatingSigner, SignerConfig};
    use crate::slot_store::InMemorySlotStore;

    fn registry_with_two_signers() -> Arc<SignerRegistry> {
        let mut registry = SignerRegistry::new();
        for name in ["txn", "id"] {
            let signer = RotatingSigner::new(
                "parsec.test",
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
        Arc::new(registry)
    }

    #[tokio::test]
    async fn aggregates_public_keys_across_all_registered_signers() {
        let registry = registry_with_two_signers();
        registry.start_all().await.unwrap();

        let publisher = JwksPublisher::new(registry.clone(), std::time::Duration::from_secs(3600));
        publisher.start().await.unwrap();

        let keys = publisher.current().await;
        assert_eq!(keys.len(), 2);

        publisher.stop();
        registry.stop_all();
    }

    #[tokio::test]
    async fn empty_registry_yields_empty_cache() {
        let registry = Arc::new(SignerRegistry::new());
        let publisher = JwksPublisher::new(registry, std::time::Duration::from_secs(3600));
        publisher.start().await.unwrap();
        assert!(publisher.current().await.is_empty());
    }
}
