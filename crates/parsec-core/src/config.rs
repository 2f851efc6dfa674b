//! Typed configuration document, one `#[derive(Deserialize)]` struct per
//! section. An embedder's own loader (figment, config-rs, hand-rolled CLI
//! flag parsing, …) is responsible for merging CLI flags, `PARSEC_*`
//! environment variables, and a YAML/JSON/TOML file into this shape with
//! CLI > env > file > defaults precedence; this crate only defines what
//! the merged document deserializes into.

use serde::Deserialize;
use std::collections::HashMap;

fn default_grpc_port() -> u16 {
    9090
}

fn default_http_port() -> u16 {
    8080
}

fn default_trust_domain() -> String {
    "parsec.local".to_string()
}

fn default_trust_store_type() -> String {
    "stub_store".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// `server` section: listener ports for the authz and exchange/JWKS
/// surfaces.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_grpc_port")]
    pub grpc_port: u16,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            grpc_port: default_grpc_port(),
            http_port: default_http_port(),
        }
    }
}

/// One entry in `trust_store.validators[]`: a name, a validator kind, and
/// whatever deployment-specific parameters that kind needs (e.g. a JWKS
/// URL for a JWT validator, a static token table for a bearer validator).
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorConfig {
    pub name: String,
    pub validator_type: String,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

/// `trust_store` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TrustStoreConfig {
    #[serde(rename = "type", default = "default_trust_store_type")]
    pub store_type: String,
    #[serde(default)]
    pub validators: Vec<ValidatorConfig>,
    /// CEL source for the [`crate::validators::filter::ValidatorFilter`];
    /// absent means [`crate::validators::filter::ValidatorFilter::Passthrough`].
    #[serde(default)]
    pub filter: Option<String>,
}

impl Default for TrustStoreConfig {
    fn default() -> Self {
        Self {
            store_type: default_trust_store_type(),
            validators: Vec::new(),
            filter: None,
        }
    }
}

/// One entry in `data_sources[]`.
#[derive(Debug, Clone, Deserialize)]
pub struct DataSourceConfig {
    pub name: String,
    pub source_type: String,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

/// One entry in `issuers[]`: the token type it produces, which issuer
/// family implements it, the CEL claim-mapper source it evaluates, and
/// (for the transaction-token family) the named signer it delegates
/// signing to.
#[derive(Debug, Clone, Deserialize)]
pub struct IssuerConfig {
    pub token_type: String,
    pub issuer_type: String,
    pub claim_mapper: String,
    #[serde(default)]
    pub signer_name: Option<String>,
    #[serde(default)]
    pub ttl_seconds: Option<i64>,
}

/// One entry in `key_providers[]`.
#[derive(Debug, Clone, Deserialize)]
pub struct KeyProviderConfig {
    pub id: String,
    pub provider_type: String,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

/// One entry in `signers[]`. Named `SignerSettings` rather than
/// `SignerConfig` to avoid colliding with [`crate::signer::SignerConfig`],
/// the runtime rotation-timing struct this deserializes into via
/// [`SignerSettings::into_signer_config`].
#[derive(Debug, Clone, Deserialize)]
pub struct SignerSettings {
    pub name: String,
    pub namespace: String,
    pub key_provider_id: String,
    #[serde(default)]
    pub key_ttl_seconds: Option<i64>,
    #[serde(default)]
    pub rotation_threshold_seconds: Option<i64>,
    #[serde(default)]
    pub grace_period_seconds: Option<i64>,
    #[serde(default)]
    pub check_interval_seconds: Option<u64>,
    #[serde(default)]
    pub prepare_timeout_seconds: Option<i64>,
}

impl SignerSettings {
    /// Builds a [`crate::signer::SignerConfig`], falling back to its
    /// defaults for any timing field left unset.
    pub fn into_signer_config(self) -> crate::signer::SignerConfig {
        let defaults = crate::signer::SignerConfig::default();
        crate::signer::SignerConfig {
            key_ttl: self
                .key_ttl_seconds
                .map(chrono::Duration::seconds)
                .unwrap_or(defaults.key_ttl),
            rotation_threshold: self
                .rotation_threshold_seconds
                .map(chrono::Duration::seconds)
                .unwrap_or(defaults.rotation_threshold),
            grace_period: self
                .grace_period_seconds
                .map(chrono::Duration::seconds)
                .unwrap_or(defaults.grace_period),
            check_interval: self
                .check_interval_seconds
                .map(std::time::Duration::from_secs)
                .unwrap_or(defaults.check_interval),
            prepare_timeout: self
                .prepare_timeout_seconds
                .map(chrono::Duration::seconds)
                .unwrap_or(defaults.prepare_timeout),
        }
    }
}

/// One entry in `authz_server.token_types[]`. Named `TokenTypeConfig`
/// rather than `TokenTypeSpec` to avoid colliding with
/// [`crate::token_service::TokenTypeSpec`], the runtime struct this
/// deserializes into via `.into()`.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenTypeConfig {
    pub token_type: String,
    pub header_name: String,
}

impl From<TokenTypeConfig> for crate::token_service::TokenTypeSpec {
    fn from(value: TokenTypeConfig) -> Self {
        crate::token_service::TokenTypeSpec {
            token_type: value.token_type,
            header_name: value.header_name,
        }
    }
}

/// `authz_server` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthzServerConfig {
    #[serde(default)]
    pub token_types: Vec<TokenTypeConfig>,
}

/// `exchange_server` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ExchangeServerConfig {
    /// Claim names the exchange response's `claims` map is restricted to;
    /// `None` means no filtering.
    #[serde(default)]
    pub claims_filter: Option<Vec<String>>,
}

/// `observability` section: log verbosity/format plus per-surface toggles
/// for the probe events [`crate::observer::ApplicationObserver`] exposes.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default)]
    pub token_issuance: bool,
    #[serde(default)]
    pub token_exchange: bool,
    #[serde(default)]
    pub authz_check: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
            token_issuance: false,
            token_exchange: false,
            authz_check: false,
        }
    }
}

/// One entry in `fixtures[]`: a named, pre-seeded identity for local
/// development and integration tests, resolved by whichever fixture
/// validator or data source the embedder wires up.
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureConfig {
    pub name: String,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

/// The full configuration document, mirroring every section named in the
/// design's external interfaces.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ParsecConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default = "default_trust_domain")]
    pub trust_domain: String,
    #[serde(default)]
    pub trust_store: TrustStoreConfig,
    #[serde(default)]
    pub data_sources: Vec<DataSourceConfig>,
    #[serde(default)]
    pub issuers: Vec<IssuerConfig>,
    #[serde(default)]
    pub key_providers: Vec<KeyProviderConfig>,
    #[serde(default)]
    pub signers: Vec<SignerSettings>,
    #[serde(default)]
    pub authz_server: AuthzServerConfig,
    #[serde(default)]
    pub exchange_server: ExchangeServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub fixtures: Vec<FixtureConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_precedence_floor() {
        let config: ParsecConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.server.grpc_port, 9090);
        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.trust_domain, "parsec.local");
        assert_eq!(config.trust_store.store_type, "stub_store");
        assert!(config.trust_store.validators.is_empty());
        assert!(config.trust_store.filter.is_none());
    }

    #[test]
    fn deserializes_a_populated_document() {
        let json = r#"{
            "server": {"grpc_port": 9191, "http_port": 8181},
            "trust_domain": "prod.example",
            "trust_store": {
                "type": "filtered",
                "validators": [{"name": "bearer", "validator_type": "bearer"}],
                "filter": "true"
            },
            "signers": [{"name": "txn", "namespace": "urn:x:txn", "key_provider_id": "default"}],
            "authz_server": {"token_types": [{"token_type": "urn:x:txn", "header_name": "Transaction-Token"}]}
        }"#;

        let config: ParsecConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.server.grpc_port, 9191);
        assert_eq!(config.trust_domain, "prod.example");
        assert_eq!(config.trust_store.validators.len(), 1);
        assert_eq!(config.signers[0].namespace, "urn:x:txn");
        assert_eq!(config.authz_server.token_types[0].header_name, "Transaction-Token");
    }

    #[test]
    fn signer_settings_fall_back_to_rotating_signer_defaults() {
        let settings = SignerSettings {
            name: "txn".into(),
            namespace: "urn:x:txn".into(),
            key_provider_id: "default".into(),
            key_ttl_seconds: None,
            rotation_threshold_seconds: None,
            grace_period_seconds: None,
            check_interval_seconds: None,
            prepare_timeout_seconds: None,
        };
        let converted = settings.into_signer_config();
        assert_eq!(converted.key_ttl, crate::signer::SignerConfig::default().key_ttl);
    }

    #[test]
    fn signer_settings_override_explicit_fields() {
        let settings = SignerSettings {
            name: "txn".into(),
            namespace: "urn:x:txn".into(),
            key_provider_id: "default".into(),
            key_ttl_seconds: Some(3600),
            rotation_threshold_seconds: None,
            grace_period_seconds: None,
            check_interval_seconds: Some(30),
            prepare_timeout_seconds: None,
        };
        let converted = settings.into_signer_config();
        assert_eq!(converted.key_ttl, chrono::Duration::seconds(3600));
        assert_eq!(converted.check_interval, std::time::Duration::from_secs(30));
    }
}
