//! Parsec identity-brokering sidecar core library.
//!
//! This crate implements the three core subsystems described by the
//! project's design: trust-store-backed credential validation with
//! CEL-expressed filtering, claim-mapped token issuance, and a dual-slot
//! rotating signer for key lifecycle management. It is consumed by thin
//! gRPC/HTTP surfaces (not included in this crate) that wire it to Envoy's
//! `ext_authz` contract and an RFC 8693 token exchange endpoint.
//!
//! # Modules
//!
//! - `clock` - injectable time source for deterministic tests
//! - `error` - the crate-wide error taxonomy
//! - `credential` - extracted request credentials and validation outcomes
//! - `request` - inbound request attributes
//! - `validators` - per-credential-type validators and CEL-based filtering
//! - `trust_store` - validator registries scoped by filter
//! - `data_source` - pluggable claim enrichment lookups
//! - `claim_mapper` - CEL-based mapping from validated identity to claims
//! - `key_provider` - key material persistence (memory, disk, KMS contract)
//! - `slot_store` - versioned compare-and-swap storage for signing slots
//! - `signer` - the dual-slot rotating signer
//! - `signer_registry` - named signer lifecycle management
//! - `issuer` - token issuer implementations
//! - `issuer_registry` - token-type-keyed issuer lookup
//! - `token_service` - orchestrates mapping + issuance
//! - `observer` - probe hooks for the rotation and issuance lifecycle
//! - `authz` - Envoy `ext_authz` check handling
//! - `exchange` - RFC 8693 token exchange handling
//! - `jwks_publisher` - background aggregation of public key material
//! - `jwks_handler` - thin JWKS HTTP handler
//! - `config` - typed configuration structs
//! - `observability` - structured logging and metrics helpers

pub mod authz;
mod cel_support;
pub mod claim_mapper;
pub mod clock;
pub mod config;
pub mod credential;
pub mod data_source;
pub mod error;
pub mod exchange;
pub mod issuer;
pub mod issuer_registry;
pub mod jwks_handler;
pub mod jwks_publisher;
pub mod key_provider;
pub mod observability;
pub mod observer;
pub mod request;
pub mod signer;
pub mod signer_registry;
pub mod slot_store;
pub mod token_service;
pub mod trust_store;
pub mod validators;
