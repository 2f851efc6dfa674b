//! HTTP handler serving a [`crate::jwks_publisher::JwksPublisher`]'s
//! cached key set as a JWK Set document (RFC 7517/7518), mounted by the
//! embedder at `/v1/jwks.json` and `/.well-known/jwks.json`.

use crate::jwks_publisher::JwksPublisher;
use axum::extract::State;
use axum::Json;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Serialize;
use std::sync::Arc;

/// One OKP (Ed25519) JWK entry.
#[derive(Debug, Serialize)]
pub struct Jwk {
    pub kty: &'static str,
    pub crv: &'static str,
    pub x: String,
    #[serde(rename = "use")]
    pub key_use: &'static str,
    pub alg: &'static str,
    pub kid: String,
}

#[derive(Debug, Serialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// `GET /v1/jwks.json` / `GET /.well-known/jwks.json`.
pub async fn handle_get_jwks(State(publisher): State<Arc<JwksPublisher>>) -> Json<JwkSet> {
    let keys = publisher
        .current()
        .await
        .into_iter()
        .map(|key| Jwk {
            kty: "OKP",
            crv: "Ed25519",
            x: URL_SAFE_NO_PAD.encode(&key.key),
            key_use: key.key_use,
            alg: key.alg,
            kid: key.kid,
        })
        .collect();

    Json(JwkSet { keys })
}
