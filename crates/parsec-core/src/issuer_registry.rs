//! Maps a token-type URN to the issuer that produces it.

use crate::error::ParsecError;
use crate::issuer::Issuer;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct IssuerRegistry {
    issuers: HashMap<String, Arc<dyn Issuer>>,
}

impl IssuerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, issuer: Arc<dyn Issuer>) {
        self.issuers.insert(issuer.token_type().to_string(), issuer);
    }

    pub fn get(&self, token_type: &str) -> Result<Arc<dyn Issuer>, ParsecError> {
        self.issuers
            .get(token_type)
            .cloned()
            .ok_or_else(|| ParsecError::IssuerNotFound(token_type.to_string()))
    }
}
