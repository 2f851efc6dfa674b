//! Named data-source fetchers, memoised per claim-mapper invocation.

use crate::error::ParsecError;
use crate::request::RequestAttributes;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The wire shape a data source's raw payload arrived in. Only `Json` is
/// decoded by the claim mapper today; other content types are accepted so
/// a data source can advertise its format and fail loudly if asked to
/// decode one the mapper doesn't understand yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Json,
    Text,
    Binary,
}

/// Input carried through to a data source's `fetch`: the request-scoped
/// context a mapper invocation shares across every `datasource(name)` call
/// it makes.
#[derive(Debug, Clone, Default)]
pub struct DataSourceInput {
    pub subject: HashMap<String, serde_json::Value>,
    pub request: RequestAttributes,
}

/// The raw result of a data-source fetch, before claim-mapper decoding.
#[derive(Debug, Clone)]
pub struct DataSourceResult {
    pub data: Vec<u8>,
    pub content_type: ContentType,
}

/// A named fetcher of auxiliary data a claim mapper can pull in via
/// `datasource(name)`.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch(&self, ctx: &CancellationToken, input: &DataSourceInput) -> Result<DataSourceResult, ParsecError>;
}

/// Named collection of [`DataSource`]s, looked up by the claim mapper's
/// `datasource(name)` host function. Memoisation of repeated lookups
/// within one mapper evaluation is the caller's responsibility (the claim
/// mapper keeps a per-invocation cache keyed by name), not this registry's
/// — the registry itself is shared, long-lived, and stateless per call.
#[derive(Default)]
pub struct DataSourceRegistry {
    sources: HashMap<String, Arc<dyn DataSource>>,
}

impl DataSourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, source: Arc<dyn DataSource>) {
        self.sources.insert(source.name().to_string(), source);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn DataSource>> {
        self.sources.get(name).cloned()
    }
}
