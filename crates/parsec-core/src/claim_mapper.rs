//! CEL-based claim mapping from validated identity + request + auxiliary
//! data-source fetches into the claim set issuers sign or embed.

use crate::cel_support::{cel_to_json, json_to_cel, request_to_cel, validation_result_to_cel};
use crate::credential::ValidationResult;
use crate::data_source::{ContentType, DataSourceInput, DataSourceRegistry};
use crate::error::ParsecError;
use crate::request::RequestAttributes;
use cel_interpreter::{Context, Program, Value as CelValue};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;

/// Everything a single claim-mapper evaluation needs.
pub struct MapperInput {
    pub subject: ValidationResult,
    pub actor: ValidationResult,
    pub request: RequestAttributes,
    pub data_sources: Arc<DataSourceRegistry>,
    pub data_source_input: DataSourceInput,
}

/// A pre-compiled CEL expression that maps a [`MapperInput`] to a claim
/// set. Compilation happens once at construction; each [`Self::map`] call
/// builds a fresh per-invocation environment, including a `datasource`
/// cache scoped to that single call.
pub struct ClaimMapper {
    program: Program,
}

impl ClaimMapper {
    pub fn compile(source: &str) -> Result<Self, ParsecError> {
        let program = Program::compile(source).map_err(|e| ParsecError::Cel(e.to_string()))?;
        Ok(Self { program })
    }

    /// Evaluates the mapper against `input`, returning the claim set.
    ///
    /// `datasource(name)` resolves `null` when the registry has no source
    /// by that name, when the fetch itself fails, or when the fetched
    /// payload's content type isn't `Json` (the only decodable shape
    /// today); the lookup is cached by name for the remainder of this
    /// invocation regardless of which of those paths produced the value.
    /// The fetch itself is async but CEL host functions are synchronous,
    /// so the fetch is driven to completion on the current
    /// Tokio runtime via `block_in_place`; this requires a multi-threaded
    /// runtime, which is what the rest of this crate assumes.
    pub fn map(&self, input: &MapperInput) -> Result<HashMap<String, Value>, ParsecError> {
        let cache: Arc<Mutex<HashMap<String, CelValue>>> = Arc::new(Mutex::new(HashMap::new()));
        let registry = Arc::clone(&input.data_sources);
        let ds_input = input.data_source_input.clone();

        let mut context = Context::default();
        context
            .add_variable("subject", validation_result_to_cel(&input.subject))
            .map_err(|e| ParsecError::Cel(e.to_string()))?;
        context
            .add_variable("actor", validation_result_to_cel(&input.actor))
            .map_err(|e| ParsecError::Cel(e.to_string()))?;
        context
            .add_variable("request", request_to_cel(&input.request))
            .map_err(|e| ParsecError::Cel(e.to_string()))?;

        context.add_function("datasource", move |name: Arc<String>| -> CelValue {
            if let Some(cached) = cache.lock().unwrap_or_else(|e| e.into_inner()).get(name.as_str()) {
                return cached.clone();
            }

            let Some(source) = registry.get(name.as_str()) else {
                return CelValue::Null;
            };

            let ds_input = ds_input.clone();
            let result = tokio::task::block_in_place(|| {
                Handle::current().block_on(async move {
                    source.fetch(&tokio_util::sync::CancellationToken::new(), &ds_input).await
                })
            });

            let value = match result {
                Ok(fetched) if fetched.content_type == ContentType::Json => {
                    match serde_json::from_slice::<Value>(&fetched.data) {
                        Ok(json) => json_to_cel(&json),
                        Err(_) => CelValue::Null,
                    }
                }
                Ok(_) | Err(_) => CelValue::Null,
            };

            cache
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(name.as_str().to_string(), value.clone());
            value
        });

        let evaluated = self.program.execute(&context).map_err(|e| ParsecError::Cel(e.to_string()))?;

        let CelValue::Map(map) = evaluated else {
            return Err(ParsecError::Cel("non-map result".into()));
        };

        let Value::Object(object) = cel_to_json(&CelValue::Map(map))? else {
            return Err(ParsecError::Cel("non-map result".into()));
        };

        Ok(object.into_iter().collect())
    }
}
