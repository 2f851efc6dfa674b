//! RFC 8693 token exchange: `POST /v1/token`.
//!
//! Shares the same trust-store/claim-mapper/token-service pipeline as
//! [`crate::authz`], but is triggered by a direct exchange request instead
//! of an `ext_authz` `Check`, and returns its result as a JSON body rather
//! than header mutations.

use crate::claim_mapper::MapperInput;
use crate::credential::{Credential, ValidationResult};
use crate::data_source::{DataSourceInput, DataSourceRegistry};
use crate::error::ParsecError;
use crate::observer::{ApplicationObserver, ProbeEvent};
use crate::request::RequestAttributes;
use crate::token_service::{TokenService, TokenTypeSpec};
use crate::trust_store::FilteredTrustStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// `urn:ietf:params:oauth:grant-type:token-exchange`, the only grant type
/// this handler accepts.
pub const TOKEN_EXCHANGE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";

/// The RFC 8693 request body.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeRequest {
    pub grant_type: String,
    pub subject_token: String,
    pub subject_token_type: String,
    #[serde(default)]
    pub actor_token: Option<String>,
    #[serde(default)]
    pub actor_token_type: Option<String>,
    #[serde(default)]
    pub requested_token_type: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub resource: Option<String>,
}

/// The RFC 8693 response body.
#[derive(Debug, Clone, Serialize)]
pub struct ExchangeResponse {
    pub access_token: String,
    pub issued_token_type: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub claims: HashMap<String, serde_json::Value>,
}

fn subject_credential_for(body: &ExchangeRequest) -> Credential {
    match body.subject_token_type.as_str() {
        "urn:ietf:params:oauth:token-type:jwt" => Credential::Jwt { token: body.subject_token.clone() },
        _ => Credential::Bearer { token: body.subject_token.clone() },
    }
}

fn actor_credential_for(body: &ExchangeRequest) -> Option<Credential> {
    let token = body.actor_token.clone()?;
    match body.actor_token_type.as_deref() {
        Some("urn:ietf:params:oauth:token-type:jwt") => Some(Credential::Jwt { token }),
        _ => Some(Credential::Bearer { token }),
    }
}

/// Resolves the default-requested token type to `requested_token_type`
/// when the caller supplied one, falling back to the handler's configured
/// default otherwise.
fn token_type_spec_for(requested: &Option<String>, default_spec: &TokenTypeSpec) -> TokenTypeSpec {
    match requested {
        Some(token_type) => TokenTypeSpec { token_type: token_type.clone(), header_name: default_spec.header_name.clone() },
        None => default_spec.clone(),
    }
}

/// Implements RFC 8693 exchange over Parsec's internal trust-store /
/// claim-mapper / token-service pipeline. Unlike [`crate::authz::AuthzCheckHandler`],
/// there is no actor-absent-means-anonymous shortcut: an exchange request
/// without an actor token simply validates with an anonymous actor, same
/// as an authz check with no transport-level actor metadata.
pub struct TokenExchangeHandler {
    actor_trust_store: Arc<FilteredTrustStore>,
    subject_trust_store: Arc<FilteredTrustStore>,
    token_service: Arc<TokenService>,
    default_token_type: TokenTypeSpec,
    data_sources: Arc<DataSourceRegistry>,
    observer: Arc<dyn ApplicationObserver>,
}

impl TokenExchangeHandler {
    pub fn new(
        actor_trust_store: Arc<FilteredTrustStore>,
        subject_trust_store: Arc<FilteredTrustStore>,
        token_service: Arc<TokenService>,
        default_token_type: TokenTypeSpec,
        data_sources: Arc<DataSourceRegistry>,
        observer: Arc<dyn ApplicationObserver>,
    ) -> Self {
        Self {
            actor_trust_store,
            subject_trust_store,
            token_service,
            default_token_type,
            data_sources,
            observer,
        }
    }

    #[tracing::instrument(skip_all, fields(subject_token_type = %body.subject_token_type))]
    pub async fn exchange(&self, ctx: &CancellationToken, body: ExchangeRequest) -> Result<ExchangeResponse, ParsecError> {
        if body.grant_type != TOKEN_EXCHANGE_GRANT_TYPE {
            return Err(ParsecError::Config(format!("unsupported grant_type {}", body.grant_type)));
        }

        let request = RequestAttributes {
            additional: HashMap::from_iter(
                [("audience", &body.audience), ("scope", &body.scope), ("resource", &body.resource)]
                    .into_iter()
                    .filter_map(|(k, v)| v.clone().map(|v| (k.to_string(), v))),
            ),
            ..Default::default()
        };
        self.observer.on_event(&ProbeEvent::RequestAttributesParsed { request: &request });

        let actor = match actor_credential_for(&body) {
            None => {
                let anonymous = ValidationResult::anonymous();
                self.observer.on_event(&ProbeEvent::ActorValidationSucceeded { actor: &anonymous });
                anonymous
            }
            Some(credential) => {
                let view = self.actor_trust_store.for_actor(&ValidationResult::anonymous(), &request);
                match view.validate(ctx, &credential).await {
                    Ok(result) => {
                        self.observer.on_event(&ProbeEvent::ActorValidationSucceeded { actor: &result });
                        result
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        self.observer.on_event(&ProbeEvent::ActorValidationFailed { reason: &reason });
                        self.observer.on_event(&ProbeEvent::End);
                        return Err(e);
                    }
                }
            }
        };

        self.observer.on_event(&ProbeEvent::SubjectCredentialExtracted { headers_consumed: &[] });

        let view = self.subject_trust_store.for_actor(&actor, &request);
        let subject_credential = subject_credential_for(&body);
        let subject = match view.validate(ctx, &subject_credential).await {
            Ok(result) => {
                self.observer.on_event(&ProbeEvent::SubjectValidationSucceeded { subject: &result });
                result
            }
            Err(e) => {
                let reason = e.to_string();
                self.observer.on_event(&ProbeEvent::SubjectValidationFailed { reason: &reason });
                self.observer.on_event(&ProbeEvent::End);
                return Err(e);
            }
        };

        let input = MapperInput {
            subject,
            actor,
            request,
            data_sources: Arc::clone(&self.data_sources),
            data_source_input: DataSourceInput::default(),
        };

        let spec = token_type_spec_for(&body.requested_token_type, &self.default_token_type);
        let issued = match self.token_service.issue(&input, std::slice::from_ref(&spec)).await {
            Ok(issued) => issued,
            Err(e) => {
                self.observer.on_event(&ProbeEvent::End);
                return Err(e);
            }
        };
        let Some((spec, token)) = issued.into_iter().next() else {
            self.observer.on_event(&ProbeEvent::End);
            return Err(ParsecError::IssuerNotFound(spec.token_type));
        };

        self.observer.on_event(&ProbeEvent::End);

        Ok(ExchangeResponse {
            access_token: token.value,
            issued_token_type: spec.token_type,
            token_type: "N_A".to_string(),
            expires_in: token
                .expires_at
                .map(|exp| (exp - token.issued_at).num_seconds())
                .unwrap_or(0),
            claims: token.claims,
        })
    }
}
