//! Envoy `ext_authz` v3–shaped check handling.
//!
//! Exposes `Check` as a plain async function over request/response structs
//! rather than a tonic-generated service: the gRPC transport itself is out
//! of scope here, so an embedder's `envoy.service.auth.v3.Authorization`
//! implementation is a thin pass-through to [`AuthzCheckHandler::check`].

use crate::claim_mapper::MapperInput;
use crate::credential::{Credential, CredentialType, ValidationResult};
use crate::data_source::{DataSourceInput, DataSourceRegistry};
use crate::error::ParsecError;
use crate::observer::{ApplicationObserver, ProbeEvent};
use crate::request::RequestAttributes;
use crate::token_service::{TokenService, TokenTypeSpec};
use crate::trust_store::{FilteredTrustStore, StubTrustStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tonic::{Code, Status};

/// Which header (or, for mTLS, the peer certificate) a subject credential
/// of a given type is expected to arrive in. Order in the containing
/// `Vec` is extraction priority — first rule that yields a credential
/// wins. This is a configuration concern, not a hard-coded policy.
#[derive(Debug, Clone)]
pub struct SubjectExtractionRule {
    pub credential_type: CredentialType,
    pub header_name: String,
}

/// A parsed `envoy.service.auth.v3.CheckRequest`'s attributes, reduced to
/// what Parsec needs.
#[derive(Debug, Clone, Default)]
pub struct CheckRequest {
    pub request: RequestAttributes,
    /// The `authorization` value from the gRPC call's own transport
    /// metadata — distinct from `request.headers`, which carries the
    /// proxied HTTP request's headers.
    pub actor_authorization: Option<String>,
    /// The verified peer certificate chain, when the transport terminated
    /// mTLS, leaf-first.
    pub peer_certificate_chain: Option<Vec<Vec<u8>>>,
}

/// The result of a `Check` call: either `OK` with header mutations, or a
/// denial status with a sanitised message.
#[derive(Debug, Clone)]
pub struct CheckResponse {
    pub status: Status,
    pub headers_to_add: HashMap<String, String>,
    pub headers_to_remove: Vec<String>,
}

impl CheckResponse {
    fn deny(status: Status) -> Self {
        Self {
            status,
            headers_to_add: HashMap::new(),
            headers_to_remove: Vec::new(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status.code() == Code::Ok
    }
}

fn strip_bearer_prefix(value: &str) -> &str {
    value.strip_prefix("Bearer ").unwrap_or(value)
}

/// Extracts the first credential a configured extraction rule matches,
/// returning it alongside the header name consumed (`None` for mTLS,
/// which isn't header-carried).
fn extract_subject(
    rules: &[SubjectExtractionRule],
    request: &RequestAttributes,
    peer_certificate_chain: &Option<Vec<Vec<u8>>>,
) -> Option<(Credential, Option<String>)> {
    for rule in rules {
        match rule.credential_type {
            CredentialType::Bearer => {
                if let Some(value) = request.header(&rule.header_name) {
                    return Some((
                        Credential::Bearer {
                            token: strip_bearer_prefix(value).to_string(),
                        },
                        Some(rule.header_name.clone()),
                    ));
                }
            }
            CredentialType::Jwt => {
                if let Some(value) = request.header(&rule.header_name) {
                    return Some((
                        Credential::Jwt {
                            token: strip_bearer_prefix(value).to_string(),
                        },
                        Some(rule.header_name.clone()),
                    ));
                }
            }
            CredentialType::Json => {
                if let Some(value) = request.header(&rule.header_name) {
                    return Some((
                        Credential::Json { raw: value.as_bytes().to_vec() },
                        Some(rule.header_name.clone()),
                    ));
                }
            }
            CredentialType::Mtls => {
                if let Some(chain) = peer_certificate_chain {
                    return Some((
                        Credential::Mtls {
                            certificate_chain: chain.clone(),
                        },
                        None,
                    ));
                }
            }
        }
    }
    None
}

/// Default subject-extraction priority: bearer `authorization`, then a
/// JWT-typed `authorization`, then mTLS from the peer certificate, then a
/// JSON identity envelope header. Deployments that need a different order
/// or additional headers should build their own `Vec<SubjectExtractionRule>`.
pub fn default_subject_extraction_rules() -> Vec<SubjectExtractionRule> {
    vec![
        SubjectExtractionRule { credential_type: CredentialType::Bearer, header_name: "authorization".into() },
        SubjectExtractionRule { credential_type: CredentialType::Jwt, header_name: "authorization".into() },
        SubjectExtractionRule { credential_type: CredentialType::Mtls, header_name: String::new() },
        SubjectExtractionRule { credential_type: CredentialType::Json, header_name: "x-identity".into() },
    ]
}

/// Implements the `Check` algorithm: parse attributes, validate the actor,
/// narrow the trust store by (actor, request), extract and validate the
/// subject, issue configured token types, and report header mutations.
pub struct AuthzCheckHandler {
    actor_trust_store: Arc<StubTrustStore>,
    trust_store: Arc<FilteredTrustStore>,
    subject_extraction: Vec<SubjectExtractionRule>,
    token_service: Arc<TokenService>,
    requested_token_types: Vec<TokenTypeSpec>,
    data_sources: Arc<DataSourceRegistry>,
    observer: Arc<dyn ApplicationObserver>,
}

impl AuthzCheckHandler {
    pub fn new(
        actor_trust_store: Arc<StubTrustStore>,
        trust_store: Arc<FilteredTrustStore>,
        subject_extraction: Vec<SubjectExtractionRule>,
        token_service: Arc<TokenService>,
        requested_token_types: Vec<TokenTypeSpec>,
        data_sources: Arc<DataSourceRegistry>,
        observer: Arc<dyn ApplicationObserver>,
    ) -> Self {
        Self {
            actor_trust_store,
            trust_store,
            subject_extraction,
            token_service,
            requested_token_types,
            data_sources,
            observer,
        }
    }

    #[tracing::instrument(skip_all, fields(path = %request.request.path))]
    pub async fn check(&self, ctx: &CancellationToken, request: CheckRequest) -> CheckResponse {
        self.observer.on_event(&ProbeEvent::RequestAttributesParsed { request: &request.request });

        let actor = match &request.actor_authorization {
            None => ValidationResult::anonymous(),
            Some(value) => {
                let credential = Credential::Bearer { token: strip_bearer_prefix(value).to_string() };
                match self.actor_trust_store.validate(ctx, &credential).await {
                    Ok(result) => {
                        self.observer.on_event(&ProbeEvent::ActorValidationSucceeded { actor: &result });
                        result
                    }
                    Err(e) => {
                        let reason = e.to_string();
                        self.observer.on_event(&ProbeEvent::ActorValidationFailed { reason: &reason });
                        self.observer.on_event(&ProbeEvent::End);
                        return CheckResponse::deny(Status::new(
                            Code::Unauthenticated,
                            format!("actor validation failed: {reason}"),
                        ));
                    }
                }
            }
        };
        if request.actor_authorization.is_none() {
            self.observer.on_event(&ProbeEvent::ActorValidationSucceeded { actor: &actor });
        }

        let view = self.trust_store.for_actor(&actor, &request.request);

        let Some((subject_credential, header_consumed)) =
            extract_subject(&self.subject_extraction, &request.request, &request.peer_certificate_chain)
        else {
            self.observer.on_event(&ProbeEvent::SubjectCredentialExtractionFailed);
            self.observer.on_event(&ProbeEvent::End);
            return CheckResponse::deny(Status::new(Code::PermissionDenied, "no subject credential present"));
        };
        let headers_consumed: Vec<String> = header_consumed.into_iter().collect();
        self.observer
            .on_event(&ProbeEvent::SubjectCredentialExtracted { headers_consumed: &headers_consumed });

        let subject = match view.validate(ctx, &subject_credential).await {
            Ok(result) => {
                self.observer.on_event(&ProbeEvent::SubjectValidationSucceeded { subject: &result });
                result
            }
            Err(e) => {
                let reason = e.to_string();
                self.observer.on_event(&ProbeEvent::SubjectValidationFailed { reason: &reason });
                self.observer.on_event(&ProbeEvent::End);
                return CheckResponse::deny(e.to_status());
            }
        };

        let input = MapperInput {
            subject,
            actor,
            request: request.request,
            data_sources: Arc::clone(&self.data_sources),
            data_source_input: DataSourceInput::default(),
        };

        let issued = match self.token_service.issue(&input, &self.requested_token_types).await {
            Ok(issued) => issued,
            Err(e) => {
                self.observer.on_event(&ProbeEvent::End);
                return CheckResponse::deny(e.to_status());
            }
        };

        let headers_to_add = issued.into_iter().map(|(spec, token)| (spec.header_name, token.value)).collect();

        self.observer.on_event(&ProbeEvent::End);
        CheckResponse {
            status: Status::new(Code::Ok, ""),
            headers_to_add,
            headers_to_remove: headers_consumed,
        }
    }
}

/// Maps a [`ParsecError`] to the `Check` response it should produce,
/// matching the propagation policy: validation failures become
/// `Unauthenticated`/`PermissionDenied` with sanitised messages.
pub fn deny_for(error: &ParsecError) -> CheckResponse {
    CheckResponse::deny(error.to_status())
}
