//! Trust stores: ordered validator collections, with an optional CEL
//! filter narrowing which validators apply to a given (actor, request).

use crate::credential::{Credential, ValidationResult};
use crate::error::ParsecError;
use crate::request::RequestAttributes;
use crate::validators::filter::ValidatorFilter;
use crate::validators::Validator;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs the shared stub-store validation algorithm over an ordered slice of
/// validators: skip validators that don't accept the credential's type,
/// return the first success, otherwise propagate the last failure (or
/// `NoValidator` if none applied at all).
async fn validate_over(
    validators: &[Arc<dyn Validator>],
    ctx: &CancellationToken,
    credential: &Credential,
) -> Result<ValidationResult, ParsecError> {
    let credential_type = credential.credential_type();
    let mut last_error: Option<ParsecError> = None;

    for validator in validators {
        if !validator.accepted_types().contains(&credential_type) {
            continue;
        }
        match validator.validate(ctx, credential).await {
            Ok(result) => return Ok(result),
            Err(e) => last_error = Some(e),
        }
    }

    Err(last_error.unwrap_or(ParsecError::NoValidator(credential_type)))
}

/// An ordered validator list applied uniformly regardless of actor —
/// suitable for fixtures and deployments with no CEL-gated policy.
pub struct StubTrustStore {
    validators: Vec<Arc<dyn Validator>>,
}

impl StubTrustStore {
    pub fn new(validators: Vec<Arc<dyn Validator>>) -> Self {
        Self { validators }
    }

    pub async fn validate(
        &self,
        ctx: &CancellationToken,
        credential: &Credential,
    ) -> Result<ValidationResult, ParsecError> {
        validate_over(&self.validators, ctx, credential).await
    }
}

/// A name → validator mapping gated by a [`ValidatorFilter`]. `for_actor`
/// produces a transient view over only the validators the filter allows
/// for that (actor, validator-name, request) triple; validation then runs
/// over the view with the same algorithm as [`StubTrustStore`].
pub struct FilteredTrustStore {
    validators: HashMap<String, Arc<dyn Validator>>,
    filter: ValidatorFilter,
}

impl FilteredTrustStore {
    pub fn new(validators: HashMap<String, Arc<dyn Validator>>, filter: ValidatorFilter) -> Self {
        Self { validators, filter }
    }

    /// Builds the filtered view for a given actor and request. The view
    /// preserves no particular ordering guarantee beyond the underlying
    /// map's iteration order, since the distilled spec only orders the
    /// stub store's static list.
    pub fn for_actor(&self, actor: &ValidationResult, request: &RequestAttributes) -> FilteredTrustStoreView {
        let allowed = self
            .validators
            .iter()
            .filter(|(name, _)| self.filter.is_allowed(actor, name, request))
            .map(|(_, validator)| Arc::clone(validator))
            .collect();
        let unfiltered = self.validators.values().map(Arc::clone).collect();
        FilteredTrustStoreView { validators: allowed, unfiltered }
    }
}

/// A narrowed, transient view over a [`FilteredTrustStore`] for one
/// (actor, request) pair. Keeps the unfiltered validator set alongside the
/// filtered one so `validate` can tell apart two distinct "nothing
/// validated this" outcomes: no validator in the store ever accepted this
/// credential type (`NoValidator`), versus a validator that would have
/// accepted it but was filtered out by policy (`FilterDenied`).
pub struct FilteredTrustStoreView {
    validators: Vec<Arc<dyn Validator>>,
    unfiltered: Vec<Arc<dyn Validator>>,
}

impl FilteredTrustStoreView {
    pub async fn validate(
        &self,
        ctx: &CancellationToken,
        credential: &Credential,
    ) -> Result<ValidationResult, ParsecError> {
        let result = validate_over(&self.validators, ctx, credential).await;
        if let Err(ParsecError::NoValidator(credential_type)) = &result {
            let filter_removed_a_candidate = self.validators.is_empty()
                && self.unfiltered.iter().any(|v| v.accepted_types().contains(credential_type));
            if filter_removed_a_candidate {
                return Err(ParsecError::FilterDenied);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvalidCredentialError;
    use crate::validators::bearer::StaticBearerValidator;

    fn bearer(name: &str, token: &str, subject: &str) -> Arc<dyn Validator> {
        Arc::new(StaticBearerValidator::new(name).with_token(
            token,
            ValidationResult {
                subject: subject.into(),
                ..Default::default()
            },
        ))
    }

    #[tokio::test]
    async fn stub_store_returns_first_success_in_order() {
        let store = StubTrustStore::new(vec![bearer("first", "t1", "a"), bearer("second", "t2", "b")]);
        let result = store
            .validate(&CancellationToken::new(), &Credential::Bearer { token: "t2".into() })
            .await
            .unwrap();
        assert_eq!(result.subject, "b");
    }

    #[tokio::test]
    async fn stub_store_skips_validators_for_unaccepted_type() {
        let store = StubTrustStore::new(vec![bearer("only-bearer", "t1", "a")]);
        let result = store
            .validate(&CancellationToken::new(), &Credential::Jwt { token: "x".into() })
            .await;
        assert!(matches!(result, Err(ParsecError::NoValidator(_))));
    }

    #[tokio::test]
    async fn stub_store_propagates_last_error_when_all_applicable_fail() {
        let store = StubTrustStore::new(vec![bearer("only", "known", "a")]);
        let result = store
            .validate(&CancellationToken::new(), &Credential::Bearer { token: "unknown".into() })
            .await;
        assert!(matches!(
            result,
            Err(ParsecError::InvalidCredential(InvalidCredentialError::BadSignature))
        ));
    }

    #[tokio::test]
    async fn filtered_store_excludes_validators_the_filter_denies() {
        let mut validators: HashMap<String, Arc<dyn Validator>> = HashMap::new();
        validators.insert("admin-validator".into(), bearer("admin-validator", "t", "a"));
        let filter = ValidatorFilter::compile_cel(r#"validator_name != "admin-validator""#).unwrap();
        let store = FilteredTrustStore::new(validators, filter);

        let view = store.for_actor(&ValidationResult::anonymous(), &RequestAttributes::default());
        let result = view
            .validate(&CancellationToken::new(), &Credential::Bearer { token: "t".into() })
            .await;
        assert!(matches!(result, Err(ParsecError::FilterDenied)));
    }

    #[tokio::test]
    async fn filtered_store_reports_no_validator_when_type_is_unaccepted_regardless_of_filter() {
        let mut validators: HashMap<String, Arc<dyn Validator>> = HashMap::new();
        validators.insert("bearer".into(), bearer("bearer", "t", "a"));
        let store = FilteredTrustStore::new(validators, ValidatorFilter::Passthrough);

        let view = store.for_actor(&ValidationResult::anonymous(), &RequestAttributes::default());
        let result = view.validate(&CancellationToken::new(), &Credential::Jwt { token: "x".into() }).await;
        assert!(matches!(result, Err(ParsecError::NoValidator(_))));
    }

    #[tokio::test]
    async fn filtered_store_includes_validators_the_filter_allows() {
        let mut validators: HashMap<String, Arc<dyn Validator>> = HashMap::new();
        validators.insert("external-validator".into(), bearer("external-validator", "t", "a"));
        let filter = ValidatorFilter::Passthrough;
        let store = FilteredTrustStore::new(validators, filter);

        let view = store.for_actor(&ValidationResult::anonymous(), &RequestAttributes::default());
        let result = view
            .validate(&CancellationToken::new(), &Credential::Bearer { token: "t".into() })
            .await
            .unwrap();
        assert_eq!(result.subject, "a");
    }
}
