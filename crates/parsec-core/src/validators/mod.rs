//! Credential validators and the trust stores that hold them.

pub mod bearer;
pub mod filter;
pub mod json_identity;
pub mod jwt;
pub mod mtls;

use crate::credential::{Credential, CredentialType, ValidationResult};
use crate::error::ParsecError;
use async_trait::async_trait;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;

/// Something that can turn a raw [`Credential`] into a [`ValidationResult`].
///
/// Polymorphic over a capability set rather than a single credential type:
/// a validator advertises which [`CredentialType`]s it accepts so a trust
/// store can skip it for credentials it wouldn't understand.
#[async_trait]
pub trait Validator: Send + Sync {
    fn name(&self) -> &str;

    fn accepted_types(&self) -> HashSet<CredentialType>;

    async fn validate(
        &self,
        ctx: &CancellationToken,
        credential: &Credential,
    ) -> Result<ValidationResult, ParsecError>;
}
