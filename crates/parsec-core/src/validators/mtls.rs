//! mTLS client-certificate validation.
//!
//! Envoy terminates TLS and forwards the verified client certificate
//! chain; this validator only parses it to extract the caller's identity
//! (subject CN / SAN) and checks the leaf's issuer against a configured
//! allow-list. It does not perform chain-of-trust verification itself —
//! that already happened at the TLS terminator.

use super::Validator;
use crate::credential::{Credential, CredentialType, ValidationResult};
use crate::error::{InvalidCredentialError, ParsecError};
use async_trait::async_trait;
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

pub struct MtlsValidator {
    name: String,
    trusted_issuers: HashSet<String>,
}

impl MtlsValidator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            trusted_issuers: HashSet::new(),
        }
    }

    pub fn with_trusted_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.trusted_issuers.insert(issuer.into());
        self
    }
}

fn san_dns_names(cert: &X509Certificate<'_>) -> Vec<String> {
    use x509_parser::extensions::{GeneralName, ParsedExtension};
    cert.extensions()
        .iter()
        .find_map(|ext| match ext.parsed_extension() {
            ParsedExtension::SubjectAlternativeName(san) => Some(
                san.general_names
                    .iter()
                    .filter_map(|name| match name {
                        GeneralName::DNSName(dns) => Some(dns.to_string()),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        })
        .unwrap_or_default()
}

#[async_trait]
impl Validator for MtlsValidator {
    fn name(&self) -> &str {
        &self.name
    }

    fn accepted_types(&self) -> HashSet<CredentialType> {
        HashSet::from([CredentialType::Mtls])
    }

    async fn validate(
        &self,
        _ctx: &CancellationToken,
        credential: &Credential,
    ) -> Result<ValidationResult, ParsecError> {
        let Credential::Mtls { certificate_chain } = credential else {
            return Err(ParsecError::InvalidCredential(InvalidCredentialError::Malformed(
                "expected mtls credential".into(),
            )));
        };

        let leaf_der = certificate_chain
            .first()
            .ok_or_else(|| ParsecError::InvalidCredential(InvalidCredentialError::Malformed("empty certificate chain".into())))?;

        let (_, cert) = X509Certificate::from_der(leaf_der)
            .map_err(|_| ParsecError::InvalidCredential(InvalidCredentialError::Malformed("unparsable certificate".into())))?;

        let issuer = cert.issuer().to_string();
        if !self.trusted_issuers.is_empty() && !self.trusted_issuers.contains(&issuer) {
            return Err(ParsecError::InvalidCredential(InvalidCredentialError::UnknownIssuer(issuer)));
        }

        let subject = cert.subject().to_string();
        let dns_names = san_dns_names(&cert);
        let trust_domain = dns_names.first().cloned().unwrap_or_else(|| subject.clone());

        Ok(ValidationResult {
            subject,
            issuer,
            trust_domain,
            audience: dns_names,
            ..ValidationResult::anonymous()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_chain_is_rejected() {
        let validator = MtlsValidator::new("mtls");
        let result = validator
            .validate(&CancellationToken::new(), &Credential::Mtls { certificate_chain: vec![] })
            .await;
        assert!(matches!(
            result,
            Err(ParsecError::InvalidCredential(InvalidCredentialError::Malformed(_)))
        ));
    }

    #[tokio::test]
    async fn unparsable_certificate_is_rejected() {
        let validator = MtlsValidator::new("mtls");
        let result = validator
            .validate(
                &CancellationToken::new(),
                &Credential::Mtls { certificate_chain: vec![vec![0u8; 4]] },
            )
            .await;
        assert!(matches!(
            result,
            Err(ParsecError::InvalidCredential(InvalidCredentialError::Malformed(_)))
        ));
    }
}
