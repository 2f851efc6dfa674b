//! Request-scoped probe hooks for the authz check lifecycle.
//!
//! An [`ApplicationObserver`] is notified of each step of a `Check` (or
//! `Exchange`) call in a fixed sequence:
//! `RequestAttributesParsed -> {ActorValidationSucceeded|Failed} ->
//! {SubjectCredentialExtracted -> SubjectValidationSucceeded|Failed |
//! SubjectCredentialExtractionFailed} -> End`. Every method has a no-op
//! default so an embedder only overrides the events it cares about; a
//! logging implementation belongs to the embedder, not this crate.

use crate::credential::ValidationResult;
use crate::request::RequestAttributes;

/// One probe event in an authz check's lifecycle.
#[derive(Debug, Clone)]
pub enum ProbeEvent<'a> {
    RequestAttributesParsed { request: &'a RequestAttributes },
    ActorValidationSucceeded { actor: &'a ValidationResult },
    ActorValidationFailed { reason: &'a str },
    SubjectCredentialExtracted { headers_consumed: &'a [String] },
    SubjectCredentialExtractionFailed,
    SubjectValidationSucceeded { subject: &'a ValidationResult },
    SubjectValidationFailed { reason: &'a str },
    End,
}

/// Receives [`ProbeEvent`]s as an authz check progresses. All methods are
/// no-ops by default.
pub trait ApplicationObserver: Send + Sync {
    fn on_event(&self, _event: &ProbeEvent<'_>) {}
}

/// An observer that does nothing, for callers with no instrumentation
/// needs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ApplicationObserver for NoopObserver {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl ApplicationObserver for RecordingObserver {
        fn on_event(&self, event: &ProbeEvent<'_>) {
            let label = match event {
                ProbeEvent::RequestAttributesParsed { .. } => "RequestAttributesParsed",
                ProbeEvent::ActorValidationSucceeded { .. } => "ActorValidationSucceeded",
                ProbeEvent::ActorValidationFailed { .. } => "ActorValidationFailed",
                ProbeEvent::SubjectCredentialExtracted { .. } => "SubjectCredentialExtracted",
                ProbeEvent::SubjectCredentialExtractionFailed => "SubjectCredentialExtractionFailed",
                ProbeEvent::SubjectValidationSucceeded { .. } => "SubjectValidationSucceeded",
                ProbeEvent::SubjectValidationFailed { .. } => "SubjectValidationFailed",
                ProbeEvent::End => "End",
            };
            self.events.lock().unwrap().push(label.to_string());
        }
    }

    #[test]
    fn noop_observer_accepts_every_event_variant() {
        let observer = NoopObserver;
        observer.on_event(&ProbeEvent::RequestAttributesParsed {
            request: &RequestAttributes::default(),
        });
        observer.on_event(&ProbeEvent::End);
    }

    #[test]
    fn recording_observer_preserves_emit_order() {
        let observer = RecordingObserver::default();
        let request = RequestAttributes::default();
        let actor = ValidationResult::anonymous();
        observer.on_event(&ProbeEvent::RequestAttributesParsed { request: &request });
        observer.on_event(&ProbeEvent::ActorValidationSucceeded { actor: &actor });
        observer.on_event(&ProbeEvent::SubjectCredentialExtracted { headers_consumed: &[] });
        observer.on_event(&ProbeEvent::SubjectValidationSucceeded { subject: &actor });
        observer.on_event(&ProbeEvent::End);

        assert_eq!(
            *observer.events.lock().unwrap(),
            vec![
                "RequestAttributesParsed",
                "ActorValidationSucceeded",
                "SubjectCredentialExtracted",
                "SubjectValidationSucceeded",
                "End",
            ]
        );
    }
}
