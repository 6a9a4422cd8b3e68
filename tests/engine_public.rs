//! Integration tests driving the public engine API with stub collaborators.

use std::sync::Arc;

use secchan::test_support::{StubChainBuilder, StubProvider, certificate_with_key};
use secchan::{
    CancelFlag, ContextStatus, CredentialCache, EngineState, FailureReason, HandshakeEngine,
    NegotiatedSession, NegotiationError, NegotiationOptions, NegotiationOutcome,
    NullPrivateKeyLocator, OptionsError, ProviderError,
};

fn engine(
    provider: &Arc<StubProvider>,
    cache: &Arc<CredentialCache>,
    options: NegotiationOptions,
) -> HandshakeEngine {
    HandshakeEngine::new(
        options,
        provider.clone(),
        Arc::new(StubChainBuilder::clean()),
        Arc::new(NullPrivateKeyLocator),
        cache.clone(),
    )
    .expect("options must validate")
}

#[test]
fn client_handshake_runs_to_done() {
    let provider = Arc::new(StubProvider::new());
    provider.script([ContextStatus::Continue, ContextStatus::Done]);
    provider.set_peer(certificate_with_key("example.com"));
    let cache = Arc::new(CredentialCache::new());
    let mut engine = engine(&provider, &cache, NegotiationOptions::client("example.com"));
    let cancel = CancelFlag::new();

    let first = engine.advance(&[], &cancel).unwrap();
    assert_eq!(first.outcome, NegotiationOutcome::Continue);
    assert!(first.outbound.is_some());
    assert_eq!(engine.state(), EngineState::InProgress);

    let second = engine.advance(&[0xAB], &cancel).unwrap();
    assert_eq!(second.outcome, NegotiationOutcome::Done);
    assert_eq!(engine.state(), EngineState::Done);
    assert_eq!(
        engine.negotiated(),
        Some(&NegotiatedSession {
            header_size: 5,
            trailer_size: 16,
            max_record_payload: 16 * 1024,
        })
    );
    assert_eq!(provider.rounds(), 2);
}

#[test]
fn server_handshake_uses_accept_entrypoint() {
    let provider = Arc::new(StubProvider::new());
    provider.script([ContextStatus::Continue, ContextStatus::Done]);
    let cache = Arc::new(CredentialCache::new());
    let options =
        NegotiationOptions::server().with_certificates(vec![certificate_with_key("srv.test")]);
    let mut engine = engine(&provider, &cache, options);
    let cancel = CancelFlag::new();

    engine.advance(&[1], &cancel).unwrap();
    let done = engine.advance(&[2], &cancel).unwrap();
    // No client certificate was presented and none is required.
    assert_eq!(done.outcome, NegotiationOutcome::Done);
    assert_eq!(provider.server_rounds(), 2);
    assert_eq!(
        provider.acquired(),
        vec![Some(certificate_with_key("srv.test").fingerprint())]
    );
}

#[test]
fn advance_after_done_is_rejected() {
    let provider = Arc::new(StubProvider::new());
    provider.script([ContextStatus::Done]);
    provider.set_peer(certificate_with_key("example.com"));
    let cache = Arc::new(CredentialCache::new());
    let mut engine = engine(&provider, &cache, NegotiationOptions::client("example.com"));

    engine.advance(&[], &CancelFlag::new()).unwrap();
    let err = engine.advance(&[], &CancelFlag::new()).unwrap_err();
    assert!(matches!(err, NegotiationError::InvalidState));
}

#[test]
fn rejected_peer_produces_fatal_alert_bytes() {
    let provider = Arc::new(StubProvider::new());
    provider.script([ContextStatus::Done]);
    provider.set_peer(certificate_with_key("unexpected.test"));
    let cache = Arc::new(CredentialCache::new());
    let mut engine = engine(&provider, &cache, NegotiationOptions::client("expected.test"));

    let status = engine.advance(&[], &CancelFlag::new()).unwrap();
    match status.outcome {
        NegotiationOutcome::Error(FailureReason::ValidationRejected(verdict)) => {
            assert!(verdict.policy_errors.name_mismatch);
        }
        other => panic!("expected validation rejection, got {other:?}"),
    }
    // BadCertificate (42) rendered by the stub as a two-byte fatal alert.
    assert_eq!(status.outbound, Some(vec![2, 42]));
    assert_eq!(engine.state(), EngineState::Failed);
}

#[test]
fn alert_production_failure_is_distinguishable() {
    let provider = Arc::new(StubProvider::new());
    provider.script([ContextStatus::Done]);
    provider.set_peer(certificate_with_key("unexpected.test"));
    provider.fail_alerts();
    let cache = Arc::new(CredentialCache::new());
    let mut engine = engine(&provider, &cache, NegotiationOptions::client("expected.test"));

    let status = engine.advance(&[], &CancelFlag::new()).unwrap();
    match status.outcome {
        NegotiationOutcome::Error(FailureReason::AlertFailed { original, cause }) => {
            assert!(matches!(*original, FailureReason::ValidationRejected(_)));
            assert_eq!(cause, ProviderError::AlertUnavailable);
        }
        other => panic!("expected AlertFailed, got {other:?}"),
    }
    assert!(status.outbound.is_none());
}

#[test]
fn cancellation_before_any_provider_call() {
    let provider = Arc::new(StubProvider::new());
    let cache = Arc::new(CredentialCache::new());
    let mut engine = engine(&provider, &cache, NegotiationOptions::client("example.com"));
    let cancel = CancelFlag::new();
    cancel.cancel();

    let err = engine.advance(&[], &cancel).unwrap_err();
    assert!(matches!(err, NegotiationError::Cancelled));
    // No context was created, so nothing was (or will be) disposed.
    assert_eq!(provider.rounds(), 0);
    assert!(provider.disposed().is_empty());
    // The session is torn down, not resumable.
    let err = engine.advance(&[], &CancelFlag::new()).unwrap_err();
    assert!(matches!(err, NegotiationError::InvalidState));
}

#[test]
fn validation_callback_error_propagates_unmodified() {
    let provider = Arc::new(StubProvider::new());
    provider.script([ContextStatus::Done]);
    provider.set_peer(certificate_with_key("example.com"));
    let cache = Arc::new(CredentialCache::new());
    let options = NegotiationOptions::client("example.com").with_validation_callback(Arc::new(
        |_, _, _| Err(secchan::CallbackError::new("revocation service down")),
    ));
    let mut engine = engine(&provider, &cache, options);

    let err = engine.advance(&[], &CancelFlag::new()).unwrap_err();
    match err {
        NegotiationError::Callback(e) => assert_eq!(e.0, "revocation service down"),
        other => panic!("expected callback error, got {other:?}"),
    }
    assert_eq!(engine.state(), EngineState::Failed);
}

#[test]
fn server_without_certificate_source_fails_before_any_byte() {
    let provider: Arc<StubProvider> = Arc::new(StubProvider::new());
    let result = HandshakeEngine::new(
        NegotiationOptions::server(),
        provider.clone(),
        Arc::new(StubChainBuilder::clean()),
        Arc::new(NullPrivateKeyLocator),
        Arc::new(CredentialCache::new()),
    );
    match result {
        Err(NegotiationError::Configuration(OptionsError::NoServerCertificate)) => {}
        other => panic!("expected configuration error, got {:?}", other.err()),
    }
    assert_eq!(provider.rounds(), 0);
}

#[test]
fn acquisition_failure_is_a_terminal_status() {
    let provider = Arc::new(StubProvider::new());
    provider.fail_acquisitions();
    let cache = Arc::new(CredentialCache::new());
    let mut engine = engine(&provider, &cache, NegotiationOptions::client("example.com"));

    let status = engine.advance(&[], &CancelFlag::new()).unwrap();
    assert_eq!(
        status.outcome,
        NegotiationOutcome::Error(FailureReason::CredentialAcquisition(
            ProviderError::CredentialRejected
        ))
    );
    // No context existed yet, so no alert could be attempted.
    assert!(status.outbound.is_none());
    assert_eq!(engine.state(), EngineState::Failed);
}

#[test]
fn client_retries_once_when_first_call_rejects_credentials() {
    let provider = Arc::new(StubProvider::new());
    provider.script([ContextStatus::CredentialsNeeded, ContextStatus::Done]);
    provider.set_peer(certificate_with_key("example.com"));
    let cache = Arc::new(CredentialCache::new());
    let options = NegotiationOptions::client("example.com")
        .with_certificates(vec![certificate_with_key("client-id.test")]);
    let mut engine = engine(&provider, &cache, options);

    let status = engine.advance(&[], &CancelFlag::new()).unwrap();
    // The retry is internal: one advance, two provider rounds, two
    // acquisitions (the speculative guess plus the forced fresh one).
    assert_eq!(status.outcome, NegotiationOutcome::Done);
    assert_eq!(provider.rounds(), 2);
    assert_eq!(provider.acquired().len(), 2);
}

#[test]
fn credentials_needed_beyond_first_call_is_surfaced() {
    let provider = Arc::new(StubProvider::new());
    provider.script([
        ContextStatus::Continue,
        ContextStatus::CredentialsNeeded,
        ContextStatus::Done,
    ]);
    provider.set_peer(certificate_with_key("example.com"));
    let cache = Arc::new(CredentialCache::new());
    let mut engine = engine(&provider, &cache, NegotiationOptions::client("example.com"));
    let cancel = CancelFlag::new();

    engine.advance(&[], &cancel).unwrap();
    let challenged = engine.advance(&[1], &cancel).unwrap();
    assert_eq!(challenged.outcome, NegotiationOutcome::CredentialsNeeded);
    // The next advance re-runs selection and completes.
    let done = engine.advance(&[2], &cancel).unwrap();
    assert_eq!(done.outcome, NegotiationOutcome::Done);
}
