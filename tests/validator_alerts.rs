//! Public-API tests for peer validation and the failure→alert path.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use secchan::test_support::{StubChainBuilder, StubProvider, certificate_with_key, leaf_certificate};
use secchan::{
    AlertCode, CancelFlag, CertificateValidator, ChainStatus, ContextStatus, CredentialCache,
    HandshakeEngine, NegotiationOptions, NegotiationOutcome, NullPrivateKeyLocator,
};

#[test]
fn callback_true_accepts_despite_computed_errors() {
    let chain = Arc::new(StubChainBuilder::with_status(ChainStatus {
        expired: true,
        ..Default::default()
    }));
    let mut validator = CertificateValidator::new(chain);
    let options = NegotiationOptions::client("expected.test")
        .with_validation_callback(Arc::new(|_, _, _| Ok(true)));
    let peer = leaf_certificate("other.test");
    let verdict = validator
        .validate(Some(&peer), &options, &CancelFlag::new())
        .unwrap();
    assert!(verdict.accepted);
    assert!(verdict.policy_errors.chain_errors);
    assert!(verdict.policy_errors.name_mismatch);
}

#[test]
fn callback_false_rejects_a_clean_peer() {
    let mut validator = CertificateValidator::new(Arc::new(StubChainBuilder::clean()));
    let options = NegotiationOptions::client("peer.test")
        .with_validation_callback(Arc::new(|_, _, _| Ok(false)));
    let peer = leaf_certificate("peer.test");
    let verdict = validator
        .validate(Some(&peer), &options, &CancelFlag::new())
        .unwrap();
    assert!(!verdict.accepted);
    assert!(verdict.policy_errors.is_empty());
    assert_eq!(verdict.alert, Some(AlertCode::BadCertificate));
}

#[test]
fn renegotiated_identical_certificate_skips_the_callback() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let mut validator = CertificateValidator::new(Arc::new(StubChainBuilder::clean()));
    let options = NegotiationOptions::client("peer.test").with_validation_callback(Arc::new(
        move |_, _, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        },
    ));
    let peer = leaf_certificate("peer.test");

    let first = validator
        .validate(Some(&peer), &options, &CancelFlag::new())
        .unwrap();
    let second = validator
        .validate(Some(&peer), &options, &CancelFlag::new())
        .unwrap();
    assert_eq!(first, second);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "trust was already established");
}

#[test]
fn engine_surfaces_alert_for_untrusted_chain() {
    let provider = Arc::new(StubProvider::new());
    provider.script([ContextStatus::Done]);
    provider.set_peer(certificate_with_key("example.com"));
    let chain = Arc::new(StubChainBuilder::with_status(ChainStatus {
        untrusted_root: true,
        ..Default::default()
    }));
    let mut engine = HandshakeEngine::new(
        NegotiationOptions::client("example.com"),
        provider.clone(),
        chain,
        Arc::new(NullPrivateKeyLocator),
        Arc::new(CredentialCache::new()),
    )
    .unwrap();

    let status = engine.advance(&[], &CancelFlag::new()).unwrap();
    assert!(matches!(status.outcome, NegotiationOutcome::Error(_)));
    // UnknownCA (48) per the first-match mapping rule.
    assert_eq!(status.outbound, Some(vec![2, AlertCode::UnknownCa.to_u8()]));
}

#[test]
fn server_accepts_missing_client_certificate_unless_required() {
    let provider = Arc::new(StubProvider::new());
    provider.script([ContextStatus::Done, ContextStatus::Done]);
    let options =
        NegotiationOptions::server().with_certificates(vec![certificate_with_key("srv.test")]);
    let mut relaxed = HandshakeEngine::new(
        options.clone(),
        provider.clone(),
        Arc::new(StubChainBuilder::clean()),
        Arc::new(NullPrivateKeyLocator),
        Arc::new(CredentialCache::new()),
    )
    .unwrap();
    let status = relaxed.advance(&[1], &CancelFlag::new()).unwrap();
    assert_eq!(status.outcome, NegotiationOutcome::Done);

    let mut strict = HandshakeEngine::new(
        options.with_peer_certificate_required(),
        provider,
        Arc::new(StubChainBuilder::clean()),
        Arc::new(NullPrivateKeyLocator),
        Arc::new(CredentialCache::new()),
    )
    .unwrap();
    let status = strict.advance(&[1], &CancelFlag::new()).unwrap();
    match &status.outcome {
        NegotiationOutcome::Error(reason) => {
            assert!(format!("{reason}").contains("rejected"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }
    // CertificateUnknown (46): the only policy error is the absent certificate.
    assert_eq!(
        status.outbound,
        Some(vec![2, AlertCode::CertificateUnknown.to_u8()])
    );
}
