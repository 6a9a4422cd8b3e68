//! Crate root for `secchan`.
//!
//! A TLS handshake and credential-negotiation engine: drives an opaque
//! security-context provider through the handshake rounds for the client
//! and server roles, selects and caches local credentials, validates the
//! peer's certificate against policy, and maps failures to protocol alerts.
//! It sits beneath a record-layer collaborator and above a transport; record
//! encryption, raw I/O and X.509 parsing stay outside this crate, behind
//! the ports.
//!
//! High-level tree:
//! * `ports` — boundary contracts: the security-context provider, chain
//!   builder / private-key locator, and an injectable clock.
//! * `domain` — options, certificates and fingerprints, verdicts, alert
//!   codes and the pure failure→alert mapping.
//! * `application::negotiation` — the credential cache, validator,
//!   selector, alert generator and the [`HandshakeEngine`] state machine.
//!
//! A caller constructs a shared [`CredentialCache`], builds
//! [`NegotiationOptions`] for a session, then feeds inbound bytes through
//! [`HandshakeEngine::advance`] until it reports a terminal outcome.

pub mod application;
pub mod domain;
pub mod ports;

#[doc(hidden)]
pub mod test_support;

pub use application::negotiation::{
    AlertGenerator, CancelFlag, CertificateValidator, CredentialCache, CredentialIdentity,
    CredentialKey, CredentialSelector, EngineState, FailureReason, HandshakeEngine,
    NegotiatedSession, NegotiationError, NegotiationOutcome, NegotiationStatus, Selection,
};
pub use domain::{
    AlertCode, CallbackError, Certificate, EncryptionPolicy, Fingerprint, HandshakeRole,
    NegotiationOptions, OptionsError, PeerCertificateVerdict, PolicyErrors, PrivateKeyBytes,
    ProtocolVersions, RevocationMode, SelectionQuery, alert_for_policy_errors,
};
pub use ports::{
    ChainBuilder, ChainPolicy, ChainReport, ChainStatus, Clock, ContextStatus, ContextStep,
    Credential, CredentialRequest, ExpectedUsage, NullPrivateKeyLocator, PrivateKeyLocator,
    ProviderError, RawContext, RawCredential, SecurityContext, SecurityContextProvider,
    StreamSizes, SystemClock,
};
