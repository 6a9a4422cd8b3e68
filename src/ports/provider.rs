//! Security-context provider boundary port.
//!
//! The negotiation engine never touches cryptographic primitives itself; it
//! drives an opaque provider (an OS security package, a TLS library, a test
//! stub) through credential acquisition and the per-round context calls, and
//! forwards whatever token bytes the provider produces. This module defines
//! that contract plus the owned resource wrappers ([`Credential`],
//! [`SecurityContext`]) the engine and the credential cache share.
//!
//! Invariants / Safety:
//! - `RawCredential` and `RawContext` are provider-scoped tokens. They carry
//!   no meaning outside the provider instance that issued them and MUST only
//!   be passed back to that instance.
//! - `release_credential` and `dispose_context` MUST be idempotent and MUST
//!   tolerate tokens whose setup never completed (a context abandoned after a
//!   failed first round is still disposed).
//! - A credential referenced by a live context MUST remain usable until the
//!   context is disposed; the ownership types below enforce the engine's side
//!   of that bargain by holding the [`Credential`] for the session lifetime.

use std::fmt;
use std::sync::Arc;

use crate::domain::alert::AlertCode;
use crate::domain::certificate::{Certificate, Fingerprint};
use crate::domain::options::{EncryptionPolicy, HandshakeRole, ProtocolVersions};

/// Opaque credential token issued by [`SecurityContextProvider::acquire_credential`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawCredential(pub u64);

/// Opaque in-progress/negotiated context token, created lazily by the first
/// `initialize_context` / `accept_context` call of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawContext(pub u64);

/// Provider-reported progress of one context call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStatus {
    /// More rounds are required; send any outbound bytes and feed the reply.
    Continue,
    /// The cryptographic handshake completed.
    Done,
    /// The peer requested renegotiation of an established session.
    Renegotiate,
    /// The provider's context outlived its validity and cannot continue.
    ContextExpired,
    /// The bound credential is unusable for this negotiation; the caller may
    /// re-acquire and retry.
    CredentialsNeeded,
}

/// Result of a single `initialize_context` / `accept_context` round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextStep {
    /// Progress classification for this round.
    pub status: ContextStatus,
    /// Token bytes to hand to the transport, if the round produced any.
    pub outbound: Option<Vec<u8>>,
    /// The context token (fresh on the first round, unchanged afterwards).
    pub context: RawContext,
}

/// Record-layer framing sizes negotiated by the provider.
///
/// Queried once on completion and recorded for the record-layer collaborator;
/// the engine itself never computes these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSizes {
    /// Bytes of per-record header overhead.
    pub header: usize,
    /// Bytes of per-record trailer overhead (MAC / AEAD tag).
    pub trailer: usize,
    /// Largest application payload a single record may carry.
    pub max_payload: usize,
}

/// Failures reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// No credential could be bound for the requested identity.
    #[error("provider could not bind a credential for the requested identity")]
    CredentialRejected,
    /// Inbound bytes were malformed or unexpected for the current state.
    #[error("malformed or unexpected handshake message")]
    ProtocolViolation,
    /// The provider could not produce the requested alert token.
    #[error("provider failed to produce an alert token")]
    AlertUnavailable,
    /// Any other provider-internal failure (stringified cause).
    #[error("internal provider failure: {0}")]
    Internal(String),
}

/// Identity and policy inputs for one credential acquisition.
#[derive(Debug, Clone)]
pub struct CredentialRequest<'a> {
    /// Role the credential will serve.
    pub role: HandshakeRole,
    /// Protocol versions the credential must cover.
    pub versions: ProtocolVersions,
    /// Selected local certificate, or `None` for an anonymous credential.
    pub certificate: Option<&'a Certificate>,
    /// Encryption policy the credential must honor.
    pub encryption_policy: EncryptionPolicy,
    /// Whether the trusted-issuer list is sent during the handshake.
    pub send_trust_list: bool,
}

/// Boundary contract for the opaque security-context provider.
///
/// Responsibilities:
/// - Bind local identities into credentials (`acquire_credential`).
/// - Advance the handshake one round at a time (`initialize_context` for the
///   client role, `accept_context` for the server role), returning a
///   [`ContextStep`].
/// - Expose negotiated facts about a completed or in-progress context:
///   framing sizes, the peer's certificate, the peer's acceptable-issuer
///   list, the requested server name.
/// - Produce wire bytes for a fatal alert (`build_alert`).
///
/// Error handling:
/// - Context calls return [`ProviderError`] for malformed input or internal
///   failure; `ContextStatus::CredentialsNeeded` is NOT an error, it asks the
///   engine to re-run credential selection.
/// - `release_credential` / `dispose_context` are infallible; a provider with
///   nothing to free simply ignores the token.
pub trait SecurityContextProvider: Send + Sync {
    /// Bind a credential for the requested identity and policy.
    ///
    /// # Errors
    /// Returns [`ProviderError::CredentialRejected`] when the identity cannot
    /// be bound (missing key, unsupported policy).
    fn acquire_credential(
        &self,
        request: &CredentialRequest<'_>,
    ) -> Result<RawCredential, ProviderError>;

    /// Client-role context call: consume `inbound` (empty on the first round)
    /// and produce the next step.
    ///
    /// # Errors
    /// Returns [`ProviderError::ProtocolViolation`] for malformed inbound
    /// bytes, [`ProviderError::Internal`] for provider faults.
    fn initialize_context(
        &self,
        credential: RawCredential,
        context: Option<RawContext>,
        target_host: Option<&str>,
        inbound: &[u8],
    ) -> Result<ContextStep, ProviderError>;

    /// Server-role context call: consume `inbound` and produce the next step.
    ///
    /// # Errors
    /// Same contract as [`SecurityContextProvider::initialize_context`].
    fn accept_context(
        &self,
        credential: RawCredential,
        context: Option<RawContext>,
        inbound: &[u8],
    ) -> Result<ContextStep, ProviderError>;

    /// Record framing sizes of a completed context.
    ///
    /// # Errors
    /// Returns an error when the context has not completed its handshake.
    fn query_sizes(&self, context: RawContext) -> Result<StreamSizes, ProviderError>;

    /// Produce the wire bytes of a fatal alert with the given code, queued as
    /// the context's next outbound message.
    ///
    /// # Errors
    /// Returns [`ProviderError::AlertUnavailable`] when the context cannot
    /// produce the token; callers surface that failure rather than silently
    /// closing.
    fn build_alert(&self, context: RawContext, code: AlertCode) -> Result<Vec<u8>, ProviderError>;

    /// The peer's leaf certificate, once the provider has seen it.
    fn peer_certificate(&self, context: RawContext) -> Option<Certificate>;

    /// Distinguished names of issuers the peer declared acceptable for a
    /// client certificate. Empty when the peer sent none.
    fn acceptable_issuers(&self, context: RawContext) -> Vec<String>;

    /// Server name the client requested (SNI), when the provider has parsed
    /// it out of the inbound flight. Meaningful for the server role only.
    fn requested_server_name(&self, _context: RawContext) -> Option<String> {
        None
    }

    /// Release one credential token. Idempotent.
    fn release_credential(&self, credential: RawCredential);

    /// Destroy one context token. Idempotent, safe on half-initialized
    /// contexts.
    fn dispose_context(&self, context: RawContext);
}

struct CredentialInner {
    provider: Arc<dyn SecurityContextProvider>,
    raw: RawCredential,
    identity: Option<Fingerprint>,
}

impl Drop for CredentialInner {
    fn drop(&mut self) {
        self.provider.release_credential(self.raw);
    }
}

/// Shared owned handle to an acquired provider credential.
///
/// Cloning increments the conceptual reference count (the cache and a session
/// may hold the same credential); the provider token is released when the
/// last clone drops.
#[derive(Clone)]
pub struct Credential {
    inner: Arc<CredentialInner>,
}

impl Credential {
    /// Wrap a freshly acquired provider token.
    ///
    /// `identity` is the fingerprint of the certificate the credential was
    /// bound to, or `None` for an anonymous credential.
    pub fn new(
        provider: Arc<dyn SecurityContextProvider>,
        raw: RawCredential,
        identity: Option<Fingerprint>,
    ) -> Self {
        Self {
            inner: Arc::new(CredentialInner {
                provider,
                raw,
                identity,
            }),
        }
    }

    /// The provider token to pass into context calls.
    pub fn raw(&self) -> RawCredential {
        self.inner.raw
    }

    /// Fingerprint of the bound certificate, if any.
    pub fn identity(&self) -> Option<&Fingerprint> {
        self.inner.identity.as_ref()
    }

    /// True when the credential was acquired without a local certificate.
    pub fn is_anonymous(&self) -> bool {
        self.inner.identity.is_none()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("raw", &self.inner.raw)
            .field("identity", &self.inner.identity)
            .finish()
    }
}

/// Owned, non-copyable handle to a session's in-progress or negotiated
/// cryptographic context.
///
/// Destroyed unconditionally on drop; the provider contract makes disposal
/// idempotent and safe on half-initialized handles.
pub struct SecurityContext {
    provider: Arc<dyn SecurityContextProvider>,
    raw: RawContext,
}

impl SecurityContext {
    /// Adopt a context token returned by the first provider round.
    pub fn new(provider: Arc<dyn SecurityContextProvider>, raw: RawContext) -> Self {
        Self { provider, raw }
    }

    /// The provider token to pass into subsequent context calls.
    pub fn raw(&self) -> RawContext {
        self.raw
    }
}

impl Drop for SecurityContext {
    fn drop(&mut self) {
        self.provider.dispose_context(self.raw);
    }
}

impl fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityContext")
            .field("raw", &self.raw)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{StubProvider, leaf_certificate};

    #[test]
    fn credential_releases_token_on_last_drop() {
        let provider = Arc::new(StubProvider::new());
        let cred = Credential::new(provider.clone(), RawCredential(7), None);
        let clone = cred.clone();
        drop(cred);
        assert!(provider.released().is_empty());
        drop(clone);
        assert_eq!(provider.released(), vec![RawCredential(7)]);
    }

    #[test]
    fn credential_identity_marks_anonymity() {
        let provider = Arc::new(StubProvider::new());
        let anon = Credential::new(provider.clone(), RawCredential(1), None);
        assert!(anon.is_anonymous());

        let cert = leaf_certificate("alpha.test");
        let bound = Credential::new(provider, RawCredential(2), Some(cert.fingerprint()));
        assert!(!bound.is_anonymous());
        assert_eq!(bound.identity(), Some(&cert.fingerprint()));
    }

    #[test]
    fn context_disposes_token_on_drop() {
        let provider = Arc::new(StubProvider::new());
        let ctx = SecurityContext::new(provider.clone(), RawContext(3));
        assert!(provider.disposed().is_empty());
        drop(ctx);
        assert_eq!(provider.disposed(), vec![RawContext(3)]);
    }
}
