//! Handshake engine: the round-trip negotiation state machine.
//!
//! Orchestrates credential selection and caching, the per-round provider
//! calls, peer-certificate validation and failure-to-alert mapping into a
//! single synchronous `advance` loop the caller drives with inbound bytes.
//!
//! States: `NotStarted → InProgress → {Done, Failed, Renegotiating}`;
//! `Renegotiating` loops back to `InProgress`. `Done` and `Failed` are
//! terminal — calling `advance` afterwards is a caller error.
//!
//! Error strategy: expected negotiation failures (credential acquisition,
//! rejected validation, protocol faults) are returned as a terminal
//! [`NegotiationStatus`] carrying a [`FailureReason`] and any alert bytes to
//! flush. `Err` is reserved for configuration errors, callback failures,
//! cancellation and misuse of a finished session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use tracing::{debug, trace, warn};

use crate::application::negotiation::alerts::AlertGenerator;
use crate::application::negotiation::cache::{CredentialCache, CredentialKey};
use crate::application::negotiation::errors::{FailureReason, NegotiationError};
use crate::application::negotiation::selector::CredentialSelector;
use crate::application::negotiation::validator::CertificateValidator;
use crate::domain::alert::AlertCode;
use crate::domain::certificate::Certificate;
use crate::domain::options::{HandshakeRole, NegotiationOptions, RevocationMode};
use crate::ports::chain::{ChainBuilder, ChainPolicy, ExpectedUsage, PrivateKeyLocator};
use crate::ports::clock::{Clock, SystemClock};
use crate::ports::provider::{
    ContextStatus, ContextStep, Credential, CredentialRequest, ProviderError, SecurityContext,
    SecurityContextProvider,
};

/// Lifetime of cached anonymous credentials, which carry no certificate to
/// derive an expiry from.
const ANONYMOUS_CREDENTIAL_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Caller-side abort signal.
///
/// Checked at `advance` entry and before each blocking sub-call; a
/// cancellation raised mid-provider-call takes effect on the next check.
/// After a cancelled handshake the session is torn down, not resumed.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    inner: Arc<AtomicBool>,
}

impl CancelFlag {
    /// Fresh, unraised flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag.
    pub fn cancel(&self) {
        self.inner.store(true, Ordering::SeqCst);
    }

    /// True once raised.
    pub fn is_cancelled(&self) -> bool {
        self.inner.load(Ordering::SeqCst)
    }
}

/// Coarse progress of a negotiation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No byte processed yet.
    NotStarted,
    /// Rounds are being exchanged.
    InProgress,
    /// The peer requested renegotiation; the next `advance` re-enters the
    /// loop with the credential step re-armed.
    Renegotiating,
    /// Handshake complete and peer accepted. Terminal.
    Done,
    /// Negotiation failed or was cancelled. Terminal.
    Failed,
}

/// Outcome classification of one `advance` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationOutcome {
    /// Send any outbound bytes and feed the peer's reply into `advance`.
    Continue,
    /// Negotiation complete; the session's negotiated parameters are
    /// recorded.
    Done,
    /// The peer requested renegotiation.
    Renegotiate,
    /// The provider's context expired; the caller should tear down.
    ContextExpired,
    /// The provider needs different credentials; calling `advance` again
    /// re-runs selection.
    CredentialsNeeded,
    /// Terminal failure; any attached outbound bytes are the fatal alert to
    /// flush before closing the transport.
    Error(FailureReason),
}

/// Result of one `advance` call: the outcome plus optional outbound bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationStatus {
    /// Outcome classification.
    pub outcome: NegotiationOutcome,
    /// Token bytes for the transport, when the round produced any.
    pub outbound: Option<Vec<u8>>,
}

impl NegotiationStatus {
    fn new(outcome: NegotiationOutcome, outbound: Option<Vec<u8>>) -> Self {
        Self { outcome, outbound }
    }
}

/// Final negotiated parameters recorded for the record-layer collaborator.
/// Obtained from the provider, never computed by this engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedSession {
    /// Per-record header overhead in bytes.
    pub header_size: usize,
    /// Per-record trailer overhead in bytes.
    pub trailer_size: usize,
    /// Largest application payload a single record may carry.
    pub max_record_payload: usize,
}

// Fresh acquisition awaiting a successful provider call before it may enter
// the cache.
struct PendingInsert {
    key: CredentialKey,
    leaf: Option<Certificate>,
    chain: Vec<Certificate>,
}

enum EnsureFailure {
    Cancelled,
    Acquisition(ProviderError),
}

/// Per-session negotiation engine.
///
/// Not safe for concurrent `advance` calls — `&mut self` enforces the
/// per-session serialization a request/response handshake implies. The
/// injected [`CredentialCache`] is the only cross-session shared state.
pub struct HandshakeEngine {
    options: NegotiationOptions,
    provider: Arc<dyn SecurityContextProvider>,
    chain_builder: Arc<dyn ChainBuilder>,
    selector: CredentialSelector,
    validator: CertificateValidator,
    alerts: AlertGenerator,
    cache: Arc<CredentialCache>,
    clock: Arc<dyn Clock>,
    state: EngineState,
    context: Option<SecurityContext>,
    credential: Option<Credential>,
    refresh_credentials: bool,
    force_fresh: bool,
    pending_insert: Option<PendingInsert>,
    negotiated: Option<NegotiatedSession>,
}

impl HandshakeEngine {
    /// Create a session using the system clock.
    ///
    /// # Errors
    /// Returns [`NegotiationError::Configuration`] for contradictory options
    /// — notably a server role without any certificate source — before any
    /// wire byte is processed.
    pub fn new(
        options: NegotiationOptions,
        provider: Arc<dyn SecurityContextProvider>,
        chain_builder: Arc<dyn ChainBuilder>,
        key_locator: Arc<dyn PrivateKeyLocator>,
        cache: Arc<CredentialCache>,
    ) -> Result<Self, NegotiationError> {
        Self::with_clock(
            options,
            provider,
            chain_builder,
            key_locator,
            cache,
            Arc::new(SystemClock),
        )
    }

    /// Create a session with an injected clock (cache-expiry tests).
    ///
    /// # Errors
    /// Same contract as [`HandshakeEngine::new`].
    pub fn with_clock(
        options: NegotiationOptions,
        provider: Arc<dyn SecurityContextProvider>,
        chain_builder: Arc<dyn ChainBuilder>,
        key_locator: Arc<dyn PrivateKeyLocator>,
        cache: Arc<CredentialCache>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, NegotiationError> {
        options.validate()?;
        debug!(role = ?options.role, "negotiation session created");
        Ok(Self {
            selector: CredentialSelector::new(chain_builder.clone(), key_locator),
            validator: CertificateValidator::new(chain_builder.clone()),
            alerts: AlertGenerator::new(provider.clone()),
            options,
            provider,
            chain_builder,
            cache,
            clock,
            state: EngineState::NotStarted,
            context: None,
            credential: None,
            refresh_credentials: false,
            force_fresh: false,
            pending_insert: None,
            negotiated: None,
        })
    }

    /// Current session state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Negotiated record-layer parameters, available once `Done`.
    pub fn negotiated(&self) -> Option<&NegotiatedSession> {
        self.negotiated.as_ref()
    }

    /// Feed inbound handshake bytes (empty on the client's first call) and
    /// obtain the next outbound token or a terminal outcome.
    ///
    /// # Errors
    /// - [`NegotiationError::InvalidState`] once the session reached `Done`
    ///   or `Failed`.
    /// - [`NegotiationError::Cancelled`] when `cancel` is raised; the
    ///   session is torn down.
    /// - [`NegotiationError::Callback`] when a caller-supplied validation
    ///   callback fails; propagated unmodified, session torn down.
    pub fn advance(
        &mut self,
        inbound: &[u8],
        cancel: &CancelFlag,
    ) -> Result<NegotiationStatus, NegotiationError> {
        if matches!(self.state, EngineState::Done | EngineState::Failed) {
            return Err(NegotiationError::InvalidState);
        }
        if cancel.is_cancelled() {
            self.teardown();
            return Err(NegotiationError::Cancelled);
        }
        match self.state {
            EngineState::NotStarted => self.transition(EngineState::InProgress),
            EngineState::Renegotiating => {
                self.refresh_credentials = true;
                self.transition(EngineState::InProgress);
            }
            _ => {}
        }

        if self.credential.is_none() || self.refresh_credentials {
            if let Err(failure) = self.ensure_credentials(cancel) {
                return self.surface_ensure_failure(failure);
            }
            self.refresh_credentials = false;
        }

        // Drive the provider; a client whose speculative credential guess is
        // rejected on the very first call gets exactly one fresh retry.
        let mut retried = false;
        let step = loop {
            if cancel.is_cancelled() {
                self.teardown();
                return Err(NegotiationError::Cancelled);
            }
            let first_call = self.context.is_none();
            let step = match self.drive_provider(inbound) {
                Ok(step) => step,
                Err(e) => return Ok(self.terminal_failure(FailureReason::Protocol(e))),
            };
            if self.context.is_none() {
                self.context = Some(SecurityContext::new(self.provider.clone(), step.context));
            }
            if step.status == ContextStatus::CredentialsNeeded
                && self.options.role == HandshakeRole::Client
                && first_call
                && !retried
            {
                retried = true;
                debug!("initial credential guess rejected; retrying once with fresh acquisition");
                self.credential = None;
                self.pending_insert = None;
                self.force_fresh = true;
                if let Err(failure) = self.ensure_credentials(cancel) {
                    return self.surface_ensure_failure(failure);
                }
                continue;
            }
            break step;
        };

        // A fresh acquisition enters the cache only after the provider
        // accepted it; a rejected credential must not pollute the cache.
        if step.status != ContextStatus::CredentialsNeeded {
            self.commit_pending_insert();
        }

        match step.status {
            ContextStatus::Continue => Ok(NegotiationStatus::new(
                NegotiationOutcome::Continue,
                step.outbound,
            )),
            ContextStatus::CredentialsNeeded => {
                self.refresh_credentials = true;
                Ok(NegotiationStatus::new(
                    NegotiationOutcome::CredentialsNeeded,
                    step.outbound,
                ))
            }
            ContextStatus::Renegotiate => {
                debug!("peer requested renegotiation");
                self.transition(EngineState::Renegotiating);
                Ok(NegotiationStatus::new(
                    NegotiationOutcome::Renegotiate,
                    step.outbound,
                ))
            }
            ContextStatus::ContextExpired => Ok(NegotiationStatus::new(
                NegotiationOutcome::ContextExpired,
                step.outbound,
            )),
            ContextStatus::Done => self.complete(step, cancel),
        }
    }

    fn complete(
        &mut self,
        step: ContextStep,
        cancel: &CancelFlag,
    ) -> Result<NegotiationStatus, NegotiationError> {
        let peer = self
            .context
            .as_ref()
            .and_then(|ctx| self.provider.peer_certificate(ctx.raw()));
        let verdict = match self.validator.validate(peer.as_ref(), &self.options, cancel) {
            Ok(verdict) => verdict,
            Err(e) => {
                // Callback failures and cancellation propagate unmodified;
                // the session is unusable either way.
                self.teardown();
                return Err(e);
            }
        };
        if !verdict.accepted {
            return Ok(self.terminal_failure(FailureReason::ValidationRejected(Box::new(verdict))));
        }
        let sizes = match &self.context {
            Some(ctx) => match self.provider.query_sizes(ctx.raw()) {
                Ok(sizes) => sizes,
                Err(e) => return Ok(self.terminal_failure(FailureReason::Protocol(e))),
            },
            None => {
                return Ok(self.terminal_failure(FailureReason::Protocol(
                    ProviderError::Internal("handshake completed without a context".into()),
                )));
            }
        };
        self.negotiated = Some(NegotiatedSession {
            header_size: sizes.header,
            trailer_size: sizes.trailer,
            max_record_payload: sizes.max_payload,
        });
        self.transition(EngineState::Done);
        debug!(
            header = sizes.header,
            trailer = sizes.trailer,
            max_payload = sizes.max_payload,
            "negotiation complete"
        );
        Ok(NegotiationStatus::new(
            NegotiationOutcome::Done,
            step.outbound,
        ))
    }

    /// Run credential selection and bind the result, preferring the shared
    /// cache over a fresh provider acquisition.
    fn ensure_credentials(&mut self, cancel: &CancelFlag) -> Result<(), EnsureFailure> {
        if cancel.is_cancelled() {
            return Err(EnsureFailure::Cancelled);
        }
        let now = self.clock.now();
        let selection = match self.options.role {
            HandshakeRole::Client => {
                let (issuers, peer) = match &self.context {
                    Some(ctx) => (
                        self.provider.acceptable_issuers(ctx.raw()),
                        self.provider.peer_certificate(ctx.raw()),
                    ),
                    None => (Vec::new(), None),
                };
                self.selector.select_client(
                    &self.options,
                    self.credential.is_some(),
                    peer.as_ref(),
                    &issuers,
                )
            }
            HandshakeRole::Server => {
                let name = self
                    .context
                    .as_ref()
                    .and_then(|ctx| self.provider.requested_server_name(ctx.raw()));
                self.selector.select_server(&self.options, name.as_deref())
            }
        };
        let restart = selection.is_restart_attempt();
        let (leaf, chain) = selection.into_parts();
        let key =
            CredentialKey::for_options(&self.options, leaf.as_ref().map(Certificate::fingerprint));

        let mut force_fresh = std::mem::take(&mut self.force_fresh);
        if restart
            && leaf.is_some()
            && !force_fresh
            && self
                .cache
                .try_get(&CredentialKey::for_options(&self.options, None), now)
                .is_some()
        {
            // Peers that do not renegotiate a live session would never see
            // the selected certificate if the anonymous guess were reused.
            debug!("cached anonymous credential would shadow the selected certificate; acquiring fresh");
            force_fresh = true;
        }
        if !force_fresh && let Some(cached) = self.cache.try_get(&key, now) {
            trace!(anonymous = cached.is_anonymous(), "reusing cached credential");
            self.credential = Some(cached);
            self.pending_insert = None;
            return Ok(());
        }

        if cancel.is_cancelled() {
            return Err(EnsureFailure::Cancelled);
        }
        let request = CredentialRequest {
            role: self.options.role,
            versions: self.options.versions,
            certificate: leaf.as_ref(),
            encryption_policy: self.options.encryption_policy,
            send_trust_list: self.options.send_trust_list,
        };
        let raw = self
            .provider
            .acquire_credential(&request)
            .map_err(EnsureFailure::Acquisition)?;
        let identity = leaf.as_ref().map(Certificate::fingerprint);
        debug!(anonymous = identity.is_none(), "acquired fresh credential");
        self.credential = Some(Credential::new(self.provider.clone(), raw, identity));
        self.pending_insert = Some(PendingInsert { key, leaf, chain });
        Ok(())
    }

    fn surface_ensure_failure(
        &mut self,
        failure: EnsureFailure,
    ) -> Result<NegotiationStatus, NegotiationError> {
        match failure {
            EnsureFailure::Cancelled => {
                self.teardown();
                Err(NegotiationError::Cancelled)
            }
            EnsureFailure::Acquisition(e) => {
                Ok(self.terminal_failure(FailureReason::CredentialAcquisition(e)))
            }
        }
    }

    fn drive_provider(&self, inbound: &[u8]) -> Result<ContextStep, ProviderError> {
        let credential = match &self.credential {
            Some(credential) => credential.raw(),
            None => return Err(ProviderError::Internal("no credential bound".into())),
        };
        let context = self.context.as_ref().map(SecurityContext::raw);
        match self.options.role {
            HandshakeRole::Client => self.provider.initialize_context(
                credential,
                context,
                self.options.target_host.as_deref(),
                inbound,
            ),
            HandshakeRole::Server => self.provider.accept_context(credential, context, inbound),
        }
    }

    fn commit_pending_insert(&mut self) {
        let Some(pending) = self.pending_insert.take() else {
            return;
        };
        let Some(credential) = &self.credential else {
            return;
        };
        let now = self.clock.now();
        let expires_at = match &pending.leaf {
            Some(leaf) => self.credential_expiry(leaf, &pending.chain, now),
            None => now + ANONYMOUS_CREDENTIAL_TTL,
        };
        self.cache
            .insert(pending.key, credential.clone(), expires_at, now);
    }

    /// Earliest `NotAfter` across the certificate and its intermediate
    /// chain, re-deriving the chain when the supplied one is absent or has
    /// already run out — a long-lived cached context can outlast an
    /// intermediate's validity.
    fn credential_expiry(
        &self,
        leaf: &Certificate,
        supplied_chain: &[Certificate],
        now: SystemTime,
    ) -> SystemTime {
        let min_over = |elements: &[Certificate]| {
            elements
                .iter()
                .map(|c| c.not_after)
                .fold(leaf.not_after, SystemTime::min)
        };
        let supplied = min_over(supplied_chain);
        if !supplied_chain.is_empty() && supplied > now {
            return supplied;
        }
        let policy = ChainPolicy {
            revocation: RevocationMode::NoCheck,
            expected_usage: match self.options.role {
                HandshakeRole::Client => ExpectedUsage::ClientAuth,
                HandshakeRole::Server => ExpectedUsage::ServerAuth,
            },
            trust_anchors: None,
        };
        let report = self.chain_builder.build_chain(leaf, &policy);
        min_over(&report.elements)
    }

    fn terminal_failure(&mut self, reason: FailureReason) -> NegotiationStatus {
        let code = match &reason {
            FailureReason::ValidationRejected(verdict) => {
                verdict.alert.unwrap_or(AlertCode::BadCertificate)
            }
            FailureReason::Protocol(_) => AlertCode::HandshakeFailure,
            FailureReason::CredentialAcquisition(_) | FailureReason::AlertFailed { .. } => {
                AlertCode::InternalError
            }
        };
        let mut reason = reason;
        let outbound = match &self.context {
            Some(ctx) => match self.alerts.build_fatal_alert(ctx, code) {
                Ok(bytes) => Some(bytes),
                Err(cause) => {
                    reason = FailureReason::AlertFailed {
                        original: Box::new(reason),
                        cause,
                    };
                    None
                }
            },
            None => None,
        };
        warn!(%reason, "negotiation failed");
        self.teardown();
        NegotiationStatus::new(NegotiationOutcome::Error(reason), outbound)
    }

    /// Release the session's credential reference and destroy the context.
    /// Runs on every terminal exit path, including cancellation.
    fn teardown(&mut self) {
        self.credential = None;
        self.context = None;
        self.pending_insert = None;
        self.transition(EngineState::Failed);
    }

    fn transition(&mut self, next: EngineState) {
        if self.state != next {
            trace!(from = ?self.state, to = ?next, "state transition");
            self.state = next;
        }
    }
}
