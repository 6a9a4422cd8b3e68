#![allow(clippy::unwrap_used)]

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::domain::alert::AlertCode;
use crate::domain::certificate::{Certificate, Fingerprint, PrivateKeyBytes};
use crate::ports::chain::{ChainBuilder, ChainPolicy, ChainReport, ChainStatus, PrivateKeyLocator};
use crate::ports::clock::Clock;
use crate::ports::provider::{
    ContextStatus, ContextStep, CredentialRequest, ProviderError, RawContext, RawCredential,
    SecurityContextProvider, StreamSizes,
};

/// Certificate metadata view with a one-year validity and no private key.
pub fn leaf_certificate(name: &str) -> Certificate {
    Certificate {
        der: format!("der:{name}").into_bytes(),
        subject: name.to_string(),
        issuer: "CN=Test CA".to_string(),
        subject_alt_names: vec![name.to_string()],
        not_before: UNIX_EPOCH,
        not_after: SystemTime::now() + Duration::from_secs(365 * 24 * 60 * 60),
        server_auth: true,
        client_auth: true,
        private_key: None,
    }
}

/// Same view with an attached private key.
pub fn certificate_with_key(name: &str) -> Certificate {
    let mut cert = leaf_certificate(name);
    cert.private_key = Some(PrivateKeyBytes(b"test-private-key".to_vec()));
    cert
}

/// Scripted security-context provider.
///
/// Each context call pops the next [`ContextStatus`] from the script
/// (defaulting to `Continue`) and emits a one-byte outbound token carrying
/// the round number. Every interaction is recorded for assertions.
#[derive(Default)]
pub struct StubProvider {
    script: Mutex<VecDeque<ContextStatus>>,
    acquired: Mutex<Vec<Option<Fingerprint>>>,
    released: Mutex<Vec<RawCredential>>,
    disposed: Mutex<Vec<RawContext>>,
    peer: Mutex<Option<Certificate>>,
    issuers: Mutex<Vec<String>>,
    server_name: Mutex<Option<String>>,
    fail_alert: AtomicBool,
    fail_acquire: AtomicBool,
    next_token: AtomicU64,
    round: AtomicU64,
    client_rounds: AtomicUsize,
    server_rounds: AtomicUsize,
}

impl StubProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the statuses successive context calls will report.
    pub fn script(&self, statuses: impl IntoIterator<Item = ContextStatus>) {
        self.script.lock().unwrap().extend(statuses);
    }

    /// Certificate reported as the peer's.
    pub fn set_peer(&self, certificate: Certificate) {
        *self.peer.lock().unwrap() = Some(certificate);
    }

    /// Acceptable-issuer list reported from the context.
    pub fn set_issuers(&self, issuers: Vec<String>) {
        *self.issuers.lock().unwrap() = issuers;
    }

    /// SNI name reported from the context.
    pub fn set_server_name(&self, name: &str) {
        *self.server_name.lock().unwrap() = Some(name.to_string());
    }

    /// Make `build_alert` fail.
    pub fn fail_alerts(&self) {
        self.fail_alert.store(true, Ordering::SeqCst);
    }

    /// Make `acquire_credential` fail.
    pub fn fail_acquisitions(&self) {
        self.fail_acquire.store(true, Ordering::SeqCst);
    }

    /// Identities passed to `acquire_credential`, in call order.
    pub fn acquired(&self) -> Vec<Option<Fingerprint>> {
        self.acquired.lock().unwrap().clone()
    }

    pub fn released(&self) -> Vec<RawCredential> {
        self.released.lock().unwrap().clone()
    }

    pub fn disposed(&self) -> Vec<RawContext> {
        self.disposed.lock().unwrap().clone()
    }

    /// Total context rounds driven (both roles).
    pub fn rounds(&self) -> usize {
        self.client_rounds.load(Ordering::SeqCst) + self.server_rounds.load(Ordering::SeqCst)
    }

    pub fn server_rounds(&self) -> usize {
        self.server_rounds.load(Ordering::SeqCst)
    }

    fn step(&self, context: Option<RawContext>) -> ContextStep {
        let status = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ContextStatus::Continue);
        let round = self.round.fetch_add(1, Ordering::SeqCst);
        ContextStep {
            status,
            outbound: Some(vec![round as u8]),
            context: context
                .unwrap_or_else(|| RawContext(self.next_token.fetch_add(1, Ordering::SeqCst) + 100)),
        }
    }
}

impl SecurityContextProvider for StubProvider {
    fn acquire_credential(
        &self,
        request: &CredentialRequest<'_>,
    ) -> Result<RawCredential, ProviderError> {
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(ProviderError::CredentialRejected);
        }
        self.acquired
            .lock()
            .unwrap()
            .push(request.certificate.map(Certificate::fingerprint));
        Ok(RawCredential(self.next_token.fetch_add(1, Ordering::SeqCst)))
    }

    fn initialize_context(
        &self,
        _credential: RawCredential,
        context: Option<RawContext>,
        _target_host: Option<&str>,
        _inbound: &[u8],
    ) -> Result<ContextStep, ProviderError> {
        self.client_rounds.fetch_add(1, Ordering::SeqCst);
        Ok(self.step(context))
    }

    fn accept_context(
        &self,
        _credential: RawCredential,
        context: Option<RawContext>,
        _inbound: &[u8],
    ) -> Result<ContextStep, ProviderError> {
        self.server_rounds.fetch_add(1, Ordering::SeqCst);
        Ok(self.step(context))
    }

    fn query_sizes(&self, _context: RawContext) -> Result<StreamSizes, ProviderError> {
        Ok(StreamSizes {
            header: 5,
            trailer: 16,
            max_payload: 16 * 1024,
        })
    }

    fn build_alert(&self, _context: RawContext, code: AlertCode) -> Result<Vec<u8>, ProviderError> {
        if self.fail_alert.load(Ordering::SeqCst) {
            return Err(ProviderError::AlertUnavailable);
        }
        Ok(vec![2, code.to_u8()])
    }

    fn peer_certificate(&self, _context: RawContext) -> Option<Certificate> {
        self.peer.lock().unwrap().clone()
    }

    fn acceptable_issuers(&self, _context: RawContext) -> Vec<String> {
        self.issuers.lock().unwrap().clone()
    }

    fn requested_server_name(&self, _context: RawContext) -> Option<String> {
        self.server_name.lock().unwrap().clone()
    }

    fn release_credential(&self, credential: RawCredential) {
        self.released.lock().unwrap().push(credential);
    }

    fn dispose_context(&self, context: RawContext) {
        self.disposed.lock().unwrap().push(context);
    }
}

/// Chain builder returning the leaf plus configured intermediates under a
/// fixed status.
#[derive(Default)]
pub struct StubChainBuilder {
    status: Mutex<ChainStatus>,
    intermediates: Mutex<Vec<Certificate>>,
    builds: AtomicUsize,
}

impl StubChainBuilder {
    /// Builder reporting a clear status.
    pub fn clean() -> Self {
        Self::default()
    }

    pub fn with_status(status: ChainStatus) -> Self {
        Self {
            status: Mutex::new(status),
            ..Default::default()
        }
    }

    pub fn set_intermediates(&self, certificates: Vec<Certificate>) {
        *self.intermediates.lock().unwrap() = certificates;
    }

    /// Number of chain builds performed.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl ChainBuilder for StubChainBuilder {
    fn build_chain(&self, leaf: &Certificate, _policy: &ChainPolicy<'_>) -> ChainReport {
        self.builds.fetch_add(1, Ordering::SeqCst);
        let mut elements = vec![leaf.clone()];
        elements.extend(self.intermediates.lock().unwrap().iter().cloned());
        ChainReport {
            elements,
            status: *self.status.lock().unwrap(),
        }
    }
}

/// Key locator resolving candidates by fingerprint against a fixed set of
/// key-bearing certificates.
#[derive(Default)]
pub struct MapKeyLocator {
    by_fingerprint: HashMap<Fingerprint, Certificate>,
}

impl MapKeyLocator {
    pub fn with(certificates: Vec<Certificate>) -> Self {
        Self {
            by_fingerprint: certificates
                .into_iter()
                .map(|c| (c.fingerprint(), c))
                .collect(),
        }
    }
}

impl PrivateKeyLocator for MapKeyLocator {
    fn find_with_private_key(&self, candidate: &Certificate) -> Option<Certificate> {
        self.by_fingerprint.get(&candidate.fingerprint()).cloned()
    }
}

/// Clock whose time only moves when a test says so.
pub struct ManualClock {
    now: Mutex<SystemTime>,
}

impl ManualClock {
    pub fn at(now: SystemTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap()
    }
}
