//! Peer-certificate validation against policy and caller callback.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::application::negotiation::engine::CancelFlag;
use crate::application::negotiation::errors::NegotiationError;
use crate::domain::alert::alert_for_policy_errors;
use crate::domain::certificate::Certificate;
use crate::domain::options::{HandshakeRole, NegotiationOptions};
use crate::domain::verdict::{PeerCertificateVerdict, PolicyErrors};
use crate::ports::chain::{ChainBuilder, ChainPolicy, ChainReport, ExpectedUsage};

/// Session-scoped validator: builds a trust chain for the presented peer
/// certificate, folds policy, and defers to the caller's callback when one
/// is installed.
///
/// Expected policy failures never surface as `Err` — they produce a rejected
/// [`PeerCertificateVerdict`]. `Err` is reserved for callback failures and
/// cancellation.
pub struct CertificateValidator {
    chain_builder: Arc<dyn ChainBuilder>,
    // Accepted verdict for the last validated peer DER. Re-presenting the
    // identical certificate within the session returns this without
    // re-invoking the callback.
    remembered: Option<(Vec<u8>, PeerCertificateVerdict)>,
}

impl CertificateValidator {
    /// Validator bound to a chain builder.
    pub fn new(chain_builder: Arc<dyn ChainBuilder>) -> Self {
        Self {
            chain_builder,
            remembered: None,
        }
    }

    /// Judge the peer's certificate under `options`.
    ///
    /// Steps: absent certificate → `NotAvailable` (fatal only when the
    /// role's policy requires one); chain build with role-swapped expected
    /// usage and optional custom trust anchors; host-name comparison for the
    /// client role; residual chain flags fold into `ChainErrors`; a
    /// caller-supplied callback, when present, overrides the computed error
    /// set entirely.
    ///
    /// # Errors
    /// - [`NegotiationError::Callback`] when the callback fails; the
    ///   remembered verdict is cleared so no partial state survives.
    /// - [`NegotiationError::Cancelled`] when `cancel` was raised before a
    ///   blocking step (chain build, callback).
    pub fn validate(
        &mut self,
        peer: Option<&Certificate>,
        options: &NegotiationOptions,
        cancel: &CancelFlag,
    ) -> Result<PeerCertificateVerdict, NegotiationError> {
        if let (Some(cert), Some((der, verdict))) = (peer, &self.remembered)
            && cert.der == *der
        {
            trace!("peer certificate unchanged; reusing accepted verdict");
            return Ok(verdict.clone());
        }

        let mut errors = PolicyErrors::default();
        let report = match peer {
            None => {
                errors.not_available = true;
                ChainReport::empty()
            }
            Some(cert) => {
                if cancel.is_cancelled() {
                    return Err(NegotiationError::Cancelled);
                }
                let policy = ChainPolicy {
                    revocation: options.revocation,
                    expected_usage: match options.role {
                        HandshakeRole::Client => ExpectedUsage::ServerAuth,
                        HandshakeRole::Server => ExpectedUsage::ClientAuth,
                    },
                    trust_anchors: options.trust_anchors.as_deref(),
                };
                let report = self.chain_builder.build_chain(cert, &policy);
                if !report.status.is_clear() {
                    errors.chain_errors = true;
                }
                if options.role == HandshakeRole::Client
                    && let Some(host) = &options.target_host
                    && !cert.matches_hostname(host)
                {
                    errors.name_mismatch = true;
                }
                report
            }
        };

        let accepted = match &options.validation_callback {
            Some(callback) => {
                if cancel.is_cancelled() {
                    return Err(NegotiationError::Cancelled);
                }
                match callback(peer, &report, &errors) {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        self.remembered = None;
                        return Err(NegotiationError::Callback(e));
                    }
                }
            }
            None => {
                errors.is_empty()
                    || (!options.require_peer_certificate && errors.only_not_available())
            }
        };

        let verdict = PeerCertificateVerdict {
            accepted,
            policy_errors: errors,
            chain_status: report.status,
            alert: if accepted {
                None
            } else {
                Some(alert_for_policy_errors(errors, report.status))
            },
        };
        if accepted && let Some(cert) = peer {
            self.remembered = Some((cert.der.clone(), verdict.clone()));
        }
        debug!(
            accepted,
            not_available = errors.not_available,
            name_mismatch = errors.name_mismatch,
            chain_errors = errors.chain_errors,
            "peer certificate verdict"
        );
        Ok(verdict)
    }
}
