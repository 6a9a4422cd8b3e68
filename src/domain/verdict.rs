//! Policy-error sets and the peer-certificate verdict.

use crate::domain::alert::AlertCode;
use crate::ports::chain::ChainStatus;

/// Named reasons a peer certificate failed validation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PolicyErrors {
    /// No certificate was presented.
    pub not_available: bool,
    /// The certificate does not match the target host name.
    pub name_mismatch: bool,
    /// The trust chain carried residual status flags.
    pub chain_errors: bool,
}

impl PolicyErrors {
    /// True when no policy error is raised.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// True when the only raised error is the absent certificate.
    pub fn only_not_available(&self) -> bool {
        self.not_available && !self.name_mismatch && !self.chain_errors
    }
}

/// Outcome of validating the peer's certificate against policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerCertificateVerdict {
    /// Whether the peer is trusted.
    pub accepted: bool,
    /// Computed policy errors (informational when a callback overrode them).
    pub policy_errors: PolicyErrors,
    /// Residual chain-build status flags.
    pub chain_status: ChainStatus,
    /// Fatal alert to send when rejected.
    pub alert: Option<AlertCode>,
}

impl PeerCertificateVerdict {
    /// Clean accepted verdict.
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            policy_errors: PolicyErrors::default(),
            chain_status: ChainStatus::default(),
            alert: None,
        }
    }
}
