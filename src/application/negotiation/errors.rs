use thiserror::Error;

use crate::domain::options::{CallbackError, OptionsError};
use crate::domain::verdict::PeerCertificateVerdict;
use crate::ports::provider::ProviderError;

/// Errors the negotiation engine raises to its immediate caller.
///
/// Expected protocol and policy failures do NOT appear here — they travel as
/// [`FailureReason`] inside a terminal `NegotiationStatus`. This enum is
/// reserved for configuration mistakes, caller-requested cancellation,
/// misuse of a finished session, and errors raised by caller-supplied
/// callbacks (which propagate unmodified).
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("invalid negotiation configuration: {0}")]
    Configuration(#[from] OptionsError),

    #[error("user callback failed: {0}")]
    Callback(#[from] CallbackError),

    #[error("handshake was cancelled")]
    Cancelled,

    #[error("advance called on a session that already completed or failed")]
    InvalidState,
}

/// Reason a negotiation ended in a terminal failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    /// The provider could not bind a credential.
    #[error("credential acquisition failed: {0}")]
    CredentialAcquisition(ProviderError),

    /// The peer's certificate was rejected by policy or callback.
    #[error("peer certificate rejected by validation policy")]
    ValidationRejected(Box<PeerCertificateVerdict>),

    /// The provider reported malformed or unexpected handshake bytes.
    #[error("protocol failure: {0}")]
    Protocol(ProviderError),

    /// A failure occurred and the subsequent alert could not be produced.
    /// Distinguishes "we tried to alert and failed" from a peer reset.
    #[error("alert generation failed ({cause}) after: {original}")]
    AlertFailed {
        original: Box<FailureReason>,
        cause: ProviderError,
    },
}
