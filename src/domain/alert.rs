//! TLS alert descriptions (RFC 8446 section 6) and the failure→alert
//! mapping used when a negotiation is abandoned.

use crate::domain::verdict::PolicyErrors;
use crate::ports::chain::ChainStatus;

/// Alert description codes this engine emits or recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AlertCode {
    CloseNotify = 0,
    HandshakeFailure = 40,
    BadCertificate = 42,
    UnsupportedCertificate = 43,
    CertificateRevoked = 44,
    CertificateExpired = 45,
    CertificateUnknown = 46,
    UnknownCa = 48,
    InternalError = 80,
}

impl AlertCode {
    /// Convert from a raw u8 byte.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::CloseNotify),
            40 => Some(Self::HandshakeFailure),
            42 => Some(Self::BadCertificate),
            43 => Some(Self::UnsupportedCertificate),
            44 => Some(Self::CertificateRevoked),
            45 => Some(Self::CertificateExpired),
            46 => Some(Self::CertificateUnknown),
            48 => Some(Self::UnknownCa),
            80 => Some(Self::InternalError),
            _ => None,
        }
    }

    /// Convert to raw u8 byte.
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Map a validation failure to the alert code sent before teardown.
///
/// Pure function over the computed policy errors and the residual chain
/// status; first matching rule wins. Grouping is intentionally coarse so the
/// alert leaks no more detail than the protocol already reveals.
pub fn alert_for_policy_errors(errors: PolicyErrors, chain: ChainStatus) -> AlertCode {
    if chain.untrusted_root || chain.partial_chain || chain.cyclic {
        AlertCode::UnknownCa
    } else if chain.revoked || chain.revocation_offline {
        AlertCode::CertificateRevoked
    } else if chain.not_yet_valid || chain.expired || chain.not_time_nested {
        AlertCode::CertificateExpired
    } else if chain.not_valid_for_usage {
        AlertCode::UnsupportedCertificate
    } else if chain.bad_signature
        || chain.invalid_extension
        || chain.invalid_policy_constraints
        || chain.no_issuance_policy
    {
        AlertCode::BadCertificate
    } else if errors.name_mismatch {
        AlertCode::BadCertificate
    } else if errors.not_available {
        AlertCode::CertificateUnknown
    } else {
        AlertCode::BadCertificate
    }
}
