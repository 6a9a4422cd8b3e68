//! Certificate metadata view and fingerprints.
//!
//! X.509 parsing is out of scope for this crate; a [`Certificate`] carries
//! the raw DER plus the handful of pre-extracted fields negotiation needs
//! (names, validity window, usage flags, an optional private key). Equality
//! is defined over the DER bytes alone — two views of the same certificate
//! compare equal even when only one of them carries the key.

use std::fmt;
use std::time::SystemTime;

use sha2::{Digest, Sha256};
use zeroize::Zeroize;

/// Raw private-key bytes attached to a certificate object.
///
/// Wiped on drop. Never logged, never part of certificate equality.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct PrivateKeyBytes(pub Vec<u8>);

impl fmt::Debug for PrivateKeyBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKeyBytes(<{} bytes>)", self.0.len())
    }
}

/// SHA-256 digest of a certificate's DER encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Compute the fingerprint of a DER encoding.
    pub fn from_der(der: &[u8]) -> Self {
        let digest = Sha256::digest(der);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Eight hex chars identify a certificate well enough in logs.
        write!(
            f,
            "Fingerprint({:02x}{:02x}{:02x}{:02x}…)",
            self.0[0], self.0[1], self.0[2], self.0[3]
        )
    }
}

/// Parsed-metadata view of an X.509 certificate.
#[derive(Debug, Clone)]
pub struct Certificate {
    /// Raw DER encoding; the identity of the certificate.
    pub der: Vec<u8>,
    /// Subject common name.
    pub subject: String,
    /// Issuer distinguished name.
    pub issuer: String,
    /// DNS subject alternative names.
    pub subject_alt_names: Vec<String>,
    /// Start of the validity window.
    pub not_before: SystemTime,
    /// End of the validity window.
    pub not_after: SystemTime,
    /// Extended key usage: valid for server authentication.
    pub server_auth: bool,
    /// Extended key usage: valid for client authentication.
    pub client_auth: bool,
    /// Private key, when this object carries one.
    pub private_key: Option<PrivateKeyBytes>,
}

impl Certificate {
    /// SHA-256 fingerprint over the DER encoding.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::from_der(&self.der)
    }

    /// True when this object carries an accessible private key.
    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    /// Match `host` against the subject alternative names, falling back to
    /// the subject common name only when no SANs are present.
    ///
    /// Supports a single leftmost wildcard label (`*.example.com` matches
    /// `a.example.com` but not `b.a.example.com`). Comparison is ASCII
    /// case-insensitive; a trailing dot on the host is ignored.
    pub fn matches_hostname(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.');
        if host.is_empty() {
            return false;
        }
        if self.subject_alt_names.is_empty() {
            return name_matches(&self.subject, host);
        }
        self.subject_alt_names
            .iter()
            .any(|pattern| name_matches(pattern, host))
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

fn name_matches(pattern: &str, host: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix("*.") {
        match host.split_once('.') {
            Some((label, rest)) => !label.is_empty() && rest.eq_ignore_ascii_case(suffix),
            None => false,
        }
    } else {
        pattern.eq_ignore_ascii_case(host)
    }
}
