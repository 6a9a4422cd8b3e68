//! Certificate store boundary ports: chain building and private-key lookup.
//!
//! Chain construction, revocation fetching and X.509 parsing live outside
//! this crate. The negotiation engine only consumes the *result* of a chain
//! build — the ordered elements plus a set of status flags — and folds those
//! flags into its policy decision.
//!
//! Contract notes:
//! - `build_chain` never fails. A chain that cannot be completed degrades to
//!   a non-empty [`ChainStatus`] (partial chain, untrusted root, ...).
//! - The root element is excluded from revocation checking; root revocation
//!   is not checkable in general and implementations MUST NOT flag it.
//! - When [`ChainPolicy::trust_anchors`] is set, trust is restricted to that
//!   custom set instead of the system trust store.

use std::time::SystemTime;

use crate::domain::certificate::Certificate;
use crate::domain::options::RevocationMode;

/// Extended-key-usage expectation applied during a chain build.
///
/// Role-swapped by the validator: a client validates the peer against
/// `ServerAuth`, a server against `ClientAuth`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedUsage {
    /// Peer must be valid for server authentication.
    ServerAuth,
    /// Peer must be valid for client authentication.
    ClientAuth,
}

/// Policy inputs for one chain build.
#[derive(Debug, Clone)]
pub struct ChainPolicy<'a> {
    /// Revocation checking mode for non-root elements.
    pub revocation: RevocationMode,
    /// Extended-key-usage the leaf must satisfy.
    pub expected_usage: ExpectedUsage,
    /// Custom trust anchors replacing the system store, when supplied.
    pub trust_anchors: Option<&'a [Certificate]>,
}

/// Status flags accumulated while building a chain.
///
/// A clear (all-false) status means the chain verified under the given
/// policy. The flag set mirrors the distinctions the alert mapping needs;
/// anything an implementation cannot classify lands in `bad_signature` or
/// `invalid_extension` as appropriate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainStatus {
    /// Chain terminates in a root that is not trusted.
    pub untrusted_root: bool,
    /// Chain could not be completed up to a self-signed root.
    pub partial_chain: bool,
    /// Chain contains a cycle.
    pub cyclic: bool,
    /// An element is revoked.
    pub revoked: bool,
    /// Revocation status could not be determined (offline source).
    pub revocation_offline: bool,
    /// An element is not yet within its validity period.
    pub not_yet_valid: bool,
    /// An element is past its validity period.
    pub expired: bool,
    /// Element validity periods are not properly nested.
    pub not_time_nested: bool,
    /// The leaf is not valid for the expected usage.
    pub not_valid_for_usage: bool,
    /// A signature in the chain did not verify.
    pub bad_signature: bool,
    /// A critical extension could not be processed.
    pub invalid_extension: bool,
    /// Policy-constraints processing failed.
    pub invalid_policy_constraints: bool,
    /// A required issuance policy is absent.
    pub no_issuance_policy: bool,
}

impl ChainStatus {
    /// True when no flag is raised.
    pub fn is_clear(&self) -> bool {
        *self == Self::default()
    }

    /// Fold another status into this one (flag-wise or).
    pub fn merge(&self, other: &Self) -> Self {
        Self {
            untrusted_root: self.untrusted_root || other.untrusted_root,
            partial_chain: self.partial_chain || other.partial_chain,
            cyclic: self.cyclic || other.cyclic,
            revoked: self.revoked || other.revoked,
            revocation_offline: self.revocation_offline || other.revocation_offline,
            not_yet_valid: self.not_yet_valid || other.not_yet_valid,
            expired: self.expired || other.expired,
            not_time_nested: self.not_time_nested || other.not_time_nested,
            not_valid_for_usage: self.not_valid_for_usage || other.not_valid_for_usage,
            bad_signature: self.bad_signature || other.bad_signature,
            invalid_extension: self.invalid_extension || other.invalid_extension,
            invalid_policy_constraints: self.invalid_policy_constraints
                || other.invalid_policy_constraints,
            no_issuance_policy: self.no_issuance_policy || other.no_issuance_policy,
        }
    }
}

/// Outcome of a chain build: the elements (leaf first, root last) and the
/// folded status flags.
#[derive(Debug, Clone, Default)]
pub struct ChainReport {
    /// Chain elements ordered leaf → root. Contains at least the leaf when a
    /// build was attempted; empty when no peer certificate was presented.
    pub elements: Vec<Certificate>,
    /// Folded status over all elements.
    pub status: ChainStatus,
}

impl ChainReport {
    /// Report for the no-certificate case.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Earliest `NotAfter` across the chain elements, if any.
    pub fn min_not_after(&self) -> Option<SystemTime> {
        self.elements.iter().map(|c| c.not_after).min()
    }
}

/// Chain-building collaborator.
pub trait ChainBuilder: Send + Sync {
    /// Build and evaluate a trust chain for `leaf` under `policy`.
    ///
    /// Never fails; degraded builds surface through [`ChainReport::status`].
    fn build_chain(&self, leaf: &Certificate, policy: &ChainPolicy<'_>) -> ChainReport;
}

/// Capability interface for locating a private-key-bearing certificate
/// object for a candidate, replacing inline OS-store branching. Platform
/// implementations are selected at startup.
pub trait PrivateKeyLocator: Send + Sync {
    /// Return a concrete certificate carrying an accessible private key for
    /// `candidate`, or `None` when no such object exists.
    fn find_with_private_key(&self, candidate: &Certificate) -> Option<Certificate>;
}

/// Locator that never finds a key; useful where the candidate objects are
/// expected to carry their keys directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPrivateKeyLocator;

impl PrivateKeyLocator for NullPrivateKeyLocator {
    fn find_with_private_key(&self, _candidate: &Certificate) -> Option<Certificate> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::leaf_certificate;
    use std::time::Duration;

    #[test]
    fn default_status_is_clear() {
        assert!(ChainStatus::default().is_clear());
        let status = ChainStatus {
            revoked: true,
            ..Default::default()
        };
        assert!(!status.is_clear());
    }

    #[test]
    fn merge_is_flag_wise_or() {
        let a = ChainStatus {
            expired: true,
            ..Default::default()
        };
        let b = ChainStatus {
            untrusted_root: true,
            ..Default::default()
        };
        let merged = a.merge(&b);
        assert!(merged.expired && merged.untrusted_root);
        assert!(!merged.revoked);
    }

    #[test]
    fn min_not_after_picks_earliest_element() {
        let mut leaf = leaf_certificate("a.test");
        let mut issuer = leaf_certificate("ca.test");
        leaf.not_after = SystemTime::UNIX_EPOCH + Duration::from_secs(2_000);
        issuer.not_after = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let report = ChainReport {
            elements: vec![leaf, issuer],
            status: ChainStatus::default(),
        };
        assert_eq!(
            report.min_not_after(),
            Some(SystemTime::UNIX_EPOCH + Duration::from_secs(1_000))
        );
        assert_eq!(ChainReport::empty().min_not_after(), None);
    }
}
