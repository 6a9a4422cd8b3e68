//! Local-credential selection.
//!
//! Decides which local certificate (if any) a session presents, implementing
//! the restart-vs-full-handshake heuristic that keeps repeated connections
//! cheap. Selection never fails: a candidate without a usable private key
//! degrades to anonymous and the peer decides whether that is acceptable.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::domain::certificate::Certificate;
use crate::domain::options::{NegotiationOptions, RevocationMode, SelectionQuery};
use crate::ports::chain::{ChainBuilder, ChainPolicy, ExpectedUsage, PrivateKeyLocator};

/// Outcome of a selection pass.
///
/// The distinction between [`Selection::DeferredAnonymous`] and
/// [`Selection::Anonymous`] is deliberate: a selection callback returning
/// nothing while candidates exist means "no session restart, but a
/// certificate may still be supplied when explicitly challenged" — it must
/// not collapse into the plain anonymous case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// A caller callback (selection or host resolver) chose this certificate.
    CallbackChosen(Certificate),
    /// Speculative session-restart pick: the single configured certificate,
    /// likely but not guaranteed to be accepted.
    RestartCandidate(Certificate),
    /// Mid-handshake challenge pick; carries the chain derived while issuer
    /// matching so expiry computation can reuse it.
    IssuerMatched {
        certificate: Certificate,
        chain: Vec<Certificate>,
    },
    /// Statically configured pick without restart semantics (server role).
    Configured(Certificate),
    /// Callback declined while candidates remain configured; defer until the
    /// peer challenges explicitly.
    DeferredAnonymous,
    /// Nothing to present.
    Anonymous,
}

impl Selection {
    /// The selected certificate, when one was chosen.
    pub fn certificate(&self) -> Option<&Certificate> {
        match self {
            Selection::CallbackChosen(c)
            | Selection::RestartCandidate(c)
            | Selection::Configured(c) => Some(c),
            Selection::IssuerMatched { certificate, .. } => Some(certificate),
            Selection::DeferredAnonymous | Selection::Anonymous => None,
        }
    }

    /// True for the speculative session-restart pick.
    pub fn is_restart_attempt(&self) -> bool {
        matches!(self, Selection::RestartCandidate(_))
    }

    /// Split into the selected certificate and any chain derived during
    /// selection.
    pub fn into_parts(self) -> (Option<Certificate>, Vec<Certificate>) {
        match self {
            Selection::CallbackChosen(c)
            | Selection::RestartCandidate(c)
            | Selection::Configured(c) => (Some(c), Vec::new()),
            Selection::IssuerMatched { certificate, chain } => (Some(certificate), chain),
            Selection::DeferredAnonymous | Selection::Anonymous => (None, Vec::new()),
        }
    }
}

/// Chooses the local certificate to present for a session.
pub struct CredentialSelector {
    chain_builder: Arc<dyn ChainBuilder>,
    key_locator: Arc<dyn PrivateKeyLocator>,
}

impl CredentialSelector {
    /// Selector bound to its chain-building and key-lookup collaborators.
    pub fn new(
        chain_builder: Arc<dyn ChainBuilder>,
        key_locator: Arc<dyn PrivateKeyLocator>,
    ) -> Self {
        Self {
            chain_builder,
            key_locator,
        }
    }

    /// Client-role selection, in priority order: selection callback; single
    /// configured certificate as a speculative restart; issuer matching
    /// against the peer's acceptable-issuer list once a credential already
    /// exists (a mid-handshake challenge); otherwise anonymous.
    pub fn select_client(
        &self,
        options: &NegotiationOptions,
        have_credential: bool,
        peer_certificate: Option<&Certificate>,
        acceptable_issuers: &[String],
    ) -> Selection {
        if let Some(callback) = &options.selection_callback {
            let query = SelectionQuery {
                target_host: options.target_host.as_deref(),
                candidates: &options.local_certificates,
                peer_certificate,
                acceptable_issuers,
            };
            return match callback(&query) {
                Some(chosen) => self.resolve_key(Selection::CallbackChosen(chosen)),
                None if !options.local_certificates.is_empty() => {
                    trace!("selection callback declined; deferring until challenged");
                    Selection::DeferredAnonymous
                }
                None => Selection::Anonymous,
            };
        }

        if !have_credential {
            if let [only] = options.local_certificates.as_slice() {
                debug!(subject = %only.subject, "attempting session restart with configured certificate");
                return self.resolve_key(Selection::RestartCandidate(only.clone()));
            }
            return Selection::Anonymous;
        }

        // The peer challenged for a certificate mid-handshake.
        self.match_issuers(&options.local_certificates, acceptable_issuers)
    }

    /// Server-role selection: selection callback, then the host resolver for
    /// the requested server name, then the first configured certificate.
    pub fn select_server(
        &self,
        options: &NegotiationOptions,
        requested_server_name: Option<&str>,
    ) -> Selection {
        if let Some(callback) = &options.selection_callback {
            let query = SelectionQuery {
                target_host: requested_server_name,
                candidates: &options.local_certificates,
                peer_certificate: None,
                acceptable_issuers: &[],
            };
            return match callback(&query) {
                Some(chosen) => self.resolve_key(Selection::CallbackChosen(chosen)),
                None if !options.local_certificates.is_empty() => Selection::DeferredAnonymous,
                None => Selection::Anonymous,
            };
        }
        if let (Some(resolver), Some(name)) = (&options.host_resolver, requested_server_name)
            && let Some(chosen) = resolver(name)
        {
            debug!(host = name, "server certificate resolved by host name");
            return self.resolve_key(Selection::CallbackChosen(chosen));
        }
        match options.local_certificates.first() {
            Some(first) => self.resolve_key(Selection::Configured(first.clone())),
            None => Selection::Anonymous,
        }
    }

    /// First configured candidate whose chain carries an issuer from the
    /// peer's acceptable list. First match wins — configuration order is the
    /// preference order. An empty list leaves every candidate eligible.
    fn match_issuers(&self, candidates: &[Certificate], issuers: &[String]) -> Selection {
        for candidate in candidates {
            let policy = ChainPolicy {
                // Issuer matching needs chain shape only; revocation waits
                // until the peer certificate is validated.
                revocation: RevocationMode::NoCheck,
                expected_usage: ExpectedUsage::ClientAuth,
                trust_anchors: None,
            };
            let report = self.chain_builder.build_chain(candidate, &policy);
            let eligible = issuers.is_empty()
                || report
                    .elements
                    .iter()
                    .any(|element| issuers.iter().any(|i| i == &element.issuer));
            if eligible {
                debug!(subject = %candidate.subject, "candidate satisfies acceptable-issuer list");
                return self.resolve_key(Selection::IssuerMatched {
                    certificate: candidate.clone(),
                    chain: report.elements,
                });
            }
        }
        debug!("no candidate satisfies the acceptable-issuer list; continuing anonymous");
        Selection::Anonymous
    }

    /// Locate a private-key-bearing object for the chosen candidate: the
    /// candidate itself when it carries a key, otherwise the locator's
    /// store lookup. No key found means the handshake proceeds anonymous
    /// rather than failing outright.
    fn resolve_key(&self, selection: Selection) -> Selection {
        let Some(candidate) = selection.certificate() else {
            return selection;
        };
        if candidate.has_private_key() {
            return selection;
        }
        match self.key_locator.find_with_private_key(candidate) {
            Some(concrete) => match selection {
                Selection::CallbackChosen(_) => Selection::CallbackChosen(concrete),
                Selection::RestartCandidate(_) => Selection::RestartCandidate(concrete),
                Selection::Configured(_) => Selection::Configured(concrete),
                Selection::IssuerMatched { chain, .. } => Selection::IssuerMatched {
                    certificate: concrete,
                    chain,
                },
                other => other,
            },
            None => {
                debug!(
                    subject = %candidate.subject,
                    "no private key available for selected certificate; proceeding anonymous"
                );
                Selection::Anonymous
            }
        }
    }
}
