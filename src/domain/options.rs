//! Session configuration: role, policy knobs, and caller-supplied callbacks.
//!
//! A [`NegotiationOptions`] value is fixed at session creation and never
//! mutated afterwards. Construction goes through the `client` / `server`
//! constructors plus `with_*` chainers; [`NegotiationOptions::validate`]
//! rejects contradictory configurations before any wire byte is processed.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::domain::certificate::Certificate;
use crate::domain::verdict::PolicyErrors;
use crate::ports::chain::ChainReport;

/// Endpoint role for the negotiation. Fixed at session creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeRole {
    /// Initiates the handshake and validates the server's certificate.
    Client,
    /// Accepts the handshake and may challenge for a client certificate.
    Server,
}

/// Set of protocol versions a session is willing to negotiate.
///
/// Part of the credential cache key: credentials acquired for different
/// version sets are never shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtocolVersions {
    /// TLS 1.2 enabled.
    pub tls12: bool,
    /// TLS 1.3 enabled.
    pub tls13: bool,
}

impl ProtocolVersions {
    /// TLS 1.3 only.
    pub fn tls13_only() -> Self {
        Self {
            tls12: false,
            tls13: true,
        }
    }

    /// True when no version is enabled.
    pub fn is_empty(&self) -> bool {
        !self.tls12 && !self.tls13
    }
}

impl Default for ProtocolVersions {
    fn default() -> Self {
        Self {
            tls12: true,
            tls13: true,
        }
    }
}

/// Record-protection requirement for the negotiated session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum EncryptionPolicy {
    /// Encryption is mandatory (default).
    #[default]
    RequireEncryption,
    /// Null ciphers are tolerated if the peer insists.
    AllowNoEncryption,
    /// Authentication-only operation is requested.
    NoEncryption,
}

/// Revocation checking mode applied during chain building.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RevocationMode {
    /// Skip revocation checking entirely (default).
    #[default]
    NoCheck,
    /// Check revocation against online sources.
    Online,
    /// Check revocation against cached/offline sources only.
    Offline,
}

impl RevocationMode {
    /// True when any revocation checking is performed.
    pub fn checks_revocation(&self) -> bool {
        !matches!(self, Self::NoCheck)
    }
}

/// Error raised by a caller-supplied callback.
///
/// Callback failures abort the handshake and propagate to the caller
/// unmodified; they are never converted into a negotiation status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct CallbackError(pub String);

impl CallbackError {
    /// Wrap a callback failure message.
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Inputs handed to a local-certificate selection callback.
#[derive(Debug)]
pub struct SelectionQuery<'a> {
    /// Host the client is connecting to, or the requested server name.
    pub target_host: Option<&'a str>,
    /// Statically configured candidate certificates.
    pub candidates: &'a [Certificate],
    /// The peer's certificate, when already known.
    pub peer_certificate: Option<&'a Certificate>,
    /// Issuer names the peer declared acceptable; empty means unrestricted.
    pub acceptable_issuers: &'a [String],
}

/// Remote-certificate validation callback.
///
/// When present, its boolean result is authoritative and overrides the
/// computed policy-error set entirely. An `Err` aborts the handshake.
pub type ValidationCallback = Arc<
    dyn Fn(Option<&Certificate>, &ChainReport, &PolicyErrors) -> Result<bool, CallbackError>
        + Send
        + Sync,
>;

/// Local-certificate selection callback. A `None` result with a non-empty
/// candidate collection defers selection to an explicit challenge; it does
/// not mean "anonymous".
pub type SelectionCallback = Arc<dyn Fn(&SelectionQuery<'_>) -> Option<Certificate> + Send + Sync>;

/// Server-certificate resolution by requested host name.
pub type HostCertificateResolver = Arc<dyn Fn(&str) -> Option<Certificate> + Send + Sync>;

/// Contradictory or incomplete session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionsError {
    /// Server role without any certificate source.
    #[error("server role requires a certificate, a selection callback, or a host resolver")]
    NoServerCertificate,
    /// Target host supplied for a server-role session.
    #[error("target host is only meaningful for the client role")]
    TargetHostOnServer,
    /// Host resolver supplied for a client-role session.
    #[error("host certificate resolver is only meaningful for the server role")]
    ResolverOnClient,
    /// Empty protocol version set.
    #[error("at least one protocol version must be enabled")]
    NoVersionsEnabled,
}

/// Immutable-after-start negotiation configuration.
#[derive(Clone)]
pub struct NegotiationOptions {
    /// Endpoint role.
    pub role: HandshakeRole,
    /// Enabled protocol versions.
    pub versions: ProtocolVersions,
    /// Statically configured local certificates (zero or more).
    pub local_certificates: Vec<Certificate>,
    /// Local-certificate selection callback.
    pub selection_callback: Option<SelectionCallback>,
    /// Remote-certificate validation callback.
    pub validation_callback: Option<ValidationCallback>,
    /// Server-certificate resolver by requested host name.
    pub host_resolver: Option<HostCertificateResolver>,
    /// Revocation checking mode for peer validation.
    pub revocation: RevocationMode,
    /// Record-protection requirement.
    pub encryption_policy: EncryptionPolicy,
    /// Host name the client expects the server certificate to match.
    pub target_host: Option<String>,
    /// Custom trust anchors restricting trust to this set.
    pub trust_anchors: Option<Vec<Certificate>>,
    /// Send the trusted-issuer list during the handshake.
    pub send_trust_list: bool,
    /// Whether the role's policy requires the peer to present a certificate.
    pub require_peer_certificate: bool,
}

impl NegotiationOptions {
    /// Client-role options targeting `host`. The peer certificate is
    /// required by default.
    pub fn client(host: impl Into<String>) -> Self {
        Self {
            role: HandshakeRole::Client,
            versions: ProtocolVersions::default(),
            local_certificates: Vec::new(),
            selection_callback: None,
            validation_callback: None,
            host_resolver: None,
            revocation: RevocationMode::default(),
            encryption_policy: EncryptionPolicy::default(),
            target_host: Some(host.into()),
            trust_anchors: None,
            send_trust_list: false,
            require_peer_certificate: true,
        }
    }

    /// Server-role options. A client certificate is not required unless
    /// [`NegotiationOptions::require_peer_certificate`] is raised.
    pub fn server() -> Self {
        Self {
            role: HandshakeRole::Server,
            versions: ProtocolVersions::default(),
            local_certificates: Vec::new(),
            selection_callback: None,
            validation_callback: None,
            host_resolver: None,
            revocation: RevocationMode::default(),
            encryption_policy: EncryptionPolicy::default(),
            target_host: None,
            trust_anchors: None,
            send_trust_list: false,
            require_peer_certificate: false,
        }
    }

    /// Add local certificates.
    pub fn with_certificates(mut self, certificates: Vec<Certificate>) -> Self {
        self.local_certificates = certificates;
        self
    }

    /// Install a selection callback.
    pub fn with_selection_callback(mut self, callback: SelectionCallback) -> Self {
        self.selection_callback = Some(callback);
        self
    }

    /// Install a validation callback.
    pub fn with_validation_callback(mut self, callback: ValidationCallback) -> Self {
        self.validation_callback = Some(callback);
        self
    }

    /// Install a server-certificate host resolver.
    pub fn with_host_resolver(mut self, resolver: HostCertificateResolver) -> Self {
        self.host_resolver = Some(resolver);
        self
    }

    /// Set the revocation checking mode.
    pub fn with_revocation(mut self, mode: RevocationMode) -> Self {
        self.revocation = mode;
        self
    }

    /// Restrict trust to a custom anchor set.
    pub fn with_trust_anchors(mut self, anchors: Vec<Certificate>) -> Self {
        self.trust_anchors = Some(anchors);
        self
    }

    /// Require the peer to present a certificate.
    pub fn with_peer_certificate_required(mut self) -> Self {
        self.require_peer_certificate = true;
        self
    }

    /// Check the configuration for contradictions.
    ///
    /// # Errors
    /// Returns the first [`OptionsError`] found; a server-role configuration
    /// without any certificate source fails here, before any handshake byte
    /// is processed.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.versions.is_empty() {
            return Err(OptionsError::NoVersionsEnabled);
        }
        match self.role {
            HandshakeRole::Client => {
                if self.host_resolver.is_some() {
                    return Err(OptionsError::ResolverOnClient);
                }
            }
            HandshakeRole::Server => {
                if self.target_host.is_some() {
                    return Err(OptionsError::TargetHostOnServer);
                }
                if self.local_certificates.is_empty()
                    && self.selection_callback.is_none()
                    && self.host_resolver.is_none()
                {
                    return Err(OptionsError::NoServerCertificate);
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for NegotiationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NegotiationOptions")
            .field("role", &self.role)
            .field("versions", &self.versions)
            .field("local_certificates", &self.local_certificates.len())
            .field("selection_callback", &self.selection_callback.is_some())
            .field("validation_callback", &self.validation_callback.is_some())
            .field("host_resolver", &self.host_resolver.is_some())
            .field("revocation", &self.revocation)
            .field("encryption_policy", &self.encryption_policy)
            .field("target_host", &self.target_host)
            .field("send_trust_list", &self.send_trust_list)
            .field("require_peer_certificate", &self.require_peer_certificate)
            .finish()
    }
}
