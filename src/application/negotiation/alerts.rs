//! Outbound fatal-alert production.
//!
//! The pure failure→alert mapping lives in `domain::alert`; this component
//! asks the security-context provider for the wire bytes of the chosen
//! alert, which become the engine's final outbound message before teardown.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::domain::alert::AlertCode;
use crate::ports::provider::{ProviderError, SecurityContext, SecurityContextProvider};

/// Produces fatal alert tokens through the provider.
pub struct AlertGenerator {
    provider: Arc<dyn SecurityContextProvider>,
}

impl AlertGenerator {
    /// Generator bound to a provider.
    pub fn new(provider: Arc<dyn SecurityContextProvider>) -> Self {
        Self { provider }
    }

    /// Build the wire bytes for a fatal alert of `code` on `context`.
    ///
    /// # Errors
    /// Surfaces the provider failure when the alert token cannot be
    /// produced; callers must be able to tell "we tried to alert and
    /// failed" from "the peer reset the connection".
    pub fn build_fatal_alert(
        &self,
        context: &SecurityContext,
        code: AlertCode,
    ) -> Result<Vec<u8>, ProviderError> {
        debug!(code = code.to_u8(), "building fatal alert token");
        match self.provider.build_alert(context.raw(), code) {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                warn!(code = code.to_u8(), error = %e, "provider failed to produce alert token");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::provider::RawContext;
    use crate::test_support::StubProvider;

    #[test]
    fn alert_bytes_come_from_the_provider() {
        let provider = Arc::new(StubProvider::new());
        let generator = AlertGenerator::new(provider.clone());
        let context = SecurityContext::new(provider, RawContext(1));
        let bytes = generator
            .build_fatal_alert(&context, AlertCode::UnknownCa)
            .unwrap();
        // The stub encodes a two-byte fatal alert: level 2, description.
        assert_eq!(bytes, vec![2, AlertCode::UnknownCa.to_u8()]);
    }

    #[test]
    fn provider_failure_is_surfaced_not_swallowed() {
        let provider = Arc::new(StubProvider::new());
        provider.fail_alerts();
        let generator = AlertGenerator::new(provider.clone());
        let context = SecurityContext::new(provider, RawContext(1));
        let err = generator
            .build_fatal_alert(&context, AlertCode::BadCertificate)
            .unwrap_err();
        assert_eq!(err, ProviderError::AlertUnavailable);
    }
}
