//! Process-wide credential cache.
//!
//! Acquiring a provider credential is expensive; sessions negotiated under
//! an identical policy and identity share one. The cache is the only
//! structure shared across sessions, so it is also the only one carrying
//! cross-session synchronization: a single mutex around the key→entry map,
//! held for map operations only. No handshake blocks on another handshake's
//! acquisition — a miss simply proceeds to acquire independently, and the
//! last writer wins on insert races.
//!
//! Expiry is lazy: an expired entry is evicted by the lookup that finds it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::SystemTime;

use tracing::{debug, trace};

use crate::domain::certificate::Fingerprint;
use crate::domain::options::{EncryptionPolicy, HandshakeRole, NegotiationOptions, ProtocolVersions};
use crate::ports::provider::Credential;

/// Identity half of a cache key: a concrete certificate or the anonymous
/// sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialIdentity {
    /// No local certificate bound.
    Anonymous,
    /// Bound to the certificate with this fingerprint.
    Certificate(Fingerprint),
}

/// Full cache key. Two sessions whose keys compare equal may share one
/// credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CredentialKey {
    pub identity: CredentialIdentity,
    pub versions: ProtocolVersions,
    pub role: HandshakeRole,
    pub encryption_policy: EncryptionPolicy,
    pub check_revocation: bool,
    pub send_trust_list: bool,
}

impl CredentialKey {
    /// Key for `options` with the given identity (`None` = anonymous).
    pub fn for_options(options: &NegotiationOptions, identity: Option<Fingerprint>) -> Self {
        Self {
            identity: match identity {
                Some(fp) => CredentialIdentity::Certificate(fp),
                None => CredentialIdentity::Anonymous,
            },
            versions: options.versions,
            role: options.role,
            encryption_policy: options.encryption_policy,
            check_revocation: options.revocation.checks_revocation(),
            send_trust_list: options.send_trust_list,
        }
    }
}

struct CacheEntry {
    credential: Credential,
    expires_at: SystemTime,
}

/// Shared cache of acquired credentials, keyed by identity and policy.
///
/// Constructed explicitly and passed by reference into every engine; tests
/// inject a fresh instance to isolate cache state.
#[derive(Default)]
pub struct CredentialCache {
    entries: Mutex<HashMap<CredentialKey, CacheEntry>>,
}

impl CredentialCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a live credential for `key`, evicting it if expired.
    ///
    /// A returned clone shares the underlying credential (conceptual
    /// reference-count increment). A miss is not an error — it is the cue to
    /// acquire a fresh credential.
    pub fn try_get(&self, key: &CredentialKey, now: SystemTime) -> Option<Credential> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get(key) {
            if entry.expires_at > now {
                trace!(identity = ?key.identity, "credential cache hit");
                return Some(entry.credential.clone());
            }
            debug!(identity = ?key.identity, "evicting expired cached credential");
            entries.remove(key);
        }
        None
    }

    /// Store a credential under `key`, replacing any existing entry.
    ///
    /// An already-expired credential is never stored; the existing entry (if
    /// any) is left in place in that case.
    pub fn insert(
        &self,
        key: CredentialKey,
        credential: Credential,
        expires_at: SystemTime,
        now: SystemTime,
    ) {
        if expires_at <= now {
            debug!(identity = ?key.identity, "refusing to cache already-expired credential");
            return;
        }
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        trace!(identity = ?key.identity, "caching credential");
        entries.insert(
            key,
            CacheEntry {
                credential,
                expires_at,
            },
        );
    }

    /// Number of entries currently held (including not-yet-evicted expired
    /// ones).
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// True when the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry whose expiry is at or before `now`; returns how many
    /// were removed. Lazy eviction on lookup remains the primary path — this
    /// is a maintenance helper for long-lived processes.
    pub fn purge_expired(&self, now: SystemTime) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::provider::{Credential, RawCredential};
    use crate::test_support::{StubProvider, leaf_certificate};
    use std::sync::Arc;
    use std::time::Duration;

    fn key_for(options: &NegotiationOptions, identity: Option<Fingerprint>) -> CredentialKey {
        CredentialKey::for_options(options, identity)
    }

    fn credential(provider: &Arc<StubProvider>, raw: u64) -> Credential {
        Credential::new(provider.clone(), RawCredential(raw), None)
    }

    #[test]
    fn hit_returns_shared_credential() {
        let provider = Arc::new(StubProvider::new());
        let cache = CredentialCache::new();
        let options = NegotiationOptions::client("example.com");
        let key = key_for(&options, None);
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(100);

        cache.insert(
            key.clone(),
            credential(&provider, 1),
            now + Duration::from_secs(60),
            now,
        );
        let hit = cache.try_get(&key, now).expect("expected a cache hit");
        assert_eq!(hit.raw(), RawCredential(1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn expired_entry_is_evicted_on_lookup() {
        let provider = Arc::new(StubProvider::new());
        let cache = CredentialCache::new();
        let options = NegotiationOptions::client("example.com");
        let key = key_for(&options, None);
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(100);

        cache.insert(
            key.clone(),
            credential(&provider, 1),
            now + Duration::from_secs(10),
            now,
        );
        let later = now + Duration::from_secs(11);
        assert!(cache.try_get(&key, later).is_none());
        // The eviction is a side effect of the failed lookup.
        assert!(cache.is_empty());
    }

    #[test]
    fn expired_credential_is_never_stored() {
        let provider = Arc::new(StubProvider::new());
        let cache = CredentialCache::new();
        let options = NegotiationOptions::client("example.com");
        let key = key_for(&options, None);
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(100);

        cache.insert(
            key.clone(),
            credential(&provider, 1),
            now + Duration::from_secs(60),
            now,
        );
        cache.insert(key.clone(), credential(&provider, 2), now, now);
        let hit = cache.try_get(&key, now).expect("live entry must survive");
        assert_eq!(hit.raw(), RawCredential(1));
    }

    #[test]
    fn last_writer_wins_on_live_replacement() {
        let provider = Arc::new(StubProvider::new());
        let cache = CredentialCache::new();
        let options = NegotiationOptions::client("example.com");
        let key = key_for(&options, None);
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(100);

        cache.insert(
            key.clone(),
            credential(&provider, 1),
            now + Duration::from_secs(60),
            now,
        );
        cache.insert(
            key.clone(),
            credential(&provider, 2),
            now + Duration::from_secs(60),
            now,
        );
        let hit = cache.try_get(&key, now).expect("expected a cache hit");
        assert_eq!(hit.raw(), RawCredential(2));
    }

    #[test]
    fn keys_differ_by_identity_and_policy() {
        let options = NegotiationOptions::client("example.com");
        let cert = leaf_certificate("id.test");
        let anonymous = key_for(&options, None);
        let bound = key_for(&options, Some(cert.fingerprint()));
        assert_ne!(anonymous, bound);

        let mut revoking = options.clone();
        revoking.revocation = crate::domain::options::RevocationMode::Online;
        assert_ne!(anonymous, key_for(&revoking, None));
    }

    #[test]
    fn purge_removes_only_expired_entries() {
        let provider = Arc::new(StubProvider::new());
        let cache = CredentialCache::new();
        let options = NegotiationOptions::client("example.com");
        let cert = leaf_certificate("id.test");
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(100);

        cache.insert(
            key_for(&options, None),
            credential(&provider, 1),
            now + Duration::from_secs(5),
            now,
        );
        cache.insert(
            key_for(&options, Some(cert.fingerprint())),
            credential(&provider, 2),
            now + Duration::from_secs(500),
            now,
        );
        let removed = cache.purge_expired(now + Duration::from_secs(10));
        assert_eq!(removed, 1);
        assert_eq!(cache.len(), 1);
    }
}
