/*
Negotiation data model: types + invariants, no I/O and no provider calls.

This layer is the single source of truth for the vocabulary the engine
speaks:

* `options` — immutable-after-start session configuration and the
  caller-supplied callback contracts.
* `certificate` — the parsed-metadata view of an X.509 certificate this
  crate operates on (parsing itself is an external concern), plus
  SHA-256 fingerprints.
* `verdict` — policy-error sets and the peer-certificate verdict.
* `alert` — TLS alert codes and the pure failure→alert mapping.

Everything here is deterministic and synchronous; anything touching the
security-context provider or the chain builder lives in `application`.
*/

pub mod alert;
pub mod certificate;
pub mod options;
pub mod verdict;

pub use alert::*;
pub use certificate::*;
pub use options::*;
pub use verdict::*;
