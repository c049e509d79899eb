//! Actum audit trail
//!
//! Append-only, HMAC-chained record of every decision. A single writer owns
//! the chain tail; readers query committed events directly. Export replays
//! the chain from genesis so a bundle is only ever produced for an event
//! whose history is intact.

pub mod chain;
pub mod error;
pub mod export;
pub mod in_memory_store;
pub mod overrides;
pub mod query;
pub mod trail;
pub mod writer;

#[cfg(feature = "sqlite")]
pub mod storage;

#[cfg(test)]
mod test_support;

pub use chain::{ChainSigner, MIN_SECRET_BYTES, SIGNATURE_PREFIX};
pub use error::{AuditError, AuditResult};
pub use export::{
    verify_bundle, ChainReport, ExportBundle, ExportMetadata, VerificationInstructions,
};
pub use in_memory_store::InMemoryAuditStore;
pub use overrides::OverrideRequest;
pub use query::{QueryLimits, QueryParams, DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT};
pub use trail::{AuditTrail, TrailConfig};
pub use writer::{AuditWriter, DEFAULT_QUEUE_DEPTH};

#[cfg(feature = "sqlite")]
pub use storage::SqliteAuditStore;
