use std::sync::Arc;

use actum_core::{AuditEvent, AuditStore, PendingEvent};

use crate::chain::ChainSigner;
use crate::error::AuditResult;
use crate::query::QueryLimits;
use crate::writer::{AuditWriter, DEFAULT_QUEUE_DEPTH};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailConfig {
    pub queue_depth: usize,
    pub limits: QueryLimits,
}

impl Default for TrailConfig {
    fn default() -> Self {
        Self {
            queue_depth: DEFAULT_QUEUE_DEPTH,
            limits: QueryLimits::default(),
        }
    }
}

/// The audit trail: one store, one signer, one writer.
///
/// Appends go through the writer. Reads, exports and verification go
/// straight to the store and only ever see committed events.
pub struct AuditTrail {
    pub(crate) store: Arc<dyn AuditStore>,
    pub(crate) signer: Arc<ChainSigner>,
    pub(crate) limits: QueryLimits,
    writer: AuditWriter,
}

impl AuditTrail {
    pub fn open(
        store: Arc<dyn AuditStore>,
        signer: ChainSigner,
        config: TrailConfig,
    ) -> AuditResult<Self> {
        let signer = Arc::new(signer);
        let writer =
            AuditWriter::spawn(Arc::clone(&store), Arc::clone(&signer), config.queue_depth)?;
        Ok(Self {
            store,
            signer,
            limits: config.limits,
            writer,
        })
    }

    /// Chain and persist a pending event.
    pub async fn commit(&self, pending: PendingEvent) -> AuditResult<AuditEvent> {
        self.writer.commit(pending).await
    }

    pub fn signer(&self) -> &ChainSigner {
        &self.signer
    }

    pub fn limits(&self) -> QueryLimits {
        self.limits
    }
}
