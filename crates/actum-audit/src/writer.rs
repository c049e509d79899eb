use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use actum_core::{AuditEvent, AuditStore, ChainSignature, ChainTail, PendingEvent};

use crate::chain::ChainSigner;
use crate::error::{AuditError, AuditResult};

pub const DEFAULT_QUEUE_DEPTH: usize = 256;

enum WriterCommand {
    Commit {
        pending: PendingEvent,
        reply: oneshot::Sender<AuditResult<AuditEvent>>,
    },
}

/// Handle to the audit writer.
///
/// The writer is the only component that assigns sequence numbers or
/// touches the chain tail. It runs on its own thread and drains a bounded
/// command queue one commit at a time; the store is called synchronously
/// there. A queued commit runs to completion even if the caller stops
/// waiting for the reply.
#[derive(Clone)]
pub struct AuditWriter {
    tx: mpsc::Sender<WriterCommand>,
}

struct WriterState {
    store: Arc<dyn AuditStore>,
    signer: Arc<ChainSigner>,
    tail: Option<ChainTail>,
}

impl AuditWriter {
    /// Start the writer, resuming from the store's current tail.
    pub fn spawn(
        store: Arc<dyn AuditStore>,
        signer: Arc<ChainSigner>,
        queue_depth: usize,
    ) -> AuditResult<Self> {
        let tail = store.tail()?;
        tracing::info!(
            resume_from = ?tail.as_ref().map(|t| t.sequence),
            "starting audit writer"
        );

        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let state = WriterState {
            store,
            signer,
            tail,
        };
        std::thread::Builder::new()
            .name("actum-audit-writer".to_string())
            .spawn(move || state.run(rx))
            .map_err(|e| AuditError::Storage(format!("failed to start audit writer: {}", e)))?;

        Ok(Self { tx })
    }

    /// Chain and persist a pending event. On `WriteFailure` the event is
    /// gone; nothing was committed and the tail did not move.
    pub async fn commit(&self, pending: PendingEvent) -> AuditResult<AuditEvent> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(WriterCommand::Commit { pending, reply })
            .await
            .map_err(|_| AuditError::WriterClosed)?;
        rx.await.map_err(|_| AuditError::WriterClosed)?
    }
}

impl WriterState {
    fn run(mut self, mut rx: mpsc::Receiver<WriterCommand>) {
        while let Some(command) = rx.blocking_recv() {
            match command {
                WriterCommand::Commit { pending, reply } => {
                    let event_id = pending.event_id.clone();
                    let result = self.append(pending);
                    if reply.send(result).is_err() {
                        tracing::debug!(event_id = %event_id, "commit caller went away");
                    }
                }
            }
        }
        tracing::info!("audit writer stopped");
    }

    fn append(&mut self, pending: PendingEvent) -> AuditResult<AuditEvent> {
        let (sequence, previous_signature) = match &self.tail {
            Some(t) => (t.sequence + 1, t.signature.clone()),
            None => (0, ChainSignature::genesis()),
        };
        let signature = self
            .signer
            .sign_event(sequence, &previous_signature, &pending)?;

        let event = AuditEvent {
            event_id: pending.event_id,
            sequence,
            timestamp: pending.timestamp,
            user: pending.user,
            client_id: pending.client_id,
            input_type: pending.input_type,
            input_hash: pending.input_hash,
            decision: pending.decision,
            signature,
            previous_signature,
        };

        if let Err(e) = self.store.append(&event) {
            tracing::warn!(
                event_id = %event.event_id,
                sequence,
                error = %e,
                "audit store rejected event, discarding"
            );
            return Err(AuditError::WriteFailure(e.to_string()));
        }

        self.tail = Some(ChainTail {
            sequence,
            signature: event.signature.clone(),
        });
        tracing::info!(
            event_id = %event.event_id,
            sequence,
            decision = %event.decision.decision,
            risk_level = %event.decision.risk_level,
            "audit event committed"
        );
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory_store::InMemoryAuditStore;
    use crate::query::QueryParams;
    use crate::test_support::{pending, FlakyStore, SECRET};
    use crate::trail::{AuditTrail, TrailConfig};
    use actum_core::Action;

    fn writer(store: Arc<dyn AuditStore>) -> (AuditWriter, Arc<ChainSigner>) {
        let signer = Arc::new(ChainSigner::new(SECRET).unwrap());
        let writer = AuditWriter::spawn(store, Arc::clone(&signer), 8).unwrap();
        (writer, signer)
    }

    #[tokio::test]
    async fn test_first_event_links_to_genesis() {
        let store = Arc::new(InMemoryAuditStore::new());
        let (writer, signer) = writer(store.clone());

        let e0 = writer.commit(pending("alice", Action::Block)).await.unwrap();
        let e1 = writer.commit(pending("bob", Action::Allow)).await.unwrap();

        assert_eq!(e0.sequence, 0);
        assert!(e0.previous_signature.is_genesis());
        assert_eq!(e1.sequence, 1);
        assert_eq!(e1.previous_signature, e0.signature);
        signer.check_link(None, &e0).unwrap();
        signer.check_link(Some(&e0), &e1).unwrap();
        assert_eq!(store.len().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_write_failure_leaves_no_trace() {
        let store = Arc::new(FlakyStore::new());
        let trail = AuditTrail::open(
            store.clone(),
            ChainSigner::new(SECRET).unwrap(),
            TrailConfig::default(),
        )
        .unwrap();

        let e0 = trail.commit(pending("alice", Action::Flag)).await.unwrap();

        store.fail_next();
        let doomed = pending("mallory", Action::Block);
        let doomed_id = doomed.event_id.clone();
        let err = trail.commit(doomed).await.unwrap_err();
        assert!(matches!(err, AuditError::WriteFailure(_)));

        // Nothing of the failed commit is visible to readers.
        assert!(matches!(
            trail.get_event(&doomed_id),
            Err(AuditError::NotFound(_))
        ));
        let all = trail.query_events(QueryParams::default()).unwrap();
        assert_eq!(all, vec![e0.clone()]);
        let blocked = trail
            .query_events(QueryParams {
                decision: Some(Action::Block),
                ..QueryParams::default()
            })
            .unwrap();
        assert!(blocked.is_empty());
        let stats = trail.stats().unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.blocked, 0);

        // The tail did not move: the next event takes the failed slot.
        let e1 = trail.commit(pending("bob", Action::Allow)).await.unwrap();
        assert_eq!(e1.sequence, 1);
        assert_eq!(e1.previous_signature, e0.signature);
        trail.signer().check_link(Some(&e0), &e1).unwrap();
        assert!(trail.verify_chain().unwrap().valid);
    }

    #[tokio::test]
    async fn test_resumes_from_existing_tail() {
        let store: Arc<InMemoryAuditStore> = Arc::new(InMemoryAuditStore::new());
        let (first, _) = writer(store.clone());
        let e0 = first.commit(pending("alice", Action::Allow)).await.unwrap();
        drop(first);

        let (second, signer) = writer(store.clone());
        let e1 = second.commit(pending("bob", Action::Allow)).await.unwrap();
        assert_eq!(e1.sequence, 1);
        signer.check_link(Some(&e0), &e1).unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_commits_form_one_chain() {
        let store = Arc::new(InMemoryAuditStore::new());
        let (writer, signer) = writer(store.clone());

        let mut handles = Vec::new();
        for i in 0..64 {
            let writer = writer.clone();
            handles.push(tokio::spawn(async move {
                writer
                    .commit(pending(&format!("user-{}", i), Action::Flag))
                    .await
            }));
        }
        let mut sequences = Vec::new();
        for h in handles {
            sequences.push(h.await.unwrap().unwrap().sequence);
        }
        sequences.sort_unstable();
        assert_eq!(sequences, (0..64).collect::<Vec<u64>>());

        let events = store.scan(0, 100).unwrap();
        let mut previous: Option<&AuditEvent> = None;
        for e in &events {
            signer.check_link(previous, e).unwrap();
            previous = Some(e);
        }
    }
}
