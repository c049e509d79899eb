use serde::{Deserialize, Serialize};

use actum_core::{AuditEvent, AuditOverride, ChainSignature, EventId, Timestamp};

use crate::chain::ChainSigner;
use crate::error::{AuditError, AuditResult};
use crate::trail::AuditTrail;

pub const EXPORT_VERSION: &str = "1.0";
pub const COMPLIANCE_FRAMEWORK: &str = "EU AI Act";
const VERIFY_PAGE: usize = 512;

/// Self-contained evidence for one committed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportBundle {
    pub event: AuditEvent,
    pub signature: ChainSignature,
    pub previous_signature: ChainSignature,
    /// Event at `sequence - 1`, so the link to it can be checked offline.
    /// Absent for the first event of the chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predecessor: Option<AuditEvent>,
    pub verification: VerificationInstructions,
    pub overrides: Vec<AuditOverride>,
    pub export_metadata: ExportMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationInstructions {
    pub algorithm: String,
    pub signature_format: String,
    pub signed_message: String,
    pub steps: Vec<String>,
}

impl VerificationInstructions {
    fn current() -> Self {
        Self {
            algorithm: "HMAC-SHA256".to_string(),
            signature_format: "hmac-sha256:<lowercase hex>".to_string(),
            signed_message: "\"actum-audit-event-v1\\n\" || sequence (u64 big-endian) || \
                             previous_signature (UTF-8) || JSON {event_id, timestamp, user, \
                             client_id, input_type, input_hash, decision}"
                .to_string(),
            steps: vec![
                "Obtain the audit signing secret from the operator of the engine.".to_string(),
                "Recompute the HMAC over the signed message built from `event`.".to_string(),
                "Compare it with `signature`; any difference means the event was altered."
                    .to_string(),
                "`previous_signature` must equal the signature of `predecessor`, or 64 zeros \
                 for sequence 0."
                    .to_string(),
                "`predecessor` is itself checked against its own signature; links further \
                 back need a full chain verification on the engine."
                    .to_string(),
                "Overrides are signed over their own fields, anchored to `signature`."
                    .to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub exported_at: String,
    pub export_version: String,
    pub compliance_framework: String,
    /// Events replayed from genesis before this bundle was produced.
    pub chain_verified_through: u64,
}

/// Result of replaying the chain from genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub valid: bool,
    pub events_checked: u64,
    pub head_sequence: Option<u64>,
    pub first_invalid: Option<u64>,
    pub reason: Option<String>,
}

impl AuditTrail {
    /// Replay the chain from genesis, stopping after `through` if given.
    fn replay(&self, through: Option<u64>) -> AuditResult<(ChainReport, Option<AuditEvent>)> {
        let mut previous: Option<AuditEvent> = None;
        let mut checked = 0u64;
        let mut next = 0u64;

        'pages: loop {
            let page = self.store.scan(next, VERIFY_PAGE)?;
            if page.is_empty() {
                break;
            }
            for event in page {
                if through.is_some_and(|t| event.sequence > t) {
                    break 'pages;
                }
                match self.signer.check_link(previous.as_ref(), &event) {
                    Ok(()) => {}
                    Err(AuditError::TamperDetected { sequence, reason }) => {
                        tracing::warn!(
                            sequence,
                            reason = %reason,
                            "audit chain verification failed"
                        );
                        let report = ChainReport {
                            valid: false,
                            events_checked: checked,
                            head_sequence: previous.as_ref().map(|p| p.sequence),
                            first_invalid: Some(sequence),
                            reason: Some(reason),
                        };
                        return Ok((report, previous));
                    }
                    Err(other) => return Err(other),
                }
                checked += 1;
                next = event.sequence + 1;
                previous = Some(event);
            }
        }

        let report = ChainReport {
            valid: true,
            events_checked: checked,
            head_sequence: previous.as_ref().map(|p| p.sequence),
            first_invalid: None,
            reason: None,
        };
        Ok((report, previous))
    }

    /// Replay the whole store and report the first broken link, if any.
    pub fn verify_chain(&self) -> AuditResult<ChainReport> {
        let (report, _) = self.replay(None)?;
        if report.valid {
            tracing::info!(events = report.events_checked, "audit chain verified");
        }
        Ok(report)
    }

    /// Build an export bundle. The chain is replayed from genesis through
    /// the event first; any broken link is `TamperDetected`.
    pub fn export_bundle(&self, event_id: &EventId) -> AuditResult<ExportBundle> {
        let event = self.get_event(event_id)?;
        let (report, last) = self.replay(Some(event.sequence))?;

        if let (Some(sequence), Some(reason)) = (report.first_invalid, report.reason.clone()) {
            return Err(AuditError::TamperDetected { sequence, reason });
        }
        if last.as_ref() != Some(&event) {
            tracing::warn!(
                event_id = %event_id,
                sequence = event.sequence,
                "event not reachable from genesis"
            );
            return Err(AuditError::TamperDetected {
                sequence: event.sequence,
                reason: "event is not reachable from genesis".to_string(),
            });
        }

        let predecessor = match event.sequence.checked_sub(1) {
            Some(previous) => Some(self.store.get_by_sequence(previous)?.ok_or_else(|| {
                AuditError::TamperDetected {
                    sequence: event.sequence,
                    reason: format!("predecessor {} is missing", previous),
                }
            })?),
            None => None,
        };

        let overrides = self.store.overrides_for(event_id)?;
        for record in &overrides {
            if !self.signer.verify_override(record, &event.signature)? {
                return Err(AuditError::TamperDetected {
                    sequence: event.sequence,
                    reason: format!("override {} signature invalid", record.override_id),
                });
            }
        }

        tracing::info!(event_id = %event_id, sequence = event.sequence, "audit bundle exported");
        Ok(ExportBundle {
            signature: event.signature.clone(),
            previous_signature: event.previous_signature.clone(),
            predecessor,
            verification: VerificationInstructions::current(),
            overrides,
            export_metadata: ExportMetadata {
                exported_at: Timestamp::now().to_rfc3339(),
                export_version: EXPORT_VERSION.to_string(),
                compliance_framework: COMPLIANCE_FRAMEWORK.to_string(),
                chain_verified_through: report.events_checked,
            },
            event,
        })
    }
}

/// Check a bundle offline with the signing secret.
///
/// Covers the event, its link to the bundled predecessor and the
/// overrides. The predecessor's own `previous_signature` is signed but its
/// target is not in the bundle, so anything earlier than `sequence - 1`
/// is only established by [`AuditTrail::verify_chain`] on the engine.
pub fn verify_bundle(bundle: &ExportBundle, signer: &ChainSigner) -> AuditResult<()> {
    let sequence = bundle.event.sequence;
    let tamper = |reason: &str| AuditError::TamperDetected {
        sequence,
        reason: reason.to_string(),
    };

    if bundle.signature != bundle.event.signature
        || bundle.previous_signature != bundle.event.previous_signature
    {
        return Err(tamper("bundle signatures disagree with the event"));
    }
    match (&bundle.predecessor, sequence) {
        (None, 0) => {}
        (None, _) => return Err(tamper("bundle carries no predecessor")),
        (Some(previous), _) => {
            if !signer.verify_event(previous)? {
                return Err(tamper("predecessor signature does not match its contents"));
            }
        }
    }
    signer.check_link(bundle.predecessor.as_ref(), &bundle.event)?;

    for record in &bundle.overrides {
        if record.original_event_id != bundle.event.event_id {
            return Err(tamper("override belongs to a different event"));
        }
        if !signer.verify_override(record, &bundle.signature)? {
            return Err(tamper("override signature invalid"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory_store::InMemoryAuditStore;
    use crate::overrides::OverrideRequest;
    use crate::test_support::{pending, SECRET};
    use crate::trail::TrailConfig;
    use actum_core::{Action, AuditStore};
    use std::sync::Arc;

    fn trail_over(store: Arc<InMemoryAuditStore>) -> AuditTrail {
        AuditTrail::open(
            store,
            ChainSigner::new(SECRET).unwrap(),
            TrailConfig::default(),
        )
        .unwrap()
    }

    async fn committed(n: usize) -> Vec<AuditEvent> {
        let trail = trail_over(Arc::new(InMemoryAuditStore::new()));
        let mut events = Vec::new();
        for i in 0..n {
            let action = [Action::Block, Action::Flag, Action::Allow][i % 3];
            events.push(trail.commit(pending(&format!("user-{}", i), action)).await.unwrap());
        }
        events
    }

    /// Rebuild a store from a list of events, as a restore from backup would.
    fn restored(events: &[AuditEvent]) -> Arc<InMemoryAuditStore> {
        let store = Arc::new(InMemoryAuditStore::new());
        for e in events {
            store.append(e).unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_empty_chain_is_valid() {
        let trail = trail_over(Arc::new(InMemoryAuditStore::new()));
        let report = trail.verify_chain().unwrap();
        assert!(report.valid);
        assert_eq!(report.events_checked, 0);
        assert_eq!(report.head_sequence, None);
    }

    #[tokio::test]
    async fn test_export_round_trip() {
        let trail = trail_over(Arc::new(InMemoryAuditStore::new()));
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(
                trail
                    .commit(pending(&format!("u{}", i), Action::Flag))
                    .await
                    .unwrap()
                    .event_id,
            );
        }

        let bundle = trail.export_bundle(&ids[3]).unwrap();
        assert_eq!(bundle.event.sequence, 3);
        assert_eq!(bundle.export_metadata.export_version, "1.0");
        assert_eq!(bundle.export_metadata.compliance_framework, "EU AI Act");
        assert_eq!(bundle.export_metadata.chain_verified_through, 4);
        verify_bundle(&bundle, trail.signer()).unwrap();

        // Survives serialization.
        let json = serde_json::to_string(&bundle).unwrap();
        let parsed: ExportBundle = serde_json::from_str(&json).unwrap();
        verify_bundle(&parsed, trail.signer()).unwrap();

        let report = trail.verify_chain().unwrap();
        assert!(report.valid);
        assert_eq!(report.events_checked, 5);
        assert_eq!(report.head_sequence, Some(4));
    }

    #[tokio::test]
    async fn test_tamper_propagates_forward() {
        let events = committed(6).await;
        let k = 2;
        let mut edited = events.clone();
        edited[k].decision.decision = Action::Allow;
        let trail = trail_over(restored(&edited));

        for (n, e) in events.iter().enumerate() {
            let result = trail.export_bundle(&e.event_id);
            if n < k {
                assert!(result.is_ok(), "event {} should export", n);
            } else {
                let failed_at = match result {
                    Err(AuditError::TamperDetected { sequence, .. }) => Some(sequence),
                    _ => None,
                };
                assert!(
                    failed_at == Some(k as u64),
                    "event {} should fail at {}",
                    n,
                    k
                );
            }
        }

        let report = trail.verify_chain().unwrap();
        assert!(!report.valid);
        assert_eq!(report.first_invalid, Some(k as u64));
        assert_eq!(report.events_checked, k as u64);
    }

    #[tokio::test]
    async fn test_missing_event_breaks_chain() {
        let events = committed(4).await;
        let mut gapped = events.clone();
        gapped.remove(1);
        let trail = trail_over(restored(&gapped));

        assert!(trail.export_bundle(&events[0].event_id).is_ok());
        assert!(matches!(
            trail.export_bundle(&events[2].event_id),
            Err(AuditError::TamperDetected { sequence: 2, .. })
        ));
        assert!(matches!(
            trail.export_bundle(&events[1].event_id),
            Err(AuditError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resigned_with_other_key_detected() {
        let events = committed(3).await;
        let trail = AuditTrail::open(
            restored(&events),
            ChainSigner::new(b"a-completely-different-key").unwrap(),
            TrailConfig::default(),
        )
        .unwrap();
        assert_eq!(trail.verify_chain().unwrap().first_invalid, Some(0));
    }

    #[tokio::test]
    async fn test_verify_bundle_detects_edits() {
        let trail = trail_over(Arc::new(InMemoryAuditStore::new()));
        let e = trail.commit(pending("alice", Action::Block)).await.unwrap();
        trail
            .record_override(
                &e.event_id,
                OverrideRequest {
                    operator: "officer".into(),
                    reason: "reviewed".into(),
                    new_decision: Action::Flag,
                    duration_minutes: Some(30),
                },
            )
            .unwrap();

        let bundle = trail.export_bundle(&e.event_id).unwrap();
        assert_eq!(bundle.overrides.len(), 1);
        verify_bundle(&bundle, trail.signer()).unwrap();

        let mut edited = bundle.clone();
        edited.event.user = "someone-else".into();
        assert!(verify_bundle(&edited, trail.signer()).is_err());

        let mut edited = bundle.clone();
        edited.overrides[0].new_decision = Action::Allow;
        assert!(verify_bundle(&edited, trail.signer()).is_err());

        let mut edited = bundle;
        edited.signature = ChainSignature::genesis();
        assert!(verify_bundle(&edited, trail.signer()).is_err());
    }

    #[tokio::test]
    async fn test_bundle_checks_link_to_predecessor() {
        let trail = trail_over(Arc::new(InMemoryAuditStore::new()));
        let e0 = trail.commit(pending("alice", Action::Flag)).await.unwrap();
        let e1 = trail.commit(pending("bob", Action::Block)).await.unwrap();

        let first = trail.export_bundle(&e0.event_id).unwrap();
        assert!(first.predecessor.is_none());
        verify_bundle(&first, trail.signer()).unwrap();

        let bundle = trail.export_bundle(&e1.event_id).unwrap();
        assert_eq!(bundle.predecessor.as_ref(), Some(&e0));
        verify_bundle(&bundle, trail.signer()).unwrap();

        let mut stripped = bundle.clone();
        stripped.predecessor = None;
        assert!(verify_bundle(&stripped, trail.signer()).is_err());

        let mut edited = bundle.clone();
        if let Some(previous) = edited.predecessor.as_mut() {
            previous.decision.decision = Action::Allow;
        }
        assert!(verify_bundle(&edited, trail.signer()).is_err());

        // A validly signed event from elsewhere in the chain is not the
        // predecessor.
        let e2 = trail.commit(pending("carol", Action::Allow)).await.unwrap();
        let mut swapped = bundle;
        swapped.predecessor = Some(e2);
        assert!(matches!(
            verify_bundle(&swapped, trail.signer()),
            Err(AuditError::TamperDetected { sequence: 1, .. })
        ));
    }

    #[tokio::test]
    async fn test_export_unknown_event() {
        let trail = trail_over(Arc::new(InMemoryAuditStore::new()));
        assert!(matches!(
            trail.export_bundle(&EventId::new("evt-nope")),
            Err(AuditError::NotFound(_))
        ));
    }
}
