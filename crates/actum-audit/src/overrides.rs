use serde::{Deserialize, Serialize};

use actum_core::{Action, AuditOverride, ChainSignature, EventId, OverrideId, Timestamp};

use crate::error::{AuditError, AuditResult};
use crate::trail::AuditTrail;

/// Operator annotation on a committed event. The event itself never changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideRequest {
    pub operator: String,
    pub reason: String,
    pub new_decision: Action,
    /// Omitted for a permanent override.
    #[serde(default, alias = "duration")]
    pub duration_minutes: Option<u32>,
}

impl OverrideRequest {
    fn validate(&self) -> AuditResult<()> {
        if self.operator.trim().is_empty() {
            return Err(AuditError::InvalidRequest("operator is required".into()));
        }
        if self.reason.trim().is_empty() {
            return Err(AuditError::InvalidRequest("reason is required".into()));
        }
        if self.duration_minutes == Some(0) {
            return Err(AuditError::InvalidRequest(
                "duration_minutes must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl AuditTrail {
    /// Record a signed override against a committed event.
    pub fn record_override(
        &self,
        event_id: &EventId,
        request: OverrideRequest,
    ) -> AuditResult<AuditOverride> {
        request.validate()?;
        let event = self.get_event(event_id)?;

        let timestamp = Timestamp::now();
        let mut record = AuditOverride {
            override_id: OverrideId::generate(&timestamp),
            original_event_id: event.event_id.clone(),
            timestamp,
            operator: request.operator,
            reason: request.reason,
            new_decision: request.new_decision,
            duration_minutes: request.duration_minutes,
            signature: ChainSignature::new(String::new()),
        };
        record.signature = self.signer.sign_override(&record, &event.signature)?;

        self.store
            .append_override(&record)
            .map_err(|e| AuditError::WriteFailure(e.to_string()))?;

        tracing::info!(
            override_id = %record.override_id,
            event_id = %event_id,
            operator = %record.operator,
            from = %event.decision.decision,
            to = %record.new_decision,
            "audit override recorded"
        );
        Ok(record)
    }

    pub fn overrides_for(&self, event_id: &EventId) -> AuditResult<Vec<AuditOverride>> {
        self.get_event(event_id)?;
        Ok(self.store.overrides_for(event_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::ChainSigner;
    use crate::in_memory_store::InMemoryAuditStore;
    use crate::test_support::{pending, SECRET};
    use crate::trail::TrailConfig;
    use std::sync::Arc;

    fn request() -> OverrideRequest {
        OverrideRequest {
            operator: "compliance-officer".into(),
            reason: "customer-facing disclosure confirmed".into(),
            new_decision: Action::Allow,
            duration_minutes: None,
        }
    }

    #[tokio::test]
    async fn test_override_leaves_event_untouched() {
        let trail = AuditTrail::open(
            Arc::new(InMemoryAuditStore::new()),
            ChainSigner::new(SECRET).unwrap(),
            TrailConfig::default(),
        )
        .unwrap();
        let e = trail.commit(pending("alice", Action::Flag)).await.unwrap();

        let record = trail.record_override(&e.event_id, request()).unwrap();
        assert!(record.override_id.as_str().starts_with("ovr-"));
        assert!(trail
            .signer()
            .verify_override(&record, &e.signature)
            .unwrap());

        assert_eq!(trail.get_event(&e.event_id).unwrap(), e);
        assert_eq!(trail.overrides_for(&e.event_id).unwrap(), vec![record]);
        assert!(trail.verify_chain().unwrap().valid);
    }

    #[tokio::test]
    async fn test_override_validation() {
        let trail = AuditTrail::open(
            Arc::new(InMemoryAuditStore::new()),
            ChainSigner::new(SECRET).unwrap(),
            TrailConfig::default(),
        )
        .unwrap();
        let e = trail.commit(pending("alice", Action::Flag)).await.unwrap();

        let mut bad = request();
        bad.operator = " ".into();
        assert!(matches!(
            trail.record_override(&e.event_id, bad),
            Err(AuditError::InvalidRequest(_))
        ));

        let mut bad = request();
        bad.duration_minutes = Some(0);
        assert!(trail.record_override(&e.event_id, bad).is_err());

        assert!(matches!(
            trail.record_override(&EventId::new("evt-missing"), request()),
            Err(AuditError::NotFound(_))
        ));
        assert!(matches!(
            trail.overrides_for(&EventId::new("evt-missing")),
            Err(AuditError::NotFound(_))
        ));
    }
}
