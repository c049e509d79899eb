//! Fixtures shared by the unit tests of this crate.

use std::sync::atomic::{AtomicBool, Ordering};

use actum_core::{
    input_digest, Action, ActumError, ActumResult, AuditEvent, AuditFilter, AuditOverride,
    AuditStore, ChainSignature, ChainTail, Decision, DecisionCounts, EventId, InputType,
    PendingEvent, PolicyVersion, RiskTier, Timestamp,
};

use crate::in_memory_store::InMemoryAuditStore;

pub const SECRET: &[u8] = b"unit-test-secret-0123456789";

fn tier_for(action: Action) -> RiskTier {
    match action {
        Action::Block => RiskTier::Unacceptable,
        Action::Flag => RiskTier::High,
        Action::Allow => RiskTier::Minimal,
    }
}

pub fn decision(action: Action) -> Decision {
    Decision {
        decision: action,
        risk_level: tier_for(action),
        confidence_score: 65,
        explanation: format!("{} fixture", action),
        triggered_tags: Vec::new(),
        policy_version: PolicyVersion::new("pack-2025-01-01-v1"),
    }
}

pub fn pending(user: &str, action: Action) -> PendingEvent {
    let timestamp = Timestamp::now();
    PendingEvent {
        event_id: EventId::generate(&timestamp),
        timestamp,
        user: user.to_string(),
        client_id: "unit-test".to_string(),
        input_type: InputType::Text,
        input_hash: input_digest(user),
        decision: decision(action),
    }
}

/// Unsigned event for exercising stores directly.
pub fn event(sequence: u64, user: &str, action: Action) -> AuditEvent {
    AuditEvent {
        event_id: EventId::new(format!("evt-{}", sequence)),
        sequence,
        timestamp: Timestamp::from_seconds(1_735_689_600 + sequence),
        user: user.to_string(),
        client_id: "unit-test".to_string(),
        input_type: InputType::Text,
        input_hash: input_digest(user),
        decision: decision(action),
        signature: ChainSignature::new(format!("sig-{}", sequence)),
        previous_signature: ChainSignature::genesis(),
    }
}

/// In-memory store whose next append can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryAuditStore,
    fail_next: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl AuditStore for FlakyStore {
    fn append(&self, event: &AuditEvent) -> ActumResult<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ActumError::Storage("simulated disk failure".into()));
        }
        self.inner.append(event)
    }

    fn tail(&self) -> ActumResult<Option<ChainTail>> {
        self.inner.tail()
    }

    fn get(&self, event_id: &EventId) -> ActumResult<Option<AuditEvent>> {
        self.inner.get(event_id)
    }

    fn get_by_sequence(&self, sequence: u64) -> ActumResult<Option<AuditEvent>> {
        self.inner.get_by_sequence(sequence)
    }

    fn scan(&self, start: u64, max: usize) -> ActumResult<Vec<AuditEvent>> {
        self.inner.scan(start, max)
    }

    fn query(&self, filter: &AuditFilter) -> ActumResult<Vec<AuditEvent>> {
        self.inner.query(filter)
    }

    fn counts(&self) -> ActumResult<DecisionCounts> {
        self.inner.counts()
    }

    fn append_override(&self, record: &AuditOverride) -> ActumResult<()> {
        self.inner.append_override(record)
    }

    fn overrides_for(&self, event_id: &EventId) -> ActumResult<Vec<AuditOverride>> {
        self.inner.overrides_for(event_id)
    }
}
