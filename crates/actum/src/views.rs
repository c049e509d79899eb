//! Response bodies shared by the HTTP API and the CLI.

use serde::{Deserialize, Serialize};

use actum_core::{
    Action, AuditEvent, AuditOverride, Decision, DecisionCounts, EventId, InputType, RiskTier,
};
use actum_policy::{PackListing, PolicyTag};

/// Body of `POST /evaluate` and `POST /evaluate-with-image`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResponse {
    pub decision: Action,
    pub risk_level: RiskTier,
    pub confidence_score: u8,
    pub explanation: String,
    pub policy_tags: Vec<String>,
    pub policy_version: String,
    pub audit_event_id: EventId,
}

impl EvaluationResponse {
    pub fn new(decision: Decision, audit_event_id: EventId) -> Self {
        Self {
            decision: decision.decision,
            risk_level: decision.risk_level,
            confidence_score: decision.confidence_score,
            explanation: decision.explanation,
            policy_tags: decision.triggered_tags,
            policy_version: decision.policy_version.0,
            audit_event_id,
        }
    }
}

/// One committed event as listed by `GET /audit-events`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSummary {
    pub event_id: EventId,
    pub sequence: u64,
    pub timestamp: String,
    pub user: String,
    pub client_id: String,
    pub input_type: InputType,
    pub decision: Action,
    pub risk_level: RiskTier,
    pub confidence_score: u8,
    pub explanation: String,
    pub policy_tags: Vec<String>,
    pub policy_version: String,
    pub signature: String,
}

impl From<AuditEvent> for EventSummary {
    fn from(e: AuditEvent) -> Self {
        Self {
            event_id: e.event_id,
            sequence: e.sequence,
            timestamp: e.timestamp.to_rfc3339(),
            user: e.user,
            client_id: e.client_id,
            input_type: e.input_type,
            decision: e.decision.decision,
            risk_level: e.decision.risk_level,
            confidence_score: e.decision.confidence_score,
            explanation: e.decision.explanation,
            policy_tags: e.decision.triggered_tags,
            policy_version: e.decision.policy_version.0,
            signature: e.signature.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideView {
    pub override_id: String,
    pub original_event_id: EventId,
    pub timestamp: String,
    pub operator: String,
    pub reason: String,
    pub new_decision: Action,
    pub duration_minutes: Option<u32>,
    pub signature: String,
}

impl From<AuditOverride> for OverrideView {
    fn from(o: AuditOverride) -> Self {
        Self {
            override_id: o.override_id.0,
            original_event_id: o.original_event_id,
            timestamp: o.timestamp.to_rfc3339(),
            operator: o.operator,
            reason: o.reason,
            new_decision: o.new_decision,
            duration_minutes: o.duration_minutes,
            signature: o.signature.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagView {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub risk_level: RiskTier,
    pub action: Action,
    pub policy_pack: String,
}

impl From<&PolicyTag> for TagView {
    fn from(t: &PolicyTag) -> Self {
        Self {
            id: t.id,
            name: t.name.clone(),
            description: t.description.clone(),
            risk_level: t.risk_level,
            action: t.action,
            policy_pack: t.pack_version.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackView {
    pub id: u32,
    pub name: String,
    pub version: String,
    pub description: String,
    pub is_active: bool,
    pub created_at: String,
}

impl From<&PackListing> for PackView {
    fn from(l: &PackListing) -> Self {
        Self {
            id: l.pack.id,
            name: l.pack.name.clone(),
            version: l.pack.version.to_string(),
            description: l.pack.description.clone(),
            is_active: l.is_active,
            created_at: l.pack.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyStats {
    pub active_packs: usize,
    pub total_packs: usize,
    pub total_tags: usize,
}

/// Body of `GET /admin-stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminStats {
    pub audit_events: DecisionCounts,
    pub policies: PolicyStats,
}
