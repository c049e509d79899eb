use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ActumError;

// ---------------------------------------------------------------------------
// RiskTier — four-level risk classification
// ---------------------------------------------------------------------------

/// Risk tier carried by every policy tag.
///
/// Ordering is by severity: Minimal < Limited < High < Unacceptable.
/// Exhaustive (no #[non_exhaustive]) so a new tier forces review of every
/// match site, including the explanation templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Unacceptable,
    High,
    Limited,
    Minimal,
}

impl RiskTier {
    /// All tiers, most severe first.
    pub const PRECEDENCE: [RiskTier; 4] = [
        RiskTier::Unacceptable,
        RiskTier::High,
        RiskTier::Limited,
        RiskTier::Minimal,
    ];

    fn ordinal(self) -> u8 {
        match self {
            RiskTier::Minimal => 0,
            RiskTier::Limited => 1,
            RiskTier::High => 2,
            RiskTier::Unacceptable => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskTier::Unacceptable => "unacceptable",
            RiskTier::High => "high",
            RiskTier::Limited => "limited",
            RiskTier::Minimal => "minimal",
        }
    }
}

impl PartialOrd for RiskTier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RiskTier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ordinal().cmp(&other.ordinal())
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unacceptable" => Ok(RiskTier::Unacceptable),
            "high" => Ok(RiskTier::High),
            "limited" => Ok(RiskTier::Limited),
            "minimal" => Ok(RiskTier::Minimal),
            other => Err(format!("unknown risk level '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Action — enforcement outcome with dominance ordering
// ---------------------------------------------------------------------------

/// Enforcement action. Ordering is dominance: Allow < Flag < Block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Block,
    Flag,
    Allow,
}

impl Action {
    fn ordinal(self) -> u8 {
        match self {
            Action::Allow => 0,
            Action::Flag => 1,
            Action::Block => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Block => "block",
            Action::Flag => "flag",
            Action::Allow => "allow",
        }
    }
}

impl PartialOrd for Action {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Action {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ordinal().cmp(&other.ordinal())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "block" => Ok(Action::Block),
            "flag" => Ok(Action::Flag),
            "allow" => Ok(Action::Allow),
            other => Err(format!("unknown decision '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// InputType
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    #[default]
    Text,
    TextWithImage,
}

impl InputType {
    pub fn as_str(self) -> &'static str {
        match self {
            InputType::Text => "text",
            InputType::TextWithImage => "text_with_image",
        }
    }
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(InputType::Text),
            "text_with_image" => Ok(InputType::TextWithImage),
            other => Err(format!("unsupported input_type '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Timestamp — canonical time representation (seconds + nanoseconds)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds_since_epoch: u64,
    pub nanoseconds: u32,
}

impl Timestamp {
    /// Current time. A clock set before 1970 reads as the epoch.
    pub fn now() -> Self {
        Self::try_from(chrono::Utc::now()).unwrap_or(Self::from_seconds(0))
    }

    pub fn from_seconds(seconds: u64) -> Self {
        Self {
            seconds_since_epoch: seconds,
            nanoseconds: 0,
        }
    }

    fn to_datetime(self) -> Option<chrono::DateTime<chrono::Utc>> {
        let seconds = i64::try_from(self.seconds_since_epoch).ok()?;
        chrono::DateTime::from_timestamp(seconds, self.nanoseconds)
    }

    pub fn to_rfc3339(&self) -> String {
        self.to_datetime()
            .map(|d| d.to_rfc3339())
            .unwrap_or_else(|| "invalid".to_string())
    }

    /// Calendar date as `YYYYMMDD`, used in event identifiers.
    pub fn date_stamp(&self) -> String {
        self.to_datetime()
            .map(|d| d.format("%Y%m%d").to_string())
            .unwrap_or_else(|| "00000000".to_string())
    }
}

impl TryFrom<chrono::DateTime<chrono::Utc>> for Timestamp {
    type Error = ActumError;

    fn try_from(dt: chrono::DateTime<chrono::Utc>) -> Result<Self, Self::Error> {
        let seconds_since_epoch = u64::try_from(dt.timestamp())
            .map_err(|_| ActumError::Internal(format!("timestamp {} is before the epoch", dt)))?;
        Ok(Self {
            seconds_since_epoch,
            nanoseconds: dt.timestamp_subsec_nanos(),
        })
    }
}

// ---------------------------------------------------------------------------
// Typed identifiers — prevent stringly-typed confusion
// ---------------------------------------------------------------------------

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

define_id!(EventId, "Unique identifier of a committed audit event.");
define_id!(OverrideId, "Unique identifier of an operator override.");
define_id!(PolicyVersion, "Version string of a published policy pack.");
define_id!(
    ChainSignature,
    "Keyed chain signature, rendered as `hmac-sha256:<hex>`."
);

impl EventId {
    /// `evt-YYYYMMDD-<12 hex>`.
    pub fn generate(at: &Timestamp) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("evt-{}-{}", at.date_stamp(), &suffix[..12]))
    }
}

impl OverrideId {
    /// `ovr-YYYYMMDD-<12 hex>`.
    pub fn generate(at: &Timestamp) -> Self {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("ovr-{}-{}", at.date_stamp(), &suffix[..12]))
    }
}

/// Previous-signature value of the first event in every chain.
pub const GENESIS_SIGNATURE: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

impl ChainSignature {
    pub fn genesis() -> Self {
        Self(GENESIS_SIGNATURE.to_string())
    }

    pub fn is_genesis(&self) -> bool {
        self.0 == GENESIS_SIGNATURE
    }
}

// ---------------------------------------------------------------------------
// Decision — the composed, immutable outcome of one evaluation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub decision: Action,
    pub risk_level: RiskTier,
    /// 0..=100
    pub confidence_score: u8,
    pub explanation: String,
    pub triggered_tags: Vec<String>,
    pub policy_version: PolicyVersion,
}

// ---------------------------------------------------------------------------
// Audit records
// ---------------------------------------------------------------------------

/// A decision that has been computed but not yet chained.
///
/// Only the audit writer turns this into an `AuditEvent`; a pending event
/// that fails to commit is dropped and never reaches a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEvent {
    pub event_id: EventId,
    pub timestamp: Timestamp,
    pub user: String,
    pub client_id: String,
    pub input_type: InputType,
    /// SHA-256 hex of the evaluated text.
    pub input_hash: String,
    pub decision: Decision,
}

/// A committed, chained audit event. Never updated, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: EventId,
    pub sequence: u64,
    pub timestamp: Timestamp,
    pub user: String,
    pub client_id: String,
    pub input_type: InputType,
    pub input_hash: String,
    pub decision: Decision,
    pub signature: ChainSignature,
    pub previous_signature: ChainSignature,
}

/// Head of a chain: the last committed sequence number and its signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTail {
    pub sequence: u64,
    pub signature: ChainSignature,
}

/// Signed operator annotation on a committed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditOverride {
    pub override_id: OverrideId,
    pub original_event_id: EventId,
    pub timestamp: Timestamp,
    pub operator: String,
    pub reason: String,
    pub new_decision: Action,
    /// None means permanent.
    pub duration_minutes: Option<u32>,
    pub signature: ChainSignature,
}

/// Conjunctive read-side filter. Results are most recent first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditFilter {
    pub decision: Option<Action>,
    pub risk_level: Option<RiskTier>,
    pub user: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl AuditFilter {
    pub const DEFAULT_LIMIT: usize = 100;

    pub fn matches(&self, event: &AuditEvent) -> bool {
        self.decision.map_or(true, |d| event.decision.decision == d)
            && self
                .risk_level
                .map_or(true, |r| event.decision.risk_level == r)
            && self.user.as_deref().map_or(true, |u| event.user == u)
    }
}

impl Default for AuditFilter {
    fn default() -> Self {
        Self {
            decision: None,
            risk_level: None,
            user: None,
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionCounts {
    pub total: u64,
    pub blocked: u64,
    pub flagged: u64,
    pub allowed: u64,
}

impl DecisionCounts {
    pub fn record(&mut self, action: Action) {
        self.total += 1;
        match action {
            Action::Block => self.blocked += 1,
            Action::Flag => self.flagged += 1,
            Action::Allow => self.allowed += 1,
        }
    }
}
