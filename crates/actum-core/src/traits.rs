use std::collections::BTreeMap;

use crate::error::ActumResult;
use crate::types::{
    AuditEvent, AuditFilter, AuditOverride, ChainTail, DecisionCounts, EventId,
};

// ---------------------------------------------------------------------------
// RiskScorer — opaque text risk model
//
// Returns calibrated probabilities per category. The engine treats the model
// as a black box; an error means "no signal", never a failed evaluation.
// ---------------------------------------------------------------------------

pub trait RiskScorer: Send + Sync {
    fn score_risk(&self, text: &str) -> ActumResult<BTreeMap<String, f64>>;
}

/// Scorer that never produces a signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRiskScorer;

impl RiskScorer for NullRiskScorer {
    fn score_risk(&self, _text: &str) -> ActumResult<BTreeMap<String, f64>> {
        Ok(BTreeMap::new())
    }
}

// ---------------------------------------------------------------------------
// FacePresenceDetector — opaque vision model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceSignal {
    pub faces_detected: u32,
    /// 0.0..=1.0
    pub confidence: f64,
}

impl FaceSignal {
    pub const NONE: FaceSignal = FaceSignal {
        faces_detected: 0,
        confidence: 0.0,
    };
}

pub trait FacePresenceDetector: Send + Sync {
    fn detect_faces(&self, image: &[u8]) -> ActumResult<FaceSignal>;
}

/// Detector that never sees a face.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullFaceDetector;

impl FacePresenceDetector for NullFaceDetector {
    fn detect_faces(&self, _image: &[u8]) -> ActumResult<FaceSignal> {
        Ok(FaceSignal::NONE)
    }
}

// ---------------------------------------------------------------------------
// AuditStore — append-only persistence for the audit chain
//
// No update, no delete. `append` must make the event
// visible atomically: readers either see the whole event or nothing.
// Sequence numbers and event ids are unique; a duplicate is a Conflict.
// ---------------------------------------------------------------------------

pub trait AuditStore: Send + Sync {
    fn append(&self, event: &AuditEvent) -> ActumResult<()>;

    /// Last committed (sequence, signature), or None for an empty chain.
    fn tail(&self) -> ActumResult<Option<ChainTail>>;

    fn get(&self, event_id: &EventId) -> ActumResult<Option<AuditEvent>>;

    fn get_by_sequence(&self, sequence: u64) -> ActumResult<Option<AuditEvent>>;

    /// Up to `max` events with sequence >= `start`, ascending.
    fn scan(&self, start: u64, max: usize) -> ActumResult<Vec<AuditEvent>>;

    /// Filtered events, descending by sequence.
    fn query(&self, filter: &AuditFilter) -> ActumResult<Vec<AuditEvent>>;

    fn counts(&self) -> ActumResult<DecisionCounts>;

    fn append_override(&self, record: &AuditOverride) -> ActumResult<()>;

    fn overrides_for(&self, event_id: &EventId) -> ActumResult<Vec<AuditOverride>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn _assert_scorer_object_safe(_: &dyn RiskScorer) {}
    fn _assert_face_object_safe(_: &dyn FacePresenceDetector) {}
    fn _assert_store_object_safe(_: &dyn AuditStore) {}

    #[test]
    fn test_null_scorers_produce_no_signal() {
        assert!(NullRiskScorer.score_risk("anything").unwrap().is_empty());
        assert_eq!(
            NullFaceDetector.detect_faces(b"\x89PNG").unwrap(),
            FaceSignal::NONE
        );
    }
}
