use std::sync::Arc;

use actum_core::{FacePresenceDetector, NullFaceDetector, NullRiskScorer, RiskScorer};

use crate::error::{PolicyResult, ValidationError};
use crate::types::{Detection, PolicyPack, SignalSource};

pub const DEFAULT_MAX_INPUT_BYTES: usize = 64 * 1024;
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputLimits {
    pub max_input_bytes: usize,
    pub max_image_bytes: usize,
}

impl Default for InputLimits {
    fn default() -> Self {
        Self {
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
            max_image_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

/// Turns raw input into candidate tag names using the lexicon of the pack
/// snapshot, the risk scorer and the face-presence detector.
///
/// Detection is a pure function of (text, image, pack, model outputs). A
/// model that fails contributes nothing; the lexicon still runs.
pub struct SignalDetector {
    scorer: Arc<dyn RiskScorer>,
    faces: Arc<dyn FacePresenceDetector>,
    limits: InputLimits,
}

impl SignalDetector {
    pub fn new(
        scorer: Arc<dyn RiskScorer>,
        faces: Arc<dyn FacePresenceDetector>,
        limits: InputLimits,
    ) -> Self {
        Self {
            scorer,
            faces,
            limits,
        }
    }

    /// Lexicon-only detector.
    pub fn lexicon_only(limits: InputLimits) -> Self {
        Self::new(Arc::new(NullRiskScorer), Arc::new(NullFaceDetector), limits)
    }

    pub fn limits(&self) -> InputLimits {
        self.limits
    }

    /// Reject input that must never reach detection.
    pub fn validate(&self, text: &str, image: Option<&[u8]>) -> Result<(), ValidationError> {
        if text.trim().is_empty() {
            return Err(ValidationError::EmptyInput);
        }
        if text.len() > self.limits.max_input_bytes {
            return Err(ValidationError::InputTooLarge {
                what: "input text",
                limit: self.limits.max_input_bytes,
                actual: text.len(),
            });
        }
        if let Some(bytes) = image {
            if bytes.is_empty() {
                return Err(ValidationError::UnsupportedMediaType(
                    "image attachment is empty".to_string(),
                ));
            }
            if bytes.len() > self.limits.max_image_bytes {
                return Err(ValidationError::InputTooLarge {
                    what: "image",
                    limit: self.limits.max_image_bytes,
                    actual: bytes.len(),
                });
            }
            image::guess_format(bytes).map_err(|_| {
                ValidationError::UnsupportedMediaType(
                    "attachment is not a recognised image format".to_string(),
                )
            })?;
        }
        Ok(())
    }

    /// Validate, then collect candidates against `pack`.
    pub fn detect(
        &self,
        text: &str,
        image: Option<&[u8]>,
        pack: &PolicyPack,
    ) -> PolicyResult<Detection> {
        self.validate(text, image)?;

        let mut detection = Detection::new();
        let lowered = text.to_lowercase();

        for tag in pack.tags() {
            if tag.matches_pattern(text) {
                detection.add(&tag.name, SignalSource::Pattern);
            }
            if tag.matches_keyword(&lowered) {
                detection.add(&tag.name, SignalSource::Keyword);
            }
        }

        if pack.tags().iter().any(|t| t.score_rule.is_some()) {
            match self.scorer.score_risk(text) {
                Ok(scores) => {
                    for tag in pack.tags() {
                        let Some(rule) = &tag.score_rule else {
                            continue;
                        };
                        match scores.get(&rule.category) {
                            Some(p) if p.is_finite() && *p > rule.threshold => {
                                detection.add(&tag.name, SignalSource::Scorer);
                            }
                            _ => {}
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "risk scorer failed, continuing without it"),
            }
        }

        if let Some(bytes) = image {
            match self.faces.detect_faces(bytes) {
                Ok(signal) if signal.faces_detected > 0 => {
                    for tag in pack.tags() {
                        if let Some(threshold) = tag.face_threshold {
                            if signal.confidence >= threshold {
                                detection.add(&tag.name, SignalSource::Image);
                            }
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "face detector failed, continuing without it")
                }
            }
        }

        tracing::debug!(
            pack = %pack.version,
            candidates = ?detection.candidate_names().collect::<Vec<_>>(),
            "detection complete"
        );
        Ok(detection)
    }
}
