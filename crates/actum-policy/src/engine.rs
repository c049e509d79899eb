use std::sync::Arc;

use actum_core::{
    input_digest, Decision, EventId, InputType, PendingEvent, PolicyVersion, Timestamp,
};

use crate::composer::compose;
use crate::detector::SignalDetector;
use crate::error::{PolicyResult, ValidationError};
use crate::evaluator::evaluate;
use crate::registry::PolicyRegistry;
use crate::types::PolicyPack;

/// One evaluation request as received from a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationRequest {
    pub text: String,
    pub client_id: String,
    pub user: String,
    pub input_type: InputType,
    pub image: Option<Vec<u8>>,
}

impl EvaluationRequest {
    pub fn text(
        text: impl Into<String>,
        client_id: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            client_id: client_id.into(),
            user: user.into(),
            input_type: InputType::Text,
            image: None,
        }
    }

    pub fn with_image(mut self, image: Vec<u8>) -> Self {
        self.input_type = InputType::TextWithImage;
        self.image = Some(image);
        self
    }

    fn check_input_type(&self) -> Result<(), ValidationError> {
        match (self.input_type, self.image.is_some()) {
            (InputType::Text, true) => Err(ValidationError::UnsupportedInputType(
                "input_type 'text' cannot carry an image".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Recorded input type: `text_with_image` only when an image was
    /// actually evaluated.
    fn effective_input_type(&self) -> InputType {
        if self.image.is_some() {
            InputType::TextWithImage
        } else {
            InputType::Text
        }
    }
}

/// Outcome of one evaluation: the decision plus the event to be chained.
#[derive(Debug, Clone)]
pub struct Evaluated {
    pub decision: Decision,
    pub pending: PendingEvent,
}

/// Detect → evaluate → compose against a single pack snapshot.
///
/// The engine holds no mutable state; concurrent evaluations share it
/// freely. Each evaluation fetches its pack snapshot once, up front.
pub struct DecisionEngine {
    registry: Arc<PolicyRegistry>,
    detector: SignalDetector,
}

impl DecisionEngine {
    pub fn new(registry: Arc<PolicyRegistry>, detector: SignalDetector) -> Self {
        Self { registry, detector }
    }

    pub fn registry(&self) -> &Arc<PolicyRegistry> {
        &self.registry
    }

    pub fn detector(&self) -> &SignalDetector {
        &self.detector
    }

    /// Evaluate against the active pack.
    pub fn evaluate(&self, request: &EvaluationRequest) -> PolicyResult<Evaluated> {
        let pack = self.registry.get_active_pack()?;
        self.evaluate_against(request, &pack)
    }

    /// Evaluate against a specific published pack, active or not. Used to
    /// reproduce a historical decision.
    pub fn replay(
        &self,
        request: &EvaluationRequest,
        version: &PolicyVersion,
    ) -> PolicyResult<Evaluated> {
        let pack = self.registry.get_pack(version)?;
        self.evaluate_against(request, &pack)
    }

    fn evaluate_against(
        &self,
        request: &EvaluationRequest,
        pack: &PolicyPack,
    ) -> PolicyResult<Evaluated> {
        request.check_input_type()?;

        let detection = self
            .detector
            .detect(&request.text, request.image.as_deref(), pack)?;
        let evaluation = evaluate(&detection, pack);
        let decision = compose(&evaluation, &detection, &pack.version);

        let timestamp = Timestamp::now();
        let pending = PendingEvent {
            event_id: EventId::generate(&timestamp),
            timestamp,
            user: request.user.clone(),
            client_id: request.client_id.clone(),
            input_type: request.effective_input_type(),
            input_hash: input_digest(&request.text),
            decision: decision.clone(),
        };

        tracing::debug!(
            event_id = %pending.event_id,
            decision = %decision.decision,
            risk_level = %decision.risk_level,
            tags = ?decision.triggered_tags,
            "evaluation complete"
        );

        Ok(Evaluated { decision, pending })
    }
}
