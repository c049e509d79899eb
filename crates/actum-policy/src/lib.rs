//! Actum policy engine
//!
//! Classifies a prompt (and optional image) against a versioned EU AI Act
//! policy pack. The pipeline is detect → evaluate → compose:
//!
//! - the detector turns raw input into candidate tag names using the pack
//!   lexicon, an opaque risk scorer and a face-presence detector;
//! - the evaluator resolves candidates into an ordered tag list, a risk tier
//!   and an action (Block > Flag > Allow);
//! - the composer attaches a confidence score and a templated explanation.
//!
//! Every evaluation runs against one immutable pack snapshot, so the same
//! input and pack always produce the same decision.

pub mod composer;
pub mod detector;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod registry;
pub mod types;

pub use composer::{compose, confidence, NO_VIOLATIONS};
pub use detector::{
    InputLimits, SignalDetector, DEFAULT_MAX_IMAGE_BYTES, DEFAULT_MAX_INPUT_BYTES,
};
pub use engine::{DecisionEngine, Evaluated, EvaluationRequest};
pub use error::{PolicyError, PolicyErrorKind, PolicyResult, ValidationError};
pub use evaluator::evaluate;
pub use registry::{PackListing, PolicyRegistry, BUILTIN_PACK_JSON};
pub use types::{
    default_article, Detection, Detector, Evaluation, PackDefinition, PackDocument, PolicyPack,
    PolicyTag, ScoreRule, SignalSource, TagDefinition,
};
