use std::collections::BTreeSet;

use actum_core::{Action, Decision, PolicyVersion, RiskTier};

use crate::types::{Detection, Detector, Evaluation, SignalSource};

pub const NO_VIOLATIONS: &str = "No policy violations detected";

/// Build the immutable decision from an evaluation and the signals that
/// produced it.
pub fn compose(
    evaluation: &Evaluation<'_>,
    detection: &Detection,
    policy_version: &PolicyVersion,
) -> Decision {
    if evaluation.triggered.is_empty() {
        return Decision {
            decision: Action::Allow,
            risk_level: RiskTier::Minimal,
            confidence_score: confidence(&BTreeSet::new()),
            explanation: NO_VIOLATIONS.to_string(),
            triggered_tags: Vec::new(),
            policy_version: policy_version.clone(),
        };
    }

    let sources: BTreeSet<SignalSource> = evaluation
        .triggered
        .iter()
        .filter_map(|t| detection.sources(&t.name))
        .flatten()
        .copied()
        .collect();

    Decision {
        decision: evaluation.action,
        risk_level: evaluation.risk_level,
        confidence_score: confidence(&sources),
        explanation: explain(evaluation),
        triggered_tags: evaluation.tag_names(),
        policy_version: policy_version.clone(),
    }
}

/// Monotonic in the number of independent detectors that agree.
///
/// | detectors            | score |
/// |----------------------|-------|
/// | none                 | 50    |
/// | one, keyword/scorer  | 55    |
/// | one, pattern/image   | 65    |
/// | two                  | 80    |
/// | three                | 95    |
pub fn confidence(sources: &BTreeSet<SignalSource>) -> u8 {
    let detectors: BTreeSet<Detector> = sources.iter().map(|s| s.detector()).collect();
    let score: u32 = match detectors.len() {
        0 => 50,
        1 => {
            let weak = sources
                .iter()
                .all(|s| matches!(s, SignalSource::Keyword | SignalSource::Scorer));
            if weak {
                55
            } else {
                65
            }
        }
        2 => 80,
        _ => 95,
    };
    score.min(100) as u8
}

fn explain(evaluation: &Evaluation<'_>) -> String {
    let verb = match evaluation.action {
        Action::Block => "Blocked by",
        Action::Flag => "Flagged by",
        Action::Allow => "Allowed by",
    };

    let names: Vec<&str> = evaluation
        .triggered
        .iter()
        .map(|t| t.name.as_str())
        .collect();
    let descriptions: Vec<&str> = evaluation
        .triggered
        .iter()
        .map(|t| t.description.as_str())
        .filter(|d| !d.is_empty())
        .collect();

    let mut articles: Vec<&str> = Vec::new();
    for tag in &evaluation.triggered {
        let article = tag.article();
        if !articles.contains(&article) {
            articles.push(article);
        }
    }

    let mut out = format!("{} {}", verb, names.join(", "));
    if !descriptions.is_empty() {
        out.push_str(": ");
        out.push_str(&descriptions.join("; "));
    }
    out.push_str(". Governing provisions: ");
    out.push_str(&articles.join("; "));
    out
}
