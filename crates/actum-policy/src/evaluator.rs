use std::cmp::Reverse;

use actum_core::{Action, RiskTier};

use crate::types::{Detection, Evaluation, PolicyPack};

/// Resolve candidates against a pack snapshot.
///
/// Two independent axes:
/// - risk tier: the most severe tier among triggered tags (Minimal if none);
/// - action: dominance Block > Flag > Allow (Allow if none).
///
/// Triggered tags are ordered by tier precedence, ties broken by their
/// position in the pack. Candidate names unknown to the pack are dropped.
/// Output depends only on the candidate set and the pack, never on the
/// order in which detectors reported.
pub fn evaluate<'p>(detection: &Detection, pack: &'p PolicyPack) -> Evaluation<'p> {
    for unknown in detection
        .candidate_names()
        .filter(|name| pack.tag(name).is_none())
    {
        tracing::debug!(tag = unknown, pack = %pack.version, "dropping candidate unknown to pack");
    }

    // Walking the pack gives definition order and deduplicates for free;
    // the stable sort then only reorders across tiers.
    let mut triggered: Vec<_> = pack
        .tags()
        .iter()
        .filter(|tag| detection.contains(&tag.name))
        .collect();
    triggered.sort_by_key(|tag| Reverse(tag.risk_level));

    let risk_level = triggered
        .iter()
        .map(|t| t.risk_level)
        .max()
        .unwrap_or(RiskTier::Minimal);
    let action = triggered
        .iter()
        .map(|t| t.action)
        .max()
        .unwrap_or(Action::Allow);

    Evaluation {
        triggered,
        risk_level,
        action,
    }
}
