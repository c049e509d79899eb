use actum_core::{Action, PolicyVersion, RiskTier};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{PolicyError, PolicyResult};

// ---------------------------------------------------------------------------
// Pack documents — the persisted configuration format
// ---------------------------------------------------------------------------

/// Scorer rule: a probability strictly above `threshold` for `category`
/// yields the tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRule {
    pub category: String,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagDefinition {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub risk_level: RiskTier,
    pub action: Action,
    /// Case-insensitive regular expressions.
    #[serde(default)]
    pub patterns: Vec<String>,
    /// Case-insensitive substrings.
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub score_rule: Option<ScoreRule>,
    /// Minimum face-presence confidence for the image signal to yield this tag.
    #[serde(default)]
    pub face_threshold: Option<f64>,
    /// Governing provision cited in explanations. Defaults by risk tier.
    #[serde(default)]
    pub article: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackDefinition {
    pub id: u32,
    pub name: String,
    pub version: PolicyVersion,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub tags: Vec<TagDefinition>,
}

/// Top-level document holding every published pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackDocument {
    pub packs: Vec<PackDefinition>,
}

// ---------------------------------------------------------------------------
// PolicyTag — a published tag with its lexicon compiled
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PolicyTag {
    pub id: u32,
    pub name: String,
    pub description: String,
    pub risk_level: RiskTier,
    pub action: Action,
    /// Version of the owning pack.
    pub pack_version: PolicyVersion,
    pub patterns: Vec<String>,
    pub keywords: Vec<String>,
    pub score_rule: Option<ScoreRule>,
    pub face_threshold: Option<f64>,
    article: Option<String>,
    compiled: Vec<Regex>,
    keywords_lower: Vec<String>,
}

impl PolicyTag {
    fn publish(def: TagDefinition, pack_version: &PolicyVersion) -> PolicyResult<Self> {
        let compiled = def
            .patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        PolicyError::InvalidPack(format!(
                            "tag '{}' pattern '{}' does not compile: {}",
                            def.name, p, e
                        ))
                    })
            })
            .collect::<PolicyResult<Vec<_>>>()?;

        if let Some(rule) = &def.score_rule {
            if !(0.0..=1.0).contains(&rule.threshold) {
                return Err(PolicyError::InvalidPack(format!(
                    "tag '{}' score threshold must be within 0.0..=1.0, got {}",
                    def.name, rule.threshold
                )));
            }
        }
        if let Some(t) = def.face_threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(PolicyError::InvalidPack(format!(
                    "tag '{}' face threshold must be within 0.0..=1.0, got {}",
                    def.name, t
                )));
            }
        }

        let keywords_lower = def.keywords.iter().map(|k| k.to_lowercase()).collect();

        Ok(Self {
            id: def.id,
            name: def.name,
            description: def.description,
            risk_level: def.risk_level,
            action: def.action,
            pack_version: pack_version.clone(),
            patterns: def.patterns,
            keywords: def.keywords,
            score_rule: def.score_rule,
            face_threshold: def.face_threshold,
            article: def.article,
            compiled,
            keywords_lower,
        })
    }

    /// Does any pattern match?
    pub fn matches_pattern(&self, text: &str) -> bool {
        self.compiled.iter().any(|re| re.is_match(text))
    }

    /// Does any keyword occur? `text_lower` must already be lowercased.
    pub fn matches_keyword(&self, text_lower: &str) -> bool {
        self.keywords_lower
            .iter()
            .any(|k| !k.is_empty() && text_lower.contains(k.as_str()))
    }

    pub fn article(&self) -> &str {
        match &self.article {
            Some(a) => a,
            None => default_article(self.risk_level),
        }
    }
}

/// Governing provision for a tier when the tag names none.
pub fn default_article(tier: RiskTier) -> &'static str {
    match tier {
        RiskTier::Unacceptable => "EU AI Act Article 5 (prohibited AI practices)",
        RiskTier::High => "EU AI Act Annex III (high-risk AI systems)",
        RiskTier::Limited => "EU AI Act Article 52 (transparency obligations)",
        RiskTier::Minimal => "no specific obligations (minimal risk)",
    }
}

// ---------------------------------------------------------------------------
// PolicyPack — immutable value snapshot of a published pack
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PolicyPack {
    pub id: u32,
    pub name: String,
    pub version: PolicyVersion,
    pub description: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    tags: Vec<PolicyTag>,
}

impl PolicyPack {
    /// Validate a definition and compile its lexicon.
    pub fn publish(def: PackDefinition) -> PolicyResult<Self> {
        if def.version.as_str().trim().is_empty() {
            return Err(PolicyError::InvalidPack(format!(
                "pack '{}' has an empty version",
                def.name
            )));
        }

        let mut seen = BTreeSet::new();
        for tag in &def.tags {
            if tag.name.trim().is_empty() {
                return Err(PolicyError::InvalidPack(format!(
                    "pack '{}' contains a tag with an empty name",
                    def.version
                )));
            }
            if !seen.insert(tag.name.as_str()) {
                return Err(PolicyError::InvalidPack(format!(
                    "pack '{}' defines tag '{}' more than once",
                    def.version, tag.name
                )));
            }
        }

        let tags = def
            .tags
            .into_iter()
            .map(|t| PolicyTag::publish(t, &def.version))
            .collect::<PolicyResult<Vec<_>>>()?;

        Ok(Self {
            id: def.id,
            name: def.name,
            version: def.version,
            description: def.description,
            created_at: def.created_at,
            tags,
        })
    }

    /// Tags in definition order.
    pub fn tags(&self) -> &[PolicyTag] {
        &self.tags
    }

    pub fn tag(&self, name: &str) -> Option<&PolicyTag> {
        self.tags.iter().find(|t| t.name == name)
    }

    /// Position of a tag in definition order; used as the tie-break
    /// within a tier.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.tags.iter().position(|t| t.name == name)
    }
}

// ---------------------------------------------------------------------------
// Detection — detector output
// ---------------------------------------------------------------------------

/// Where a candidate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SignalSource {
    /// Regular-expression lexicon hit.
    Pattern,
    /// Substring lexicon hit.
    Keyword,
    /// Scorer probability above the tag threshold.
    Scorer,
    /// Face-presence signal on the attached image.
    Image,
}

/// The three independent detectors that can corroborate one another.
/// Pattern and keyword hits both come from the lexicon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Detector {
    Lexicon,
    Scorer,
    Image,
}

impl SignalSource {
    pub fn detector(self) -> Detector {
        match self {
            SignalSource::Pattern | SignalSource::Keyword => Detector::Lexicon,
            SignalSource::Scorer => Detector::Scorer,
            SignalSource::Image => Detector::Image,
        }
    }
}

/// Candidate tag names with the signals that produced each one.
/// Ordered maps keep iteration deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detection {
    candidates: BTreeMap<String, BTreeSet<SignalSource>>,
}

impl Detection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tag: impl Into<String>, source: SignalSource) {
        self.candidates.entry(tag.into()).or_default().insert(source);
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn candidate_names(&self) -> impl Iterator<Item = &str> {
        self.candidates.keys().map(String::as_str)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.candidates.contains_key(tag)
    }

    pub fn sources(&self, tag: &str) -> Option<&BTreeSet<SignalSource>> {
        self.candidates.get(tag)
    }
}

// ---------------------------------------------------------------------------
// Evaluation — evaluator output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Evaluation<'p> {
    /// Ordered by tier precedence, then pack position.
    pub triggered: Vec<&'p PolicyTag>,
    pub risk_level: RiskTier,
    pub action: Action,
}

impl Evaluation<'_> {
    pub fn tag_names(&self) -> Vec<String> {
        self.triggered.iter().map(|t| t.name.clone()).collect()
    }
}
