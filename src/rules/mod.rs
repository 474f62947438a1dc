use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::warn;

use crate::error::ValidationError;
use crate::evaluation::bucket::TOTAL_WEIGHT;

// MODELS

/// Comparison applied by a clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Eq,
    Neq,
    In,
    Contains,
    StartsWith,
    EndsWith,
    Matches,
    Gt,
    Lt,
    Gte,
    Lte,
    SemverEq,
    SemverGt,
    SemverLt,
    /// Any operator name this build does not know. Never matches.
    #[serde(other)]
    Unknown,
}

/// One typed comparison against a context attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clause {
    pub attribute: String,
    pub op: Operator,
    #[serde(default)]
    pub values: Vec<Value>,
    #[serde(default)]
    pub negate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_kind: Option<String>,
    #[serde(skip)]
    patterns: PatternCache,
}

impl Clause {
    pub fn new(attribute: impl Into<String>, op: Operator, values: Vec<Value>) -> Self {
        Self {
            attribute: attribute.into(),
            op,
            values,
            negate: false,
            context_kind: None,
            patterns: PatternCache::default(),
        }
    }

    /// Compiled `matches` patterns, built on first use and reused after.
    /// Invalid patterns are left out.
    pub(crate) fn patterns(&self) -> Cow<'_, [Regex]> {
        let (source, compiled) = self
            .patterns
            .0
            .get_or_init(|| (self.values.clone(), compile_patterns(&self.values)));
        if *source == self.values {
            Cow::Borrowed(compiled.as_slice())
        } else {
            // `values` was edited after the first match
            Cow::Owned(compile_patterns(&self.values))
        }
    }

    pub fn negated(mut self) -> Self {
        self.negate = !self.negate;
        self
    }

    pub fn for_kind(mut self, kind: impl Into<String>) -> Self {
        self.context_kind = Some(kind.into());
        self
    }
}

/// Regexes compiled from a clause's values, paired with the values they came from.
#[derive(Debug, Clone, Default)]
struct PatternCache(OnceLock<(Vec<Value>, Vec<Regex>)>);

impl PartialEq for PatternCache {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

fn compile_patterns(values: &[Value]) -> Vec<Regex> {
    values
        .iter()
        .filter_map(|value| match value {
            Value::String(s) => Some(Cow::Borrowed(s.as_str())),
            Value::Number(n) => Some(Cow::Owned(n.to_string())),
            Value::Bool(b) => Some(Cow::Owned(b.to_string())),
            _ => None,
        })
        .filter_map(|pattern| match Regex::new(&pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(pattern = %pattern, error = %e, "invalid pattern in matches clause");
                None
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightedVariation {
    pub variation_id: String,
    /// Share of traffic on a 0..=100000 scale.
    pub weight: u32,
}

/// A deterministic weighted split across variations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rollout {
    pub variations: Vec<WeightedVariation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_kind: Option<String>,
}

impl Rollout {
    pub fn new(variations: impl IntoIterator<Item = (impl Into<String>, u32)>) -> Self {
        Self {
            variations: variations
                .into_iter()
                .map(|(variation_id, weight)| WeightedVariation {
                    variation_id: variation_id.into(),
                    weight,
                })
                .collect(),
            bucket_by: None,
            context_kind: None,
        }
    }

    pub fn bucket_by(mut self, attribute: impl Into<String>) -> Self {
        self.bucket_by = Some(attribute.into());
        self
    }
}

/// What a rule or the fallthrough serves: a fixed variation or a rollout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariationOrRollout {
    Variation {
        #[serde(rename = "variationId")]
        variation_id: String,
    },
    Rollout { rollout: Rollout },
}

impl VariationOrRollout {
    pub fn variation(id: impl Into<String>) -> Self {
        VariationOrRollout::Variation {
            variation_id: id.into(),
        }
    }
}

impl From<Rollout> for VariationOrRollout {
    fn from(rollout: Rollout) -> Self {
        VariationOrRollout::Rollout { rollout }
    }
}

/// Clauses ANDed together, serving one variation or rollout when they all hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetingRule {
    pub id: String,
    #[serde(default)]
    pub clauses: Vec<Clause>,
    #[serde(flatten)]
    pub serve: VariationOrRollout,
}

impl TargetingRule {
    pub fn new(id: impl Into<String>, clauses: Vec<Clause>, serve: impl Into<VariationOrRollout>) -> Self {
        Self {
            id: id.into(),
            clauses,
            serve: serve.into(),
        }
    }
}

impl From<String> for VariationOrRollout {
    fn from(id: String) -> Self {
        VariationOrRollout::variation(id)
    }
}

impl From<&str> for VariationOrRollout {
    fn from(id: &str) -> Self {
        VariationOrRollout::variation(id)
    }
}

// HELPER FUNCTIONS

/// Check that a rollout's weights are in range and add up to the full scale.
pub fn validate_rollout(location: &str, rollout: &Rollout) -> Result<(), ValidationError> {
    if rollout.variations.is_empty() {
        return Err(ValidationError::EmptyRollout {
            location: location.to_string(),
        });
    }

    let mut sum: u64 = 0;
    for weighted in &rollout.variations {
        if weighted.weight > TOTAL_WEIGHT {
            return Err(ValidationError::WeightOutOfRange {
                location: location.to_string(),
                weight: weighted.weight,
                max: TOTAL_WEIGHT,
            });
        }
        sum += u64::from(weighted.weight);
    }

    if sum != u64::from(TOTAL_WEIGHT) {
        return Err(ValidationError::WeightSum {
            location: location.to_string(),
            sum,
            expected: TOTAL_WEIGHT,
        });
    }

    Ok(())
}

/// Check that every `matches` pattern compiles.
pub fn validate_clause(location: &str, clause: &Clause) -> Result<(), ValidationError> {
    if clause.op != Operator::Matches {
        return Ok(());
    }

    for pattern in clause.values.iter().filter_map(Value::as_str) {
        if let Err(e) = Regex::new(pattern) {
            return Err(ValidationError::InvalidPattern {
                location: location.to_string(),
                pattern: pattern.to_string(),
                reason: e.to_string(),
            });
        }
    }

    Ok(())
}

/// Check a rule list: unique ids, compilable clauses, sane rollouts, known variations.
pub fn validate_rules(
    owner: &str,
    rules: &[TargetingRule],
    variation_ids: &HashSet<&str>,
) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();

    for (index, rule) in rules.iter().enumerate() {
        if !rule.id.is_empty() && !seen.insert(rule.id.as_str()) {
            return Err(ValidationError::DuplicateRule {
                id: rule.id.clone(),
            });
        }

        let location = format!("{owner} rule {index}");
        for clause in &rule.clauses {
            validate_clause(&location, clause)?;
        }

        validate_serve(&location, &rule.serve, variation_ids)?;
    }

    Ok(())
}

/// Check that a fixed variation or every rollout slice refers to a known variation.
pub fn validate_serve(
    location: &str,
    serve: &VariationOrRollout,
    variation_ids: &HashSet<&str>,
) -> Result<(), ValidationError> {
    match serve {
        VariationOrRollout::Variation { variation_id } => {
            require_known(location, variation_id, variation_ids)
        }
        VariationOrRollout::Rollout { rollout } => {
            validate_rollout(location, rollout)?;
            for weighted in &rollout.variations {
                require_known(location, &weighted.variation_id, variation_ids)?;
            }
            Ok(())
        }
    }
}

pub(crate) fn require_known(
    location: &str,
    id: &str,
    variation_ids: &HashSet<&str>,
) -> Result<(), ValidationError> {
    if variation_ids.contains(id) {
        Ok(())
    } else {
        Err(ValidationError::UnknownVariation {
            location: location.to_string(),
            id: id.to_string(),
        })
    }
}
