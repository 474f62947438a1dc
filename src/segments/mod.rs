use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::rules::{validate_clause, Clause};

// MODELS

/// A condition set for segment membership. Serves nothing by itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentRule {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub clauses: Vec<Clause>,
}

impl SegmentRule {
    pub fn new(id: impl Into<String>, clauses: Vec<Clause>) -> Self {
        Self {
            id: id.into(),
            clauses,
        }
    }
}

/// A reusable, named group of contexts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub key: String,
    #[serde(default)]
    pub rules: Vec<SegmentRule>,
    #[serde(default)]
    pub included: Vec<String>,
    #[serde(default)]
    pub excluded: Vec<String>,
    /// Kind whose key is checked against `included`/`excluded`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_kind: Option<String>,
}

impl Segment {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }
}

// HELPER FUNCTIONS

pub fn validate_segment(segment: &Segment) -> Result<(), ValidationError> {
    if segment.key.trim().is_empty() {
        return Err(ValidationError::EmptySegmentKey);
    }

    for (index, rule) in segment.rules.iter().enumerate() {
        let location = format!("segment {} rule {index}", segment.key);
        for clause in &rule.clauses {
            validate_clause(&location, clause)?;
        }
    }

    Ok(())
}
