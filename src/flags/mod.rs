use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;

use crate::context::DEFAULT_KIND;
use crate::error::ValidationError;
use crate::rules::{require_known, validate_rules, validate_serve, TargetingRule, VariationOrRollout};

pub const MAX_FLAG_KEY_LEN: usize = 64;

// MODELS

/// Declared payload type of a flag's variations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlagType {
    Boolean,
    String,
    Number,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variation {
    pub id: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Variation {
    pub fn new(id: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
            name: None,
        }
    }
}

/// Context keys pinned to a variation regardless of rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndividualTarget {
    #[serde(default = "default_kind")]
    pub context_kind: String,
    pub variation_id: String,
    #[serde(default)]
    pub values: Vec<String>,
}

fn default_kind() -> String {
    DEFAULT_KIND.to_string()
}

/// Another flag that must currently serve `variation_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prerequisite {
    pub flag_key: String,
    pub variation_id: String,
}

impl Prerequisite {
    pub fn new(flag_key: impl Into<String>, variation_id: impl Into<String>) -> Self {
        Self {
            flag_key: flag_key.into(),
            variation_id: variation_id.into(),
        }
    }
}

/// Everything needed to evaluate one flag in one environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagForEvaluation {
    pub key: String,
    #[serde(rename = "type")]
    pub flag_type: FlagType,
    pub variations: Vec<Variation>,
    pub on: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub off_variation_id: Option<String>,
    pub fallthrough: VariationOrRollout,
    #[serde(default)]
    pub targets: Vec<IndividualTarget>,
    #[serde(default)]
    pub rules: Vec<TargetingRule>,
    #[serde(default)]
    pub prerequisites: Vec<Prerequisite>,
    /// Carried through but not part of the bucketing input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
}

impl FlagForEvaluation {
    /// A boolean flag with variations `"true"` and `"false"`, on, falling through to `"true"`.
    pub fn boolean(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            flag_type: FlagType::Boolean,
            variations: vec![Variation::new("true", true), Variation::new("false", false)],
            on: true,
            off_variation_id: Some("false".to_string()),
            fallthrough: VariationOrRollout::variation("true"),
            targets: Vec::new(),
            rules: Vec::new(),
            prerequisites: Vec::new(),
            salt: None,
        }
    }

    pub fn variation(&self, id: &str) -> Option<&Variation> {
        self.variations.iter().find(|v| v.id == id)
    }
}

// HELPER FUNCTIONS

/// Validating the flag key
pub fn validate_flag_key(key: &str) -> Result<(), ValidationError> {
    let Some(first) = key.chars().next() else {
        return Err(ValidationError::EmptyKey);
    };

    if key.len() > MAX_FLAG_KEY_LEN {
        return Err(ValidationError::KeyTooLong {
            max: MAX_FLAG_KEY_LEN,
        });
    }

    if !first.is_ascii_alphabetic() {
        return Err(ValidationError::KeyMustStartWithLetter);
    }

    if !key
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        return Err(ValidationError::InvalidKeyCharacter);
    }

    Ok(())
}

/// Full structural check of a flag before it is published.
pub fn validate_flag(flag: &FlagForEvaluation) -> Result<(), ValidationError> {
    validate_flag_key(&flag.key)?;

    if flag.variations.is_empty() {
        return Err(ValidationError::NoVariations {
            flag: flag.key.clone(),
        });
    }

    let mut ids = HashSet::new();
    for variation in &flag.variations {
        if !ids.insert(variation.id.as_str()) {
            return Err(ValidationError::DuplicateVariation {
                id: variation.id.clone(),
            });
        }
    }

    if let Some(off) = &flag.off_variation_id {
        require_known("off variation", off, &ids)?;
    }
    validate_serve("fallthrough", &flag.fallthrough, &ids)?;

    for (index, target) in flag.targets.iter().enumerate() {
        require_known(&format!("target {index}"), &target.variation_id, &ids)?;
    }

    validate_rules(&flag.key, &flag.rules, &ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Rollout;
    use serde_json::json;

    #[test]
    fn test_validate_flag_key() {
        assert!(validate_flag_key("new-checkout_v2").is_ok());
        assert_eq!(validate_flag_key(""), Err(ValidationError::EmptyKey));
        assert_eq!(
            validate_flag_key("2fa"),
            Err(ValidationError::KeyMustStartWithLetter)
        );
        assert_eq!(
            validate_flag_key("NewCheckout"),
            Err(ValidationError::InvalidKeyCharacter)
        );
        assert!(matches!(
            validate_flag_key(&"a".repeat(65)),
            Err(ValidationError::KeyTooLong { .. })
        ));
    }

    #[test]
    fn test_deserialize_flag() {
        let flag: FlagForEvaluation = serde_json::from_value(json!({
            "key": "dark-mode",
            "type": "boolean",
            "variations": [
                {"id": "on", "value": true},
                {"id": "off", "value": false}
            ],
            "on": true,
            "offVariationId": "off",
            "fallthrough": {"variationId": "off"},
            "targets": [{"variationId": "on", "values": ["user-1"]}],
            "prerequisites": [{"flagKey": "new-ui", "variationId": "on"}]
        }))
        .unwrap();

        assert_eq!(flag.flag_type, FlagType::Boolean);
        assert_eq!(flag.targets[0].context_kind, "user");
        assert_eq!(flag.prerequisites[0], Prerequisite::new("new-ui", "on"));
        assert!(flag.rules.is_empty());
        assert!(flag.salt.is_none());
        assert_eq!(flag.variation("on").map(|v| &v.value), Some(&json!(true)));
    }

    #[test]
    fn test_validate_flag() {
        let flag = FlagForEvaluation::boolean("checkout");
        assert!(validate_flag(&flag).is_ok());

        let mut missing_off = flag.clone();
        missing_off.off_variation_id = Some("gone".to_string());
        assert!(matches!(
            validate_flag(&missing_off),
            Err(ValidationError::UnknownVariation { .. })
        ));

        let mut duplicate = flag.clone();
        duplicate.variations.push(Variation::new("true", true));
        assert_eq!(
            validate_flag(&duplicate),
            Err(ValidationError::DuplicateVariation { id: "true".to_string() })
        );

        let mut short_rollout = flag.clone();
        short_rollout.fallthrough = Rollout::new([("true", 10_000), ("false", 10_000)]).into();
        assert!(matches!(
            validate_flag(&short_rollout),
            Err(ValidationError::WeightSum { .. })
        ));

        let mut empty = flag;
        empty.variations.clear();
        empty.off_variation_id = None;
        assert!(matches!(
            validate_flag(&empty),
            Err(ValidationError::NoVariations { .. })
        ));
    }
}
