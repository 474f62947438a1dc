pub mod bucket;
pub mod clause;
pub mod hash;
pub mod prerequisite;
pub mod segment;
pub mod semver;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::config::EvaluatorConfig;
use crate::context::RequestContext;
use crate::flags::FlagForEvaluation;
use crate::rules::VariationOrRollout;
use crate::store::{FlagStore, NoSegments, SegmentStore};
use bucket::bucket;
use clause::RuleMatcher;

static NO_SEGMENTS: NoSegments = NoSegments;

/// Why a variation was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    Off,
    TargetMatch,
    RuleMatch,
    PrerequisiteFailed,
    Fallthrough,
    Error,
}

/// Which stage produced an unusable result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    OffVariationMissing,
    TargetVariationMissing,
    RuleVariationMissing,
    FallthroughVariationMissing,
    FlagNotFound,
}

// Flag evaluation result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub value: Value,
    pub variation_id: Option<String>,
    pub reason: Reason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prerequisite_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prerequisite_error: Option<String>,
}

impl EvaluationResult {
    fn served(value: Value, variation_id: &str, reason: Reason) -> Self {
        Self {
            value,
            variation_id: Some(variation_id.to_string()),
            reason,
            rule_index: None,
            rule_id: None,
            error_kind: None,
            prerequisite_key: None,
            prerequisite_error: None,
        }
    }

    fn error(kind: ErrorKind) -> Self {
        Self {
            value: Value::Null,
            variation_id: None,
            reason: Reason::Error,
            rule_index: None,
            rule_id: None,
            error_kind: Some(kind),
            prerequisite_key: None,
            prerequisite_error: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.reason == Reason::Error
    }
}

/// Evaluates flags against contexts.
///
/// Holds read-only views of the flag and segment stores plus settings. It
/// keeps no state between calls and can be shared across threads.
pub struct Evaluator<'a> {
    flags: &'a dyn FlagStore,
    segments: &'a dyn SegmentStore,
    config: EvaluatorConfig,
}

impl<'a> Evaluator<'a> {
    pub fn new(flags: &'a dyn FlagStore) -> Self {
        Self {
            flags,
            segments: &NO_SEGMENTS,
            config: EvaluatorConfig::default(),
        }
    }

    pub fn with_segments(mut self, segments: &'a dyn SegmentStore) -> Self {
        self.segments = segments;
        self
    }

    pub fn with_config(mut self, config: EvaluatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    fn matcher(&self) -> RuleMatcher<'_> {
        match self.config.segment_attribute.as_deref() {
            Some(attribute) => RuleMatcher::with_segments(self.segments, attribute),
            None => RuleMatcher::new(),
        }
    }

    /// Evaluate one flag for one context. Always produces a result.
    pub fn evaluate(&self, flag: &FlagForEvaluation, context: &RequestContext) -> EvaluationResult {
        let result = self.evaluate_on_path(flag, context, &mut vec![flag.key.clone()]);
        debug!(
            flag = %flag.key,
            reason = ?result.reason,
            variation = ?result.variation_id,
            "flag evaluated"
        );
        result
    }

    /// Evaluate a flag looked up by key.
    pub fn evaluate_key(&self, key: &str, context: &RequestContext) -> EvaluationResult {
        match self.flags.flag(key) {
            Some(flag) => self.evaluate(flag, context),
            None => {
                debug!(flag = key, "evaluated unknown flag");
                EvaluationResult::error(ErrorKind::FlagNotFound)
            }
        }
    }

    /// Evaluate every flag in the store, keyed by flag key.
    pub fn evaluate_all(&self, context: &RequestContext) -> BTreeMap<String, EvaluationResult> {
        self.flags
            .all_flags()
            .into_iter()
            .map(|flag| (flag.key.clone(), self.evaluate(flag, context)))
            .collect()
    }

    pub(crate) fn evaluate_on_path(
        &self,
        flag: &FlagForEvaluation,
        context: &RequestContext,
        path: &mut Vec<String>,
    ) -> EvaluationResult {
        // Step 1: If flag is off, serve the off variation
        if !flag.on {
            return off_result(flag, Reason::Off);
        }

        // Step 2: Every prerequisite must serve its required variation
        let check = self.prerequisites_on_path(flag, context, path);
        if !check.met {
            let mut result = off_result(flag, Reason::PrerequisiteFailed);
            result.prerequisite_key = check.failed_key;
            result.prerequisite_error = check.error;
            return result;
        }

        // Step 3: Individual targets, in array order
        for target in &flag.targets {
            let Some(target_context) = context.as_kind(&target.context_kind) else {
                continue;
            };
            if target.values.iter().any(|k| k == target_context.key()) {
                return resolve(
                    flag,
                    Some(target.variation_id.as_str()),
                    Reason::TargetMatch,
                    ErrorKind::TargetVariationMissing,
                );
            }
        }

        // Step 4: Rules, first match wins
        let matcher = self.matcher();
        for (index, rule) in flag.rules.iter().enumerate() {
            if !matcher.all(&rule.clauses, context, &mut Vec::new()) {
                continue;
            }

            let id = serve(flag, &rule.serve, context);
            let mut result = resolve(flag, id, Reason::RuleMatch, ErrorKind::RuleVariationMissing);
            result.rule_index = Some(index);
            result.rule_id = Some(rule.id.clone());
            return result;
        }

        // Step 5: Fallthrough
        let id = serve(flag, &flag.fallthrough, context);
        resolve(flag, id, Reason::Fallthrough, ErrorKind::FallthroughVariationMissing)
    }
}

fn serve<'f>(flag: &FlagForEvaluation, serve: &'f VariationOrRollout, context: &RequestContext) -> Option<&'f str> {
    match serve {
        VariationOrRollout::Variation { variation_id } => Some(variation_id.as_str()),
        VariationOrRollout::Rollout { rollout } => bucket(&flag.key, rollout, context),
    }
}

fn off_result(flag: &FlagForEvaluation, reason: Reason) -> EvaluationResult {
    resolve(
        flag,
        flag.off_variation_id.as_deref(),
        reason,
        ErrorKind::OffVariationMissing,
    )
}

fn resolve(flag: &FlagForEvaluation, id: Option<&str>, reason: Reason, missing: ErrorKind) -> EvaluationResult {
    match id.and_then(|id| flag.variation(id)) {
        Some(variation) => EvaluationResult::served(variation.value.clone(), &variation.id, reason),
        None => {
            warn!(flag = %flag.key, variation = ?id, stage = ?missing, "variation not found");
            EvaluationResult::error(missing)
        }
    }
}

/// Evaluate `flag` with default settings and no segments.
pub fn evaluate(
    flag: &FlagForEvaluation,
    all_flags: &dyn FlagStore,
    context: &RequestContext,
) -> EvaluationResult {
    Evaluator::new(all_flags).evaluate(flag, context)
}
