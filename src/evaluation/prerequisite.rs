use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Evaluator, Reason};
use crate::context::RequestContext;
use crate::flags::FlagForEvaluation;
use crate::store::FlagStore;

/// Outcome of walking a flag's prerequisites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrerequisiteCheck {
    pub met: bool,
    /// Key of the first prerequisite that was not satisfied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_key: Option<String>,
    /// Set when the walk itself failed (cycle, missing flag, depth bound),
    /// as opposed to a prerequisite simply serving another variation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PrerequisiteCheck {
    fn met() -> Self {
        Self {
            met: true,
            failed_key: None,
            error: None,
        }
    }

    fn unmet(key: &str, error: Option<String>) -> Self {
        Self {
            met: false,
            failed_key: Some(key.to_string()),
            error,
        }
    }
}

impl<'a> Evaluator<'a> {
    /// Check every prerequisite of `flag`, in order, stopping at the first failure.
    pub fn check_prerequisites(&self, flag: &FlagForEvaluation, context: &RequestContext) -> PrerequisiteCheck {
        self.prerequisites_on_path(flag, context, &mut vec![flag.key.clone()])
    }

    /// `path` is the chain of flag keys currently being evaluated, outermost
    /// first. Keys are popped on the way back out, so a flag reached twice
    /// through different branches is not mistaken for a cycle.
    pub(crate) fn prerequisites_on_path(
        &self,
        flag: &FlagForEvaluation,
        context: &RequestContext,
        path: &mut Vec<String>,
    ) -> PrerequisiteCheck {
        for prerequisite in &flag.prerequisites {
            let key = prerequisite.flag_key.as_str();

            if path.iter().any(|k| k == key) {
                let chain = format!("{} -> {key}", path.join(" -> "));
                warn!(flag = %flag.key, chain = %chain, "circular prerequisite");
                return PrerequisiteCheck::unmet(
                    key,
                    Some(format!("Circular prerequisite dependency: {chain}")),
                );
            }

            if let Some(max) = self.config.max_prerequisite_depth {
                if path.len() > max {
                    warn!(flag = %flag.key, max, "prerequisite chain too deep");
                    return PrerequisiteCheck::unmet(
                        key,
                        Some(format!("Prerequisite chain exceeds maximum depth of {max}")),
                    );
                }
            }

            let Some(required) = self.flags.flag(key) else {
                warn!(flag = %flag.key, prerequisite = key, "prerequisite flag missing");
                return PrerequisiteCheck::unmet(key, Some(format!("Prerequisite flag '{key}' not found")));
            };

            path.push(key.to_string());
            let result = self.evaluate_on_path(required, context, path);
            path.pop();

            if let Some(error) = result.prerequisite_error {
                return PrerequisiteCheck::unmet(key, Some(error));
            }

            if result.reason == Reason::Error {
                return PrerequisiteCheck::unmet(
                    key,
                    Some(format!("Prerequisite flag '{key}' could not be evaluated")),
                );
            }

            if result.variation_id.as_deref() != Some(prerequisite.variation_id.as_str()) {
                debug!(
                    flag = %flag.key,
                    prerequisite = key,
                    expected = %prerequisite.variation_id,
                    actual = ?result.variation_id,
                    "prerequisite not satisfied"
                );
                return PrerequisiteCheck::unmet(key, None);
            }
        }

        PrerequisiteCheck::met()
    }
}

/// Walk `flag`'s prerequisites against `all_flags`, with default settings.
pub fn check_prerequisites(
    flag: &FlagForEvaluation,
    all_flags: &dyn FlagStore,
    context: &RequestContext,
) -> PrerequisiteCheck {
    Evaluator::new(all_flags).check_prerequisites(flag, context)
}
