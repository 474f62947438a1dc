//! Deterministic feature flag evaluation.
//!
//! Given a flag, the flags it may depend on and a context, [`evaluate`]
//! picks exactly one variation and reports why. Nothing here performs I/O
//! or keeps state between calls: callers load flags and segments, hand in
//! read-only views, and decide when to evaluate again.
//!
//! Rollouts hash with MurmurHash3 (x86, 32-bit) so every implementation
//! buckets a context identically.

pub mod config;
pub mod context;
pub mod error;
pub mod evaluation;
pub mod flags;
pub mod rules;
pub mod segments;
pub mod store;

pub use config::EvaluatorConfig;
pub use context::{Context, MultiContext, RequestContext};
pub use error::{ConfigError, ContextError, ValidationError};
pub use evaluation::bucket::{bucket, bucket_value, TOTAL_WEIGHT};
pub use evaluation::clause::{matches_clause, matches_rule, RuleMatcher};
pub use evaluation::hash::hash;
pub use evaluation::prerequisite::{check_prerequisites, PrerequisiteCheck};
pub use evaluation::segment::is_in_segment;
pub use evaluation::{evaluate, ErrorKind, EvaluationResult, Evaluator, Reason};
pub use flags::{FlagForEvaluation, FlagType, IndividualTarget, Prerequisite, Variation};
pub use rules::{Clause, Operator, Rollout, TargetingRule, VariationOrRollout, WeightedVariation};
pub use segments::{Segment, SegmentRule};
pub use store::{FlagStore, NoSegments, SegmentStore, Snapshot};
