use thiserror::Error;

/// Problems found in a flag or segment before it is published.
///
/// Evaluation never returns these; it degrades to a documented default
/// instead. They exist for the write path that stores configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("flag key cannot be empty")]
    EmptyKey,

    #[error("flag key is too long (max: {max} characters)")]
    KeyTooLong { max: usize },

    #[error("flag key must start with an ASCII letter")]
    KeyMustStartWithLetter,

    #[error("flag key can only contain lowercase letters, numbers, underscores and hyphens")]
    InvalidKeyCharacter,

    #[error("flag '{flag}' has no variations")]
    NoVariations { flag: String },

    #[error("variation id '{id}' is declared more than once")]
    DuplicateVariation { id: String },

    #[error("{location} references unknown variation '{id}'")]
    UnknownVariation { location: String, id: String },

    #[error("rule id '{id}' is declared more than once")]
    DuplicateRule { id: String },

    #[error("{location} weight {weight} is outside 0..={max}")]
    WeightOutOfRange {
        location: String,
        weight: u32,
        max: u32,
    },

    #[error("{location} weights sum to {sum}, expected {expected}")]
    WeightSum {
        location: String,
        sum: u64,
        expected: u32,
    },

    #[error("{location} has an empty rollout")]
    EmptyRollout { location: String },

    #[error("{location} has an invalid pattern '{pattern}': {reason}")]
    InvalidPattern {
        location: String,
        pattern: String,
        reason: String,
    },

    #[error("segment key cannot be empty")]
    EmptySegmentKey,
}

/// Rejected context shapes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context kind cannot be empty")]
    EmptyKind,

    #[error("context kind 'multi' is reserved for multi-kind contexts")]
    ReservedKind,

    #[error("multi-kind context must contain at least one context")]
    EmptyMulti,

    #[error("multi-kind context contains kind '{0}' more than once")]
    DuplicateKind(String),
}

/// Malformed environment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{name} must be a positive integer, got '{value}'")]
    InvalidDepth { name: &'static str, value: String },

    #[error("{name} cannot be blank")]
    BlankValue { name: &'static str },
}
