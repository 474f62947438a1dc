use dotenvy::dotenv;
use serde::Deserialize;
use std::env;

use crate::error::ConfigError;

pub const MAX_DEPTH_VAR: &str = "FLAG_MAX_PREREQUISITE_DEPTH";
pub const SEGMENT_ATTRIBUTE_VAR: &str = "FLAG_SEGMENT_ATTRIBUTE";

/// Tunables for an [`Evaluator`](crate::evaluation::Evaluator).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct EvaluatorConfig {
    /// Longest prerequisite chain followed before giving up. Unbounded when `None`.
    pub max_prerequisite_depth: Option<usize>,
    /// Reserved clause attribute whose values name segments. No segment
    /// lookups happen when `None`.
    pub segment_attribute: Option<String>,
}

impl EvaluatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv().is_ok();

        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build from any variable source; unset variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let max_prerequisite_depth = match lookup(MAX_DEPTH_VAR) {
            Some(raw) => Some(parse_depth(&raw)?),
            None => None,
        };

        let segment_attribute = match lookup(SEGMENT_ATTRIBUTE_VAR) {
            Some(raw) if raw.trim().is_empty() => {
                return Err(ConfigError::BlankValue {
                    name: SEGMENT_ATTRIBUTE_VAR,
                })
            }
            Some(raw) => Some(raw.trim().to_string()),
            None => None,
        };

        Ok(Self {
            max_prerequisite_depth,
            segment_attribute,
        })
    }

    pub fn with_max_prerequisite_depth(mut self, depth: usize) -> Self {
        self.max_prerequisite_depth = Some(depth);
        self
    }

    pub fn with_segment_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.segment_attribute = Some(attribute.into());
        self
    }
}

fn parse_depth(raw: &str) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(depth) if depth > 0 => Ok(depth),
        _ => Err(ConfigError::InvalidDepth {
            name: MAX_DEPTH_VAR,
            value: raw.to_string(),
        }),
    }
}
