use serde_json::Value;
use std::borrow::Cow;
use tracing::debug;

use super::semver::Version;
use crate::context::RequestContext;
use crate::rules::{Clause, Operator, TargetingRule};
use crate::store::SegmentStore;

/// Segment membership wired into clause matching: a clause whose attribute
/// equals `attribute` treats its values as segment keys.
#[derive(Clone, Copy)]
pub struct SegmentLookup<'a> {
    pub store: &'a dyn SegmentStore,
    pub attribute: &'a str,
}

/// Clause and rule matching, optionally able to consult segments.
#[derive(Clone, Copy, Default)]
pub struct RuleMatcher<'a> {
    segments: Option<SegmentLookup<'a>>,
}

impl<'a> RuleMatcher<'a> {
    /// A matcher that never consults segments.
    pub fn new() -> Self {
        Self { segments: None }
    }

    pub fn with_segments(store: &'a dyn SegmentStore, attribute: &'a str) -> Self {
        Self {
            segments: Some(SegmentLookup { store, attribute }),
        }
    }

    pub fn matches_clause(&self, clause: &Clause, context: &RequestContext) -> bool {
        self.clause(clause, context, &mut Vec::new())
    }

    pub fn matches_rule(&self, rule: &TargetingRule, context: &RequestContext) -> bool {
        self.all(&rule.clauses, context, &mut Vec::new())
    }

    /// AND over `clauses`; an empty list holds.
    pub(crate) fn all(&self, clauses: &[Clause], context: &RequestContext, path: &mut Vec<String>) -> bool {
        clauses.iter().all(|clause| self.clause(clause, context, path))
    }

    /// `path` holds the segment keys being resolved above this clause.
    pub(crate) fn clause(&self, clause: &Clause, context: &RequestContext, path: &mut Vec<String>) -> bool {
        if clause.op == Operator::Unknown {
            debug!(attribute = %clause.attribute, "clause uses an unknown operator");
            return false;
        }

        if let Some(lookup) = self.segments.filter(|l| l.attribute == clause.attribute) {
            return self.segment_clause(lookup, clause, context, path) != clause.negate;
        }

        // `kind` without an explicit context kind asks about any kind present.
        if clause.attribute == "kind" && clause.context_kind.is_none() {
            let matched = context
                .kinds()
                .into_iter()
                .any(|kind| match_value(clause, &Value::String(kind.to_string())));
            return matched != clause.negate;
        }

        let Some(target) = context.select(clause.context_kind.as_deref()) else {
            return false;
        };
        let Some(value) = target.value_of(&clause.attribute) else {
            return false;
        };

        let matched = match (clause.op, value.as_ref()) {
            // `neq` on an array holds only when no element equals an operand.
            (Operator::Neq, Value::Array(items)) => {
                !items.iter().any(|item| equals_any(item, &clause.values))
            }
            (_, Value::Array(items)) => items.iter().any(|item| match_value(clause, item)),
            (_, single) => match_value(clause, single),
        };
        matched != clause.negate
    }

    fn segment_clause(
        &self,
        lookup: SegmentLookup<'_>,
        clause: &Clause,
        context: &RequestContext,
        path: &mut Vec<String>,
    ) -> bool {
        if !matches!(clause.op, Operator::In | Operator::Eq) {
            debug!(op = ?clause.op, "segment clauses only support in/eq");
            return false;
        }

        clause.values.iter().filter_map(Value::as_str).any(|key| {
            match lookup.store.segment(key) {
                Some(segment) => self.segment_membership(segment, context, path),
                None => {
                    debug!(segment = key, "clause references unknown segment");
                    false
                }
            }
        })
    }
}

/// Match one clause against a context, without segment lookups.
pub fn matches_clause(clause: &Clause, context: &RequestContext) -> bool {
    RuleMatcher::new().matches_clause(clause, context)
}

/// Match every clause of a rule against a context, without segment lookups.
pub fn matches_rule(rule: &TargetingRule, context: &RequestContext) -> bool {
    RuleMatcher::new().matches_rule(rule, context)
}

/// Apply the clause operator to one attribute value against its operand list.
fn match_value(clause: &Clause, actual: &Value) -> bool {
    let operands = clause.values.as_slice();
    match clause.op {
        Operator::Eq | Operator::In => equals_any(actual, operands),
        Operator::Neq => !equals_any(actual, operands),
        Operator::Contains => string_op(actual, operands, |a, o| a.contains(o)),
        Operator::StartsWith => string_op(actual, operands, |a, o| a.starts_with(o)),
        Operator::EndsWith => string_op(actual, operands, |a, o| a.ends_with(o)),
        Operator::Matches => pattern_op(actual, clause),
        Operator::Gt => numeric_op(actual, operands, |a, o| a > o),
        Operator::Lt => numeric_op(actual, operands, |a, o| a < o),
        Operator::Gte => numeric_op(actual, operands, |a, o| a >= o),
        Operator::Lte => numeric_op(actual, operands, |a, o| a <= o),
        Operator::SemverEq => semver_op(actual, operands, |a, o| a == o),
        Operator::SemverGt => semver_op(actual, operands, |a, o| a > o),
        Operator::SemverLt => semver_op(actual, operands, |a, o| a < o),
        Operator::Unknown => false,
    }
}

fn equals_any(actual: &Value, operands: &[Value]) -> bool {
    operands.iter().any(|o| values_equal(actual, o))
}

/// Strict equality, except numbers compare by value (`1 == 1.0`).
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        _ => a == b,
    }
}

/// Text form for the string operators: strings, numbers and booleans only.
fn as_text(value: &Value) -> Option<Cow<'_, str>> {
    match value {
        Value::String(s) => Some(Cow::Borrowed(s.as_str())),
        Value::Number(n) => Some(Cow::Owned(n.to_string())),
        Value::Bool(b) => Some(Cow::Owned(b.to_string())),
        _ => None,
    }
}

fn string_op(actual: &Value, operands: &[Value], test: impl Fn(&str, &str) -> bool) -> bool {
    let Some(actual) = as_text(actual) else {
        return false;
    };
    operands
        .iter()
        .filter_map(as_text)
        .any(|operand| test(&*actual, &*operand))
}

fn pattern_op(actual: &Value, clause: &Clause) -> bool {
    let Some(actual) = as_text(actual) else {
        return false;
    };
    clause.patterns().iter().any(|re| re.is_match(&actual))
}

fn numeric_op(actual: &Value, operands: &[Value], test: impl Fn(f64, f64) -> bool) -> bool {
    let Some(actual) = actual.as_f64() else {
        return false;
    };
    operands
        .iter()
        .filter_map(Value::as_f64)
        .any(|operand| test(actual, operand))
}

fn semver_op(actual: &Value, operands: &[Value], test: impl Fn(&Version, &Version) -> bool) -> bool {
    let Some(actual) = actual.as_str().and_then(|s| s.parse::<Version>().ok()) else {
        return false;
    };
    operands
        .iter()
        .filter_map(|o| o.as_str().and_then(|s| s.parse::<Version>().ok()))
        .any(|operand| test(&actual, &operand))
}
