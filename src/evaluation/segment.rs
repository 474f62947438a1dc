use tracing::warn;

use super::clause::RuleMatcher;
use crate::context::RequestContext;
use crate::segments::Segment;

impl<'a> RuleMatcher<'a> {
    /// Membership test: exclusion beats inclusion, inclusion beats rules.
    pub fn is_in_segment(&self, segment: &Segment, context: &RequestContext) -> bool {
        self.segment_membership(segment, context, &mut Vec::new())
    }

    pub(crate) fn segment_membership(
        &self,
        segment: &Segment,
        context: &RequestContext,
        path: &mut Vec<String>,
    ) -> bool {
        if let Some(target) = context.select(segment.context_kind.as_deref()) {
            let key = target.key();
            if segment.excluded.iter().any(|k| k == key) {
                return false;
            }
            if segment.included.iter().any(|k| k == key) {
                return true;
            }
        }

        if path.iter().any(|k| k == &segment.key) {
            warn!(segment = %segment.key, "segment rules reference themselves");
            return false;
        }

        path.push(segment.key.clone());
        let matched = segment
            .rules
            .iter()
            .any(|rule| self.all(&rule.clauses, context, path));
        path.pop();
        matched
    }
}

/// Segment membership using the segment's own lists and rules only.
pub fn is_in_segment(segment: &Segment, context: &RequestContext) -> bool {
    RuleMatcher::new().is_in_segment(segment, context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, MultiContext};
    use crate::rules::{Clause, Operator};
    use crate::segments::SegmentRule;
    use serde_json::json;
    use std::collections::HashMap;

    fn user(key: &str) -> RequestContext {
        Context::user(key).with_attribute("email", format!("{key}@acme.com")).into()
    }

    fn beta() -> Segment {
        let mut segment = Segment::new("beta");
        segment.included = vec!["both".to_string(), "in".to_string()];
        segment.excluded = vec!["both".to_string(), "staff".to_string()];
        segment
    }

    #[test]
    fn test_exclusion_wins() {
        assert!(!is_in_segment(&beta(), &user("both")));
    }

    #[test]
    fn test_included_only() {
        assert!(is_in_segment(&beta(), &user("in")));
    }

    #[test]
    fn test_no_list_no_rule() {
        assert!(!is_in_segment(&beta(), &user("stranger")));
    }

    #[test]
    fn test_rules_decide_the_rest() {
        let mut segment = beta();
        segment.rules.push(SegmentRule::new(
            "acme",
            vec![Clause::new("email", Operator::EndsWith, vec![json!("@acme.com")])],
        ));

        assert!(is_in_segment(&segment, &user("stranger")));
        // Excluded keys stay out even when a rule matches.
        assert!(!is_in_segment(&segment, &user("staff")));
    }

    #[test]
    fn test_lists_follow_context_kind() {
        let mut segment = Segment::new("big-orgs");
        segment.context_kind = Some("org".to_string());
        segment.included = vec!["acme".to_string()];

        let multi: RequestContext = MultiContext::new(vec![
            Context::user("acme"),
            Context::new("org", "acme").unwrap(),
        ])
        .unwrap()
        .into();
        assert!(is_in_segment(&segment, &multi));
        assert!(!is_in_segment(&segment, &user("acme")));
    }

    #[test]
    fn test_nested_segments() {
        let mut inner = Segment::new("inner");
        inner.included = vec!["u-1".to_string()];

        let mut outer = Segment::new("outer");
        outer.rules.push(SegmentRule::new(
            "nested",
            vec![Clause::new("segments", Operator::In, vec![json!("inner")])],
        ));

        let store: HashMap<String, Segment> = [inner, outer.clone()]
            .into_iter()
            .map(|s| (s.key.clone(), s))
            .collect();
        let matcher = RuleMatcher::with_segments(&store, "segments");

        assert!(matcher.is_in_segment(&outer, &user("u-1")));
        assert!(!matcher.is_in_segment(&outer, &user("u-2")));
        // Without the lookup the clause reads a plain, absent attribute.
        assert!(!is_in_segment(&outer, &user("u-1")));
    }

    #[test]
    fn test_self_referencing_segment_terminates() {
        let mut looping = Segment::new("loop");
        looping.rules.push(SegmentRule::new(
            "self",
            vec![Clause::new("segments", Operator::In, vec![json!("loop")])],
        ));

        let store: HashMap<String, Segment> =
            [(looping.key.clone(), looping.clone())].into_iter().collect();
        let matcher = RuleMatcher::with_segments(&store, "segments");

        assert!(!matcher.is_in_segment(&looping, &user("u-1")));
    }
}
