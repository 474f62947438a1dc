use serde_json::Value;
use std::borrow::Cow;

use super::hash::hash;
use crate::context::RequestContext;
use crate::rules::Rollout;

/// Rollout weights are expressed against this total.
pub const TOTAL_WEIGHT: u32 = 100_000;

const KEY_ATTRIBUTE: &str = "key";

/// Position of a context within a flag's rollout, in `0..TOTAL_WEIGHT`.
///
/// Hashes `"{flag_key}.{bucket value}"`. The bucket value is the context key
/// unless `bucket_by` names a present attribute. Strings are used as-is,
/// numbers and booleans by their JSON text (`0.5`, `true`). A missing or null
/// attribute, an array or an object falls back to the key. A multi-kind
/// context missing the rollout's kind lands in bucket 0.
pub fn bucket_value(flag_key: &str, rollout: &Rollout, context: &RequestContext) -> u32 {
    let Some(context) = context.select(rollout.context_kind.as_deref()) else {
        return 0;
    };

    let attribute = rollout.bucket_by.as_deref().unwrap_or(KEY_ATTRIBUTE);
    let value: Cow<'_, str> = if attribute == KEY_ATTRIBUTE {
        Cow::Borrowed(context.key())
    } else {
        context
            .value_of(attribute)
            .and_then(|value| bucketable(value.as_ref()))
            .map_or(Cow::Borrowed(context.key()), Cow::Owned)
    };

    hash(&format!("{flag_key}.{value}"), 0) % TOTAL_WEIGHT
}

fn bucketable(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Pick the rollout variation for a context.
///
/// Walks the weights in order and returns the first slice whose running
/// total exceeds the bucket. Weights summing short of the full scale leave
/// the remainder to the last slice. `None` only for an empty rollout.
pub fn bucket<'r>(flag_key: &str, rollout: &'r Rollout, context: &RequestContext) -> Option<&'r str> {
    let bucket = u64::from(bucket_value(flag_key, rollout, context));

    let mut cumulative: u64 = 0;
    for weighted in &rollout.variations {
        cumulative += u64::from(weighted.weight);
        if cumulative > bucket {
            return Some(&weighted.variation_id);
        }
    }

    rollout.variations.last().map(|w| w.variation_id.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Context, MultiContext};

    fn user(key: &str) -> RequestContext {
        Context::user(key).into()
    }

    fn half_and_half() -> Rollout {
        Rollout::new([("on", 50_000), ("off", 50_000)])
    }

    #[test]
    fn test_known_bucket_value() {
        let rollout = half_and_half();
        assert_eq!(bucket_value("my-flag", &rollout, &user("user-1")), 79_288);
        assert_eq!(bucket_value("my-flag", &rollout, &user("user-2")), 53_257);
    }

    #[test]
    fn test_boundary_is_exclusive() {
        let ctx = user("user-1");
        let below = Rollout::new([("a", 79_288), ("b", 20_712)]);
        let above = Rollout::new([("a", 79_289), ("b", 20_711)]);
        assert_eq!(bucket("my-flag", &below, &ctx), Some("b"));
        assert_eq!(bucket("my-flag", &above, &ctx), Some("a"));
    }

    #[test]
    fn test_bucket_deterministic() {
        let rollout = half_and_half();
        for i in 0..50 {
            let ctx = user(&format!("user-{i}"));
            assert_eq!(bucket("flag", &rollout, &ctx), bucket("flag", &rollout, &ctx));
        }
    }

    #[test]
    fn test_full_weight_takes_everyone() {
        let rollout = Rollout::new([("only", TOTAL_WEIGHT)]);
        for i in 0..100 {
            assert_eq!(bucket("flag", &rollout, &user(&format!("key-{i}"))), Some("only"));
        }
    }

    #[test]
    fn test_even_split_distribution() {
        let rollout = half_and_half();
        let on = (0..100_000)
            .filter(|i| bucket("rollout-flag", &rollout, &user(&format!("user-{i}"))) == Some("on"))
            .count();
        assert!((49_000..=51_000).contains(&on), "on = {on}");
    }

    #[test]
    fn test_small_population_sees_both() {
        let rollout = half_and_half();
        let picks: Vec<&str> = (0..20)
            .filter_map(|i| bucket("split-flag", &rollout, &user(&format!("user-{i}"))))
            .collect();
        assert!(picks.contains(&"on"));
        assert!(picks.contains(&"off"));
    }

    #[test]
    fn test_short_weights_fall_to_last() {
        let rollout = Rollout::new([("a", 0), ("b", 0)]);
        assert_eq!(bucket("flag", &rollout, &user("anyone")), Some("b"));

        let empty = Rollout::new(Vec::<(String, u32)>::new());
        assert_eq!(bucket("flag", &empty, &user("anyone")), None);
    }

    #[test]
    fn test_bucket_by_attribute() {
        let rollout = half_and_half().bucket_by("org_id");
        let a: RequestContext = Context::user("a").with_attribute("org_id", "acme").into();
        let b: RequestContext = Context::user("b").with_attribute("org_id", "acme").into();
        assert_eq!(
            bucket_value("flag", &rollout, &a),
            bucket_value("flag", &rollout, &b)
        );

        // Integers bucket by their decimal form.
        let numeric: RequestContext = Context::user("c").with_attribute("org_id", 42).into();
        let text: RequestContext = Context::user("d").with_attribute("org_id", "42").into();
        assert_eq!(
            bucket_value("flag", &rollout, &numeric),
            bucket_value("flag", &rollout, &text)
        );
    }

    #[test]
    fn test_missing_bucket_by_falls_back_to_key() {
        let by_email = half_and_half().bucket_by("email");
        let by_key = half_and_half();
        let ctx = user("user-7");
        assert_eq!(
            bucket_value("flag", &by_email, &ctx),
            bucket_value("flag", &by_key, &ctx)
        );

        for unusable in [Value::Null, serde_json::json!(["a"]), serde_json::json!({"a": 1})] {
            let unusable: RequestContext = Context::user("user-7").with_attribute("email", unusable).into();
            assert_eq!(
                bucket_value("flag", &by_email, &unusable),
                bucket_value("flag", &by_key, &ctx)
            );
        }
    }

    #[test]
    fn test_bucket_by_float_and_bool_use_their_text() {
        let by_ratio = half_and_half().bucket_by("ratio");
        let first: RequestContext = Context::user("user-1").with_attribute("ratio", 0.5).into();
        let second: RequestContext = Context::user("user-2").with_attribute("ratio", 0.5).into();
        let expected = hash("flag.0.5", 0) % TOTAL_WEIGHT;
        assert_eq!(bucket_value("flag", &by_ratio, &first), expected);
        assert_eq!(bucket_value("flag", &by_ratio, &second), expected);

        let by_beta = half_and_half().bucket_by("beta");
        let first: RequestContext = Context::user("user-1").with_attribute("beta", true).into();
        let second: RequestContext = Context::user("user-2").with_attribute("beta", true).into();
        let expected = hash("flag.true", 0) % TOTAL_WEIGHT;
        assert_eq!(bucket_value("flag", &by_beta, &first), expected);
        assert_eq!(bucket_value("flag", &by_beta, &second), expected);
    }

    #[test]
    fn test_rollout_by_kind() {
        let mut rollout = half_and_half();
        rollout.context_kind = Some("org".to_string());

        let org = || Context::new("org", "acme").unwrap();
        let first: RequestContext = MultiContext::new(vec![Context::user("u-1"), org()]).unwrap().into();
        let second: RequestContext = MultiContext::new(vec![Context::user("u-2"), org()]).unwrap().into();
        assert_eq!(
            bucket_value("flag", &rollout, &first),
            bucket_value("flag", &rollout, &second)
        );

        assert_eq!(bucket_value("flag", &rollout, &user("u-1")), 0);
    }
}
