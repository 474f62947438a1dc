use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashMap};

use crate::error::ContextError;

/// Kind assumed when none is given, and the kind a multi-kind context
/// falls back to when a clause or rollout does not name one.
pub const DEFAULT_KIND: &str = "user";

/// Reserved kind tag of a multi-kind context.
pub const MULTI_KIND: &str = "multi";

// MODELS

/// A single entity being evaluated (a user, a device, an organization...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawContext")]
pub struct Context {
    kind: String,
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    attributes: HashMap<String, Value>,
}

#[derive(Deserialize)]
struct RawContext {
    #[serde(default = "default_kind")]
    kind: String,
    key: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    attributes: HashMap<String, Value>,
}

fn default_kind() -> String {
    DEFAULT_KIND.to_string()
}

impl TryFrom<RawContext> for Context {
    type Error = ContextError;

    fn try_from(raw: RawContext) -> Result<Self, Self::Error> {
        let mut context = Context::new(raw.kind, raw.key)?;
        context.name = raw.name;
        context.attributes = raw.attributes;
        Ok(context)
    }
}

impl Context {
    pub fn new(kind: impl Into<String>, key: impl Into<String>) -> Result<Self, ContextError> {
        let kind = kind.into();
        validate_kind(&kind)?;
        Ok(Self {
            kind,
            key: key.into(),
            name: None,
            attributes: HashMap::new(),
        })
    }

    /// Shorthand for a context of the default `user` kind.
    pub fn user(key: impl Into<String>) -> Self {
        Self {
            kind: default_kind(),
            key: key.into(),
            name: None,
            attributes: HashMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn attributes(&self) -> &HashMap<String, Value> {
        &self.attributes
    }

    /// Resolve an attribute for clause matching.
    ///
    /// `key`, `kind` and `name` read the identity fields; everything else
    /// reads the attribute map. Absent values are `None`.
    pub fn value_of(&self, attribute: &str) -> Option<Cow<'_, Value>> {
        match attribute {
            "key" => Some(Cow::Owned(Value::String(self.key.clone()))),
            "kind" => Some(Cow::Owned(Value::String(self.kind.clone()))),
            "name" => self
                .name
                .as_ref()
                .map(|name| Cow::Owned(Value::String(name.clone()))),
            _ => self.attributes.get(attribute).map(Cow::Borrowed),
        }
    }
}

fn validate_kind(kind: &str) -> Result<(), ContextError> {
    if kind.is_empty() {
        return Err(ContextError::EmptyKind);
    }
    if kind == MULTI_KIND {
        return Err(ContextError::ReservedKind);
    }
    Ok(())
}

/// Several contexts of distinct kinds evaluated together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMultiContext", into = "RawMultiContext")]
pub struct MultiContext {
    contexts: BTreeMap<String, Context>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
enum MultiTag {
    #[serde(rename = "multi")]
    Multi,
}

#[derive(Serialize, Deserialize)]
struct RawMultiContext {
    kind: MultiTag,
    contexts: Vec<Context>,
}

impl TryFrom<RawMultiContext> for MultiContext {
    type Error = ContextError;

    fn try_from(raw: RawMultiContext) -> Result<Self, Self::Error> {
        MultiContext::new(raw.contexts)
    }
}

impl From<MultiContext> for RawMultiContext {
    fn from(multi: MultiContext) -> Self {
        RawMultiContext {
            kind: MultiTag::Multi,
            contexts: multi.contexts.into_values().collect(),
        }
    }
}

impl MultiContext {
    /// Build a multi-kind context. Each kind may appear once.
    pub fn new(contexts: impl IntoIterator<Item = Context>) -> Result<Self, ContextError> {
        let mut by_kind = BTreeMap::new();
        for context in contexts {
            let kind = context.kind.clone();
            if by_kind.insert(kind.clone(), context).is_some() {
                return Err(ContextError::DuplicateKind(kind));
            }
        }
        if by_kind.is_empty() {
            return Err(ContextError::EmptyMulti);
        }
        Ok(Self { contexts: by_kind })
    }

    pub fn get(&self, kind: &str) -> Option<&Context> {
        self.contexts.get(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.contexts.keys().map(String::as_str)
    }

    pub fn contexts(&self) -> impl Iterator<Item = &Context> {
        self.contexts.values()
    }
}

/// What a caller supplies per evaluation: one context or several.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestContext {
    Multi(MultiContext),
    Single(Context),
}

impl RequestContext {
    pub fn kind(&self) -> &str {
        match self {
            RequestContext::Single(context) => context.kind(),
            RequestContext::Multi(_) => MULTI_KIND,
        }
    }

    /// The sub-context of the given kind, if present.
    pub fn as_kind(&self, kind: &str) -> Option<&Context> {
        match self {
            RequestContext::Single(context) => (context.kind == kind).then_some(context),
            RequestContext::Multi(multi) => multi.get(kind),
        }
    }

    /// Pick the sub-context a clause, target or rollout addresses.
    ///
    /// With no kind given, a single context answers for itself and a
    /// multi-kind context answers with its `user` member.
    pub fn select(&self, kind: Option<&str>) -> Option<&Context> {
        match (self, kind) {
            (_, Some(kind)) => self.as_kind(kind),
            (RequestContext::Single(context), None) => Some(context),
            (RequestContext::Multi(multi), None) => multi.get(DEFAULT_KIND),
        }
    }

    pub fn kinds(&self) -> Vec<&str> {
        match self {
            RequestContext::Single(context) => vec![context.kind()],
            RequestContext::Multi(multi) => multi.kinds().collect(),
        }
    }
}

impl From<Context> for RequestContext {
    fn from(context: Context) -> Self {
        RequestContext::Single(context)
    }
}

impl From<MultiContext> for RequestContext {
    fn from(multi: MultiContext) -> Self {
        RequestContext::Multi(multi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reserved_and_empty_kinds_rejected() {
        assert_eq!(Context::new("multi", "k"), Err(ContextError::ReservedKind));
        assert_eq!(Context::new("", "k"), Err(ContextError::EmptyKind));
        assert!(Context::new("device", "d-1").is_ok());
    }

    #[test]
    fn test_identity_attributes() {
        let context = Context::user("user-1")
            .with_name("Ada")
            .with_attribute("plan", "pro");

        assert_eq!(context.value_of("key").unwrap().as_ref(), &json!("user-1"));
        assert_eq!(context.value_of("kind").unwrap().as_ref(), &json!("user"));
        assert_eq!(context.value_of("name").unwrap().as_ref(), &json!("Ada"));
        assert_eq!(context.value_of("plan").unwrap().as_ref(), &json!("pro"));
        assert!(context.value_of("missing").is_none());
    }

    #[test]
    fn test_multi_context_rejects_duplicate_kinds() {
        let result = MultiContext::new(vec![Context::user("a"), Context::user("b")]);
        assert_eq!(result, Err(ContextError::DuplicateKind("user".to_string())));
        assert_eq!(MultiContext::new(vec![]), Err(ContextError::EmptyMulti));
    }

    #[test]
    fn test_select_sub_context() {
        let org = Context::new("org", "acme").unwrap();
        let multi: RequestContext = MultiContext::new(vec![Context::user("u-1"), org])
            .unwrap()
            .into();

        assert_eq!(multi.kind(), "multi");
        assert_eq!(multi.select(None).map(Context::key), Some("u-1"));
        assert_eq!(multi.select(Some("org")).map(Context::key), Some("acme"));
        assert!(multi.select(Some("device")).is_none());

        let single: RequestContext = Context::new("device", "d-1").unwrap().into();
        assert_eq!(single.select(None).map(Context::key), Some("d-1"));
        assert!(single.select(Some("user")).is_none());
    }

    #[test]
    fn test_deserialize_single_and_multi() {
        let single: RequestContext =
            serde_json::from_value(json!({"key": "u-1", "attributes": {"age": 30}})).unwrap();
        assert_eq!(single.kind(), "user");

        let multi: RequestContext = serde_json::from_value(json!({
            "kind": "multi",
            "contexts": [
                {"kind": "user", "key": "u-1"},
                {"kind": "org", "key": "acme"}
            ]
        }))
        .unwrap();
        assert_eq!(multi.kinds(), vec!["org", "user"]);

        let duplicate = serde_json::from_value::<RequestContext>(json!({
            "kind": "multi",
            "contexts": [{"key": "a"}, {"key": "b"}]
        }));
        assert!(duplicate.is_err());
    }
}
