// ── Per-attribute filters ──
//
// A filter holds a set of exact scalar values (checked first, O(1)) and an
// ordered list of slower fallback matchers tried until one hits.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_json::{Map, Value};

use super::attribute::Attribute;
use crate::error::QueryError;
use crate::model::MirroredObject;

/// Hashable form of a scalar JSON value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SetKey {
    Null,
    Bool(bool),
    Int(i128),
    Str(String),
}

impl SetKey {
    /// `None` for floats and containers, which cannot take part in set lookups.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Self::Null),
            Value::Bool(b) => Some(Self::Bool(*b)),
            Value::Number(n) => n
                .as_i64()
                .map(i128::from)
                .or_else(|| n.as_u64().map(i128::from))
                .map(Self::Int),
            Value::String(s) => Some(Self::Str(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }
}

impl From<bool> for SetKey {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SetKey {
    fn from(value: i64) -> Self {
        Self::Int(i128::from(value))
    }
}

impl From<u32> for SetKey {
    fn from(value: u32) -> Self {
        Self::Int(i128::from(value))
    }
}

impl From<&str> for SetKey {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

impl From<String> for SetKey {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

/// A boolean test over an attribute value, for Rust callers that need
/// more than the built-in matchers.
pub type PredicateFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// One fallback test.
#[derive(Clone)]
pub enum Matcher {
    /// Structural equality, also for arrays.
    Equals(Value),
    /// Regex anchored at the start of a string value.
    Pattern { source: String, regex: Regex },
    /// Substring of a string value.
    Contains(String),
    /// Inclusive integer range.
    Range { lo: i64, hi: i64 },
    Predicate(PredicateFn),
}

impl Matcher {
    pub fn pattern(attribute: &str, source: &str) -> Result<Self, QueryError> {
        let regex = Regex::new(&format!("^(?:{source})")).map_err(|source| {
            QueryError::InvalidPattern {
                attribute: attribute.to_owned(),
                source,
            }
        })?;
        Ok(Self::Pattern {
            source: source.to_owned(),
            regex,
        })
    }

    pub fn predicate(f: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Self {
        Self::Predicate(Arc::new(f))
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Equals(expected) => value == expected,
            Self::Pattern { regex, .. } => value.as_str().is_some_and(|s| regex.is_match(s)),
            Self::Contains(needle) => value.as_str().is_some_and(|s| s.contains(needle.as_str())),
            Self::Range { lo, hi } => value.as_i64().is_some_and(|n| (*lo..=*hi).contains(&n)),
            Self::Predicate(f) => f(value),
        }
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(v) => f.debug_tuple("Equals").field(v).finish(),
            Self::Pattern { source, .. } => f.debug_tuple("Pattern").field(source).finish(),
            Self::Contains(s) => f.debug_tuple("Contains").field(s).finish(),
            Self::Range { lo, hi } => f.debug_struct("Range").field("lo", lo).field("hi", hi).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(v) => write!(f, "{v}"),
            Self::Pattern { source, .. } => write!(f, "/{source}/"),
            Self::Contains(s) => write!(f, "*{s}*"),
            Self::Range { lo, hi } => write!(f, "{lo}..={hi}"),
            Self::Predicate(_) => f.write_str("<predicate>"),
        }
    }
}

/// Membership test for one attribute.
#[derive(Debug, Clone)]
pub struct Filter {
    attribute: Attribute,
    set: HashSet<SetKey>,
    fallbacks: Vec<Matcher>,
}

impl Filter {
    /// An empty filter. It matches nothing until values or matchers are added.
    pub fn new(attribute: Attribute) -> Self {
        Self {
            attribute,
            set: HashSet::new(),
            fallbacks: Vec::new(),
        }
    }

    /// Exact match against a single value.
    pub fn equals(attribute: Attribute, value: impl Into<SetKey>) -> Self {
        Self::new(attribute).with_value(value)
    }

    /// Exact match against any of `values`.
    pub fn any_of<I, K>(attribute: Attribute, values: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<SetKey>,
    {
        Self {
            set: values.into_iter().map(Into::into).collect(),
            ..Self::new(attribute)
        }
    }

    pub fn with_value(mut self, value: impl Into<SetKey>) -> Self {
        self.set.insert(value.into());
        self
    }

    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.fallbacks.push(matcher);
        self
    }

    /// Build a filter from a JSON predicate spec.
    ///
    /// - scalar (bool, integer, string, null): single-value set
    /// - `{"any_of": [..]}`: set of scalars
    /// - `{"regex": ".."}`, `{"contains": ".."}`, `{"range": [lo, hi]}`: one matcher
    /// - array: ordered fallback list of scalars and the tagged forms above
    ///
    /// Floats, untagged objects and unknown tags are rejected.
    pub fn from_spec(name: &str, spec: &Value) -> Result<Self, QueryError> {
        let attribute = Attribute::parse(name)?;
        let mut filter = Self::new(attribute);

        match spec {
            Value::Array(items) => {
                for item in items {
                    filter.push_fallback(name, item)?;
                }
            }
            Value::Object(map) => filter.push_tagged(name, map, true)?,
            scalar => {
                let key = scalar_key(name, scalar)?;
                filter.set.insert(key);
            }
        }
        Ok(filter)
    }

    pub fn attribute(&self) -> Attribute {
        self.attribute
    }

    pub fn matches(&self, obj: &MirroredObject) -> bool {
        let value = self.attribute.read(obj);
        let value = value.as_value();

        if !self.set.is_empty()
            && SetKey::from_value(value).is_some_and(|key| self.set.contains(&key))
        {
            return true;
        }
        self.fallbacks.iter().any(|m| m.matches(value))
    }

    fn push_fallback(&mut self, name: &str, item: &Value) -> Result<(), QueryError> {
        match item {
            Value::Object(map) => self.push_tagged(name, map, false),
            Value::Array(_) => {
                reject_floats(name, item)?;
                self.fallbacks.push(Matcher::Equals(item.clone()));
                Ok(())
            }
            scalar => {
                scalar_key(name, scalar)?;
                self.fallbacks.push(Matcher::Equals(scalar.clone()));
                Ok(())
            }
        }
    }

    /// `{"tag": arg}` forms. `any_of` feeds the set at top level and
    /// becomes equality fallbacks inside a list, preserving list order.
    fn push_tagged(
        &mut self,
        name: &str,
        map: &Map<String, Value>,
        top_level: bool,
    ) -> Result<(), QueryError> {
        let mut entries = map.iter();
        let (Some((tag, arg)), None) = (entries.next(), entries.next()) else {
            return Err(unsupported(name, "an object that is not a single tagged predicate"));
        };

        match (tag.as_str(), arg) {
            ("any_of", Value::Array(values)) => {
                for value in values {
                    let key = scalar_key(name, value)?;
                    if top_level {
                        self.set.insert(key);
                    } else {
                        self.fallbacks.push(Matcher::Equals(value.clone()));
                    }
                }
            }
            ("regex", Value::String(source)) => {
                self.fallbacks.push(Matcher::pattern(name, source)?);
            }
            ("contains", Value::String(needle)) => {
                self.fallbacks.push(Matcher::Contains(needle.clone()));
            }
            ("range", Value::Array(bounds)) => match bounds.as_slice() {
                [lo, hi] => {
                    let (Some(lo), Some(hi)) = (lo.as_i64(), hi.as_i64()) else {
                        return Err(unsupported(name, "a range with non-integer bounds"));
                    };
                    self.fallbacks.push(Matcher::Range { lo, hi });
                }
                _ => return Err(unsupported(name, "a range without exactly two bounds")),
            },
            (tag, _) => {
                return Err(unsupported(name, &format!("the predicate tag '{tag}' with this argument")));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self
            .set
            .iter()
            .map(|key| match key {
                SetKey::Null => "null".to_owned(),
                SetKey::Bool(b) => b.to_string(),
                SetKey::Int(n) => n.to_string(),
                SetKey::Str(s) => format!("{s:?}"),
            })
            .collect();
        parts.sort();
        parts.extend(self.fallbacks.iter().map(ToString::to_string));

        match parts.as_slice() {
            [single] => write!(f, "{}={single}", self.attribute),
            _ => write!(f, "{}=[{}]", self.attribute, parts.join(", ")),
        }
    }
}

fn scalar_key(name: &str, value: &Value) -> Result<SetKey, QueryError> {
    SetKey::from_value(value).ok_or_else(|| unsupported(name, describe(value)))
}

fn reject_floats(name: &str, value: &Value) -> Result<(), QueryError> {
    match value {
        Value::Number(n) if n.is_f64() => Err(unsupported(name, "a floating-point number")),
        Value::Array(items) => items.iter().try_for_each(|item| reject_floats(name, item)),
        _ => Ok(()),
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Number(n) if n.is_f64() => "a floating-point number",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
        _ => "a scalar",
    }
}

fn unsupported(name: &str, kind: &str) -> QueryError {
    QueryError::UnsupportedValue {
        attribute: name.to_owned(),
        kind: kind.to_owned(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::model::ObjectId;

    fn node(props: Value) -> MirroredObject {
        MirroredObject::from_record(
            ObjectId::new(40),
            json!({ "id": 40, "type": "PipeWire:Interface:Node", "info": { "props": props } }),
        )
    }

    #[test]
    fn float_value_is_rejected() {
        let err = Filter::from_spec("node_description", &json!(0.5)).unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedValue { .. }));

        let err = Filter::from_spec("device_id", &json!({ "any_of": [1, 2.5] })).unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedValue { .. }));

        let err = Filter::from_spec("device_id", &json!(["a", 1.5])).unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedValue { .. }));
    }

    #[test]
    fn untagged_object_and_unknown_tag_are_rejected() {
        for spec in [json!({ "a": 1, "b": 2 }), json!({ "glob": "x*" }), json!({ "regex": 3 })] {
            let err = Filter::from_spec("node_name", &spec).unwrap_err();
            assert!(matches!(err, QueryError::UnsupportedValue { .. }), "{spec}");
        }
    }

    #[test]
    fn unknown_attribute_fails_construction() {
        let err = Filter::from_spec("volume", &json!(1)).unwrap_err();
        assert!(matches!(err, QueryError::UnknownAttribute { .. }));
    }

    #[test]
    fn invalid_regex_is_reported() {
        let err = Filter::from_spec("node_name", &json!({ "regex": "(" })).unwrap_err();
        assert!(matches!(err, QueryError::InvalidPattern { .. }));
    }

    #[test]
    fn scalar_and_set_membership() {
        let obj = node(json!({ "node.description": "Speakers", "device.id": 42 }));

        assert!(Filter::from_spec("node_description", &json!("Speakers")).unwrap().matches(&obj));
        assert!(!Filter::from_spec("node_description", &json!("Headset")).unwrap().matches(&obj));
        assert!(Filter::from_spec("device_id", &json!({ "any_of": [7, 42] })).unwrap().matches(&obj));
        assert!(Filter::any_of(Attribute::DeviceId, [1_i64, 42]).matches(&obj));
    }

    #[test]
    fn set_does_not_conflate_bool_and_int() {
        let obj = node(json!({ "media.class": "Audio/Sink" }));
        assert!(Filter::equals(Attribute::IsSink, true).matches(&obj));
        assert!(!Filter::from_spec("is_sink", &json!(1)).unwrap().matches(&obj));
    }

    #[test]
    fn regex_is_anchored_at_start() {
        let obj = node(json!({ "node.name": "alsa_output.usb-Focusrite" }));
        assert!(Filter::from_spec("node_name", &json!({ "regex": "alsa_output\\." })).unwrap().matches(&obj));
        assert!(!Filter::from_spec("node_name", &json!({ "regex": "usb" })).unwrap().matches(&obj));
        assert!(Filter::from_spec("node_name", &json!({ "contains": "usb" })).unwrap().matches(&obj));
    }

    #[test]
    fn fallback_list_tries_each_matcher() {
        let obj = node(json!({ "node.description": "USB Audio Pro", "object.serial": 7 }));
        let spec = json!(["Speakers", { "regex": "HDMI" }, { "contains": "Audio" }]);
        assert!(Filter::from_spec("node_description", &spec).unwrap().matches(&obj));

        let spec = json!(["Speakers", { "regex": "HDMI" }]);
        assert!(!Filter::from_spec("node_description", &spec).unwrap().matches(&obj));
    }

    #[test]
    fn range_and_predicate_matchers() {
        let obj = node(json!({ "device.id": 42 }));
        assert!(Filter::from_spec("device_id", &json!({ "range": [40, 50] })).unwrap().matches(&obj));
        assert!(!Filter::from_spec("device_id", &json!({ "range": [0, 41] })).unwrap().matches(&obj));

        let even = Filter::new(Attribute::DeviceId)
            .with_matcher(Matcher::predicate(|v| v.as_i64().is_some_and(|n| n % 2 == 0)));
        assert!(even.matches(&obj));
    }

    #[test]
    fn array_items_compare_structurally() {
        let obj = MirroredObject::from_record(
            ObjectId::new(1),
            json!({ "id": 1, "info": { "props": {}, "params": { "Tag": [] } } }),
        );
        assert!(Filter::from_spec("Tag", &json!([[]])).unwrap().matches(&obj));
    }

    #[test]
    fn display_describes_the_filter() {
        let filter = Filter::from_spec("node_description", &json!("Speakers")).unwrap();
        assert_eq!(filter.to_string(), "node_description=\"Speakers\"");

        let filter = Filter::from_spec("node_name", &json!([{ "regex": "alsa" }, { "contains": "usb" }])).unwrap();
        assert_eq!(filter.to_string(), "node_name=[/alsa/, *usb*]");
    }
}
