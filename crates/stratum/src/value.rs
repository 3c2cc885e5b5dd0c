//! value representation
//!
//! The resolved output model contains the following data types
//! - null
//! - boolean (true/false)
//! - integer (signed, i64)
//! - decimal (f64)
//! - string (utf-8)
//! - array ("list" of values)
//! - object (order-preserving "map"/"dictionary", where the key is of type string)
//!
//! Additionally:
//! - the only valid **implicit** conversion: every `integer` is also a `decimal`
//! - integer arithmetic that overflows falls back to `decimal`
//!
use serde::{
    ser::{SerializeMap, SerializeSeq},
    Serializer,
};

pub type Object = indexmap::IndexMap<String, Value>;

/// All possible value types
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
    Array(Vec<Value>),
    Object(Object),
}

impl Value {
    /// Name of the value's type as used in error messages and by `typeof`
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "boolean",
            Value::Integer(_) | Value::Decimal(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(self, Value::Array(_) | Value::Object(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Decimal(_))
    }

    /// Truthiness as used by `&&`, `||`, `!`, `?:` and `${if}` blocks
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Decimal(d) => *d != 0.0 && !d.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    /// Integral view of a number (`2.0` counts, `2.5` does not)
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Decimal(d) if d.fract() == 0.0 && d.is_finite() => Some(*d as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Render a primitive for string interpolation
    ///
    /// Returns `None` for arrays and objects.
    pub fn to_template_string(&self) -> Option<String> {
        match self {
            Value::Null => Some("null".to_string()),
            Value::Boolean(b) => Some(b.to_string()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Decimal(d) => Some(d.to_string()),
            Value::String(s) => Some(s.clone()),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Recursively merge `other` into `self`; keys of `other` win
    ///
    /// Only objects are merged, any other combination is replaced by `other`.
    pub fn deep_merge(self, other: Value) -> Value {
        match (self, other) {
            (Value::Object(mut base), Value::Object(overlay)) => {
                for (key, value) in overlay {
                    match base.get_mut(&key) {
                        Some(existing) => {
                            let current = std::mem::replace(existing, Value::Null);
                            *existing = current.deep_merge(value);
                        }
                        None => {
                            base.insert(key, value);
                        }
                    }
                }
                Value::Object(base)
            }
            (_, other) => other,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a == b,
            (a, b) if a.is_number() && b.is_number() => a.as_f64() == b.as_f64(),
            _ => false,
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Decimal(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(value: Vec<T>) -> Self {
        Value::Array(value.into_iter().map(Into::into).collect())
    }
}

impl<K: ToString, V: Into<Value>> From<indexmap::IndexMap<K, V>> for Value {
    fn from(value: indexmap::IndexMap<K, V>) -> Self {
        Value::Object(
            value
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.into()))
                .collect(),
        )
    }
}

impl From<serde_json::Number> for Value {
    fn from(value: serde_json::Number) -> Self {
        if let Some(int) = value.as_i64() {
            return Value::Integer(int);
        }

        // u64 beyond i64::MAX and floats both end up here
        Value::Decimal(value.as_f64().unwrap_or(f64::NAN))
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Value {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => b.into(),
            serde_json::Value::Number(n) => n.into(),
            serde_json::Value::String(s) => s.into(),
            serde_json::Value::Array(a) => a.into(),
            serde_json::Value::Object(o) => {
                Value::Object(o.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<serde_yaml::Value> for Value {
    fn from(value: serde_yaml::Value) -> Value {
        use serde_yaml::Value as Yaml;

        match value {
            Yaml::Null => Value::Null,
            Yaml::Bool(b) => b.into(),
            Yaml::Number(n) => match n.as_i64() {
                Some(int) => Value::Integer(int),
                None => Value::Decimal(n.as_f64().unwrap_or(f64::NAN)),
            },
            Yaml::String(s) => s.into(),
            Yaml::Sequence(seq) => seq.into(),
            Yaml::Mapping(mapping) => Value::Object(
                mapping
                    .into_iter()
                    .map(|(k, v)| (yaml_key(k), v.into()))
                    .collect(),
            ),
            Yaml::Tagged(tagged) => tagged.value.into(),
        }
    }
}

/// Mapping keys are always strings in the output model
fn yaml_key(key: serde_yaml::Value) -> String {
    match Value::from(key) {
        Value::String(s) => s,
        other => other
            .to_template_string()
            .unwrap_or_else(|| serde_json::to_string(&other).unwrap_or_default()),
    }
}

impl serde::ser::Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Boolean(value) => serializer.serialize_bool(*value),
            Value::Integer(value) => serializer.serialize_i64(*value),
            Value::Decimal(value) => serializer.serialize_f64(*value),
            Value::String(value) => serializer.serialize_str(value),
            Value::Array(value) => {
                let mut ser = serializer.serialize_seq(Some(value.len()))?;
                for element in value {
                    ser.serialize_element(element)?;
                }
                ser.end()
            }
            Value::Object(value) => {
                let mut ser = serializer.serialize_map(Some(value.len()))?;
                for (element_key, element_value) in value {
                    ser.serialize_entry(element_key, element_value)?;
                }
                ser.end()
            }
        }
    }
}

/// Build a [Value] from a JSON-like literal
///
/// ```
/// # use stratum::value;
/// let v = value!({ "a": [1, 2.5, "three", null] });
/// assert_eq!(v.type_name(), "object");
/// ```
#[macro_export]
macro_rules! value {
    ($($json:tt)+) => {
        $crate::value::Value::from($crate::__serde_json::json!($($json)+))
    };
}
