//! Schema-driven `DynamicValue` encoding
//!
//! A `DynamicValue` on the wire is either msgpack (preferred) or JSON and
//! cannot be interpreted without the schema it was encoded against, so
//! every decode and encode takes the [`Block`] or [`AttributeType`]
//! explicitly.
//!
//! Unknown values (not yet computed) exist only in msgpack, as extension
//! type 0.

pub mod json;
pub mod msgpack;

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Number;
use thiserror::Error;

use crate::diagnostics::{AttributePath, Diagnostic};
use crate::proto;
use crate::schema::{AttributeType, Block, NestedBlock, NestingMode};

/// Value codec errors
#[derive(Debug, Error, PartialEq)]
pub enum ValueError {
    /// Bytes are not valid msgpack
    #[error("invalid msgpack: {0}")]
    Msgpack(String),

    /// Bytes are not valid JSON
    #[error("invalid JSON: {0}")]
    Json(String),

    /// Bytes left over after the value
    #[error("{0} unexpected trailing bytes after value")]
    TrailingBytes(usize),

    /// Value does not conform to its type
    #[error("at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Where
        path: AttributePath,
        /// Schema type
        expected: String,
        /// What was there
        found: String,
    },

    /// Object key that the schema does not declare
    #[error("at {path}: unsupported attribute {name:?}")]
    UnknownAttribute {
        /// Containing object
        path: AttributePath,
        /// Offending key
        name: String,
    },

    /// Number that cannot be represented
    #[error("at {path}: invalid number {value}")]
    InvalidNumber {
        /// Where
        path: AttributePath,
        /// Raw number
        value: String,
    },

    /// Embedded type of a dynamic value is invalid
    #[error("at {path}: invalid dynamic type: {reason}")]
    InvalidDynamicType {
        /// Where
        path: AttributePath,
        /// What went wrong
        reason: String,
    },
}

impl ValueError {
    pub(crate) fn mismatch(path: &AttributePath, expected: impl fmt::Display, found: &str) -> Self {
        Self::TypeMismatch {
            path: path.clone(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Location inside the value, when known
    pub fn path(&self) -> Option<&AttributePath> {
        match self {
            Self::TypeMismatch { path, .. }
            | Self::UnknownAttribute { path, .. }
            | Self::InvalidNumber { path, .. }
            | Self::InvalidDynamicType { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Report as an error diagnostic
    pub fn to_diagnostic(&self, summary: &str) -> Diagnostic {
        let diag = Diagnostic::error(summary, self.to_string());
        match self.path() {
            Some(path) => diag.with_attribute(path.clone()),
            None => diag,
        }
    }
}

/// A configuration or state value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absent
    #[default]
    Null,
    /// Not known until apply
    Unknown,
    /// Boolean
    Bool(bool),
    /// Number
    Number(Number),
    /// String
    String(String),
    /// List
    List(Vec<Value>),
    /// Set
    Set(Vec<Value>),
    /// Map with string keys
    Map(BTreeMap<String, Value>),
    /// Object (also the value of a block)
    Object(BTreeMap<String, Value>),
    /// Tuple
    Tuple(Vec<Value>),
}

impl Value {
    /// Build an object from key/value pairs
    pub fn object<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Object(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Whether the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether the value, and everything inside it, is known
    pub fn is_known(&self) -> bool {
        match self {
            Self::Unknown => false,
            Self::List(items) | Self::Set(items) | Self::Tuple(items) => {
                items.iter().all(Value::is_known)
            }
            Self::Map(fields) | Self::Object(fields) => fields.values().all(Value::is_known),
            _ => true,
        }
    }

    /// Field of an object or map
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Self::Object(fields) | Self::Map(fields) => fields.get(key),
            _ => None,
        }
    }

    /// Mutable fields of an object
    pub fn as_object_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Self::Object(fields) => Some(fields),
            _ => None,
        }
    }

    /// String content
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean content
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric content
    pub fn as_number(&self) -> Option<&Number> {
        match self {
            Self::Number(n) => Some(n),
            _ => None,
        }
    }

    /// Name of the value's kind, for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Unknown => "unknown",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::Map(_) => "map",
            Self::Object(_) => "object",
            Self::Tuple(_) => "tuple",
        }
    }

    /// Most specific type describing this value
    ///
    /// Used to tag values of `dynamic` attributes. Collections whose
    /// elements disagree (or are empty) get `dynamic` elements.
    pub fn infer_type(&self) -> AttributeType {
        fn common(items: &[Value]) -> AttributeType {
            let mut types = items
                .iter()
                .filter(|v| !v.is_null() && *v != &Value::Unknown)
                .map(Value::infer_type);
            match types.next() {
                Some(first) => {
                    if types.all(|t| t == first) {
                        first
                    } else {
                        AttributeType::Dynamic
                    }
                }
                None => AttributeType::Dynamic,
            }
        }

        match self {
            Self::Null | Self::Unknown => AttributeType::Dynamic,
            Self::Bool(_) => AttributeType::Bool,
            Self::Number(_) => AttributeType::Number,
            Self::String(_) => AttributeType::String,
            Self::List(items) => AttributeType::list(common(items)),
            Self::Set(items) => AttributeType::set(common(items)),
            Self::Tuple(items) => AttributeType::Tuple(items.iter().map(Value::infer_type).collect()),
            Self::Map(fields) => {
                let items: Vec<Value> = fields.values().cloned().collect();
                AttributeType::map(common(&items))
            }
            Self::Object(fields) => AttributeType::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.infer_type()))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

/// Non-finite floats have no JSON number form and become null
impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Number::from_f64(n).map_or(Self::Null, Self::Number)
    }
}

impl From<Number> for Value {
    fn from(n: Number) -> Self {
        Self::Number(n)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn seq(f: &mut fmt::Formatter<'_>, open: &str, items: &[Value], close: &str) -> fmt::Result {
            f.write_str(open)?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", item)?;
            }
            f.write_str(close)
        }

        match self {
            Self::Null => f.write_str("null"),
            Self::Unknown => f.write_str("(known after apply)"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{:?}", s),
            Self::List(items) | Self::Tuple(items) => seq(f, "[", items, "]"),
            Self::Set(items) => seq(f, "toset([", items, "])"),
            Self::Map(fields) | Self::Object(fields) => {
                f.write_str("{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{} = {}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

/// Value of a nested block that is absent from an encoded object
pub(crate) fn absent_nested(nested: &NestedBlock) -> Value {
    match nested.nesting {
        NestingMode::Single => Value::Null,
        NestingMode::Group => null_object(&nested.block),
        NestingMode::List => Value::List(Vec::new()),
        NestingMode::Set => Value::Set(Vec::new()),
        NestingMode::Map => Value::Map(BTreeMap::new()),
    }
}

/// Object for `block` with every attribute null and every nested block absent
pub(crate) fn null_object(block: &Block) -> Value {
    let mut fields = BTreeMap::new();
    fill_absent(&mut fields, block);
    Value::Object(fields)
}

/// Add the attributes and nested blocks of `block` missing from `fields`
pub(crate) fn fill_absent(fields: &mut BTreeMap<String, Value>, block: &Block) {
    for attr in &block.attributes {
        fields.entry(attr.name.clone()).or_insert(Value::Null);
    }
    for nested in &block.block_types {
        fields
            .entry(nested.type_name.clone())
            .or_insert_with(|| absent_nested(nested));
    }
}

/// Decode a wire `DynamicValue` against a block
///
/// msgpack wins when present, then JSON; an absent or empty value is null.
pub fn decode_dynamic(
    value: Option<&proto::DynamicValue>,
    block: &Block,
) -> Result<Value, ValueError> {
    match value {
        Some(dv) if !dv.msgpack.is_empty() => msgpack::decode_block(&dv.msgpack, block),
        Some(dv) if !dv.json.is_empty() => json::decode_block(&dv.json, block),
        _ => Ok(Value::Null),
    }
}

/// Encode a value against a block as a msgpack `DynamicValue`
pub fn encode_dynamic(value: &Value, block: &Block) -> Result<proto::DynamicValue, ValueError> {
    Ok(proto::DynamicValue {
        msgpack: msgpack::encode_block(value, block)?,
        json: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;

    fn block() -> Block {
        Block::new()
            .attribute(Attribute::required("input", AttributeType::String))
            .attribute(Attribute::computed("output", AttributeType::String))
    }

    #[test]
    fn absent_dynamic_value_is_null() {
        assert_eq!(decode_dynamic(None, &block()).unwrap(), Value::Null);
        assert_eq!(
            decode_dynamic(Some(&proto::DynamicValue::default()), &block()).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn msgpack_is_preferred_over_json() {
        let value = Value::object([("input", Value::from("from msgpack"))]);
        let mut dv = encode_dynamic(&value, &block()).unwrap();
        dv.json = br#"{"input":"from json"}"#.to_vec();

        let decoded = decode_dynamic(Some(&dv), &block()).unwrap();
        assert_eq!(decoded.get("input"), Some(&Value::from("from msgpack")));
    }

    #[test]
    fn json_is_used_when_msgpack_is_empty() {
        let dv = proto::DynamicValue {
            msgpack: vec![],
            json: br#"{"input":"x"}"#.to_vec(),
        };
        let decoded = decode_dynamic(Some(&dv), &block()).unwrap();
        assert_eq!(decoded.get("input"), Some(&Value::from("x")));
        assert_eq!(decoded.get("output"), Some(&Value::Null));
    }

    #[test]
    fn knownness_is_deep() {
        assert!(Value::from("x").is_known());
        assert!(!Value::Unknown.is_known());
        assert!(!Value::object([("a", Value::List(vec![Value::Unknown]))]).is_known());
        assert!(Value::Null.is_known());
    }

    #[test]
    fn inferred_types_follow_the_value() {
        assert_eq!(Value::from("x").infer_type(), AttributeType::String);
        assert_eq!(
            Value::List(vec![Value::from(1), Value::from(2)]).infer_type(),
            AttributeType::list(AttributeType::Number)
        );
        assert_eq!(
            Value::List(vec![Value::from(1), Value::from("a")]).infer_type(),
            AttributeType::list(AttributeType::Dynamic)
        );
        assert_eq!(
            Value::object([("a", Value::from(true))]).infer_type(),
            AttributeType::object([("a", AttributeType::Bool)])
        );
    }

    #[test]
    fn display_reads_like_configuration() {
        let value = Value::object([
            ("name", Value::from("web")),
            ("ports", Value::List(vec![Value::from(80), Value::from(443)])),
            ("id", Value::Unknown),
        ]);
        assert_eq!(
            value.to_string(),
            "{id = (known after apply), name = \"web\", ports = [80, 443]}"
        );
    }

    #[test]
    fn errors_become_diagnostics_at_their_path() {
        let err = ValueError::mismatch(
            &AttributePath::attribute_root("input"),
            &AttributeType::String,
            "bool",
        );
        let diag = err.to_diagnostic("Invalid configuration");
        assert!(diag.is_error());
        assert_eq!(diag.attribute, Some(AttributePath::attribute_root("input")));
        assert!(diag.detail.contains("expected \"string\", found bool"));
    }
}
