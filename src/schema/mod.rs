//! Schema model shared by providers and the value codec
//!
//! A [`Block`] describes the shape of a configuration or state object:
//! typed attributes plus nested blocks. Every `DynamicValue` on the wire is
//! only meaningful next to the block it was encoded with.
//!
//! # Attribute types
//!
//! Types travel as JSON type expressions:
//!
//! ```text
//! "string"  "number"  "bool"  "dynamic"
//! ["list", T]  ["set", T]  ["map", T]
//! ["object", {"name": T, ...}]  ["tuple", [T, ...]]
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::diagnostics::{AttributePath, Diagnostic};
use crate::proto;
use crate::value::Value;

/// Schema errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// Type expression is not one of the known forms
    #[error("invalid type expression {0}")]
    InvalidType(String),

    /// Type expression bytes are not JSON
    #[error("type expression is not valid JSON: {0}")]
    InvalidJson(String),

    /// Nesting mode on the wire is unset or unknown
    #[error("invalid nesting mode {0} for block {1:?}")]
    InvalidNesting(i32, String),
}

/// Type of an attribute value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub enum AttributeType {
    /// UTF-8 string
    String,
    /// Arbitrary precision number
    Number,
    /// Boolean
    Bool,
    /// Type decided by the value itself
    Dynamic,
    /// Ordered sequence of one element type
    List(Box<AttributeType>),
    /// Unordered collection of one element type
    Set(Box<AttributeType>),
    /// String-keyed map of one element type
    Map(Box<AttributeType>),
    /// Fixed set of named, individually typed attributes
    Object(BTreeMap<String, AttributeType>),
    /// Fixed sequence of individually typed elements
    Tuple(Vec<AttributeType>),
}

impl AttributeType {
    /// `list(element)`
    pub fn list(element: AttributeType) -> Self {
        Self::List(Box::new(element))
    }

    /// `set(element)`
    pub fn set(element: AttributeType) -> Self {
        Self::Set(Box::new(element))
    }

    /// `map(element)`
    pub fn map(element: AttributeType) -> Self {
        Self::Map(Box::new(element))
    }

    /// `object({...})`
    pub fn object<K: Into<String>>(attributes: impl IntoIterator<Item = (K, AttributeType)>) -> Self {
        Self::Object(attributes.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Encode as the wire JSON type expression
    pub fn to_json_bytes(&self) -> Vec<u8> {
        serde_json::Value::from(self.clone()).to_string().into_bytes()
    }

    /// Decode a wire JSON type expression
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, SchemaError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| SchemaError::InvalidJson(e.to_string()))?;
        Self::try_from(value)
    }

    /// Short name used in error messages
    pub fn friendly_name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Dynamic => "dynamic",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::Map(_) => "map",
            Self::Object(_) => "object",
            Self::Tuple(_) => "tuple",
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", serde_json::Value::from(self.clone()))
    }
}

impl From<AttributeType> for serde_json::Value {
    fn from(ty: AttributeType) -> Self {
        match ty {
            AttributeType::String => json!("string"),
            AttributeType::Number => json!("number"),
            AttributeType::Bool => json!("bool"),
            AttributeType::Dynamic => json!("dynamic"),
            AttributeType::List(e) => json!(["list", serde_json::Value::from(*e)]),
            AttributeType::Set(e) => json!(["set", serde_json::Value::from(*e)]),
            AttributeType::Map(e) => json!(["map", serde_json::Value::from(*e)]),
            AttributeType::Object(attrs) => {
                let attrs: serde_json::Map<String, serde_json::Value> =
                    attrs.into_iter().map(|(k, v)| (k, v.into())).collect();
                json!(["object", attrs])
            }
            AttributeType::Tuple(elems) => {
                let elems: Vec<serde_json::Value> = elems.into_iter().map(Into::into).collect();
                json!(["tuple", elems])
            }
        }
    }
}

impl TryFrom<serde_json::Value> for AttributeType {
    type Error = SchemaError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value as J;

        let invalid = |v: &J| SchemaError::InvalidType(v.to_string());

        match &value {
            J::String(name) => match name.as_str() {
                "string" => Ok(Self::String),
                "number" => Ok(Self::Number),
                "bool" => Ok(Self::Bool),
                "dynamic" => Ok(Self::Dynamic),
                _ => Err(invalid(&value)),
            },
            // Objects may carry a third element listing optional attributes
            J::Array(parts) if parts.len() == 2 || parts.len() == 3 => {
                let kind = parts[0].as_str().ok_or_else(|| invalid(&value))?;
                let arg = parts[1].clone();
                match (kind, parts.len()) {
                    ("list", 2) => Ok(Self::list(Self::try_from(arg)?)),
                    ("set", 2) => Ok(Self::set(Self::try_from(arg)?)),
                    ("map", 2) => Ok(Self::map(Self::try_from(arg)?)),
                    ("object", _) => match arg {
                        J::Object(attrs) => attrs
                            .into_iter()
                            .map(|(k, v)| Ok((k, Self::try_from(v)?)))
                            .collect::<Result<BTreeMap<_, _>, SchemaError>>()
                            .map(Self::Object),
                        _ => Err(invalid(&value)),
                    },
                    ("tuple", 2) => match arg {
                        J::Array(elems) => elems
                            .into_iter()
                            .map(Self::try_from)
                            .collect::<Result<Vec<_>, _>>()
                            .map(Self::Tuple),
                        _ => Err(invalid(&value)),
                    },
                    _ => Err(invalid(&value)),
                }
            }
            _ => Err(invalid(&value)),
        }
    }
}

/// An attribute of a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribute {
    /// Attribute name
    pub name: String,
    /// Value type
    #[serde(rename = "type")]
    pub r#type: AttributeType,
    /// Human-readable description
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Must be set in configuration
    pub required: bool,
    /// May be set in configuration
    pub optional: bool,
    /// Set by the provider
    pub computed: bool,
    /// Value is hidden from output
    pub sensitive: bool,
}

impl Attribute {
    fn new(name: impl Into<String>, r#type: AttributeType) -> Self {
        Self {
            name: name.into(),
            r#type,
            description: String::new(),
            required: false,
            optional: false,
            computed: false,
            sensitive: false,
        }
    }

    /// Attribute that must be configured
    pub fn required(name: impl Into<String>, r#type: AttributeType) -> Self {
        Self {
            required: true,
            ..Self::new(name, r#type)
        }
    }

    /// Attribute that may be configured
    pub fn optional(name: impl Into<String>, r#type: AttributeType) -> Self {
        Self {
            optional: true,
            ..Self::new(name, r#type)
        }
    }

    /// Attribute set only by the provider
    pub fn computed(name: impl Into<String>, r#type: AttributeType) -> Self {
        Self {
            computed: true,
            ..Self::new(name, r#type)
        }
    }

    /// Attribute that may be configured and otherwise is set by the provider
    pub fn optional_computed(name: impl Into<String>, r#type: AttributeType) -> Self {
        Self {
            optional: true,
            computed: true,
            ..Self::new(name, r#type)
        }
    }

    /// Mark the value as sensitive
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    /// Set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// How a nested block repeats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NestingMode {
    /// At most one, value is an object or null
    Single,
    /// Ordered blocks, value is a list of objects
    List,
    /// Unordered blocks, value is a set of objects
    Set,
    /// Labelled blocks, value is a map of objects
    Map,
    /// Exactly one, never null
    Group,
}

/// A block nested inside another block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NestedBlock {
    /// Block type name
    pub type_name: String,
    /// Repetition mode
    pub nesting: NestingMode,
    /// Contents
    pub block: Block,
    /// Fewest blocks allowed (0 = no bound)
    pub min_items: i64,
    /// Most blocks allowed (0 = no bound)
    pub max_items: i64,
}

impl NestedBlock {
    /// Nested block without item bounds
    pub fn new(type_name: impl Into<String>, nesting: NestingMode, block: Block) -> Self {
        Self {
            type_name: type_name.into(),
            nesting,
            block,
            min_items: 0,
            max_items: 0,
        }
    }

    /// Bound the number of blocks
    pub fn items(mut self, min_items: i64, max_items: i64) -> Self {
        self.min_items = min_items;
        self.max_items = max_items;
        self
    }
}

/// Shape of a configuration or state object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Block {
    /// Block version
    pub version: i64,
    /// Attributes
    pub attributes: Vec<Attribute>,
    /// Nested blocks
    pub block_types: Vec<NestedBlock>,
}

impl Block {
    /// Empty block
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute
    pub fn attribute(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Add a nested block
    pub fn block_type(mut self, nested: NestedBlock) -> Self {
        self.block_types.push(nested);
        self
    }

    /// Look up an attribute by name
    pub fn get_attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Look up a nested block by type name
    pub fn get_block_type(&self, name: &str) -> Option<&NestedBlock> {
        self.block_types.iter().find(|b| b.type_name == name)
    }

    /// Check a configuration value against this block
    ///
    /// Reports missing required attributes, values for attributes that can
    /// only be computed, and nested block counts outside their bounds.
    /// Unknown values are never reported; they may become valid later.
    pub fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        self.validate_at(config, AttributePath::root(), &mut diagnostics);
        diagnostics
    }

    fn validate_at(&self, config: &Value, path: AttributePath, out: &mut Vec<Diagnostic>) {
        let Value::Object(fields) = config else {
            return;
        };

        for attr in &self.attributes {
            let value = fields.get(&attr.name).unwrap_or(&Value::Null);
            let attr_path = path.clone().attribute(&attr.name);

            if attr.required && value.is_null() {
                out.push(
                    Diagnostic::error(
                        "Missing required argument",
                        format!("The argument \"{}\" is required, but no definition was found.", attr.name),
                    )
                    .with_attribute(attr_path),
                );
            } else if !attr.required && !attr.optional && !value.is_null() && value.is_known() {
                out.push(
                    Diagnostic::error(
                        "Value for unconfigurable attribute",
                        format!("Can't configure a value for \"{}\": its value will be decided automatically.", attr.name),
                    )
                    .with_attribute(attr_path),
                );
            }
        }

        for nested in &self.block_types {
            let value = fields.get(&nested.type_name).unwrap_or(&Value::Null);
            nested.validate_at(value, path.clone().attribute(&nested.type_name), out);
        }
    }
}

impl NestedBlock {
    fn validate_at(&self, value: &Value, path: AttributePath, out: &mut Vec<Diagnostic>) {
        let count = match (self.nesting, value) {
            (_, Value::Unknown) => return,
            (NestingMode::Single | NestingMode::Group, Value::Null) => 0,
            (NestingMode::Single | NestingMode::Group, v) => {
                self.block.validate_at(v, path.clone(), out);
                1
            }
            (_, Value::Null) => 0,
            (_, Value::List(items) | Value::Set(items)) => {
                for (i, item) in items.iter().enumerate() {
                    let item_path = match self.nesting {
                        NestingMode::List => path.clone().index(i as i64),
                        _ => path.clone(),
                    };
                    self.block.validate_at(item, item_path, out);
                }
                items.len() as i64
            }
            (_, Value::Map(items)) => {
                for (key, item) in items {
                    self.block.validate_at(item, path.clone().key(key), out);
                }
                items.len() as i64
            }
            _ => return,
        };

        if self.min_items > 0 && count < self.min_items {
            out.push(
                Diagnostic::error(
                    format!("Insufficient {} blocks", self.type_name),
                    format!("At least {} \"{}\" blocks are required.", self.min_items, self.type_name),
                )
                .with_attribute(path.clone()),
            );
        }
        if self.max_items > 0 && count > self.max_items {
            out.push(
                Diagnostic::error(
                    format!("Too many {} blocks", self.type_name),
                    format!("No more than {} \"{}\" blocks are allowed.", self.max_items, self.type_name),
                )
                .with_attribute(path),
            );
        }
    }
}

/// Versioned top-level block for a provider, resource or data source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Schema {
    /// Schema version, used to upgrade stored state
    pub version: i64,
    /// Top-level block
    pub block: Block,
}

impl Schema {
    /// Schema at version 0
    pub fn new(block: Block) -> Self {
        Self { version: 0, block }
    }

    /// Set the version
    pub fn with_version(mut self, version: i64) -> Self {
        self.version = version;
        self
    }
}

/// Everything a provider exposes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderSchema {
    /// Provider configuration
    pub provider: Schema,
    /// Managed resource types
    pub resource_schemas: BTreeMap<String, Schema>,
    /// Data source types
    pub data_source_schemas: BTreeMap<String, Schema>,
}

impl ProviderSchema {
    /// Provider schema without resources or data sources
    pub fn new(provider: Schema) -> Self {
        Self {
            provider,
            ..Self::default()
        }
    }

    /// Add a managed resource type
    pub fn resource(mut self, type_name: impl Into<String>, schema: Schema) -> Self {
        self.resource_schemas.insert(type_name.into(), schema);
        self
    }

    /// Add a data source type
    pub fn data_source(mut self, type_name: impl Into<String>, schema: Schema) -> Self {
        self.data_source_schemas.insert(type_name.into(), schema);
        self
    }
}

// =============================================================================
// Wire conversions
// =============================================================================

impl From<&Attribute> for proto::schema::Attribute {
    fn from(attr: &Attribute) -> Self {
        Self {
            name: attr.name.clone(),
            r#type: attr.r#type.to_json_bytes(),
            description: attr.description.clone(),
            required: attr.required,
            optional: attr.optional,
            computed: attr.computed,
            sensitive: attr.sensitive,
        }
    }
}

impl From<NestingMode> for proto::schema::nested_block::NestingMode {
    fn from(mode: NestingMode) -> Self {
        match mode {
            NestingMode::Single => Self::Single,
            NestingMode::List => Self::List,
            NestingMode::Set => Self::Set,
            NestingMode::Map => Self::Map,
            NestingMode::Group => Self::Group,
        }
    }
}

impl From<&NestedBlock> for proto::schema::NestedBlock {
    fn from(nested: &NestedBlock) -> Self {
        Self {
            type_name: nested.type_name.clone(),
            block: Some((&nested.block).into()),
            nesting: proto::schema::nested_block::NestingMode::from(nested.nesting) as i32,
            min_items: nested.min_items,
            max_items: nested.max_items,
        }
    }
}

impl From<&Block> for proto::schema::Block {
    fn from(block: &Block) -> Self {
        Self {
            version: block.version,
            attributes: block.attributes.iter().map(Into::into).collect(),
            block_types: block.block_types.iter().map(Into::into).collect(),
        }
    }
}

impl From<&Schema> for proto::Schema {
    fn from(schema: &Schema) -> Self {
        Self {
            version: schema.version,
            block: Some((&schema.block).into()),
        }
    }
}

impl From<&ProviderSchema> for proto::get_provider_schema::Response {
    fn from(schema: &ProviderSchema) -> Self {
        let convert = |schemas: &BTreeMap<String, Schema>| -> HashMap<String, proto::Schema> {
            schemas
                .iter()
                .map(|(name, schema)| (name.clone(), schema.into()))
                .collect()
        };
        Self {
            provider: Some((&schema.provider).into()),
            resource_schemas: convert(&schema.resource_schemas),
            data_source_schemas: convert(&schema.data_source_schemas),
            diagnostics: Vec::new(),
        }
    }
}

impl TryFrom<proto::schema::Attribute> for Attribute {
    type Error = SchemaError;

    fn try_from(attr: proto::schema::Attribute) -> Result<Self, Self::Error> {
        Ok(Self {
            r#type: AttributeType::from_json_bytes(&attr.r#type)?,
            name: attr.name,
            description: attr.description,
            required: attr.required,
            optional: attr.optional,
            computed: attr.computed,
            sensitive: attr.sensitive,
        })
    }
}

impl TryFrom<proto::schema::NestedBlock> for NestedBlock {
    type Error = SchemaError;

    fn try_from(nested: proto::schema::NestedBlock) -> Result<Self, Self::Error> {
        use proto::schema::nested_block::NestingMode as Wire;

        let nesting = match Wire::try_from(nested.nesting) {
            Ok(Wire::Single) => NestingMode::Single,
            Ok(Wire::List) => NestingMode::List,
            Ok(Wire::Set) => NestingMode::Set,
            Ok(Wire::Map) => NestingMode::Map,
            Ok(Wire::Group) => NestingMode::Group,
            Ok(Wire::Invalid) | Err(_) => {
                return Err(SchemaError::InvalidNesting(nested.nesting, nested.type_name))
            }
        };
        Ok(Self {
            block: nested.block.map(Block::try_from).transpose()?.unwrap_or_default(),
            type_name: nested.type_name,
            nesting,
            min_items: nested.min_items,
            max_items: nested.max_items,
        })
    }
}

impl TryFrom<proto::schema::Block> for Block {
    type Error = SchemaError;

    fn try_from(block: proto::schema::Block) -> Result<Self, Self::Error> {
        Ok(Self {
            version: block.version,
            attributes: block
                .attributes
                .into_iter()
                .map(Attribute::try_from)
                .collect::<Result<_, _>>()?,
            block_types: block
                .block_types
                .into_iter()
                .map(NestedBlock::try_from)
                .collect::<Result<_, _>>()?,
        })
    }
}

impl TryFrom<proto::Schema> for Schema {
    type Error = SchemaError;

    fn try_from(schema: proto::Schema) -> Result<Self, Self::Error> {
        Ok(Self {
            version: schema.version,
            block: schema.block.map(Block::try_from).transpose()?.unwrap_or_default(),
        })
    }
}

impl TryFrom<proto::get_provider_schema::Response> for ProviderSchema {
    type Error = SchemaError;

    fn try_from(resp: proto::get_provider_schema::Response) -> Result<Self, Self::Error> {
        let convert = |schemas: HashMap<String, proto::Schema>| {
            schemas
                .into_iter()
                .map(|(name, schema)| Ok((name, Schema::try_from(schema)?)))
                .collect::<Result<BTreeMap<_, _>, SchemaError>>()
        };
        Ok(Self {
            provider: resp.provider.map(Schema::try_from).transpose()?.unwrap_or_default(),
            resource_schemas: convert(resp.resource_schemas)?,
            data_source_schemas: convert(resp.data_source_schemas)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::string(AttributeType::String, r#""string""#)]
    #[case::number(AttributeType::Number, r#""number""#)]
    #[case::bool(AttributeType::Bool, r#""bool""#)]
    #[case::dynamic(AttributeType::Dynamic, r#""dynamic""#)]
    #[case::list(AttributeType::list(AttributeType::String), r#"["list","string"]"#)]
    #[case::set(AttributeType::set(AttributeType::Number), r#"["set","number"]"#)]
    #[case::map(AttributeType::map(AttributeType::Bool), r#"["map","bool"]"#)]
    #[case::object(
        AttributeType::object([("a", AttributeType::String), ("b", AttributeType::list(AttributeType::Number))]),
        r#"["object",{"a":"string","b":["list","number"]}]"#
    )]
    #[case::tuple(
        AttributeType::Tuple(vec![AttributeType::String, AttributeType::Bool]),
        r#"["tuple",["string","bool"]]"#
    )]
    fn type_expressions_match_the_wire_format(#[case] ty: AttributeType, #[case] wire: &str) {
        assert_eq!(String::from_utf8(ty.to_json_bytes()).unwrap(), wire);
        assert_eq!(AttributeType::from_json_bytes(wire.as_bytes()).unwrap(), ty);
    }

    #[rstest]
    #[case::unknown_primitive(r#""integer""#)]
    #[case::bare_list(r#"["list"]"#)]
    #[case::object_needs_map(r#"["object",["a"]]"#)]
    #[case::tuple_needs_array(r#"["tuple","string"]"#)]
    #[case::too_long(r#"["list","string","extra"]"#)]
    #[case::number_literal("5")]
    fn rejects_invalid_type_expressions(#[case] wire: &str) {
        assert!(matches!(
            AttributeType::from_json_bytes(wire.as_bytes()),
            Err(SchemaError::InvalidType(_))
        ));
    }

    #[test]
    fn object_optional_attribute_list_is_accepted() {
        let ty = AttributeType::from_json_bytes(br#"["object",{"a":"string"},["a"]]"#).unwrap();
        assert_eq!(ty, AttributeType::object([("a", AttributeType::String)]));
    }

    #[test]
    fn not_json_is_rejected() {
        assert!(matches!(
            AttributeType::from_json_bytes(b"string"),
            Err(SchemaError::InvalidJson(_))
        ));
    }

    fn resource_block() -> Block {
        Block::new()
            .attribute(Attribute::required("input", AttributeType::String))
            .attribute(Attribute::computed("output", AttributeType::String))
            .block_type(
                NestedBlock::new(
                    "rule",
                    NestingMode::List,
                    Block::new().attribute(Attribute::required("port", AttributeType::Number)),
                )
                .items(1, 2),
            )
    }

    fn config(fields: Vec<(&str, Value)>) -> Value {
        Value::object(fields)
    }

    #[test]
    fn valid_config_has_no_diagnostics() {
        let rule = config(vec![("port", Value::from(80))]);
        let diags = resource_block().validate(&config(vec![
            ("input", Value::from("x")),
            ("rule", Value::List(vec![rule])),
        ]));
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn missing_required_attribute_is_reported_with_its_path() {
        let rule = config(vec![("port", Value::Null)]);
        let diags = resource_block().validate(&config(vec![("rule", Value::List(vec![rule]))]));

        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].summary, "Missing required argument");
        assert_eq!(diags[0].attribute.as_ref().unwrap().to_string(), "input");
        assert_eq!(diags[1].attribute.as_ref().unwrap().to_string(), "rule[0].port");
    }

    #[test]
    fn computed_only_attribute_cannot_be_configured() {
        let rule = config(vec![("port", Value::from(80))]);
        let diags = resource_block().validate(&config(vec![
            ("input", Value::from("x")),
            ("output", Value::from("y")),
            ("rule", Value::List(vec![rule])),
        ]));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].summary, "Value for unconfigurable attribute");
    }

    #[test]
    fn unknown_values_are_not_reported() {
        let diags = resource_block().validate(&config(vec![
            ("input", Value::Unknown),
            ("rule", Value::Unknown),
        ]));
        assert!(diags.is_empty(), "{:?}", diags);
    }

    #[test]
    fn nested_block_counts_are_enforced() {
        let rule = || config(vec![("port", Value::from(1))]);

        let too_few = resource_block().validate(&config(vec![("input", Value::from("x"))]));
        assert_eq!(too_few.len(), 1);
        assert_eq!(too_few[0].summary, "Insufficient rule blocks");

        let too_many = resource_block().validate(&config(vec![
            ("input", Value::from("x")),
            ("rule", Value::List(vec![rule(), rule(), rule()])),
        ]));
        assert_eq!(too_many.len(), 1);
        assert_eq!(too_many[0].summary, "Too many rule blocks");
    }

    #[test]
    fn schema_survives_the_wire() {
        let schema = ProviderSchema::new(Schema::new(
            Block::new().attribute(Attribute::optional("token", AttributeType::String).sensitive()),
        ))
        .resource("example_example", Schema::new(resource_block()).with_version(2))
        .data_source("example_example", Schema::new(resource_block()));

        let wire = proto::get_provider_schema::Response::from(&schema);

        assert_eq!(ProviderSchema::try_from(wire).unwrap(), schema);
    }

    #[test]
    fn invalid_nesting_is_rejected_from_the_wire() {
        let wire = proto::schema::NestedBlock {
            type_name: "bad".to_string(),
            nesting: 0,
            ..Default::default()
        };
        assert_eq!(
            NestedBlock::try_from(wire),
            Err(SchemaError::InvalidNesting(0, "bad".to_string()))
        );
    }
}
