//! JSON decoding of values
//!
//! JSON shows up in two places: a `DynamicValue` whose msgpack field is
//! empty, and raw state stored by an earlier provider version. Upgraded
//! state is decoded leniently: attributes the current schema no longer
//! declares are dropped instead of rejected. Unknown values cannot appear
//! in JSON.

use std::collections::BTreeMap;

use serde_json::{Number, Value as Json};

use super::{absent_nested, fill_absent, Value, ValueError};
use crate::diagnostics::AttributePath;
use crate::schema::{AttributeType, Block, NestedBlock, NestingMode};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Strict,
    DropUndeclared,
}

/// Parse bytes as untyped JSON
pub fn parse(bytes: &[u8]) -> Result<Json, ValueError> {
    serde_json::from_slice(bytes).map_err(|e| ValueError::Json(e.to_string()))
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

/// Decode a value of type `ty`
pub fn decode(bytes: &[u8], ty: &AttributeType) -> Result<Value, ValueError> {
    from_json(parse(bytes)?, ty, &AttributePath::root(), Mode::Strict)
}

/// Decode the value of a block, rejecting undeclared attributes
pub fn decode_block(bytes: &[u8], block: &Block) -> Result<Value, ValueError> {
    block_from_json(parse(bytes)?, block, &AttributePath::root(), Mode::Strict)
}

/// Decode stored state against the current block
///
/// Attributes and nested blocks the block no longer declares are dropped.
pub fn decode_state(bytes: &[u8], block: &Block) -> Result<Value, ValueError> {
    state_from_json(parse(bytes)?, block)
}

/// [`decode_state`] for JSON that is already parsed
pub fn state_from_json(json: Json, block: &Block) -> Result<Value, ValueError> {
    block_from_json(json, block, &AttributePath::root(), Mode::DropUndeclared)
}

fn from_json(
    json: Json,
    ty: &AttributeType,
    path: &AttributePath,
    mode: Mode,
) -> Result<Value, ValueError> {
    if json.is_null() {
        return Ok(Value::Null);
    }

    match (ty, json) {
        (AttributeType::String, Json::String(s)) => Ok(Value::String(s)),
        (AttributeType::String, Json::Number(n)) => Ok(Value::String(n.to_string())),
        (AttributeType::String, Json::Bool(b)) => Ok(Value::String(b.to_string())),
        (AttributeType::Number, Json::Number(n)) => Ok(Value::Number(n)),
        (AttributeType::Number, Json::String(s)) => s
            .trim()
            .parse::<Number>()
            .map(Value::Number)
            .map_err(|_| ValueError::InvalidNumber {
                path: path.clone(),
                value: s.clone(),
            }),
        (AttributeType::Bool, Json::Bool(b)) => Ok(Value::Bool(b)),
        (AttributeType::Bool, Json::String(s)) if s == "true" || s == "false" => {
            Ok(Value::Bool(s == "true"))
        }
        (AttributeType::List(element), Json::Array(items)) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| from_json(item, element, &path.clone().index(i as i64), mode))
            .collect::<Result<_, _>>()
            .map(Value::List),
        (AttributeType::Set(element), Json::Array(items)) => items
            .into_iter()
            .map(|item| from_json(item, element, path, mode))
            .collect::<Result<_, _>>()
            .map(Value::Set),
        (AttributeType::Tuple(elements), Json::Array(items)) if items.len() == elements.len() => {
            items
                .into_iter()
                .zip(elements)
                .enumerate()
                .map(|(i, (item, element))| {
                    from_json(item, element, &path.clone().index(i as i64), mode)
                })
                .collect::<Result<_, _>>()
                .map(Value::Tuple)
        }
        (AttributeType::Map(element), Json::Object(entries)) => {
            let mut fields = BTreeMap::new();
            for (key, item) in entries {
                let value = from_json(item, element, &path.clone().key(&key), mode)?;
                fields.insert(key, value);
            }
            Ok(Value::Map(fields))
        }
        (AttributeType::Object(attributes), Json::Object(entries)) => {
            let mut fields = BTreeMap::new();
            for (key, item) in entries {
                match attributes.get(&key) {
                    Some(attr_ty) => {
                        let value = from_json(item, attr_ty, &path.clone().attribute(&key), mode)?;
                        fields.insert(key, value);
                    }
                    None if mode == Mode::DropUndeclared => {}
                    None => {
                        return Err(ValueError::UnknownAttribute {
                            path: path.clone(),
                            name: key,
                        })
                    }
                }
            }
            for name in attributes.keys() {
                fields.entry(name.clone()).or_insert(Value::Null);
            }
            Ok(Value::Object(fields))
        }
        (AttributeType::Dynamic, Json::Object(mut wrapper)) => {
            let (Some(type_json), Some(value)) = (wrapper.remove("type"), wrapper.remove("value"))
            else {
                return Err(ValueError::InvalidDynamicType {
                    path: path.clone(),
                    reason: "expected an object with \"type\" and \"value\"".to_string(),
                });
            };
            let actual = AttributeType::try_from(type_json).map_err(|e| {
                ValueError::InvalidDynamicType {
                    path: path.clone(),
                    reason: e.to_string(),
                }
            })?;
            from_json(value, &actual, path, mode)
        }
        (ty, json) => Err(ValueError::mismatch(path, ty, json_kind(&json))),
    }
}

fn block_from_json(
    json: Json,
    block: &Block,
    path: &AttributePath,
    mode: Mode,
) -> Result<Value, ValueError> {
    let entries = match json {
        Json::Null => return Ok(Value::Null),
        Json::Object(entries) => entries,
        other => return Err(ValueError::mismatch(path, "block object", json_kind(&other))),
    };

    let mut fields = BTreeMap::new();
    for (key, item) in entries {
        let item_path = path.clone().attribute(&key);
        let value = if let Some(attr) = block.get_attribute(&key) {
            from_json(item, &attr.r#type, &item_path, mode)?
        } else if let Some(nested) = block.get_block_type(&key) {
            nested_from_json(item, nested, &item_path, mode)?
        } else if mode == Mode::DropUndeclared {
            continue;
        } else {
            return Err(ValueError::UnknownAttribute {
                path: path.clone(),
                name: key,
            });
        };
        fields.insert(key, value);
    }
    fill_absent(&mut fields, block);
    Ok(Value::Object(fields))
}

fn nested_from_json(
    json: Json,
    nested: &NestedBlock,
    path: &AttributePath,
    mode: Mode,
) -> Result<Value, ValueError> {
    if json.is_null() {
        return Ok(absent_nested(nested));
    }

    match (nested.nesting, json) {
        (NestingMode::Single | NestingMode::Group, json) => {
            block_from_json(json, &nested.block, path, mode)
        }
        (NestingMode::List, Json::Array(items)) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| block_from_json(item, &nested.block, &path.clone().index(i as i64), mode))
            .collect::<Result<_, _>>()
            .map(Value::List),
        (NestingMode::Set, Json::Array(items)) => items
            .into_iter()
            .map(|item| block_from_json(item, &nested.block, path, mode))
            .collect::<Result<_, _>>()
            .map(Value::Set),
        (NestingMode::Map, Json::Object(entries)) => {
            let mut fields = BTreeMap::new();
            for (key, item) in entries {
                let value = block_from_json(item, &nested.block, &path.clone().key(&key), mode)?;
                fields.insert(key, value);
            }
            Ok(Value::Map(fields))
        }
        (_, json) => Err(ValueError::mismatch(
            path,
            format!("{:?} block", nested.nesting).to_lowercase(),
            json_kind(&json),
        )),
    }
}
