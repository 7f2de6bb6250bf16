//! msgpack encoding of values
//!
//! - unknown: extension type 0 (12 is also read, for refined unknowns)
//! - numbers: integers when integral, float64 otherwise; strings are
//!   accepted when decoding numbers too large for either
//! - objects and blocks: maps keyed by attribute name, sorted; a missing key
//!   decodes as null and an undeclared key is an error
//! - dynamic: a two element array `[type_json, value]`

use std::collections::BTreeMap;

use rmpv::Value as Raw;
use serde_json::Number;

use super::{absent_nested, fill_absent, Value, ValueError};
use crate::diagnostics::AttributePath;
use crate::schema::{AttributeType, Block, NestedBlock, NestingMode};

/// Extension type carrying an unknown value
pub const UNKNOWN_EXT: i8 = 0;

/// Extension type of an unknown value with refinements
const REFINED_UNKNOWN_EXT: i8 = 12;

fn unknown() -> Raw {
    Raw::Ext(UNKNOWN_EXT, vec![0])
}

fn is_unknown(raw: &Raw) -> bool {
    matches!(raw, Raw::Ext(code, _) if *code == UNKNOWN_EXT || *code == REFINED_UNKNOWN_EXT)
}

fn raw_kind(raw: &Raw) -> &'static str {
    match raw {
        Raw::Nil => "nil",
        Raw::Boolean(_) => "bool",
        Raw::Integer(_) => "integer",
        Raw::F32(_) | Raw::F64(_) => "float",
        Raw::String(_) => "string",
        Raw::Binary(_) => "binary",
        Raw::Array(_) => "array",
        Raw::Map(_) => "map",
        Raw::Ext(_, _) => "extension",
    }
}

fn read(bytes: &[u8]) -> Result<Raw, ValueError> {
    let mut cursor = bytes;
    let raw =
        rmpv::decode::read_value(&mut cursor).map_err(|e| ValueError::Msgpack(e.to_string()))?;
    if !cursor.is_empty() {
        return Err(ValueError::TrailingBytes(cursor.len()));
    }
    Ok(raw)
}

fn write(raw: &Raw) -> Result<Vec<u8>, ValueError> {
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, raw).map_err(|e| ValueError::Msgpack(e.to_string()))?;
    Ok(buf)
}

/// Decode a value of type `ty`
pub fn decode(bytes: &[u8], ty: &AttributeType) -> Result<Value, ValueError> {
    from_raw(read(bytes)?, ty, &AttributePath::root())
}

/// Decode the value of a block
pub fn decode_block(bytes: &[u8], block: &Block) -> Result<Value, ValueError> {
    block_from_raw(read(bytes)?, block, &AttributePath::root())
}

/// Encode a value of type `ty`
pub fn encode(value: &Value, ty: &AttributeType) -> Result<Vec<u8>, ValueError> {
    write(&to_raw(value, ty, &AttributePath::root())?)
}

/// Encode the value of a block
pub fn encode_block(value: &Value, block: &Block) -> Result<Vec<u8>, ValueError> {
    write(&block_to_raw(value, block, &AttributePath::root())?)
}

// =============================================================================
// Decoding
// =============================================================================

fn string_key(key: Raw, path: &AttributePath) -> Result<String, ValueError> {
    match key {
        Raw::String(s) => s
            .into_str()
            .ok_or_else(|| ValueError::mismatch(path, "utf-8 key", "invalid utf-8")),
        other => Err(ValueError::mismatch(path, "string key", raw_kind(&other))),
    }
}

fn number_from_raw(raw: Raw, path: &AttributePath) -> Result<Value, ValueError> {
    let invalid = |value: String| ValueError::InvalidNumber {
        path: path.clone(),
        value,
    };
    let number = match raw {
        Raw::Integer(i) => match (i.as_i64(), i.as_u64()) {
            (Some(n), _) => Number::from(n),
            (None, Some(n)) => Number::from(n),
            _ => return Err(invalid(i.to_string())),
        },
        Raw::F64(f) => Number::from_f64(f).ok_or_else(|| invalid(f.to_string()))?,
        Raw::F32(f) => Number::from_f64(f as f64).ok_or_else(|| invalid(f.to_string()))?,
        Raw::String(s) => {
            let s = s.into_str().unwrap_or_default();
            s.trim().parse::<Number>().map_err(|_| invalid(s.clone()))?
        }
        other => {
            return Err(ValueError::mismatch(
                path,
                AttributeType::Number,
                raw_kind(&other),
            ))
        }
    };
    Ok(Value::Number(number))
}

fn from_raw(raw: Raw, ty: &AttributeType, path: &AttributePath) -> Result<Value, ValueError> {
    if raw.is_nil() {
        return Ok(Value::Null);
    }
    if is_unknown(&raw) {
        return Ok(Value::Unknown);
    }

    match (ty, raw) {
        (AttributeType::String, Raw::String(s)) => s
            .into_str()
            .map(Value::String)
            .ok_or_else(|| ValueError::mismatch(path, ty, "invalid utf-8")),
        (AttributeType::Number, raw) => number_from_raw(raw, path),
        (AttributeType::Bool, Raw::Boolean(b)) => Ok(Value::Bool(b)),
        (AttributeType::List(element), Raw::Array(items)) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| from_raw(item, element, &path.clone().index(i as i64)))
            .collect::<Result<_, _>>()
            .map(Value::List),
        (AttributeType::Set(element), Raw::Array(items)) => items
            .into_iter()
            .map(|item| from_raw(item, element, path))
            .collect::<Result<_, _>>()
            .map(Value::Set),
        (AttributeType::Tuple(elements), Raw::Array(items)) => {
            if items.len() != elements.len() {
                return Err(ValueError::mismatch(
                    path,
                    ty,
                    &format!("array of {} elements", items.len()),
                ));
            }
            items
                .into_iter()
                .zip(elements)
                .enumerate()
                .map(|(i, (item, element))| from_raw(item, element, &path.clone().index(i as i64)))
                .collect::<Result<_, _>>()
                .map(Value::Tuple)
        }
        (AttributeType::Map(element), Raw::Map(entries)) => {
            let mut fields = BTreeMap::new();
            for (key, item) in entries {
                let key = string_key(key, path)?;
                let value = from_raw(item, element, &path.clone().key(&key))?;
                fields.insert(key, value);
            }
            Ok(Value::Map(fields))
        }
        (AttributeType::Object(attributes), Raw::Map(entries)) => {
            let mut fields = BTreeMap::new();
            for (key, item) in entries {
                let key = string_key(key, path)?;
                let Some(attr_ty) = attributes.get(&key) else {
                    return Err(ValueError::UnknownAttribute {
                        path: path.clone(),
                        name: key,
                    });
                };
                let value = from_raw(item, attr_ty, &path.clone().attribute(&key))?;
                fields.insert(key, value);
            }
            for name in attributes.keys() {
                fields.entry(name.clone()).or_insert(Value::Null);
            }
            Ok(Value::Object(fields))
        }
        (AttributeType::Dynamic, Raw::Array(mut parts)) if parts.len() == 2 => {
            let value = parts.pop().unwrap_or(Raw::Nil);
            let type_bytes = match parts.pop() {
                Some(Raw::Binary(bytes)) => bytes,
                Some(Raw::String(s)) => s.into_bytes(),
                other => {
                    return Err(ValueError::InvalidDynamicType {
                        path: path.clone(),
                        reason: format!(
                            "type must be bytes, found {}",
                            other.as_ref().map(raw_kind).unwrap_or("nothing")
                        ),
                    })
                }
            };
            let actual = AttributeType::from_json_bytes(&type_bytes).map_err(|e| {
                ValueError::InvalidDynamicType {
                    path: path.clone(),
                    reason: e.to_string(),
                }
            })?;
            from_raw(value, &actual, path)
        }
        (ty, raw) => Err(ValueError::mismatch(path, ty, raw_kind(&raw))),
    }
}

fn block_from_raw(raw: Raw, block: &Block, path: &AttributePath) -> Result<Value, ValueError> {
    if raw.is_nil() {
        return Ok(Value::Null);
    }
    if is_unknown(&raw) {
        return Ok(Value::Unknown);
    }
    let Raw::Map(entries) = raw else {
        return Err(ValueError::mismatch(path, "block object", raw_kind(&raw)));
    };

    let mut fields = BTreeMap::new();
    for (key, item) in entries {
        let key = string_key(key, path)?;
        let item_path = path.clone().attribute(&key);
        let value = if let Some(attr) = block.get_attribute(&key) {
            from_raw(item, &attr.r#type, &item_path)?
        } else if let Some(nested) = block.get_block_type(&key) {
            nested_from_raw(item, nested, &item_path)?
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

fn nested_from_raw(
    raw: Raw,
    nested: &NestedBlock,
    path: &AttributePath,
) -> Result<Value, ValueError> {
    if is_unknown(&raw) {
        return Ok(Value::Unknown);
    }
    if raw.is_nil() {
        return Ok(absent_nested(nested));
    }

    match (nested.nesting, raw) {
        (NestingMode::Single | NestingMode::Group, raw) => block_from_raw(raw, &nested.block, path),
        (NestingMode::List, Raw::Array(items)) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| block_from_raw(item, &nested.block, &path.clone().index(i as i64)))
            .collect::<Result<_, _>>()
            .map(Value::List),
        (NestingMode::Set, Raw::Array(items)) => items
            .into_iter()
            .map(|item| block_from_raw(item, &nested.block, path))
            .collect::<Result<_, _>>()
            .map(Value::Set),
        (NestingMode::Map, Raw::Map(entries)) => {
            let mut fields = BTreeMap::new();
            for (key, item) in entries {
                let key = string_key(key, path)?;
                let value = block_from_raw(item, &nested.block, &path.clone().key(&key))?;
                fields.insert(key, value);
            }
            Ok(Value::Map(fields))
        }
        (_, raw) => Err(ValueError::mismatch(
            path,
            format!("{:?} block", nested.nesting).to_lowercase(),
            raw_kind(&raw),
        )),
    }
}

// =============================================================================
// Encoding
// =============================================================================

fn number_to_raw(number: &Number, path: &AttributePath) -> Result<Raw, ValueError> {
    if let Some(n) = number.as_i64() {
        return Ok(Raw::from(n));
    }
    if let Some(n) = number.as_u64() {
        return Ok(Raw::from(n));
    }
    let f = number.as_f64().ok_or_else(|| ValueError::InvalidNumber {
        path: path.clone(),
        value: number.to_string(),
    })?;
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Ok(Raw::from(f as i64))
    } else {
        Ok(Raw::F64(f))
    }
}

fn sequence_to_raw<'a>(
    items: impl Iterator<Item = (&'a Value, &'a AttributeType)>,
    path: &AttributePath,
    indexed: bool,
) -> Result<Raw, ValueError> {
    items
        .enumerate()
        .map(|(i, (item, ty))| {
            let item_path = if indexed {
                path.clone().index(i as i64)
            } else {
                path.clone()
            };
            to_raw(item, ty, &item_path)
        })
        .collect::<Result<Vec<_>, ValueError>>()
        .map(Raw::Array)
}

fn to_raw(value: &Value, ty: &AttributeType, path: &AttributePath) -> Result<Raw, ValueError> {
    match (value, ty) {
        (Value::Null, _) => Ok(Raw::Nil),
        (Value::Unknown, _) => Ok(unknown()),
        (value, AttributeType::Dynamic) => {
            let actual = value.infer_type();
            Ok(Raw::Array(vec![
                Raw::Binary(actual.to_json_bytes()),
                to_raw(value, &actual, path)?,
            ]))
        }
        (Value::String(s), AttributeType::String) => Ok(Raw::from(s.as_str())),
        (Value::Number(n), AttributeType::Number) => number_to_raw(n, path),
        (Value::Bool(b), AttributeType::Bool) => Ok(Raw::Boolean(*b)),
        (
            Value::List(items) | Value::Set(items) | Value::Tuple(items),
            AttributeType::List(element),
        ) => sequence_to_raw(items.iter().zip(std::iter::repeat(&**element)), path, true),
        (
            Value::List(items) | Value::Set(items) | Value::Tuple(items),
            AttributeType::Set(element),
        ) => sequence_to_raw(items.iter().zip(std::iter::repeat(&**element)), path, false),
        (Value::List(items) | Value::Tuple(items), AttributeType::Tuple(elements))
            if items.len() == elements.len() =>
        {
            sequence_to_raw(items.iter().zip(elements.iter()), path, true)
        }
        (Value::Map(fields) | Value::Object(fields), AttributeType::Map(element)) => fields
            .iter()
            .map(|(k, v)| Ok((Raw::from(k.as_str()), to_raw(v, element, &path.clone().key(k))?)))
            .collect::<Result<Vec<_>, ValueError>>()
            .map(Raw::Map),
        (Value::Object(fields) | Value::Map(fields), AttributeType::Object(attributes)) => {
            if let Some(name) = fields.keys().find(|k| !attributes.contains_key(*k)) {
                return Err(ValueError::UnknownAttribute {
                    path: path.clone(),
                    name: name.clone(),
                });
            }
            attributes
                .iter()
                .map(|(name, attr_ty)| {
                    let item = fields.get(name).unwrap_or(&Value::Null);
                    let raw = to_raw(item, attr_ty, &path.clone().attribute(name))?;
                    Ok((Raw::from(name.as_str()), raw))
                })
                .collect::<Result<Vec<_>, ValueError>>()
                .map(Raw::Map)
        }
        (value, ty) => Err(ValueError::mismatch(path, ty, value.kind())),
    }
}

fn block_to_raw(value: &Value, block: &Block, path: &AttributePath) -> Result<Raw, ValueError> {
    let fields = match value {
        Value::Null => return Ok(Raw::Nil),
        Value::Unknown => return Ok(unknown()),
        Value::Object(fields) => fields,
        other => return Err(ValueError::mismatch(path, "block object", other.kind())),
    };

    if let Some(name) = fields
        .keys()
        .find(|k| block.get_attribute(k).is_none() && block.get_block_type(k).is_none())
    {
        return Err(ValueError::UnknownAttribute {
            path: path.clone(),
            name: name.clone(),
        });
    }

    // Keys are written in name order regardless of schema order
    let mut entries: BTreeMap<&str, Raw> = BTreeMap::new();
    for attr in &block.attributes {
        let item = fields.get(&attr.name).unwrap_or(&Value::Null);
        let raw = to_raw(item, &attr.r#type, &path.clone().attribute(&attr.name))?;
        entries.insert(&attr.name, raw);
    }
    for nested in &block.block_types {
        let absent;
        let item = match fields.get(&nested.type_name) {
            Some(item) => item,
            None => {
                absent = absent_nested(nested);
                &absent
            }
        };
        let raw = nested_to_raw(item, nested, &path.clone().attribute(&nested.type_name))?;
        entries.insert(&nested.type_name, raw);
    }

    Ok(Raw::Map(
        entries
            .into_iter()
            .map(|(k, v)| (Raw::from(k), v))
            .collect(),
    ))
}

fn nested_to_raw(value: &Value, nested: &NestedBlock, path: &AttributePath) -> Result<Raw, ValueError> {
    match (nested.nesting, value) {
        (_, Value::Unknown) => Ok(unknown()),
        (NestingMode::Single | NestingMode::Group, value) => block_to_raw(value, &nested.block, path),
        (NestingMode::List | NestingMode::Set, Value::Null) => Ok(Raw::Array(Vec::new())),
        (NestingMode::Map, Value::Null) => Ok(Raw::Map(Vec::new())),
        (NestingMode::List | NestingMode::Set, Value::List(items) | Value::Set(items)) => {
            let indexed = nested.nesting == NestingMode::List;
            items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    let item_path = if indexed {
                        path.clone().index(i as i64)
                    } else {
                        path.clone()
                    };
                    block_to_raw(item, &nested.block, &item_path)
                })
                .collect::<Result<Vec<_>, ValueError>>()
                .map(Raw::Array)
        }
        (NestingMode::Map, Value::Map(items) | Value::Object(items)) => items
            .iter()
            .map(|(k, v)| Ok((Raw::from(k.as_str()), block_to_raw(v, &nested.block, &path.clone().key(k))?)))
            .collect::<Result<Vec<_>, ValueError>>()
            .map(Raw::Map),
        (_, other) => Err(ValueError::mismatch(
            path,
            format!("{:?} block", nested.nesting).to_lowercase(),
            other.kind(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;
    use rstest::rstest;

    fn example_block() -> Block {
        Block::new()
            .attribute(Attribute::required("input", AttributeType::String))
            .attribute(Attribute::computed("output", AttributeType::String))
    }

    fn raw_bytes(raw: Raw) -> Vec<u8> {
        write(&raw).unwrap()
    }

    fn raw_map(entries: Vec<(&str, Raw)>) -> Raw {
        Raw::Map(entries.into_iter().map(|(k, v)| (Raw::from(k), v)).collect())
    }

    #[test]
    fn block_keys_are_sorted_and_missing_attributes_are_nil() {
        let value = Value::object([("input", Value::from("x"))]);
        let bytes = encode_block(&value, &example_block()).unwrap();

        assert_eq!(
            read(&bytes).unwrap(),
            raw_map(vec![("input", Raw::from("x")), ("output", Raw::Nil)])
        );
    }

    #[test]
    fn decoding_fills_missing_attributes_with_null() {
        let bytes = raw_bytes(raw_map(vec![("input", Raw::from("x"))]));
        let value = decode_block(&bytes, &example_block()).unwrap();

        assert_eq!(
            value,
            Value::object([("input", Value::from("x")), ("output", Value::Null)])
        );
    }

    #[test]
    fn undeclared_attribute_is_rejected_both_ways() {
        let bytes = raw_bytes(raw_map(vec![("bogus", Raw::from(1))]));
        assert!(matches!(
            decode_block(&bytes, &example_block()),
            Err(ValueError::UnknownAttribute { name, .. }) if name == "bogus"
        ));

        let value = Value::object([("bogus", Value::from(1))]);
        assert!(matches!(
            encode_block(&value, &example_block()),
            Err(ValueError::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn unknown_is_extension_zero() {
        let bytes = encode(&Value::Unknown, &AttributeType::String).unwrap();
        assert_eq!(read(&bytes).unwrap(), Raw::Ext(0, vec![0]));
        assert_eq!(decode(&bytes, &AttributeType::String).unwrap(), Value::Unknown);

        let refined = raw_bytes(Raw::Ext(12, vec![1, 2]));
        assert_eq!(decode(&refined, &AttributeType::Number).unwrap(), Value::Unknown);
    }

    #[rstest]
    #[case::int(Value::from(42), Raw::from(42i64))]
    #[case::negative(Value::from(-7), Raw::from(-7i64))]
    #[case::integral_float(Value::Number(Number::from_f64(3.0).unwrap()), Raw::from(3i64))]
    #[case::fraction(Value::Number(Number::from_f64(1.5).unwrap()), Raw::F64(1.5))]
    #[case::big_unsigned(Value::Number(Number::from(u64::MAX)), Raw::from(u64::MAX))]
    #[case::two_pow_63(
        Value::Number(Number::from_f64(9_223_372_036_854_775_808.0).unwrap()),
        Raw::F64(9_223_372_036_854_775_808.0)
    )]
    fn numbers_are_integers_when_integral(#[case] value: Value, #[case] expected: Raw) {
        let bytes = encode(&value, &AttributeType::Number).unwrap();
        assert_eq!(read(&bytes).unwrap(), expected);
    }

    #[rstest]
    #[case::int(Raw::from(5i64), "5")]
    #[case::float(Raw::F64(2.5), "2.5")]
    #[case::float32(Raw::F32(0.5), "0.5")]
    #[case::string(Raw::from("12"), "12")]
    fn numbers_decode_from_any_numeric_form(#[case] raw: Raw, #[case] expected: &str) {
        let value = decode(&raw_bytes(raw), &AttributeType::Number).unwrap();
        assert_eq!(value.as_number().unwrap().to_string(), expected);
    }

    #[test]
    fn non_numeric_string_is_an_invalid_number() {
        let bytes = raw_bytes(Raw::from("twelve"));
        assert!(matches!(
            decode(&bytes, &AttributeType::Number),
            Err(ValueError::InvalidNumber { .. })
        ));
    }

    #[test]
    fn type_mismatch_reports_the_path() {
        let ty = AttributeType::object([("tags", AttributeType::map(AttributeType::String))]);
        let bytes = raw_bytes(raw_map(vec![(
            "tags",
            raw_map(vec![("env", Raw::Boolean(true))]),
        )]));

        let err = decode(&bytes, &ty).unwrap_err();
        assert_eq!(err.path().unwrap().to_string(), "tags[\"env\"]");
    }

    #[test]
    fn dynamic_values_carry_their_type() {
        let value = Value::List(vec![Value::from("a"), Value::from("b")]);
        let bytes = encode(&value, &AttributeType::Dynamic).unwrap();

        let Raw::Array(parts) = read(&bytes).unwrap() else {
            panic!("dynamic value should be an array");
        };
        assert_eq!(parts[0], Raw::Binary(br#"["list","string"]"#.to_vec()));
        assert_eq!(decode(&bytes, &AttributeType::Dynamic).unwrap(), value);
    }

    #[test]
    fn dynamic_with_bad_type_is_rejected() {
        let bytes = raw_bytes(Raw::Array(vec![Raw::Binary(b"\"float\"".to_vec()), Raw::from(1)]));
        assert!(matches!(
            decode(&bytes, &AttributeType::Dynamic),
            Err(ValueError::InvalidDynamicType { .. })
        ));
    }

    #[test]
    fn collections_round_trip() {
        let ty = AttributeType::object([
            ("list", AttributeType::list(AttributeType::Number)),
            ("set", AttributeType::set(AttributeType::String)),
            ("map", AttributeType::map(AttributeType::Bool)),
            ("tuple", AttributeType::Tuple(vec![AttributeType::String, AttributeType::Number])),
        ]);
        let value = Value::object([
            ("list", Value::List(vec![Value::from(1), Value::from(2)])),
            ("set", Value::Set(vec![Value::from("a")])),
            ("map", Value::Map([("k".to_string(), Value::from(true))].into())),
            ("tuple", Value::Tuple(vec![Value::from("x"), Value::from(9)])),
        ]);

        let bytes = encode(&value, &ty).unwrap();
        assert_eq!(decode(&bytes, &ty).unwrap(), value);
    }

    fn nested_block() -> Block {
        let inner = Block::new().attribute(Attribute::optional("name", AttributeType::String));
        Block::new()
            .block_type(NestedBlock::new("single", NestingMode::Single, inner.clone()))
            .block_type(NestedBlock::new("group", NestingMode::Group, inner.clone()))
            .block_type(NestedBlock::new("list", NestingMode::List, inner.clone()))
            .block_type(NestedBlock::new("set", NestingMode::Set, inner.clone()))
            .block_type(NestedBlock::new("map", NestingMode::Map, inner))
    }

    #[test]
    fn absent_nested_blocks_decode_per_nesting_mode() {
        let value = decode_block(&raw_bytes(raw_map(vec![])), &nested_block()).unwrap();

        assert_eq!(value.get("single"), Some(&Value::Null));
        assert_eq!(
            value.get("group"),
            Some(&Value::object([("name", Value::Null)]))
        );
        assert_eq!(value.get("list"), Some(&Value::List(vec![])));
        assert_eq!(value.get("set"), Some(&Value::Set(vec![])));
        assert_eq!(value.get("map"), Some(&Value::Map(BTreeMap::new())));
    }

    #[test]
    fn nested_blocks_round_trip() {
        let item = |name: &str| Value::object([("name", Value::from(name))]);
        let value = Value::object([
            ("single", item("one")),
            ("group", item("grouped")),
            ("list", Value::List(vec![item("a"), item("b")])),
            ("set", Value::Set(vec![item("c")])),
            ("map", Value::Map([("k".to_string(), item("d"))].into())),
        ]);

        let bytes = encode_block(&value, &nested_block()).unwrap();
        assert_eq!(decode_block(&bytes, &nested_block()).unwrap(), value);
    }

    #[test]
    fn garbage_and_trailing_bytes_are_rejected() {
        // fixarray of two elements, truncated after the first
        assert!(matches!(
            decode_block(&[0x92, 0x01], &example_block()),
            Err(ValueError::Msgpack(_))
        ));

        let mut bytes = raw_bytes(Raw::Nil);
        bytes.push(0xc0);
        assert_eq!(
            decode_block(&bytes, &example_block()),
            Err(ValueError::TrailingBytes(1))
        );
    }

    #[test]
    fn null_block_is_nil() {
        let bytes = encode_block(&Value::Null, &example_block()).unwrap();
        assert_eq!(bytes, vec![0xc0]);
        assert_eq!(decode_block(&bytes, &example_block()).unwrap(), Value::Null);
    }
}
