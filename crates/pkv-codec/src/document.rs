//! Tagged value codec.
//!
//! Every stored node has the shape `{"t": <tag>, "v": <payload>}` where the
//! tag is one of `null|bool|i32|u32|i64|u64|f64|str|arr|obj`. The document
//! root is a plain JSON object mapping key names to such nodes; the root
//! itself carries no `{t,v}` wrapper.
//!
//! Decoding is strict: a node with a missing or non-string tag, an unknown
//! tag, extra keys, or a payload that does not match the tag fails with
//! `InvalidValueType`, and a failure in any child fails the whole decode.
//! Integer-tagged payloads may arrive as floating-point JSON numbers (a
//! common JSON limitation) and are accepted only when the value is
//! losslessly representable in the declared range.

use serde_json::{Map, Number, Value};

use pkv_types::{KvsError, KvsMap, KvsValue};

/// Key holding the tag string inside a node.
const TAG_KEY: &str = "t";

/// Key holding the payload inside a node.
const PAYLOAD_KEY: &str = "v";

/// Encode one value into its tagged node.
///
/// Fails with `InvalidValueType` when the value cannot be represented in
/// JSON (a non-finite `F64`).
pub fn encode_value(value: &KvsValue) -> Result<Value, KvsError> {
    let payload = match value {
        KvsValue::Null => Value::Null,
        KvsValue::Boolean(b) => Value::Bool(*b),
        KvsValue::I32(n) => Value::Number(Number::from(i64::from(*n))),
        KvsValue::U32(n) => Value::Number(Number::from(u64::from(*n))),
        KvsValue::I64(n) => Value::Number(Number::from(*n)),
        KvsValue::U64(n) => Value::Number(Number::from(*n)),
        KvsValue::F64(n) => {
            let number = Number::from_f64(*n).ok_or(KvsError::InvalidValueType)?;
            Value::Number(number)
        }
        KvsValue::String(s) => Value::String(s.clone()),
        KvsValue::Array(items) => {
            let encoded: Result<Vec<Value>, KvsError> = items.iter().map(encode_value).collect();
            Value::Array(encoded?)
        }
        KvsValue::Object(map) => {
            let mut encoded = Map::new();
            for (key, child) in map {
                encoded.insert(key.clone(), encode_value(child)?);
            }
            Value::Object(encoded)
        }
    };

    let mut node = Map::new();
    node.insert(TAG_KEY.to_string(), Value::String(value.type_name().into()));
    node.insert(PAYLOAD_KEY.to_string(), payload);
    Ok(Value::Object(node))
}

/// Decode one tagged node into a value.
pub fn decode_value(node: &Value) -> Result<KvsValue, KvsError> {
    let fields = node.as_object().ok_or(KvsError::InvalidValueType)?;
    if fields.len() != 2 {
        return Err(KvsError::InvalidValueType);
    }
    let tag = fields
        .get(TAG_KEY)
        .and_then(Value::as_str)
        .ok_or(KvsError::InvalidValueType)?;
    let payload = fields.get(PAYLOAD_KEY).ok_or(KvsError::InvalidValueType)?;

    match tag {
        "null" => match payload {
            Value::Null => Ok(KvsValue::Null),
            _ => Err(KvsError::InvalidValueType),
        },
        "bool" => payload
            .as_bool()
            .map(KvsValue::Boolean)
            .ok_or(KvsError::InvalidValueType),
        "i32" => decode_number(payload, decode_i32).map(KvsValue::I32),
        "u32" => decode_number(payload, decode_u32).map(KvsValue::U32),
        "i64" => decode_number(payload, decode_i64).map(KvsValue::I64),
        "u64" => decode_number(payload, decode_u64).map(KvsValue::U64),
        "f64" => decode_number(payload, |n| n.as_f64().ok_or(KvsError::InvalidValueType))
            .map(KvsValue::F64),
        "str" => payload
            .as_str()
            .map(|s| KvsValue::String(s.to_string()))
            .ok_or(KvsError::InvalidValueType),
        "arr" => {
            let items = payload.as_array().ok_or(KvsError::InvalidValueType)?;
            let decoded: Result<Vec<KvsValue>, KvsError> =
                items.iter().map(decode_value).collect();
            Ok(KvsValue::Array(decoded?))
        }
        "obj" => {
            let fields = payload.as_object().ok_or(KvsError::InvalidValueType)?;
            let mut decoded = KvsMap::with_capacity(fields.len());
            for (key, child) in fields {
                decoded.insert(key.clone(), decode_value(child)?);
            }
            Ok(KvsValue::Object(decoded))
        }
        _ => Err(KvsError::InvalidValueType),
    }
}

/// Encode a full document: each entry becomes a tagged node at the root.
pub fn encode_document(map: &KvsMap) -> Result<Map<String, Value>, KvsError> {
    let mut root = Map::new();
    for (key, value) in map {
        root.insert(key.clone(), encode_value(value)?);
    }
    Ok(root)
}

/// Decode a full document from its root object.
pub fn decode_document(root: &Map<String, Value>) -> Result<KvsMap, KvsError> {
    let mut map = KvsMap::with_capacity(root.len());
    for (key, node) in root {
        map.insert(key.clone(), decode_value(node)?);
    }
    Ok(map)
}

fn decode_number<T>(
    payload: &Value,
    convert: impl FnOnce(&Number) -> Result<T, KvsError>,
) -> Result<T, KvsError> {
    match payload {
        Value::Number(n) => convert(n),
        _ => Err(KvsError::InvalidValueType),
    }
}

// Integer conversions accept integer- or float-shaped JSON numbers, but
// the value must survive the trip into the declared range without
// truncation or overflow.

fn decode_i32(n: &Number) -> Result<i32, KvsError> {
    if let Some(i) = n.as_i64() {
        return i32::try_from(i).map_err(|_| KvsError::InvalidValueType);
    }
    if n.as_u64().is_some() {
        // u64 values beyond i64::MAX are far outside the i32 range.
        return Err(KvsError::InvalidValueType);
    }
    let f = n.as_f64().ok_or(KvsError::InvalidValueType)?;
    if f.fract() == 0.0 && f >= f64::from(i32::MIN) && f <= f64::from(i32::MAX) {
        Ok(f as i32)
    } else {
        Err(KvsError::InvalidValueType)
    }
}

fn decode_u32(n: &Number) -> Result<u32, KvsError> {
    if let Some(u) = n.as_u64() {
        return u32::try_from(u).map_err(|_| KvsError::InvalidValueType);
    }
    if n.as_i64().is_some() {
        // A negative integer; as_u64 already covered the non-negatives.
        return Err(KvsError::InvalidValueType);
    }
    let f = n.as_f64().ok_or(KvsError::InvalidValueType)?;
    if f.fract() == 0.0 && f >= 0.0 && f <= f64::from(u32::MAX) {
        Ok(f as u32)
    } else {
        Err(KvsError::InvalidValueType)
    }
}

fn decode_i64(n: &Number) -> Result<i64, KvsError> {
    if let Some(i) = n.as_i64() {
        return Ok(i);
    }
    if n.as_u64().is_some() {
        return Err(KvsError::InvalidValueType);
    }
    let f = n.as_f64().ok_or(KvsError::InvalidValueType)?;
    // 2^63 itself is representable as f64 but not as i64, hence the
    // exclusive upper bound.
    if f.fract() == 0.0 && f >= -(2f64.powi(63)) && f < 2f64.powi(63) {
        Ok(f as i64)
    } else {
        Err(KvsError::InvalidValueType)
    }
}

fn decode_u64(n: &Number) -> Result<u64, KvsError> {
    if let Some(u) = n.as_u64() {
        return Ok(u);
    }
    if n.as_i64().is_some() {
        return Err(KvsError::InvalidValueType);
    }
    let f = n.as_f64().ok_or(KvsError::InvalidValueType)?;
    if f.fract() == 0.0 && f >= 0.0 && f < 2f64.powi(64) {
        Ok(f as u64)
    } else {
        Err(KvsError::InvalidValueType)
    }
}
