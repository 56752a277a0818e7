//! JSON <-> document conversion, with the extended-JSON wrappers
//! (`$oid`, `$date`, `$timestamp`, `$binary`, `$minKey`, `$maxKey`).

use chrono::{DateTime, Utc};
use serde_json::{Map, Number, Value};
use crate::core::error::{Error, ErrorKind, Result};
use crate::core::types::{KvDocument, KvValue};

pub fn parse_document(json: &str) -> Result<KvDocument> {
    let value: Value = serde_json::from_str(json)?;
    match from_json(value)? {
        KvValue::Document(doc) => Ok(doc),
        other => Err(Error::new(
            ErrorKind::InvalidArgument,
            format!("expected a JSON object, found {}", other.type_name()),
        )),
    }
}

pub fn from_json(value: Value) -> Result<KvValue> {
    let converted = match value {
        Value::Null => KvValue::Null,
        Value::Bool(b) => KvValue::Boolean(b),
        Value::Number(n) => from_number(&n),
        Value::String(s) => KvValue::String(s),
        Value::Array(elements) => KvValue::Array(
            elements.into_iter().map(from_json).collect::<Result<Vec<_>>>()?,
        ),
        Value::Object(map) => from_object(map)?,
    };
    Ok(converted)
}

fn from_number(n: &Number) -> KvValue {
    match n.as_i64() {
        Some(i) => match i32::try_from(i) {
            Ok(small) => KvValue::Integer(small),
            Err(_) => KvValue::Long(i),
        },
        None => KvValue::Double(n.as_f64().unwrap_or(f64::NAN)),
    }
}

fn from_object(map: Map<String, Value>) -> Result<KvValue> {
    if map.len() == 1 {
        if let Some((key, value)) = map.iter().next() {
            if let Some(special) = from_extended(key, value)? {
                return Ok(special);
            }
        }
    }

    let mut doc = KvDocument::new();
    for (key, value) in map {
        doc.insert(key, from_json(value)?);
    }
    Ok(KvValue::Document(doc))
}

fn from_extended(key: &str, value: &Value) -> Result<Option<KvValue>> {
    let converted = match (key, value) {
        ("$oid", Value::String(text)) => {
            let bytes = hex::decode(text)?;
            let oid: [u8; 12] = bytes.try_into().map_err(|_| {
                Error::new(ErrorKind::Parse, format!("$oid must be 12 bytes: {}", text))
            })?;
            KvValue::ObjectId(oid)
        }
        ("$date", Value::String(text)) => {
            let instant = DateTime::parse_from_rfc3339(text)
                .map_err(|e| Error::new(ErrorKind::Parse, format!("bad $date {}: {}", text, e)))?;
            KvValue::Instant(instant.with_timezone(&Utc))
        }
        ("$binary", Value::String(text)) => KvValue::Binary(hex::decode(text)?),
        ("$timestamp", Value::Object(parts)) => {
            let field = |name: &str| {
                parts.get(name)
                    .and_then(Value::as_u64)
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| Error::new(ErrorKind::Parse, format!("$timestamp needs {}", name)))
            };
            KvValue::Timestamp { seconds: field("t")?, ordinal: field("i")? }
        }
        ("$minKey", _) => KvValue::MinKey,
        ("$maxKey", _) => KvValue::MaxKey,
        _ => return Ok(None),
    };
    Ok(Some(converted))
}

pub fn to_json(value: &KvValue) -> Value {
    match value {
        KvValue::Null => Value::Null,
        KvValue::Boolean(b) => Value::Bool(*b),
        KvValue::Integer(i) => Value::from(*i),
        KvValue::Long(l) => Value::from(*l),
        KvValue::Double(d) => Number::from_f64(*d).map_or(Value::Null, Value::Number),
        KvValue::String(s) => Value::String(s.clone()),
        KvValue::Binary(bytes) => wrap("$binary", Value::String(hex::encode(bytes))),
        KvValue::Date(date) => Value::String(date.format("%Y-%m-%d").to_string()),
        KvValue::Time(time) => Value::String(time.format("%H:%M:%S%.f").to_string()),
        KvValue::Instant(instant) => wrap("$date", Value::String(instant.to_rfc3339())),
        KvValue::ObjectId(oid) => wrap("$oid", Value::String(hex::encode(oid))),
        KvValue::Timestamp { seconds, ordinal } => {
            let mut parts = Map::new();
            parts.insert("t".to_string(), Value::from(*seconds));
            parts.insert("i".to_string(), Value::from(*ordinal));
            wrap("$timestamp", Value::Object(parts))
        }
        KvValue::Document(doc) => document_to_json(doc),
        KvValue::Array(elements) => Value::Array(elements.iter().map(to_json).collect()),
        KvValue::MinKey => wrap("$minKey", Value::from(1)),
        KvValue::MaxKey => wrap("$maxKey", Value::from(1)),
    }
}

pub fn document_to_json(doc: &KvDocument) -> Value {
    let mut map = Map::new();
    for (key, value) in doc.iter() {
        map.insert(key.to_string(), to_json(value));
    }
    Value::Object(map)
}

fn wrap(key: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_pick_the_narrowest_type() {
        let doc = parse_document(r#"{"a": 34, "b": 5000000000, "c": 1.5}"#).unwrap();
        assert_eq!(doc.get("a"), Some(&KvValue::Integer(34)));
        assert_eq!(doc.get("b"), Some(&KvValue::Long(5_000_000_000)));
        assert_eq!(doc.get("c"), Some(&KvValue::Double(1.5)));
    }

    #[test]
    fn extended_wrappers_are_recognised() {
        let doc = parse_document(
            r#"{"_id": {"$oid": "000102030405060708090a0b"}, "ts": {"$timestamp": {"t": 7, "i": 2}}, "k": {"$minKey": 1}}"#,
        ).unwrap();
        assert_eq!(doc.get("_id"), Some(&KvValue::ObjectId([0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11])));
        assert_eq!(doc.get("ts"), Some(&KvValue::Timestamp { seconds: 7, ordinal: 2 }));
        assert_eq!(doc.get("k"), Some(&KvValue::MinKey));
    }

    #[test]
    fn top_level_must_be_an_object() {
        let err = parse_document("[1, 2]").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn to_json_restores_the_wrappers() {
        let doc = parse_document(r#"{"bin": {"$binary": "cafe"}, "n": [1, null]}"#).unwrap();
        let json = document_to_json(&doc);
        assert_eq!(json["bin"]["$binary"], "cafe");
        assert_eq!(json["n"][1], Value::Null);
    }

    #[test]
    fn malformed_hex_is_a_parse_error() {
        let err = parse_document(r#"{"bin": {"$binary": "caf"}}"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
        let err = parse_document(r#"{"_id": {"$oid": "zz0102030405060708090a0b"}}"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
        let err = parse_document(r#"{"_id": {"$oid": "0001"}}"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Parse);
    }
}
