//! Canonical scalar wire forms. One fixed literal encoding per scalar kind,
//! stable across versions so round-trips are exact:
//!
//! - `Text`  → the raw string, unquoted
//! - `Bool`  → `true` / `false`
//! - `Int`   → decimal literal
//! - `Float` → shortest round-trip decimal (serde_json/ryu form)
//! - `Date`  → ISO-8601 `YYYY-MM-DD`
//! - `Json`  → compact JSON over the JSON-native variants only
//!   (null/bool/int/float/text/list/map; dates, tuples and records are
//!   rejected so that decode is the exact inverse of encode)
//!
//! Decoding is driven by the declared kind, never by sniffing the text.

use crate::{codec::SerializeError, schema::ScalarKind, value::Value};
use chrono::NaiveDate;
use std::collections::BTreeMap;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Encode one scalar value to its canonical string form.
pub fn encode_scalar(field: &str, kind: ScalarKind, value: &Value) -> Result<String, SerializeError> {
    match (kind, value) {
        (ScalarKind::Text, Value::Text(s)) => Ok(s.clone()),
        (ScalarKind::Bool, Value::Bool(b)) => Ok(if *b { "true" } else { "false" }.to_string()),
        (ScalarKind::Int, Value::Int(i)) => Ok(i.to_string()),
        (ScalarKind::Float, Value::Float(f)) => encode_float(field, *f),
        // Int promotes into a float slot; it decodes back as Float.
        (ScalarKind::Float, Value::Int(i)) => encode_float(field, *i as f64),
        (ScalarKind::Date, Value::Date(d)) => Ok(d.format(DATE_FORMAT).to_string()),
        (ScalarKind::Json, v) => {
            let json = value_to_json(field, v)?;
            Ok(json.to_string())
        }
        (kind, v) => Err(SerializeError::KindMismatch {
            field: field.to_string(),
            expected: kind.as_str(),
            found: v.tag(),
        }),
    }
}

/// Decode one canonical string form back into a value.
pub fn decode_scalar(field: &str, kind: ScalarKind, text: &str) -> Result<Value, SerializeError> {
    match kind {
        ScalarKind::Text => Ok(Value::Text(text.to_string())),
        ScalarKind::Bool => match text {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(decode_error(field, "bool", "expected 'true' or 'false'")),
        },
        ScalarKind::Int => text
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|err| decode_error(field, "int", &err.to_string())),
        ScalarKind::Float => text
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|err| decode_error(field, "float", &err.to_string())),
        ScalarKind::Date => NaiveDate::parse_from_str(text, DATE_FORMAT)
            .map(Value::Date)
            .map_err(|err| decode_error(field, "date", &err.to_string())),
        ScalarKind::Json => {
            let json: serde_json::Value = serde_json::from_str(text)
                .map_err(|err| decode_error(field, "json", &err.to_string()))?;
            Ok(json_to_value(&json))
        }
    }
}

fn encode_float(field: &str, f: f64) -> Result<String, SerializeError> {
    if !f.is_finite() {
        return Err(SerializeError::NonFiniteFloat {
            field: field.to_string(),
        });
    }
    // serde_json's number formatting is the shortest round-trip form.
    Ok(serde_json::Number::from_f64(f)
        .map(|n| n.to_string())
        .unwrap_or_else(|| f.to_string()))
}

fn decode_error(field: &str, expected: &'static str, message: &str) -> SerializeError {
    SerializeError::Decode {
        field: field.to_string(),
        expected,
        message: message.to_string(),
    }
}

/// Encode one tuple slot into its inline JSON element, checked against the
/// declared slot kind. Dates inline as ISO strings; everything else keeps
/// its JSON-native shape.
pub(crate) fn tuple_scalar_to_json(
    field: &str,
    kind: ScalarKind,
    value: &Value,
) -> Result<serde_json::Value, SerializeError> {
    match (kind, value) {
        (ScalarKind::Date, Value::Date(_)) | (ScalarKind::Text, Value::Text(_)) => Ok(
            serde_json::Value::String(encode_scalar(field, kind, value)?),
        ),
        (ScalarKind::Bool, Value::Bool(_))
        | (ScalarKind::Int, Value::Int(_))
        | (ScalarKind::Float, Value::Float(_) | Value::Int(_))
        | (ScalarKind::Json, _) => value_to_json(field, &promote(kind, value)),
        (kind, v) => Err(SerializeError::KindMismatch {
            field: field.to_string(),
            expected: kind.as_str(),
            found: v.tag(),
        }),
    }
}

/// Decode one inline tuple slot against its declared kind.
pub(crate) fn tuple_scalar_from_json(
    field: &str,
    kind: ScalarKind,
    json: &serde_json::Value,
) -> Result<Value, SerializeError> {
    let mismatch = || SerializeError::Decode {
        field: field.to_string(),
        expected: kind.as_str(),
        message: format!("unexpected inline element {json}"),
    };

    match kind {
        ScalarKind::Bool => json.as_bool().map(Value::Bool).ok_or_else(mismatch),
        ScalarKind::Int => json.as_i64().map(Value::Int).ok_or_else(mismatch),
        ScalarKind::Float => json.as_f64().map(Value::Float).ok_or_else(mismatch),
        ScalarKind::Text => json
            .as_str()
            .map(|s| Value::Text(s.to_string()))
            .ok_or_else(mismatch),
        ScalarKind::Date => {
            let text = json.as_str().ok_or_else(mismatch)?;
            decode_scalar(field, ScalarKind::Date, text)
        }
        ScalarKind::Json => Ok(json_to_value(json)),
    }
}

/// Int into a float slot carries the promotion through the JSON bridge.
fn promote(kind: ScalarKind, value: &Value) -> Value {
    match (kind, value) {
        (ScalarKind::Float, Value::Int(i)) => Value::Float(*i as f64),
        _ => value.clone(),
    }
}

/// Bridge a value into `serde_json::Value`, restricted to the JSON-native
/// variants so the bridge inverts exactly.
pub(crate) fn value_to_json(field: &str, value: &Value) -> Result<serde_json::Value, SerializeError> {
    let mismatch = |found: &'static str| SerializeError::KindMismatch {
        field: field.to_string(),
        expected: "json",
        found,
    };

    match value {
        Value::Null => Ok(serde_json::Value::Null),
        Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
        Value::Int(i) => Ok(serde_json::Value::Number((*i).into())),
        Value::Float(f) => {
            if !f.is_finite() {
                return Err(SerializeError::NonFiniteFloat {
                    field: field.to_string(),
                });
            }
            serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| mismatch("float"))
        }
        Value::Text(s) => Ok(serde_json::Value::String(s.clone())),
        Value::List(xs) => xs
            .iter()
            .map(|x| value_to_json(field, x))
            .collect::<Result<Vec<_>, _>>()
            .map(serde_json::Value::Array),
        Value::Map(m) => {
            let mut out = serde_json::Map::with_capacity(m.len());
            for (k, v) in m {
                out.insert(k.clone(), value_to_json(field, v)?);
            }
            Ok(serde_json::Value::Object(out))
        }
        Value::Date(_) => Err(mismatch("date")),
        Value::Tuple(_) => Err(mismatch("tuple")),
        Value::Record(_) => Err(mismatch("record")),
    }
}

/// Bridge back from `serde_json::Value`. Whole numbers come back as `Int`,
/// everything else fractional as `Float`.
pub(crate) fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => n
            .as_i64()
            .map_or_else(|| Value::Float(n.as_f64().unwrap_or(0.0)), Value::Int),
        serde_json::Value::String(s) => Value::Text(s.clone()),
        serde_json::Value::Array(xs) => Value::List(xs.iter().map(json_to_value).collect()),
        serde_json::Value::Object(m) => Value::Map(
            m.iter()
                .map(|(k, v)| (k.clone(), json_to_value(v)))
                .collect::<BTreeMap<_, _>>(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(kind: ScalarKind, value: Value) {
        let text = encode_scalar("f", kind, &value).expect("encode should succeed");
        let back = decode_scalar("f", kind, &text).expect("decode should succeed");
        assert_eq!(back, value, "round-trip must be exact for {kind:?}");
    }

    #[test]
    fn text_is_stored_raw() {
        let text = encode_scalar("f", ScalarKind::Text, &Value::Text("true".to_string()))
            .expect("encode text");
        assert_eq!(text, "true", "text is never quoted or escaped");
        roundtrip(ScalarKind::Text, Value::Text("Jane Austen".to_string()));
    }

    #[test]
    fn scalar_forms_round_trip_exactly() {
        roundtrip(ScalarKind::Bool, Value::Bool(false));
        roundtrip(ScalarKind::Int, Value::Int(-42));
        roundtrip(ScalarKind::Float, Value::Float(3.4));
        roundtrip(
            ScalarKind::Date,
            Value::Date(NaiveDate::from_ymd_opt(1600, 4, 4).expect("valid date")),
        );
        roundtrip(
            ScalarKind::Json,
            Value::List(vec![
                Value::Text("Classic".to_string()),
                Value::Text("Romance".to_string()),
            ]),
        );
    }

    #[test]
    fn int_promotes_into_float_slots() {
        let text = encode_scalar("f", ScalarKind::Float, &Value::Int(2)).expect("encode");
        let back = decode_scalar("f", ScalarKind::Float, &text).expect("decode");
        assert_eq!(back, Value::Float(2.0));
    }

    #[test]
    fn kind_mismatch_is_an_error() {
        let err = encode_scalar("f", ScalarKind::Int, &Value::Text("7".to_string()))
            .expect_err("text into int slot should fail");
        assert!(matches!(err, SerializeError::KindMismatch { .. }));
    }

    #[test]
    fn non_finite_floats_are_rejected() {
        let err = encode_scalar("f", ScalarKind::Float, &Value::Float(f64::NAN))
            .expect_err("NaN should not encode");
        assert!(matches!(err, SerializeError::NonFiniteFloat { .. }));
    }

    #[test]
    fn corrupt_stored_text_fails_decode() {
        let err =
            decode_scalar("f", ScalarKind::Int, "not-a-number").expect_err("decode should fail");
        assert!(matches!(err, SerializeError::Decode { .. }));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn int_forms_round_trip(i in any::<i64>()) {
                let text = encode_scalar("f", ScalarKind::Int, &Value::Int(i))
                    .expect("int should encode");
                let back = decode_scalar("f", ScalarKind::Int, &text)
                    .expect("int should decode");
                prop_assert_eq!(back, Value::Int(i));
            }

            #[test]
            fn text_forms_round_trip(s in ".*") {
                let text = encode_scalar("f", ScalarKind::Text, &Value::Text(s.clone()))
                    .expect("text should encode");
                let back = decode_scalar("f", ScalarKind::Text, &text)
                    .expect("text should decode");
                prop_assert_eq!(back, Value::Text(s));
            }

            #[test]
            fn finite_float_forms_round_trip(
                f in any::<f64>().prop_filter("finite", |f| f.is_finite())
            ) {
                let text = encode_scalar("f", ScalarKind::Float, &Value::Float(f))
                    .expect("finite float should encode");
                let back = decode_scalar("f", ScalarKind::Float, &text)
                    .expect("float should decode");
                prop_assert_eq!(back, Value::Float(f), "shortest form must round-trip");
            }
        }
    }

    #[test]
    fn json_kind_rejects_records() {
        let record = Value::Record(crate::record::Record::new().with("a", 1i64));
        let err =
            encode_scalar("f", ScalarKind::Json, &record).expect_err("record in json slot");
        assert!(matches!(
            err,
            SerializeError::KindMismatch { found: "record", .. }
        ));
    }
}
