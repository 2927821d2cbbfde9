use crate::error::{ConnectorError, ConnectorResult};
use serde_json::{Number, Value};
use sqlx::postgres::{PgRow, PgTypeInfo};
use sqlx::{Column, Row, TypeInfo, ValueRef};

/// Column names of `row`, in order.
pub fn column_names(row: &PgRow) -> Vec<String> {
    row.columns()
        .iter()
        .map(|column| column.name().to_string())
        .collect()
}

/// Converts one row into JSON values, one per column.
pub fn convert_row(row: &PgRow) -> ConnectorResult<Vec<Value>> {
    row.columns()
        .iter()
        .map(|column| extract_column(row, column.ordinal(), column.type_info()))
        .collect()
}

fn extract_column(row: &PgRow, idx: usize, type_info: &PgTypeInfo) -> ConnectorResult<Value> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let value = match type_info.name().to_ascii_uppercase().as_str() {
        "BOOL" => Value::Bool(row.try_get::<bool, _>(idx)?),
        "INT2" => Value::from(row.try_get::<i16, _>(idx)?),
        "INT4" => Value::from(row.try_get::<i32, _>(idx)?),
        "INT8" => Value::from(row.try_get::<i64, _>(idx)?),
        "FLOAT4" => float(row.try_get::<f32, _>(idx)? as f64)?,
        "FLOAT8" => float(row.try_get::<f64, _>(idx)?)?,
        "TIMESTAMP" => {
            let ts = row.try_get::<chrono::NaiveDateTime, _>(idx)?;
            Value::String(ts.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        }
        "TIMESTAMPTZ" => {
            let ts = row.try_get::<chrono::DateTime<chrono::Utc>, _>(idx)?;
            Value::String(ts.to_rfc3339())
        }
        "DATE" => Value::String(row.try_get::<chrono::NaiveDate, _>(idx)?.to_string()),
        "JSON" | "JSONB" => row.try_get::<Value, _>(idx)?,
        "BYTEA" => Value::String(hex(&row.try_get::<Vec<u8>, _>(idx)?)),
        // NUMERIC, UUID, TIME and anything unknown keep their text form.
        _ => match row.try_get_unchecked::<String, _>(idx) {
            Ok(text) => Value::String(text),
            Err(_) => Value::String(hex(&row.try_get_unchecked::<Vec<u8>, _>(idx)?)),
        },
    };

    Ok(value)
}

fn float(value: f64) -> ConnectorResult<Value> {
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| ConnectorError::InvalidRequest(format!("non-finite float {value}")))
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_matches_server_bytea_output() {
        assert_eq!(hex(&[0xde, 0xad, 0x01]), "\\xdead01");
        assert_eq!(hex(&[]), "\\x");
    }

    #[test]
    fn test_non_finite_float_rejected() {
        assert!(float(f64::NAN).is_err());
        assert_eq!(float(1.5).unwrap(), Value::from(1.5));
    }
}
