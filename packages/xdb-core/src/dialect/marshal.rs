//! Canonical value <-> storage value translation shared by the dialects.

use chrono::{DateTime, DurationRound, SecondsFormat, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use xdb_types::{DataType, FieldProperties, FieldSize, Value};

use super::Dialect;
use crate::driver::SqlValue;
use crate::error::DbError;

pub(crate) fn encode<D: Dialect + ?Sized>(
    dialect: &D,
    field: &FieldProperties,
    value: Value,
) -> Result<SqlValue, DbError> {
    let encoding = dialect.encoding();
    let value = field.check_value(value)?;
    let nan = || {
        DbError::invalid_argument(format!(
            "field '{}': {} stores NaN as NULL",
            field.name,
            dialect.name()
        ))
    };
    let encoded = match value {
        Value::Null => SqlValue::Null,
        Value::Single(v) if v.is_nan() && !encoding.stores_nan => return Err(nan()),
        Value::Double(v) if v.is_nan() && !encoding.stores_nan => return Err(nan()),
        Value::Bool(v) if encoding.native_bool => SqlValue::Bool(v),
        Value::Bool(v) => SqlValue::Integer(v as i64),
        Value::UInt64(v) if encoding.numeric_unsigned_64 => SqlValue::Decimal(Decimal::from(v)),
        // Stored as the same 64 bits; the engine sees values above i64::MAX as negative.
        Value::UInt64(v) => SqlValue::Integer(v as i64),
        Value::Single(v) => SqlValue::Real(v as f64),
        Value::Double(v) => SqlValue::Real(v),
        Value::Decimal(d) => {
            let d = fit_decimal(field, d)?;
            if encoding.native_decimal {
                SqlValue::Decimal(d)
            } else {
                SqlValue::Real(d.to_f64().ok_or_else(|| {
                    DbError::invalid_argument(format!("{} does not fit a double", d))
                })?)
            }
        }
        Value::String(s) | Value::User(s) => SqlValue::Text(s),
        Value::Char(c) => SqlValue::Text(c.to_string()),
        Value::Binary(b) => SqlValue::Blob(b),
        Value::DateTime(t) => {
            let t = truncate_date_time(t, dialect.date_time_precision())?;
            if encoding.native_timestamp {
                SqlValue::Timestamp(t)
            } else {
                SqlValue::Text(t.to_rfc3339_opts(SecondsFormat::Micros, true))
            }
        }
        Value::TimeSpan(d) => {
            let micros = d.num_microseconds().ok_or_else(|| {
                DbError::invalid_argument(format!("time span of field '{}' overflows", field.name))
            })?;
            let step = dialect
                .time_span_precision()
                .num_microseconds()
                .unwrap_or(1)
                .max(1);
            SqlValue::Integer(micros - micros % step)
        }
        other => match other.as_i64() {
            Some(v) => SqlValue::Integer(v),
            None => {
                return Err(DbError::invalid_argument(format!(
                    "value {} cannot be stored in field '{}'",
                    other, field.name
                )))
            }
        },
    };
    Ok(encoded)
}

pub(crate) fn decode<D: Dialect + ?Sized>(
    dialect: &D,
    field: &FieldProperties,
    value: SqlValue,
) -> Result<Value, DbError> {
    let unreadable = |value: &SqlValue| {
        DbError::schema_mismatch(format!(
            "field '{}' of type {} cannot hold stored value {:?}",
            field.name, field.data_type, value
        ))
    };
    let ty = field.data_type;
    let decoded = match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(v) if ty == DataType::UInt64 && !dialect.encoding().numeric_unsigned_64 => {
            Value::UInt64(v as u64)
        }
        ref v @ (SqlValue::Integer(_) | SqlValue::Bool(_)) if ty == DataType::Bool => {
            Value::Bool(v.as_bool().ok_or_else(|| unreadable(v))?)
        }
        SqlValue::Integer(v) if ty.integer_range().is_some() => coerce(Value::Int64(v), ty)?,
        SqlValue::Decimal(d) if ty.integer_range().is_some() => coerce(Value::Decimal(d), ty)?,
        SqlValue::Integer(v) if ty == DataType::TimeSpan => {
            Value::TimeSpan(chrono::Duration::microseconds(v))
        }
        SqlValue::Integer(v) if ty == DataType::Single => Value::Single(v as f32),
        SqlValue::Integer(v) if ty == DataType::Double => Value::Double(v as f64),
        SqlValue::Integer(v) if ty == DataType::Decimal => Value::Decimal(Decimal::from(v)),
        SqlValue::Real(v) if ty == DataType::Single => Value::Single(v as f32),
        SqlValue::Real(v) if ty == DataType::Double => Value::Double(v),
        SqlValue::Real(v) if ty == DataType::Decimal => Value::Decimal(real_to_decimal(dialect, field, v)?),
        SqlValue::Decimal(d) if ty == DataType::Decimal => Value::Decimal(d),
        ref v @ SqlValue::Decimal(d) if ty == DataType::Double => {
            Value::Double(d.to_f64().ok_or_else(|| unreadable(v))?)
        }
        ref v @ SqlValue::Text(ref s) if ty == DataType::Decimal => {
            Value::Decimal(s.parse::<Decimal>().map_err(|_| unreadable(v))?)
        }
        SqlValue::Text(s) if ty == DataType::String => Value::String(s),
        SqlValue::Text(s) if ty == DataType::User => Value::User(s),
        SqlValue::Text(s) if ty == DataType::Char => coerce(Value::String(s), ty)?,
        SqlValue::Text(s) if ty == DataType::Binary => Value::Binary(s.into_bytes()),
        SqlValue::Blob(b) if ty == DataType::Binary => Value::Binary(b),
        SqlValue::Timestamp(t) if ty == DataType::DateTime => Value::DateTime(t),
        ref v @ SqlValue::Text(ref s) if ty == DataType::DateTime => Value::DateTime(
            DateTime::parse_from_rfc3339(s)
                .map_err(|_| unreadable(v))?
                .with_timezone(&Utc),
        ),
        other => return Err(unreadable(&other)),
    };
    Ok(decoded)
}

fn coerce(value: Value, ty: DataType) -> Result<Value, DbError> {
    value
        .coerce(ty)
        .map_err(|e| DbError::schema_mismatch(format!("stored value does not fit: {}", e)))
}

/// Rounds to the declared scale and rejects values with too many integer digits.
fn fit_decimal(field: &FieldProperties, value: Decimal) -> Result<Decimal, DbError> {
    let FieldSize::Precision { precision, scale } = field.size else {
        return Ok(value);
    };
    let rounded = value.round_dp(scale as u32);
    let integer_digits = integer_digits(rounded);
    if integer_digits > (precision - scale) as usize {
        return Err(DbError::invalid_argument(format!(
            "{} exceeds precision {}.{} of field '{}'",
            value, precision, scale, field.name
        )));
    }
    Ok(rounded)
}

fn integer_digits(value: Decimal) -> usize {
    let text = value.trunc().abs().to_string();
    let integer = text.split('.').next().unwrap_or_default();
    integer.trim_start_matches('0').len()
}

/// Reads a decimal stored as a double, clamping to the decimal range and
/// dropping the digits the double cannot carry.
fn real_to_decimal<D: Dialect + ?Sized>(
    dialect: &D,
    field: &FieldProperties,
    v: f64,
) -> Result<Decimal, DbError> {
    if v.is_nan() {
        return Err(DbError::schema_mismatch(format!(
            "field '{}' holds NaN, which is not a decimal",
            field.name
        )));
    }
    if v >= Decimal::MAX.to_f64().unwrap_or(f64::MAX) {
        return Ok(Decimal::MAX);
    }
    if v <= Decimal::MIN.to_f64().unwrap_or(f64::MIN) {
        return Ok(Decimal::MIN);
    }
    let d = Decimal::from_f64(v).ok_or_else(|| {
        DbError::schema_mismatch(format!("field '{}' holds {} which is not a decimal", field.name, v))
    })?;
    let d = d.round_sf(dialect.float_precision()).unwrap_or(d);
    Ok(match field.size {
        FieldSize::Precision { scale, .. } => d.round_dp(scale as u32),
        _ => d,
    })
}

fn truncate_date_time(
    t: DateTime<Utc>,
    precision: chrono::Duration,
) -> Result<DateTime<Utc>, DbError> {
    t.duration_trunc(precision)
        .map_err(|e| DbError::invalid_argument(format!("cannot truncate {}: {}", t, e)))
}
