//! Canonical data types and values.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LayoutError;

/// Engine-neutral value kinds.
///
/// Every value handled at the application layer is tagged with exactly one
/// of these. Dialect adapters translate them to a database type of their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// Boolean value
    Bool,
    /// 8-bit signed integer
    Int8,
    /// 16-bit signed integer
    Int16,
    /// 32-bit signed integer
    Int32,
    /// 64-bit signed integer
    Int64,
    /// 8-bit unsigned integer
    UInt8,
    /// 16-bit unsigned integer
    UInt16,
    /// 32-bit unsigned integer
    UInt32,
    /// 64-bit unsigned integer
    UInt64,
    /// 32-bit floating point number
    Single,
    /// 64-bit floating point number
    Double,
    /// Fixed point decimal number
    Decimal,
    /// UTF-8 string
    String,
    /// Single character
    Char,
    /// Raw bytes
    Binary,
    /// Point in time (UTC)
    DateTime,
    /// Signed duration
    TimeSpan,
    /// Enumeration stored by its integer discriminant
    Enum,
    /// User defined type stored by its string representation
    User,
}

impl DataType {
    /// All canonical types in declaration order.
    pub const ALL: [DataType; 19] = [
        DataType::Bool,
        DataType::Int8,
        DataType::Int16,
        DataType::Int32,
        DataType::Int64,
        DataType::UInt8,
        DataType::UInt16,
        DataType::UInt32,
        DataType::UInt64,
        DataType::Single,
        DataType::Double,
        DataType::Decimal,
        DataType::String,
        DataType::Char,
        DataType::Binary,
        DataType::DateTime,
        DataType::TimeSpan,
        DataType::Enum,
        DataType::User,
    ];

    /// Returns `true` for the signed integer types.
    pub fn is_signed_integer(&self) -> bool {
        matches!(
            self,
            DataType::Int8 | DataType::Int16 | DataType::Int32 | DataType::Int64
        )
    }

    /// Returns `true` for the unsigned integer types.
    pub fn is_unsigned_integer(&self) -> bool {
        matches!(
            self,
            DataType::UInt8 | DataType::UInt16 | DataType::UInt32 | DataType::UInt64
        )
    }

    /// Returns `true` if this type is an integer type.
    pub fn is_integer(&self) -> bool {
        self.is_signed_integer() || self.is_unsigned_integer()
    }

    /// Returns `true` if this type is a floating point type.
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Single | DataType::Double)
    }

    /// Returns `true` if this type is numeric (integer, float or decimal).
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float() || *self == DataType::Decimal
    }

    /// Returns `true` for types that accept a maximum length.
    pub fn is_text(&self) -> bool {
        matches!(self, DataType::String | DataType::User)
    }

    /// Inclusive value range of the integer types.
    pub fn integer_range(&self) -> Option<(i128, i128)> {
        let range = match self {
            DataType::Int8 => (i8::MIN as i128, i8::MAX as i128),
            DataType::Int16 => (i16::MIN as i128, i16::MAX as i128),
            DataType::Int32 => (i32::MIN as i128, i32::MAX as i128),
            DataType::Int64 | DataType::Enum => (i64::MIN as i128, i64::MAX as i128),
            DataType::UInt8 => (0, u8::MAX as i128),
            DataType::UInt16 => (0, u16::MAX as i128),
            DataType::UInt32 => (0, u32::MAX as i128),
            DataType::UInt64 => (0, u64::MAX as i128),
            _ => return None,
        };
        Some(range)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Bool => "bool",
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::UInt8 => "uint8",
            DataType::UInt16 => "uint16",
            DataType::UInt32 => "uint32",
            DataType::UInt64 => "uint64",
            DataType::Single => "single",
            DataType::Double => "double",
            DataType::Decimal => "decimal",
            DataType::String => "string",
            DataType::Char => "char",
            DataType::Binary => "binary",
            DataType::DateTime => "datetime",
            DataType::TimeSpan => "timespan",
            DataType::Enum => "enum",
            DataType::User => "user",
        };
        f.write_str(name)
    }
}

impl FromStr for DataType {
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .iter()
            .copied()
            .find(|ty| ty.to_string().eq_ignore_ascii_case(s))
            .ok_or_else(|| LayoutError::UnknownType(s.to_string()))
    }
}

/// A single canonical value.
///
/// `Null` is the only untyped value; every other variant maps to exactly one
/// [`DataType`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    Single(f32),
    Double(f64),
    Decimal(Decimal),
    String(String),
    Char(char),
    Binary(Vec<u8>),
    DateTime(DateTime<Utc>),
    TimeSpan(Duration),
    Enum(i64),
    User(String),
}

impl Value {
    /// Returns the type of this value, `None` for `Null`.
    pub fn data_type(&self) -> Option<DataType> {
        let ty = match self {
            Value::Null => return None,
            Value::Bool(_) => DataType::Bool,
            Value::Int8(_) => DataType::Int8,
            Value::Int16(_) => DataType::Int16,
            Value::Int32(_) => DataType::Int32,
            Value::Int64(_) => DataType::Int64,
            Value::UInt8(_) => DataType::UInt8,
            Value::UInt16(_) => DataType::UInt16,
            Value::UInt32(_) => DataType::UInt32,
            Value::UInt64(_) => DataType::UInt64,
            Value::Single(_) => DataType::Single,
            Value::Double(_) => DataType::Double,
            Value::Decimal(_) => DataType::Decimal,
            Value::String(_) => DataType::String,
            Value::Char(_) => DataType::Char,
            Value::Binary(_) => DataType::Binary,
            Value::DateTime(_) => DataType::DateTime,
            Value::TimeSpan(_) => DataType::TimeSpan,
            Value::Enum(_) => DataType::Enum,
            Value::User(_) => DataType::User,
        };
        Some(ty)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view of integer-like values (integers, enums and integral decimals).
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Int8(v) => Some(*v as i128),
            Value::Int16(v) => Some(*v as i128),
            Value::Int32(v) => Some(*v as i128),
            Value::Int64(v) | Value::Enum(v) => Some(*v as i128),
            Value::UInt8(v) => Some(*v as i128),
            Value::UInt16(v) => Some(*v as i128),
            Value::UInt32(v) => Some(*v as i128),
            Value::UInt64(v) => Some(*v as i128),
            Value::Decimal(d) if d.fract().is_zero() => d.to_i128(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_i128().and_then(|v| i64::try_from(v).ok())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Single(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::Decimal(d) => d.to_f64(),
            other => other.as_i128().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::User(s) => Some(s),
            _ => None,
        }
    }

    /// Converts this value into the representation of `ty`.
    ///
    /// Integers convert between widths when the value fits the target range,
    /// so `Int64(-1)` is rejected for `UInt32` while `Int64(7)` becomes
    /// `UInt32(7)`. `Null` passes through unchanged.
    pub fn coerce(self, ty: DataType) -> Result<Value, LayoutError> {
        if self.data_type() == Some(ty) || self.is_null() {
            return Ok(self);
        }
        let mismatch = |value: &Value| LayoutError::TypeMismatch {
            expected: ty,
            got: value.data_type().map(|t| t.to_string()).unwrap_or_default(),
        };
        if let Some((min, max)) = ty.integer_range() {
            let v = self.as_i128().ok_or_else(|| mismatch(&self))?;
            if v < min || v > max {
                return Err(LayoutError::OutOfRange {
                    ty,
                    value: v.to_string(),
                });
            }
            // Range checked above, the casts are exact.
            return Ok(match ty {
                DataType::Int8 => Value::Int8(v as i8),
                DataType::Int16 => Value::Int16(v as i16),
                DataType::Int32 => Value::Int32(v as i32),
                DataType::Int64 => Value::Int64(v as i64),
                DataType::UInt8 => Value::UInt8(v as u8),
                DataType::UInt16 => Value::UInt16(v as u16),
                DataType::UInt32 => Value::UInt32(v as u32),
                DataType::UInt64 => Value::UInt64(v as u64),
                _ => Value::Enum(v as i64),
            });
        }
        match (ty, self) {
            (DataType::Double, value) => value
                .as_f64()
                .map(Value::Double)
                .ok_or_else(|| mismatch(&value)),
            (DataType::Single, value) => match value.as_f64() {
                Some(v) if !v.is_finite() || v.abs() <= f32::MAX as f64 => {
                    Ok(Value::Single(v as f32))
                }
                Some(v) => Err(LayoutError::OutOfRange {
                    ty,
                    value: v.to_string(),
                }),
                None => Err(mismatch(&value)),
            },
            (DataType::Decimal, value) => {
                if let Some(v) = value.as_i128() {
                    return Decimal::try_from_i128_with_scale(v, 0).map(Value::Decimal).map_err(
                        |_| LayoutError::OutOfRange {
                            ty,
                            value: v.to_string(),
                        },
                    );
                }
                match value.as_f64() {
                    Some(v) => Decimal::try_from(v)
                        .map(Value::Decimal)
                        .map_err(|_| LayoutError::OutOfRange {
                            ty,
                            value: v.to_string(),
                        }),
                    None => Err(mismatch(&value)),
                }
            }
            (DataType::String, Value::Char(c)) => Ok(Value::String(c.to_string())),
            (DataType::String, Value::User(s)) => Ok(Value::String(s)),
            (DataType::User, Value::String(s)) => Ok(Value::User(s)),
            (DataType::Char, Value::String(s)) => {
                let mut chars = s.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(Value::Char(c)),
                    _ => Err(LayoutError::OutOfRange {
                        ty,
                        value: s.clone(),
                    }),
                }
            }
            (_, value) => Err(mismatch(&value)),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int8(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) | Value::Enum(v) => write!(f, "{}", v),
            Value::UInt8(v) => write!(f, "{}", v),
            Value::UInt16(v) => write!(f, "{}", v),
            Value::UInt32(v) => write!(f, "{}", v),
            Value::UInt64(v) => write!(f, "{}", v),
            Value::Single(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::String(v) | Value::User(v) => f.write_str(v),
            Value::Char(v) => write!(f, "{}", v),
            Value::Binary(v) => write!(f, "<{} bytes>", v.len()),
            Value::DateTime(v) => write!(f, "{}", v.to_rfc3339()),
            Value::TimeSpan(v) => write!(f, "{}", v),
        }
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

impl_from_value! {
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    f32 => Single,
    f64 => Double,
    Decimal => Decimal,
    String => String,
    char => Char,
    Vec<u8> => Binary,
    DateTime<Utc> => DateTime,
    Duration => TimeSpan,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}
