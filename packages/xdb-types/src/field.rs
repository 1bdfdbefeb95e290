//! Field descriptors and flags.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::LayoutError;
use crate::types::{DataType, Value};

/// Maximum identifier length accepted for names (PostgreSQL NAMEDATALEN - 1).
pub const MAX_NAME_LENGTH: usize = 63;

/// Maximum description length in characters.
pub const MAX_DESCRIPTION_LENGTH: usize = 255;

bitflags::bitflags! {
    /// Column flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct FieldFlags: u8 {
        /// Part of the row identifier (primary key)
        const IDENTIFIER = 1;
        /// Value generated by the engine on insert
        const AUTO_INCREMENT = 1 << 1;
        /// Unique constraint
        const UNIQUE = 1 << 2;
        /// Secondary index
        const INDEXED = 1 << 3;
        /// Accepts null
        const NULLABLE = 1 << 4;
    }
}

impl FieldFlags {
    pub const NONE: FieldFlags = FieldFlags::empty();
    /// Every defined flag.
    pub const ALL: FieldFlags = FieldFlags::all();

    const NAMES: [(FieldFlags, &'static str); 5] = [
        (FieldFlags::IDENTIFIER, "Identifier"),
        (FieldFlags::AUTO_INCREMENT, "AutoIncrement"),
        (FieldFlags::UNIQUE, "Unique"),
        (FieldFlags::INDEXED, "Indexed"),
        (FieldFlags::NULLABLE, "Nullable"),
    ];
}

impl fmt::Display for FieldFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("None");
        }
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&names.join(" | "))
    }
}

/// Size specification of a field.
///
/// Strings carry a maximum length, decimals a precision and scale. The
/// textual form `"precision.scale"` is accepted for decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FieldSize {
    #[default]
    Unbounded,
    Length(u32),
    Precision { precision: u8, scale: u8 },
}

impl FieldSize {
    /// Parses a size for `ty`: a length for text, `"p.s"` or `"p"` for decimals.
    pub fn parse(field: &str, ty: DataType, spec: &str) -> Result<FieldSize, LayoutError> {
        let invalid = |reason: String| LayoutError::InvalidSize {
            field: field.to_string(),
            reason,
        };
        let spec = spec.trim();
        if spec.is_empty() || spec == "0" {
            return Ok(FieldSize::Unbounded);
        }
        match ty {
            DataType::Decimal => {
                let (p, s) = spec.split_once('.').unwrap_or((spec, "0"));
                let precision = p
                    .parse::<u8>()
                    .map_err(|_| invalid(format!("bad precision '{}'", p)))?;
                let scale = s
                    .parse::<u8>()
                    .map_err(|_| invalid(format!("bad scale '{}'", s)))?;
                let size = FieldSize::Precision { precision, scale };
                size.validate(field, ty)?;
                Ok(size)
            }
            ty if ty.is_text() => spec
                .parse::<u32>()
                .map(FieldSize::Length)
                .map_err(|_| invalid(format!("bad length '{}'", spec))),
            _ => Err(invalid(format!("{} does not take a size", ty))),
        }
    }

    /// Checks the size is meaningful for `ty`.
    pub fn validate(&self, field: &str, ty: DataType) -> Result<(), LayoutError> {
        let invalid = |reason: String| LayoutError::InvalidSize {
            field: field.to_string(),
            reason,
        };
        match *self {
            FieldSize::Unbounded => Ok(()),
            FieldSize::Length(0) => Err(invalid("length must be positive".to_string())),
            FieldSize::Length(_) if ty.is_text() || ty == DataType::Binary => Ok(()),
            FieldSize::Precision { precision, scale } if ty == DataType::Decimal => {
                if precision == 0 {
                    Err(invalid("precision must be positive".to_string()))
                } else if scale > precision {
                    Err(invalid(format!(
                        "scale {} exceeds precision {}",
                        scale, precision
                    )))
                } else {
                    Ok(())
                }
            }
            _ => Err(invalid(format!("{:?} does not apply to {}", self, ty))),
        }
    }

    pub fn max_length(&self) -> Option<u32> {
        match self {
            FieldSize::Length(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for FieldSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldSize::Unbounded => f.write_str("0"),
            FieldSize::Length(n) => write!(f, "{}", n),
            FieldSize::Precision { precision, scale } => write!(f, "{}.{}", precision, scale),
        }
    }
}

/// Describes one column of a row layout.
///
/// `data_type` is the canonical type used by the application;
/// `type_at_database` is what a dialect adapter stores it as. Freshly built
/// fields carry the same type in both until a dialect maps them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldProperties {
    /// Ordinal position within the layout
    pub index: usize,
    /// Logical name
    pub name: String,
    /// Column name at the database
    pub name_at_database: String,
    /// Canonical type
    pub data_type: DataType,
    /// Storage type chosen by the dialect
    pub type_at_database: DataType,
    pub flags: FieldFlags,
    #[serde(default)]
    pub size: FieldSize,
    #[serde(default)]
    pub description: Option<String>,
}

impl FieldProperties {
    pub fn is_identifier(&self) -> bool {
        self.flags.contains(FieldFlags::IDENTIFIER)
    }

    pub fn is_auto_increment(&self) -> bool {
        self.flags.contains(FieldFlags::AUTO_INCREMENT)
    }

    pub fn is_unique(&self) -> bool {
        self.flags.contains(FieldFlags::UNIQUE)
    }

    pub fn is_indexed(&self) -> bool {
        self.flags.contains(FieldFlags::INDEXED)
    }

    pub fn is_nullable(&self) -> bool {
        self.flags.contains(FieldFlags::NULLABLE)
    }

    pub fn max_length(&self) -> Option<u32> {
        self.size.max_length()
    }

    /// Validates and coerces a value for this field.
    ///
    /// Checks nullability, converts integers between widths with range
    /// checks and enforces the maximum string length. Auto increment
    /// identifiers accept `Null` so the engine can generate the value.
    pub fn check_value(&self, value: Value) -> Result<Value, LayoutError> {
        if value.is_null() {
            if self.is_nullable() || self.is_auto_increment() {
                return Ok(Value::Null);
            }
            return Err(LayoutError::NullNotAllowed {
                field: self.name.clone(),
            });
        }
        let value = value.coerce(self.data_type)?;
        if let (Some(max), Some(text)) = (self.max_length(), value.as_str()) {
            let length = text.chars().count();
            if length > max as usize {
                return Err(LayoutError::TooLong {
                    field: self.name.clone(),
                    length,
                    max,
                });
            }
        }
        Ok(value)
    }

    /// Validates name, size and description.
    pub fn validate(&self) -> Result<(), LayoutError> {
        validate_name("Field", &self.name)?;
        validate_name("Field", &self.name_at_database)?;
        self.size.validate(&self.name, self.data_type)?;
        if let Some(description) = &self.description {
            validate_description(&self.name, description)?;
        }
        Ok(())
    }
}

/// Checks that `name` is a plain SQL identifier: ASCII letters, digits and
/// underscores, not starting with a digit, at most [`MAX_NAME_LENGTH`] long.
pub fn validate_name(what: &'static str, name: &str) -> Result<(), LayoutError> {
    if name.is_empty() {
        return Err(LayoutError::EmptyName { what });
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(LayoutError::NameTooLong {
            what,
            name: name.to_string(),
            max: MAX_NAME_LENGTH,
        });
    }
    let starts_with_digit = name.as_bytes()[0].is_ascii_digit();
    if starts_with_digit || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
        return Err(LayoutError::InvalidName {
            what,
            name: name.to_string(),
        });
    }
    Ok(())
}

fn validate_description(field: &str, description: &str) -> Result<(), LayoutError> {
    let invalid = |reason: String| LayoutError::InvalidDescription {
        field: field.to_string(),
        reason,
    };
    if description.len() > MAX_DESCRIPTION_LENGTH {
        return Err(invalid(format!(
            "longer than {} characters",
            MAX_DESCRIPTION_LENGTH
        )));
    }
    if let Some(c) = description.chars().find(|c| !(' '..='~').contains(c)) {
        return Err(invalid(format!("character {:?} is not printable ascii", c)));
    }
    Ok(())
}

/// Builder for creating FieldProperties instances.
#[derive(Debug, Clone)]
pub struct FieldBuilder {
    name: String,
    name_at_database: Option<String>,
    data_type: DataType,
    flags: FieldFlags,
    size: FieldSize,
    description: Option<String>,
}

impl FieldBuilder {
    /// Creates a new field builder with the given name and type.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            name_at_database: None,
            data_type,
            flags: FieldFlags::NONE,
            size: FieldSize::Unbounded,
            description: None,
        }
    }

    #[must_use]
    pub fn flags(mut self, flags: FieldFlags) -> Self {
        self.flags |= flags;
        self
    }

    #[must_use]
    pub fn identifier(self) -> Self {
        self.flags(FieldFlags::IDENTIFIER)
    }

    #[must_use]
    pub fn auto_increment(self) -> Self {
        self.flags(FieldFlags::AUTO_INCREMENT)
    }

    #[must_use]
    pub fn unique(self) -> Self {
        self.flags(FieldFlags::UNIQUE)
    }

    #[must_use]
    pub fn indexed(self) -> Self {
        self.flags(FieldFlags::INDEXED)
    }

    #[must_use]
    pub fn nullable(self) -> Self {
        self.flags(FieldFlags::NULLABLE)
    }

    #[must_use]
    pub fn max_length(mut self, length: u32) -> Self {
        self.size = FieldSize::Length(length);
        self
    }

    #[must_use]
    pub fn precision(mut self, precision: u8, scale: u8) -> Self {
        self.size = FieldSize::Precision { precision, scale };
        self
    }

    #[must_use]
    pub fn size(mut self, size: FieldSize) -> Self {
        self.size = size;
        self
    }

    #[must_use]
    pub fn name_at_database(mut self, name: impl Into<String>) -> Self {
        self.name_at_database = Some(name.into());
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Builds the field at position `index`, validating names and sizes.
    pub fn build(self, index: usize) -> Result<FieldProperties, LayoutError> {
        let field = FieldProperties {
            index,
            name_at_database: self.name_at_database.unwrap_or_else(|| self.name.clone()),
            name: self.name,
            data_type: self.data_type,
            type_at_database: self.data_type,
            flags: self.flags,
            size: self.size,
            description: self.description,
        };
        field.validate()?;
        Ok(field)
    }
}
