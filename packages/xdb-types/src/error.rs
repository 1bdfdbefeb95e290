//! Layout and value validation errors.

use thiserror::Error;

use crate::types::DataType;

/// Error type for field, layout and row validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// Name is empty
    #[error("{what} name must not be empty")]
    EmptyName { what: &'static str },

    /// Name contains characters outside `[A-Za-z0-9_]` or starts with a digit
    #[error("{what} name '{name}' contains invalid characters")]
    InvalidName { what: &'static str, name: String },

    /// Name exceeds the maximum identifier length
    #[error("{what} name '{name}' exceeds {max} characters")]
    NameTooLong {
        what: &'static str,
        name: String,
        max: usize,
    },

    /// Field name appears twice in one layout
    #[error("Field '{field}' already exists in layout '{layout}'")]
    DuplicateField { layout: String, field: String },

    /// Field index differs from its position
    #[error("Field '{field}' has index {index} but sits at position {position}")]
    IndexMismatch {
        field: String,
        index: usize,
        position: usize,
    },

    /// Layout has no fields
    #[error("Layout '{0}' has no fields")]
    EmptyLayout(String),

    /// Description is not printable ASCII or too long
    #[error("Description of field '{field}' is invalid: {reason}")]
    InvalidDescription { field: String, reason: String },

    /// Decimal precision/scale or string length out of range
    #[error("Invalid size for field '{field}': {reason}")]
    InvalidSize { field: String, reason: String },

    /// Unknown type name
    #[error("Unknown data type '{0}'")]
    UnknownType(String),

    /// Row arity differs from the layout
    #[error("Row has {got} values but layout '{layout}' has {expected} fields")]
    FieldCountMismatch {
        layout: String,
        expected: usize,
        got: usize,
    },

    /// Value cannot be assigned to the field type
    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: DataType, got: String },

    /// Value does not fit the range of the field type
    #[error("Value {value} is out of range for {ty}")]
    OutOfRange { ty: DataType, value: String },

    /// Null supplied for a non-nullable field
    #[error("Field '{field}' is not nullable")]
    NullNotAllowed { field: String },

    /// String longer than the field's maximum length
    #[error("Value for field '{field}' has {length} characters, maximum is {max}")]
    TooLong {
        field: String,
        length: usize,
        max: u32,
    },

    /// Field lookup failed
    #[error("Field '{field}' not found in layout '{layout}'")]
    FieldNotFound { layout: String, field: String },
}
