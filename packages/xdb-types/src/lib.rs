//! Engine-neutral data model for the cross-dialect storage layer.
//!
//! This crate defines canonical data types and values, field descriptors,
//! row layouts and rows. It performs no I/O.

pub mod error;
pub mod field;
pub mod layout;
pub mod types;

pub use error::LayoutError;
pub use field::{
    validate_name, FieldBuilder, FieldFlags, FieldProperties, FieldSize, MAX_DESCRIPTION_LENGTH,
    MAX_NAME_LENGTH,
};
pub use layout::{LayoutMismatch, Row, RowLayout, RowLayoutBuilder};
pub use types::{DataType, Value};

pub use chrono;
pub use rust_decimal;
