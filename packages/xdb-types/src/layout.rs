//! Row layouts and rows.

use std::collections::HashSet;
use std::fmt;
use std::ops::Index;

use serde::{Deserialize, Serialize};

use crate::error::LayoutError;
use crate::field::{validate_name, FieldBuilder, FieldFlags, FieldProperties};
use crate::types::Value;

/// Ordered, named collection of fields: the schema contract of a table.
///
/// # Invariants
///
/// - `fields[i].index == i`
/// - logical names and database names are unique within the layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "UncheckedLayout")]
pub struct RowLayout {
    name: String,
    fields: Vec<FieldProperties>,
}

/// Deserialized form of a layout before validation.
#[derive(Deserialize)]
struct UncheckedLayout {
    name: String,
    fields: Vec<FieldProperties>,
}

impl TryFrom<UncheckedLayout> for RowLayout {
    type Error = LayoutError;

    fn try_from(unchecked: UncheckedLayout) -> Result<Self, LayoutError> {
        RowLayout::new(unchecked.name, unchecked.fields)
    }
}

/// First structural difference found between two layouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutMismatch {
    FieldCount { expected: usize, got: usize },
    Name { index: usize, expected: String, got: String },
    Type { field: String, expected: String, got: String },
    Flags { field: String, expected: FieldFlags, got: FieldFlags },
}

impl fmt::Display for LayoutMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutMismatch::FieldCount { expected, got } => {
                write!(f, "expected {} fields, found {}", expected, got)
            }
            LayoutMismatch::Name {
                index,
                expected,
                got,
            } => write!(
                f,
                "field {} is named '{}', expected '{}'",
                index, got, expected
            ),
            LayoutMismatch::Type {
                field,
                expected,
                got,
            } => write!(f, "field '{}' has type {}, expected {}", field, got, expected),
            LayoutMismatch::Flags {
                field,
                expected,
                got,
            } => write!(
                f,
                "field '{}' has flags [{}], expected [{}]",
                field, got, expected
            ),
        }
    }
}

impl RowLayout {
    /// Creates a layout from already built fields.
    ///
    /// Field indices are checked against their positions.
    pub fn new(name: impl Into<String>, fields: Vec<FieldProperties>) -> Result<Self, LayoutError> {
        let layout = Self {
            name: name.into(),
            fields,
        };
        layout.validate()?;
        Ok(layout)
    }

    /// Starts a builder for a layout called `name`.
    pub fn builder(name: impl Into<String>) -> RowLayoutBuilder {
        RowLayoutBuilder::new(name)
    }

    fn validate(&self) -> Result<(), LayoutError> {
        validate_name("Layout", &self.name)?;
        if self.fields.is_empty() {
            return Err(LayoutError::EmptyLayout(self.name.clone()));
        }
        let mut names = HashSet::new();
        let mut database_names = HashSet::new();
        for (position, field) in self.fields.iter().enumerate() {
            field.validate()?;
            if field.index != position {
                return Err(LayoutError::IndexMismatch {
                    field: field.name.clone(),
                    index: field.index,
                    position,
                });
            }
            if !names.insert(field.name.to_ascii_lowercase())
                || !database_names.insert(field.name_at_database.to_ascii_lowercase())
            {
                return Err(LayoutError::DuplicateField {
                    layout: self.name.clone(),
                    field: field.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldProperties] {
        &self.fields
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn field(&self, index: usize) -> Option<&FieldProperties> {
        self.fields.get(index)
    }

    /// Case-insensitive lookup by logical name.
    pub fn field_by_name(&self, name: &str) -> Option<&FieldProperties> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn index_of(&self, name: &str) -> Result<usize, LayoutError> {
        self.field_by_name(name)
            .map(|f| f.index)
            .ok_or_else(|| LayoutError::FieldNotFound {
                layout: self.name.clone(),
                field: name.to_string(),
            })
    }

    /// Fields flagged as identifier, in ordinal order.
    pub fn identifier_fields(&self) -> impl Iterator<Item = &FieldProperties> {
        self.fields.iter().filter(|f| f.is_identifier())
    }

    pub fn has_identifier(&self) -> bool {
        self.fields.iter().any(|f| f.is_identifier())
    }

    /// The identifier field generated by the engine, if any.
    pub fn auto_increment_identifier(&self) -> Option<&FieldProperties> {
        self.identifier_fields().find(|f| f.is_auto_increment())
    }

    /// Returns a copy of this layout with a different name.
    pub fn renamed(&self, name: impl Into<String>) -> Result<RowLayout, LayoutError> {
        RowLayout::new(name, self.fields.clone())
    }

    /// Applies `map` to every field, keeping the layout invariants.
    pub fn map_fields<F>(&self, mut map: F) -> Result<RowLayout, LayoutError>
    where
        F: FnMut(&FieldProperties) -> FieldProperties,
    {
        let fields = self.fields.iter().map(&mut map).collect();
        RowLayout::new(self.name.clone(), fields)
    }

    /// Structural compatibility: same field count and, per position, the same
    /// name, canonical type and flags.
    pub fn check_compatible(&self, other: &RowLayout) -> Result<(), LayoutMismatch> {
        self.compare(other, FieldFlags::ALL, |f| {
            (f.name.to_ascii_lowercase(), f.data_type.to_string())
        })
    }

    pub fn is_compatible(&self, other: &RowLayout) -> bool {
        self.check_compatible(other).is_ok()
    }

    /// Compatibility as seen by a database: compares database names, database
    /// types and only the flags in `flags` (the ones a dialect can read back).
    pub fn check_compatible_at_database(
        &self,
        live: &RowLayout,
        flags: FieldFlags,
    ) -> Result<(), LayoutMismatch> {
        self.compare(live, flags, |f| {
            (
                f.name_at_database.to_ascii_lowercase(),
                f.type_at_database.to_string(),
            )
        })
    }

    /// Compares canonical types per position. Fields the engine generates
    /// are skipped: their declared type only names the storage class.
    pub fn check_canonical_types(&self, live: &RowLayout) -> Result<(), LayoutMismatch> {
        for (expected, got) in self.fields.iter().zip(&live.fields) {
            if got.is_auto_increment() || expected.data_type == got.data_type {
                continue;
            }
            return Err(LayoutMismatch::Type {
                field: expected.name.clone(),
                expected: expected.data_type.to_string(),
                got: got.data_type.to_string(),
            });
        }
        Ok(())
    }

    fn compare<K>(&self, other: &RowLayout, mask: FieldFlags, key: K) -> Result<(), LayoutMismatch>
    where
        K: Fn(&FieldProperties) -> (String, String),
    {
        if self.fields.len() != other.fields.len() {
            return Err(LayoutMismatch::FieldCount {
                expected: self.fields.len(),
                got: other.fields.len(),
            });
        }
        for (index, (expected, got)) in self.fields.iter().zip(&other.fields).enumerate() {
            let (expected_name, expected_type) = key(expected);
            let (got_name, got_type) = key(got);
            if expected_name != got_name {
                return Err(LayoutMismatch::Name {
                    index,
                    expected: expected.name.clone(),
                    got: got.name.clone(),
                });
            }
            if expected_type != got_type {
                return Err(LayoutMismatch::Type {
                    field: expected.name.clone(),
                    expected: expected_type,
                    got: got_type,
                });
            }
            let expected_flags = expected.flags.intersection(mask);
            let got_flags = got.flags.intersection(mask);
            if expected_flags != got_flags {
                return Err(LayoutMismatch::Flags {
                    field: expected.name.clone(),
                    expected: expected_flags,
                    got: got_flags,
                });
            }
        }
        Ok(())
    }
}

/// Builder for layouts with automatic index assignment.
#[derive(Debug)]
pub struct RowLayoutBuilder {
    name: String,
    fields: Vec<FieldBuilder>,
}

impl RowLayoutBuilder {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Appends a field; its index is its position.
    #[must_use]
    pub fn field(mut self, field: FieldBuilder) -> Self {
        self.fields.push(field);
        self
    }

    pub fn build(self) -> Result<RowLayout, LayoutError> {
        let fields = self
            .fields
            .into_iter()
            .enumerate()
            .map(|(index, field)| field.build(index))
            .collect::<Result<Vec<_>, _>>()?;
        RowLayout::new(self.name, fields)
    }
}

/// Ordered tuple of values conforming to a layout.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    /// Wraps values without validation.
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Builds a row checked against `layout`: matching arity, every value
    /// assignable to its field (integers coerced with range checks).
    pub fn checked(layout: &RowLayout, values: Vec<Value>) -> Result<Self, LayoutError> {
        if values.len() != layout.field_count() {
            return Err(LayoutError::FieldCountMismatch {
                layout: layout.name().to_string(),
                expected: layout.field_count(),
                got: values.len(),
            });
        }
        let values = layout
            .fields()
            .iter()
            .zip(values)
            .map(|(field, value)| field.check_value(value))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { values })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value of the field called `name` in `layout`.
    pub fn get_by_name(&self, layout: &RowLayout, name: &str) -> Result<&Value, LayoutError> {
        let index = layout.index_of(name)?;
        self.values
            .get(index)
            .ok_or_else(|| LayoutError::FieldNotFound {
                layout: layout.name().to_string(),
                field: name.to_string(),
            })
    }

    pub fn set(&mut self, index: usize, value: impl Into<Value>) {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = value.into();
        }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Identifier values of this row in ordinal order.
    pub fn key(&self, layout: &RowLayout) -> Vec<Value> {
        layout
            .identifier_fields()
            .filter_map(|f| self.values.get(f.index).cloned())
            .collect()
    }
}

impl Index<usize> for Row {
    type Output = Value;

    fn index(&self, index: usize) -> &Value {
        &self.values[index]
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::new(values)
    }
}
