//! Statement values and the builder that assembles them.

use std::fmt;

use xdb_types::{FieldProperties, Value};

use crate::dialect::{quote_text, Dialect, ParameterMode, StatementKind};
use crate::driver::SqlValue;
use crate::error::DbError;

/// SQL text with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    kind: StatementKind,
    sql: String,
    params: Vec<SqlValue>,
}

impl Statement {
    /// A statement without parameters.
    pub fn new(kind: StatementKind, sql: impl Into<String>) -> Self {
        Self {
            kind,
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Assembles one statement.
///
/// Values are bound through placeholders or rendered as literals,
/// whichever the dialect chose for the statement kind.
pub struct StatementBuilder<'a> {
    dialect: &'a dyn Dialect,
    kind: StatementKind,
    mode: ParameterMode,
    sql: String,
    params: Vec<SqlValue>,
}

impl<'a> StatementBuilder<'a> {
    pub fn new(dialect: &'a dyn Dialect, kind: StatementKind) -> Self {
        Self {
            dialect,
            kind,
            mode: dialect.parameter_mode(kind),
            sql: String::new(),
            params: Vec::new(),
        }
    }

    pub fn mode(&self) -> ParameterMode {
        self.mode
    }

    /// Appends raw SQL text.
    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    pub fn push_identifier(&mut self, name: &str) -> &mut Self {
        let quoted = self.dialect.escape_identifier(name);
        self.sql.push_str(&quoted);
        self
    }

    /// Appends a storage value as a placeholder or a literal. Fails when
    /// a literal is needed and the value has none.
    pub fn push_value(&mut self, value: SqlValue) -> Result<&mut Self, DbError> {
        match self.mode {
            ParameterMode::Parameterized => {
                self.params.push(value);
                let placeholder = self.dialect.placeholder(self.params.len());
                self.sql.push_str(&placeholder);
            }
            ParameterMode::Literal => {
                let literal = self.dialect.render_literal(&value)?;
                self.sql.push_str(&literal);
            }
        }
        Ok(self)
    }

    /// Appends text, such as a table name, as a placeholder or a literal.
    pub fn push_text(&mut self, text: &str) -> &mut Self {
        match self.mode {
            ParameterMode::Parameterized => {
                self.params.push(SqlValue::Text(text.to_string()));
                let placeholder = self.dialect.placeholder(self.params.len());
                self.sql.push_str(&placeholder);
            }
            ParameterMode::Literal => self.sql.push_str(&quote_text(text)),
        }
        self
    }

    /// Translates a canonical value for `field` and appends it.
    pub fn push_field_value(
        &mut self,
        field: &FieldProperties,
        value: Value,
    ) -> Result<&mut Self, DbError> {
        let value = self.dialect.to_database(field, value)?;
        self.push_value(value)
    }

    /// Appends `a = v AND b = w` for the given fields and values.
    pub fn push_conditions<'f, I>(&mut self, pairs: I) -> Result<&mut Self, DbError>
    where
        I: IntoIterator<Item = (&'f FieldProperties, Value)>,
    {
        for (i, (field, value)) in pairs.into_iter().enumerate() {
            if i > 0 {
                self.push(" AND ");
            }
            self.push_identifier(&field.name_at_database);
            if value.is_null() {
                self.push(" IS NULL");
            } else {
                self.push(" = ");
                self.push_field_value(field, value)?;
            }
        }
        Ok(self)
    }

    pub fn finish(self) -> Statement {
        Statement {
            kind: self.kind,
            sql: self.sql,
            params: self.params,
        }
    }
}
