use xdb_types::{FieldProperties, Row, RowLayout, Value};

use crate::database::Database;
use crate::dialect::{Dialect, StatementKind};
use crate::driver::SqlValue;
use crate::error::DbError;
use crate::statement::{Statement, StatementBuilder};
use crate::storage::{Session, Storage};

/// A table of a [`Database`], typed by a row layout.
///
/// Rows move through absent, inserted and updated states. Updating or
/// deleting an absent row fails with `NotFound` instead of doing nothing,
/// so callers notice stale state.
///
/// Keyed operations take the identifier values in ordinal order. Tables
/// with a single identifier also have `*_by_id` shorthands.
#[derive(Debug, Clone)]
pub struct Table {
    pub(super) database: Database,
    /// Layout in canonical types, as given by the caller
    pub(super) layout: RowLayout,
    /// Layout after the dialect chose storage types
    pub(super) mapped: RowLayout,
    pub(super) qualified_name: String,
}

impl Table {
    pub(crate) fn new(database: Database, layout: RowLayout) -> Result<Self, DbError> {
        let dialect = database.storage().dialect();
        let mapped = dialect.map_layout(&layout)?;
        let qualified_name = dialect.fully_qualified_name(database.name(), layout.name());
        Ok(Self {
            database,
            layout,
            mapped,
            qualified_name,
        })
    }

    pub fn name(&self) -> &str {
        self.layout.name()
    }

    pub fn layout(&self) -> &RowLayout {
        &self.layout
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    /// Name as written in statements, quoted and qualified.
    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub(super) fn storage(&self) -> &Storage {
        self.database.storage()
    }

    pub(super) fn dialect(&self) -> &dyn Dialect {
        self.storage().dialect()
    }

    pub(super) fn with_session<T, F>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&mut Session<'_>) -> Result<T, DbError>,
    {
        self.storage()
            .with_session(Some(self.database.name()), Some(self.name()), f)
    }

    /// Inserts `row` and returns it as stored.
    ///
    /// When the identifier is auto incremented and `row` leaves it `Null`,
    /// the engine generates it and the returned row carries the new value.
    /// A unique or identifier collision fails with `DuplicateKey`.
    pub fn insert(&self, row: Row) -> Result<Row, DbError> {
        let mut values = self.check_row(row)?;
        let generated = self
            .mapped
            .auto_increment_identifier()
            .filter(|f| values[f.index].is_null());
        let statement = self.insert_statement(&values, generated.map(|f| f.index), None)?;

        // The generated key is only visible on the session that inserted.
        let id = self.with_session(|session| {
            session.execute(&statement)?;
            if generated.is_none() {
                return Ok(None);
            }
            let query = Statement::new(StatementKind::Query, self.dialect().last_inserted_id_query());
            Ok(session.query(&query)?.scalar().and_then(SqlValue::as_i64))
        })?;
        if let Some(field) = generated {
            let id = id.ok_or_else(|| {
                DbError::schema_mismatch(format!(
                    "table '{}' reported no generated key for '{}'",
                    self.name(),
                    field.name
                ))
            })?;
            values[field.index] = Value::Int64(id).coerce(field.data_type)?;
        }
        Ok(Row::new(values))
    }

    /// Overwrites the non-identifier fields of the row with the key of `row`.
    pub fn update(&self, row: Row) -> Result<(), DbError> {
        let values = self.check_row(row)?;
        let key = self.row_key(&values);
        let affected = match self.update_statement(&values, &key)? {
            Some(statement) => self.with_session(|session| session.execute(&statement))?,
            // Only key columns: nothing to change, the row just has to exist.
            None => u64::from(self.exists(&key)?),
        };
        if affected == 0 {
            return Err(self.row_not_found(&key));
        }
        Ok(())
    }

    /// Inserts `row`, or overwrites the non-identifier fields of the row
    /// with the same key. The identifier itself never changes.
    ///
    /// Dialects with a native upsert do this in one atomic statement.
    /// Otherwise the table reads before it writes: two writers replacing
    /// the same new key at once can both see it absent, and the second
    /// insert then fails with `DuplicateKey`. Callers needing atomicity on
    /// such dialects serialize writers per key. With
    /// `StorageConfig::emulate_upsert` off the fallback is refused with
    /// `UnsupportedOperation`.
    pub fn replace(&self, row: Row) -> Result<Row, DbError> {
        let values = self.check_row(row)?;
        let key = self.row_key(&values);
        self.key_pairs(&key)?;

        let dialect = self.dialect();
        if dialect.supports_native_upsert() {
            let clause = dialect.upsert_clause(&self.mapped)?;
            let statement = self.insert_statement(&values, None, Some(&clause))?;
            self.with_session(|session| session.execute(&statement))?;
            return Ok(Row::new(values));
        }
        if !self.storage().config().emulate_upsert {
            return Err(DbError::unsupported(format!(
                "{} has no native upsert and emulation is disabled",
                dialect.name()
            )));
        }

        tracing::warn!(
            database = self.database.name(),
            table = self.name(),
            "replacing row without native upsert, concurrent writers may collide"
        );
        let exists = self.exists_statement(&key)?;
        let insert = self.insert_statement(&values, None, None)?;
        let update = self.update_statement(&values, &key)?;
        self.with_session(|session| {
            if session.query(&exists)?.is_empty() {
                session.execute(&insert)?;
                return Ok(());
            }
            if let Some(update) = &update {
                // The row may have been deleted since the existence check.
                if session.execute(update)? == 0 {
                    session.execute(&insert)?;
                }
            }
            Ok(())
        })?;
        Ok(Row::new(values))
    }

    /// Deletes the row with `key`.
    pub fn delete(&self, key: &[Value]) -> Result<(), DbError> {
        let mut builder = StatementBuilder::new(self.dialect(), StatementKind::Dml);
        builder
            .push("DELETE FROM ")
            .push(&self.qualified_name)
            .push(" WHERE ");
        builder.push_conditions(self.key_pairs(key)?)?;
        let statement = builder.finish();
        if self.with_session(|session| session.execute(&statement))? == 0 {
            return Err(self.row_not_found(key));
        }
        Ok(())
    }

    pub fn delete_by_id(&self, id: impl Into<Value>) -> Result<(), DbError> {
        self.delete(&[id.into()])
    }

    /// Checks `row` against the layout, coercing integers to their field
    /// types.
    fn check_row(&self, row: Row) -> Result<Vec<Value>, DbError> {
        Ok(Row::checked(&self.layout, row.into_values())?.into_values())
    }

    fn row_key(&self, values: &[Value]) -> Vec<Value> {
        self.layout
            .identifier_fields()
            .map(|f| values[f.index].clone())
            .collect()
    }

    /// Pairs the identifier fields with the values of `key`.
    pub(super) fn key_pairs(
        &self,
        key: &[Value],
    ) -> Result<Vec<(&FieldProperties, Value)>, DbError> {
        let fields: Vec<&FieldProperties> = self.mapped.identifier_fields().collect();
        if fields.is_empty() {
            return Err(DbError::unsupported(format!(
                "table '{}' has no identifier",
                self.name()
            )));
        }
        if key.len() != fields.len() {
            return Err(DbError::invalid_argument(format!(
                "table '{}' is keyed by {} values, got {}",
                self.name(),
                fields.len(),
                key.len()
            )));
        }
        fields
            .into_iter()
            .zip(key.iter().cloned())
            .map(|(field, value)| {
                if value.is_null() {
                    Err(DbError::invalid_argument(format!(
                        "identifier '{}' of table '{}' has no value",
                        field.name,
                        self.name()
                    )))
                } else {
                    Ok((field, value))
                }
            })
            .collect()
    }

    pub(super) fn row_not_found(&self, key: &[Value]) -> DbError {
        let key: Vec<String> = key.iter().map(ToString::to_string).collect();
        DbError::not_found(format!(
            "no row with key ({}) in table '{}'",
            key.join(", "),
            self.name()
        ))
    }

    /// `INSERT` of every column except `skip`, followed by `upsert`.
    fn insert_statement(
        &self,
        values: &[Value],
        skip: Option<usize>,
        upsert: Option<&str>,
    ) -> Result<Statement, DbError> {
        let columns: Vec<&FieldProperties> = self
            .mapped
            .fields()
            .iter()
            .filter(|f| Some(f.index) != skip)
            .collect();
        let mut builder = StatementBuilder::new(self.dialect(), StatementKind::Dml);
        builder.push("INSERT INTO ").push(&self.qualified_name);
        if columns.is_empty() {
            builder.push(" DEFAULT VALUES");
        } else {
            builder.push(" (");
            for (i, field) in columns.iter().enumerate() {
                if i > 0 {
                    builder.push(", ");
                }
                builder.push_identifier(&field.name_at_database);
            }
            builder.push(") VALUES (");
            for (i, field) in columns.iter().enumerate() {
                if i > 0 {
                    builder.push(", ");
                }
                builder.push_field_value(field, values[field.index].clone())?;
            }
            builder.push(")");
        }
        if let Some(upsert) = upsert {
            builder.push(upsert);
        }
        Ok(builder.finish())
    }

    /// `UPDATE` of the non-key columns, or `None` when every column is
    /// part of the key.
    fn update_statement(
        &self,
        values: &[Value],
        key: &[Value],
    ) -> Result<Option<Statement>, DbError> {
        let pairs = self.key_pairs(key)?;
        let columns: Vec<&FieldProperties> = self
            .mapped
            .fields()
            .iter()
            .filter(|f| !f.is_identifier())
            .collect();
        if columns.is_empty() {
            return Ok(None);
        }
        let mut builder = StatementBuilder::new(self.dialect(), StatementKind::Dml);
        builder
            .push("UPDATE ")
            .push(&self.qualified_name)
            .push(" SET ");
        for (i, field) in columns.iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            builder.push_identifier(&field.name_at_database).push(" = ");
            builder.push_field_value(field, values[field.index].clone())?;
        }
        builder.push(" WHERE ");
        builder.push_conditions(pairs)?;
        Ok(Some(builder.finish()))
    }
}
