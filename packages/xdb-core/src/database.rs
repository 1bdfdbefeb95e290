//! One logical database and the tables inside it.

use xdb_types::{validate_name, RowLayout};

use crate::ddl;
use crate::dialect::{StatementKind, TableFlags};
use crate::error::DbError;
use crate::statement::Statement;
use crate::storage::Storage;
use crate::table::Table;

/// Handle to a database of a [`Storage`].
///
/// Nothing is cached: every call asks the live engine, so tables created
/// or dropped elsewhere are seen immediately.
#[derive(Debug, Clone)]
pub struct Database {
    storage: Storage,
    name: String,
}

impl Database {
    pub(crate) fn new(storage: Storage, name: &str) -> Self {
        Self {
            storage,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Returns the names of the tables in this database, sorted.
    pub fn table_names(&self) -> Result<Vec<String>, DbError> {
        let statement = self.storage.dialect().table_names_query(&self.name);
        let result = self.storage.query(Some(&self.name), None, &statement)?;
        let mut names: Vec<String> = result
            .rows
            .iter()
            .filter_map(|row| row.first().and_then(|v| v.as_str()).map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn has_table(&self, name: &str) -> Result<bool, DbError> {
        validate_name("Table", name)?;
        Ok(self.table_names()?.iter().any(|n| n == name))
    }

    /// Creates a table for `layout`.
    ///
    /// # Arguments
    /// * `layout` - Columns of the new table; its name names the table
    /// * `flags` - Table options such as [`TableFlags::IN_MEMORY`]
    ///
    /// # Returns
    /// The new table. Layouts the dialect cannot create fail with
    /// `UnsupportedOperation` or `InvalidArgument` before any statement is
    /// sent; an existing table fails with `AlreadyExists`.
    pub fn create_table(&self, layout: &RowLayout, flags: TableFlags) -> Result<Table, DbError> {
        let statements = ddl::create_table(self.storage.dialect(), &self.name, layout, flags)?;
        if self.has_table(layout.name())? {
            return Err(DbError::already_exists(format!(
                "Table '{}' already exists in database '{}'",
                layout.name(),
                self.name
            )));
        }

        self.storage
            .with_session(Some(&self.name), Some(layout.name()), |session| {
                // A failed statement discards the session, which rolls back.
                session.execute(&Statement::new(StatementKind::Ddl, "BEGIN"))?;
                for statement in &statements {
                    session.execute(statement)?;
                }
                session.execute(&Statement::new(StatementKind::Ddl, "COMMIT"))?;
                Ok(())
            })?;
        tracing::info!(
            database = self.name.as_str(),
            table = layout.name(),
            indexes = statements.len().saturating_sub(1),
            "created table"
        );
        Table::new(self.clone(), layout.clone())
    }

    /// Opens the table named by `expected`, checking that its live columns
    /// match the layout.
    ///
    /// # Returns
    /// The table typed by `expected`. A missing table fails with `NotFound`;
    /// a differing field count, order, type or flag fails with
    /// `SchemaMismatch`.
    pub fn open_table(&self, expected: &RowLayout) -> Result<Table, DbError> {
        let dialect = self.storage.dialect();
        let live = self.live_layout(expected.name())?;
        let mapped = dialect.map_layout(expected)?;
        mapped
            .check_compatible_at_database(&live, dialect.introspected_flags())
            .and_then(|()| {
                if dialect.records_canonical_types() {
                    mapped.check_canonical_types(&live)
                } else {
                    Ok(())
                }
            })
            .map_err(|mismatch| {
                DbError::schema_mismatch(format!(
                    "table '{}' does not match its layout: {}",
                    expected.name(),
                    mismatch
                ))
            })?;
        Table::new(self.clone(), expected.clone())
    }

    /// Opens `name` with the layout read from the database.
    pub fn get_table(&self, name: &str) -> Result<Table, DbError> {
        let layout = self.live_layout(name)?;
        Table::new(self.clone(), layout)
    }

    /// Drops the table `name`.
    pub fn drop_table(&self, name: &str) -> Result<(), DbError> {
        if !self.has_table(name)? {
            return Err(DbError::not_found(format!(
                "Table '{}' does not exist in database '{}'",
                name, self.name
            )));
        }
        let statement = ddl::drop_table(self.storage.dialect(), &self.name, name);
        self.storage.execute(Some(&self.name), Some(name), &statement)?;
        tracing::info!(database = self.name.as_str(), table = name, "dropped table");
        Ok(())
    }

    fn live_layout(&self, table: &str) -> Result<RowLayout, DbError> {
        validate_name("Table", table)?;
        let dialect = self.storage.dialect();
        let statement = dialect.schema_introspection_query(&self.name, table);
        let schema = self.storage.query(Some(&self.name), Some(table), &statement)?;
        dialect.layout_from_schema(table, &schema)
    }
}
