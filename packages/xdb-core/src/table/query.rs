//! Read operations of a table.

use xdb_types::{Row, Value};

use super::Table;
use crate::dialect::StatementKind;
use crate::driver::SqlValue;
use crate::error::DbError;
use crate::statement::{Statement, StatementBuilder};

impl Table {
    /// `SELECT <every column> FROM <table>`.
    fn select(&self) -> StatementBuilder<'_> {
        let mut builder = StatementBuilder::new(self.dialect(), StatementKind::Query);
        builder.push("SELECT ");
        for (i, field) in self.mapped.fields().iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            builder.push_identifier(&field.name_at_database);
        }
        builder.push(" FROM ").push(&self.qualified_name);
        builder
    }

    pub(super) fn exists_statement(&self, key: &[Value]) -> Result<Statement, DbError> {
        let mut builder = StatementBuilder::new(self.dialect(), StatementKind::Query);
        builder
            .push("SELECT 1 FROM ")
            .push(&self.qualified_name)
            .push(" WHERE ");
        builder.push_conditions(self.key_pairs(key)?)?;
        Ok(builder.finish())
    }

    pub fn exists(&self, key: &[Value]) -> Result<bool, DbError> {
        let statement = self.exists_statement(key)?;
        let result = self.with_session(|session| session.query(&statement))?;
        Ok(!result.is_empty())
    }

    pub fn exists_by_id(&self, id: impl Into<Value>) -> Result<bool, DbError> {
        self.exists(&[id.into()])
    }

    /// Returns the row with `key`, or `None` when there is none.
    pub fn try_get_row(&self, key: &[Value]) -> Result<Option<Row>, DbError> {
        let mut builder = self.select();
        builder.push(" WHERE ");
        builder.push_conditions(self.key_pairs(key)?)?;
        let statement = builder.finish();
        let result = self.with_session(|session| session.query(&statement))?;
        result
            .rows
            .into_iter()
            .next()
            .map(|values| self.decode(values))
            .transpose()
    }

    pub fn try_get_row_by_id(&self, id: impl Into<Value>) -> Result<Option<Row>, DbError> {
        self.try_get_row(&[id.into()])
    }

    /// Returns the row with `key`; fails with `NotFound` when there is none.
    pub fn get_row(&self, key: &[Value]) -> Result<Row, DbError> {
        self.try_get_row(key)?
            .ok_or_else(|| self.row_not_found(key))
    }

    pub fn get_row_by_id(&self, id: impl Into<Value>) -> Result<Row, DbError> {
        self.get_row(&[id.into()])
    }

    pub fn count(&self) -> Result<u64, DbError> {
        let statement = Statement::new(
            StatementKind::Query,
            format!("SELECT COUNT(*) FROM {}", self.qualified_name),
        );
        let result = self.with_session(|session| session.query(&statement))?;
        result
            .scalar()
            .and_then(SqlValue::as_i64)
            .and_then(|count| u64::try_from(count).ok())
            .ok_or_else(|| {
                DbError::schema_mismatch(format!("table '{}' returned no row count", self.name()))
            })
    }

    /// Every row of the table, in no particular order.
    ///
    /// The result is read in full before this returns; rows are decoded as
    /// the iterator advances. Call again to start over.
    pub fn get_rows(&self) -> Result<Rows, DbError> {
        let statement = self.select().finish();
        let result = self.with_session(|session| session.query(&statement))?;
        Ok(Rows {
            table: self.clone(),
            rows: result.rows.into_iter(),
        })
    }

    /// Up to `limit` rows starting at position `offset`, ordered by the
    /// identifier.
    ///
    /// Positions are not stable: they hold only at the instant of the query
    /// and shift with every concurrent insert or delete. Two page reads may
    /// skip or repeat rows.
    pub fn get_rows_page(&self, offset: u64, limit: u64) -> Result<Vec<Row>, DbError> {
        let mut order: Vec<String> = self
            .mapped
            .identifier_fields()
            .map(|f| self.dialect().escape_identifier(&f.name_at_database))
            .collect();
        if order.is_empty() {
            order.push("1".to_string());
        }
        let mut builder = self.select();
        builder.push(&format!(
            " ORDER BY {} LIMIT {} OFFSET {}",
            order.join(", "),
            limit.min(i64::MAX as u64),
            offset.min(i64::MAX as u64)
        ));
        let statement = builder.finish();
        let result = self.with_session(|session| session.query(&statement))?;
        result
            .rows
            .into_iter()
            .map(|values| self.decode(values))
            .collect()
    }

    /// The row at position `index` in identifier order.
    ///
    /// Best effort only, with the same unstable positions as
    /// [`Table::get_rows_page`]. Fails with `NotFound` past the last row.
    pub fn get_row_at(&self, index: u64) -> Result<Row, DbError> {
        self.get_rows_page(index, 1)?.into_iter().next().ok_or_else(|| {
            DbError::not_found(format!(
                "table '{}' has no row at position {}",
                self.name(),
                index
            ))
        })
    }

    /// Converts one stored row to canonical values.
    fn decode(&self, values: Vec<SqlValue>) -> Result<Row, DbError> {
        if values.len() != self.mapped.field_count() {
            return Err(DbError::schema_mismatch(format!(
                "table '{}' returned {} columns, expected {}",
                self.name(),
                values.len(),
                self.mapped.field_count()
            )));
        }
        let dialect = self.dialect();
        let values = self
            .mapped
            .fields()
            .iter()
            .zip(values)
            .map(|(field, value)| dialect.from_database(field, value))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Row::new(values))
    }
}

/// Rows returned by [`Table::get_rows`].
#[derive(Debug)]
pub struct Rows {
    table: Table,
    rows: std::vec::IntoIter<Vec<SqlValue>>,
}

impl Iterator for Rows {
    type Item = Result<Row, DbError>;

    fn next(&mut self) -> Option<Self::Item> {
        let values = self.rows.next()?;
        Some(self.table.decode(values))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for Rows {}
