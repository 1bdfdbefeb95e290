//! Tables of user types.
//!
//! A type describes its own layout and row conversion by implementing
//! [`Record`]; [`TypedTable`] then moves values of that type in and out of
//! a [`Table`].

use std::marker::PhantomData;

use xdb_types::{Row, RowLayout, Value};

use crate::database::Database;
use crate::dialect::TableFlags;
use crate::error::DbError;
use crate::table::Table;

/// A type stored as one row.
pub trait Record: Sized {
    /// Layout of the table holding values of this type. Its name is the
    /// table name.
    fn layout() -> Result<RowLayout, DbError>;

    /// Values in layout order.
    fn to_row(&self) -> Row;

    fn from_row(row: Row) -> Result<Self, DbError>;
}

/// A [`Table`] holding values of `T`.
#[derive(Debug, Clone)]
pub struct TypedTable<T> {
    table: Table,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> TypedTable<T> {
    /// Creates the table for `T` in `database`.
    pub fn create(database: &Database, flags: TableFlags) -> Result<Self, DbError> {
        let table = database.create_table(&T::layout()?, flags)?;
        Ok(Self::wrap(table))
    }

    /// Opens the existing table for `T`, checking its layout.
    pub fn open(database: &Database) -> Result<Self, DbError> {
        let table = database.open_table(&T::layout()?)?;
        Ok(Self::wrap(table))
    }

    fn wrap(table: Table) -> Self {
        Self {
            table,
            _record: PhantomData,
        }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Inserts `record` and returns it with any generated key filled in.
    pub fn insert(&self, record: &T) -> Result<T, DbError> {
        T::from_row(self.table.insert(record.to_row())?)
    }

    pub fn update(&self, record: &T) -> Result<(), DbError> {
        self.table.update(record.to_row())
    }

    /// See [`Table::replace`] for the atomicity caveat.
    pub fn replace(&self, record: &T) -> Result<(), DbError> {
        self.table.replace(record.to_row()).map(|_| ())
    }

    pub fn delete(&self, key: &[Value]) -> Result<(), DbError> {
        self.table.delete(key)
    }

    pub fn get(&self, key: &[Value]) -> Result<T, DbError> {
        T::from_row(self.table.get_row(key)?)
    }

    pub fn try_get(&self, key: &[Value]) -> Result<Option<T>, DbError> {
        self.table.try_get_row(key)?.map(T::from_row).transpose()
    }

    pub fn count(&self) -> Result<u64, DbError> {
        self.table.count()
    }

    pub fn all(&self) -> Result<Vec<T>, DbError> {
        self.table
            .get_rows()?
            .map(|row| row.and_then(T::from_row))
            .collect()
    }
}
