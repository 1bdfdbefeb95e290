//! SQLite driver built on rusqlite.

use std::time::Duration;

use chrono::SecondsFormat;
use rusqlite::ffi::ErrorCode;
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqliteValue, ValueRef};
use rusqlite::{params_from_iter, Connection, OpenFlags};
use rust_decimal::prelude::ToPrimitive;

use super::{Driver, DriverConnection, DriverError, ResultSet, SqlValue};

/// Opens SQLite database files.
///
/// Connection strings are `file:` URIs; the `mode` query parameter decides
/// whether a missing file is created.
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    busy_timeout: Duration,
}

impl SqliteDriver {
    pub fn new(busy_timeout: Duration) -> Self {
        Self { busy_timeout }
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl Driver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn open(&self, connection_string: &str) -> Result<Box<dyn DriverConnection>, DriverError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(connection_string, flags)
            .map_err(|e| map_error(e).connection_lost())?;
        conn.busy_timeout(self.busy_timeout).map_err(map_error)?;
        Ok(Box::new(SqliteConnection { conn }))
    }
}

struct SqliteConnection {
    conn: Connection,
}

impl DriverConnection for SqliteConnection {
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DriverError> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(map_error)?;
        let affected = stmt
            .execute(params_from_iter(params.iter()))
            .map_err(map_error)?;
        Ok(affected as u64)
    }

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<ResultSet, DriverError> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(map_error)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let width = columns.len();
        let mut rows = stmt
            .query(params_from_iter(params.iter()))
            .map_err(map_error)?;
        let mut result = Vec::new();
        while let Some(row) = rows.next().map_err(map_error)? {
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(from_value_ref(row.get_ref(i).map_err(map_error)?)?);
            }
            result.push(values);
        }
        Ok(ResultSet {
            columns,
            rows: result,
        })
    }

    fn close(self: Box<Self>) -> Result<(), DriverError> {
        self.conn.close().map_err(|(_, e)| map_error(e))
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let output = match self {
            SqlValue::Null => ToSqlOutput::Owned(SqliteValue::Null),
            SqlValue::Bool(v) => ToSqlOutput::Owned(SqliteValue::Integer(*v as i64)),
            SqlValue::Integer(v) => ToSqlOutput::Owned(SqliteValue::Integer(*v)),
            SqlValue::Real(v) => ToSqlOutput::Owned(SqliteValue::Real(*v)),
            SqlValue::Decimal(d) => match d.to_f64() {
                Some(v) => ToSqlOutput::Owned(SqliteValue::Real(v)),
                None => ToSqlOutput::Owned(SqliteValue::Text(d.to_string())),
            },
            SqlValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Blob(b) => ToSqlOutput::Borrowed(ValueRef::Blob(b)),
            SqlValue::Timestamp(t) => ToSqlOutput::Owned(SqliteValue::Text(
                t.to_rfc3339_opts(SecondsFormat::Micros, true),
            )),
        };
        Ok(output)
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Result<SqlValue, DriverError> {
    Ok(match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(v) => SqlValue::Integer(v),
        ValueRef::Real(v) => SqlValue::Real(v),
        ValueRef::Text(bytes) => SqlValue::Text(
            String::from_utf8(bytes.to_vec()).map_err(|e| DriverError::wrap(None, e))?,
        ),
        ValueRef::Blob(bytes) => SqlValue::Blob(bytes.to_vec()),
    })
}

fn map_error(e: rusqlite::Error) -> DriverError {
    let (code, lost) = match &e {
        rusqlite::Error::SqliteFailure(failure, _) => (
            Some(failure.extended_code.to_string()),
            matches!(
                failure.code,
                ErrorCode::CannotOpen
                    | ErrorCode::NotADatabase
                    | ErrorCode::PermissionDenied
                    | ErrorCode::SystemIoFailure
            ),
        ),
        _ => (None, false),
    };
    let error = DriverError::wrap(code, e);
    if lost {
        error.connection_lost()
    } else {
        error
    }
}
