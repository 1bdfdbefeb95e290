//! Minimal contract with database client libraries.
//!
//! The storage engine talks to a database only through [`Driver`] and
//! [`DriverConnection`]; values cross the boundary as [`SqlValue`]s that
//! the dialect adapters have already translated into storage form.

use std::error::Error as StdError;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "postgres")]
pub use self::postgres::PostgresDriver;
#[cfg(feature = "sqlite")]
pub use self::sqlite::SqliteDriver;

/// Value in storage form, as bound to or read from a driver.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Decimal(Decimal),
    Text(String),
    Blob(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(v) => Some(*v),
            SqlValue::Bool(v) => Some(*v as i64),
            SqlValue::Decimal(d) if d.fract().is_zero() => {
                rust_decimal::prelude::ToPrimitive::to_i64(d)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness of flag columns returned by catalog queries.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(v) => Some(*v),
            SqlValue::Integer(v) => Some(*v != 0),
            SqlValue::Text(s) => match s.as_str() {
                "t" | "true" | "YES" | "1" => Some(true),
                "f" | "false" | "NO" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

/// Fully materialised result of a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl ResultSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// First column of the first row.
    pub fn scalar(&self) -> Option<&SqlValue> {
        self.rows.first().and_then(|row| row.first())
    }
}

/// Error reported by a driver.
///
/// `code` holds the SQLSTATE-equivalent: the SQLSTATE for PostgreSQL, the
/// extended result code for SQLite.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DriverError {
    code: Option<String>,
    message: String,
    connection_lost: bool,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl DriverError {
    pub fn new(code: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            code: code.map(str::to_string),
            message: message.into(),
            connection_lost: false,
            source: None,
        }
    }

    /// Wraps the native error of a client library.
    pub fn wrap<E>(code: Option<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            code,
            message: source.to_string(),
            connection_lost: false,
            source: Some(Box::new(source)),
        }
    }

    /// Marks the error as a broken or unreachable connection.
    #[must_use]
    pub fn connection_lost(mut self) -> Self {
        self.connection_lost = true;
        self
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_connection_lost(&self) -> bool {
        self.connection_lost
    }
}

/// Opens connections from connection strings.
pub trait Driver: Send + Sync + fmt::Debug {
    /// Short name used in log output.
    fn name(&self) -> &'static str;

    fn open(&self, connection_string: &str) -> Result<Box<dyn DriverConnection>, DriverError>;
}

/// One open session with a database.
///
/// Statements on one connection run in issue order.
pub trait DriverConnection: Send {
    /// Runs a statement and returns the number of affected rows.
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DriverError>;

    /// Runs a query and materialises its result.
    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<ResultSet, DriverError>;

    fn close(self: Box<Self>) -> Result<(), DriverError> {
        Ok(())
    }
}
