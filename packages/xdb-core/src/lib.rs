//! Cross-dialect relational storage.
//!
//! One row model, defined in `xdb-types`, persisted to different SQL
//! engines through one API. Each engine has a [`Dialect`] that owns type
//! mapping, quoting, DDL fragments, upsert shape and value translation,
//! and a [`Driver`] that talks to the client library. [`Storage`] pools
//! connections and classifies errors; [`Database`] compiles layouts into
//! DDL; [`Table`] does CRUD on rows.
//!
//! ```no_run
//! use xdb_core::{DataType, FieldBuilder, Row, RowLayout, Storage, StorageConfig, TableFlags, Value};
//!
//! # fn main() -> Result<(), xdb_core::DbError> {
//! let storage = Storage::sqlite(StorageConfig::embedded("./data"));
//! let database = storage.create_database("app")?;
//! let layout = RowLayout::builder("users")
//!     .field(FieldBuilder::new("id", DataType::Int64).identifier().auto_increment())
//!     .field(FieldBuilder::new("name", DataType::String).max_length(50).unique())
//!     .build()?;
//! let users = database.create_table(&layout, TableFlags::NONE)?;
//! let row = users.insert(Row::new(vec![Value::Null, "alice".into()]))?;
//! assert_eq!(row[0], Value::Int64(1));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod database;
pub mod ddl;
pub mod dialect;
pub mod driver;
pub mod error;
pub mod pool;
pub mod statement;
pub mod storage;
pub mod table;
pub mod typed;

pub use config::StorageConfig;
pub use database::Database;
pub use dialect::{Dialect, PostgresDialect, SqliteDialect, StatementKind, TableFlags};
pub use driver::{Driver, DriverConnection, DriverError, ResultSet, SqlValue};
pub use error::{DbError, ErrorKind};
pub use statement::{Statement, StatementBuilder};
pub use storage::{Session, Storage};
pub use table::{Rows, Table};
pub use typed::{Record, TypedTable};

pub use xdb_types::{
    DataType, FieldBuilder, FieldFlags, FieldProperties, FieldSize, LayoutError, Row, RowLayout,
    Value,
};
