//! Dialect-agnostic storage engine.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use xdb_types::validate_name;

use crate::config::StorageConfig;
use crate::database::Database;
use crate::dialect::{Catalog, Dialect, StatementKind};
use crate::driver::{Driver, DriverError, ResultSet};
use crate::error::{DbError, ErrorKind};
use crate::pool::{ConnectionPool, PooledConnection};
use crate::statement::Statement;

/// Companion files SQLite keeps next to a database file.
const DATABASE_FILE_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];

struct StorageInner {
    dialect: Arc<dyn Dialect>,
    pool: ConnectionPool,
    config: StorageConfig,
}

/// Entry point: one engine, one connection pool.
///
/// `Storage` is cheap to clone; clones share the pool. Every statement runs
/// on a connection checked out for that call only, so a `Storage` can be
/// used from many threads at once.
#[derive(Clone)]
pub struct Storage {
    inner: Arc<StorageInner>,
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("dialect", &self.inner.dialect.name())
            .field("pool", &self.inner.pool)
            .finish_non_exhaustive()
    }
}

impl Storage {
    pub fn new(dialect: Arc<dyn Dialect>, driver: Arc<dyn Driver>, config: StorageConfig) -> Self {
        tracing::debug!(
            dialect = dialect.name(),
            driver = driver.name(),
            "creating storage"
        );
        let pool = ConnectionPool::new(
            driver,
            config.max_connections,
            std::time::Duration::from_millis(config.connect_timeout_ms),
        );
        Self {
            inner: Arc::new(StorageInner {
                dialect,
                pool,
                config,
            }),
        }
    }

    /// Embedded storage: one SQLite file per database under `config.location`.
    #[cfg(feature = "sqlite")]
    pub fn sqlite(config: StorageConfig) -> Self {
        let driver = crate::driver::SqliteDriver::new(std::time::Duration::from_millis(
            config.busy_timeout_ms,
        ));
        Self::new(
            Arc::new(crate::dialect::SqliteDialect::default()),
            Arc::new(driver),
            config,
        )
    }

    /// Server storage on PostgreSQL.
    #[cfg(feature = "postgres")]
    pub fn postgres(config: StorageConfig) -> Self {
        let driver = crate::driver::PostgresDriver::new(std::time::Duration::from_millis(
            config.connect_timeout_ms,
        ));
        Self::new(
            Arc::new(crate::dialect::PostgresDialect::default()),
            Arc::new(driver),
            config,
        )
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.inner.dialect.as_ref()
    }

    pub fn config(&self) -> &StorageConfig {
        &self.inner.config
    }

    /// Runs `f` on one connection to `database` (the maintenance database or
    /// server when `None`). Statements inside run in issue order on the
    /// same session.
    pub fn with_session<T, F>(
        &self,
        database: Option<&str>,
        table: Option<&str>,
        f: F,
    ) -> Result<T, DbError>
    where
        F: FnOnce(&mut Session<'_>) -> Result<T, DbError>,
    {
        let dialect = self.dialect();
        let connection_string = dialect.connection_string(&self.inner.config, database)?;
        let connection = self
            .inner
            .pool
            .acquire(&connection_string)
            .map_err(|e| {
                let message = format!(
                    "cannot connect to {} database '{}': {}",
                    dialect.name(),
                    database.unwrap_or_default(),
                    e.message()
                );
                tracing::warn!(database = database.unwrap_or_default(), "{}", message);
                DbError::from_driver(ErrorKind::ConnectionFailure, message, e)
            })?;
        let mut session = Session {
            dialect,
            connection,
            database: database.unwrap_or_default(),
            table: table.unwrap_or_default(),
        };
        f(&mut session)
    }

    /// Executes one statement on its own session.
    pub fn execute(
        &self,
        database: Option<&str>,
        table: Option<&str>,
        statement: &Statement,
    ) -> Result<u64, DbError> {
        self.with_session(database, table, |session| session.execute(statement))
    }

    /// Runs one query on its own session.
    pub fn query(
        &self,
        database: Option<&str>,
        table: Option<&str>,
        statement: &Statement,
    ) -> Result<ResultSet, DbError> {
        self.with_session(database, table, |session| session.query(statement))
    }

    // --- catalog ---

    /// Names of the existing databases, sorted.
    pub fn database_names(&self) -> Result<Vec<String>, DbError> {
        match self.dialect().catalog(&self.inner.config) {
            Catalog::Server {
                maintenance_database,
                list_databases,
            } => {
                let result = self.query(
                    Some(&maintenance_database),
                    None,
                    &Statement::new(StatementKind::Query, list_databases),
                )?;
                Ok(result
                    .rows
                    .iter()
                    .filter_map(|row| row.first().and_then(|v| v.as_str()).map(str::to_string))
                    .collect())
            }
            Catalog::Files {
                directory,
                extension,
            } => database_files(&directory, extension),
        }
    }

    pub fn has_database(&self, name: &str) -> Result<bool, DbError> {
        validate_name("Database", name)?;
        Ok(self.database_names()?.iter().any(|n| n == name))
    }

    /// Returns the existing database `name`.
    pub fn get_database(&self, name: &str) -> Result<Database, DbError> {
        if !self.has_database(name)? {
            return Err(DbError::not_found(format!("Database '{}' does not exist", name)));
        }
        Ok(Database::new(self.clone(), name))
    }

    /// Creates the database `name`.
    pub fn create_database(&self, name: &str) -> Result<Database, DbError> {
        if self.has_database(name)? {
            return Err(DbError::already_exists(format!(
                "Database '{}' already exists",
                name
            )));
        }
        match self.dialect().catalog(&self.inner.config) {
            Catalog::Server {
                maintenance_database,
                ..
            } => {
                let sql = self.dialect().create_database_sql(name);
                self.execute(
                    Some(&maintenance_database),
                    None,
                    &Statement::new(StatementKind::Ddl, sql),
                )?;
            }
            Catalog::Files {
                directory,
                extension,
            } => {
                fs::create_dir_all(&directory).map_err(|e| io_error(&directory, e))?;
                let path = database_file(&directory, name, extension);
                fs::OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&path)
                    .map_err(|e| match e.kind() {
                        io::ErrorKind::AlreadyExists => {
                            DbError::already_exists(format!("Database '{}' already exists", name))
                        }
                        _ => io_error(&path, e),
                    })?;
            }
        }
        tracing::info!(dialect = self.dialect().name(), database = name, "created database");
        Ok(Database::new(self.clone(), name))
    }

    /// Drops the database `name` and everything in it.
    pub fn drop_database(&self, name: &str) -> Result<(), DbError> {
        if !self.has_database(name)? {
            return Err(DbError::not_found(format!("Database '{}' does not exist", name)));
        }
        // Idle sessions on the database would keep it open.
        let connection_string = self.dialect().connection_string(&self.inner.config, Some(name))?;
        self.inner.pool.evict(&connection_string);

        match self.dialect().catalog(&self.inner.config) {
            Catalog::Server {
                maintenance_database,
                ..
            } => {
                let sql = self.dialect().drop_database_sql(name);
                self.execute(
                    Some(&maintenance_database),
                    None,
                    &Statement::new(StatementKind::Ddl, sql),
                )?;
            }
            Catalog::Files {
                directory,
                extension,
            } => {
                let path = database_file(&directory, name, extension);
                fs::remove_file(&path).map_err(|e| match e.kind() {
                    io::ErrorKind::NotFound => {
                        DbError::not_found(format!("Database '{}' does not exist", name))
                    }
                    _ => io_error(&path, e),
                })?;
                for suffix in DATABASE_FILE_SUFFIXES {
                    let mut companion = path.clone().into_os_string();
                    companion.push(suffix);
                    let companion = PathBuf::from(companion);
                    if companion.exists() {
                        fs::remove_file(&companion).map_err(|e| io_error(&companion, e))?;
                    }
                }
            }
        }
        tracing::info!(dialect = self.dialect().name(), database = name, "dropped database");
        Ok(())
    }

    /// Closes all pooled connections. Later operations fail with
    /// `ConnectionFailure`.
    pub fn shutdown(&self) {
        self.inner.pool.shutdown();
    }
}

fn database_file(directory: &Path, name: &str, extension: &str) -> PathBuf {
    directory.join(format!("{}.{}", name, extension))
}

fn database_files(directory: &Path, extension: &str) -> Result<Vec<String>, DbError> {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_error(directory, e)),
    };
    let mut names = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| io_error(directory, e))?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(extension) || !path.is_file() {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if validate_name("Database", stem).is_ok() {
                names.push(stem.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

fn io_error(path: &Path, e: io::Error) -> DbError {
    DbError::connection_failure(format!("{}: {}", path.display(), e))
}

/// One checked out connection.
///
/// A connection that saw a failed statement is discarded when the session
/// ends instead of going back to the pool.
pub struct Session<'a> {
    dialect: &'a dyn Dialect,
    connection: PooledConnection,
    database: &'a str,
    table: &'a str,
}

impl Session<'_> {
    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect
    }

    pub fn execute(&mut self, statement: &Statement) -> Result<u64, DbError> {
        self.trace(statement);
        let result = self
            .connection
            .execute(statement.sql(), statement.params());
        result.map_err(|e| self.fail(statement, e))
    }

    pub fn query(&mut self, statement: &Statement) -> Result<ResultSet, DbError> {
        self.trace(statement);
        let result = self.connection.query(statement.sql(), statement.params());
        result.map_err(|e| self.fail(statement, e))
    }

    fn trace(&self, statement: &Statement) {
        tracing::debug!(
            database = self.database,
            table = self.table,
            kind = ?statement.kind(),
            params = statement.params().len(),
            sql = statement.sql(),
            "executing statement"
        );
    }

    fn fail(&mut self, statement: &Statement, error: DriverError) -> DbError {
        self.connection.mark_broken();
        let kind = self.dialect.classify_error(&error);
        tracing::warn!(
            database = self.database,
            table = self.table,
            ?kind,
            "statement failed, discarding connection"
        );
        if kind == ErrorKind::UnsupportedOperation {
            tracing::error!(
                code = error.code().unwrap_or_default(),
                sql = statement.sql(),
                "unclassified driver error: {}",
                error
            );
        }
        let message = match self.table {
            "" => error.message().to_string(),
            table => format!("{} ({})", error.message(), table),
        };
        DbError::from_driver(kind, message, error)
    }
}
