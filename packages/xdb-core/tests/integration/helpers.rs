//! Shared fixtures.

use std::sync::Arc;

use tempfile::TempDir;

use xdb_core::driver::SqliteDriver;
use xdb_core::{
    DataType, Database, FieldBuilder, RowLayout, SqliteDialect, Storage, StorageConfig,
};

/// A storage rooted in a temporary directory that lives as long as the
/// fixture.
pub struct Fixture {
    pub dir: TempDir,
    pub storage: Storage,
}

impl Fixture {
    pub fn new() -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let storage = Storage::sqlite(StorageConfig::embedded(dir.path()));
        Ok(Self { dir, storage })
    }

    /// Storage with a custom dialect and config tweaks.
    pub fn with(
        dialect: SqliteDialect,
        configure: impl FnOnce(&mut StorageConfig),
    ) -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let mut config = StorageConfig::embedded(dir.path());
        configure(&mut config);
        let storage = Storage::new(Arc::new(dialect), Arc::new(SqliteDriver::default()), config);
        Ok(Self { dir, storage })
    }

    pub fn database(&self) -> anyhow::Result<Database> {
        Ok(self.storage.create_database("app")?)
    }
}

/// `{id: Int64 identifier auto increment, name: String(50) unique}`
pub fn users_layout() -> anyhow::Result<RowLayout> {
    Ok(RowLayout::builder("users")
        .field(
            FieldBuilder::new("id", DataType::Int64)
                .identifier()
                .auto_increment(),
        )
        .field(FieldBuilder::new("name", DataType::String).max_length(50).unique())
        .build()?)
}

/// `{key: String(32) identifier, value: Int32}`
pub fn settings_layout() -> anyhow::Result<RowLayout> {
    Ok(RowLayout::builder("settings")
        .field(FieldBuilder::new("key", DataType::String).identifier().max_length(32))
        .field(FieldBuilder::new("value", DataType::Int32))
        .build()?)
}
