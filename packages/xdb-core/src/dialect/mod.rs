//! Dialect adapters.
//!
//! A [`Dialect`] knows everything engine specific: how names are quoted,
//! which database type stores each canonical type, how values are written
//! and read back, how tables are introspected and how driver errors map to
//! [`ErrorKind`]s. The rest of the crate builds statements only through
//! this trait, so it never contains engine specific SQL text.

use std::fmt;
use std::path::PathBuf;

use chrono::Duration;
use xdb_types::{DataType, FieldFlags, FieldProperties, FieldSize, RowLayout, Value};

use crate::config::StorageConfig;
use crate::driver::{DriverError, ResultSet, SqlValue};
use crate::error::{DbError, ErrorKind};
use crate::statement::Statement;

mod marshal;
mod postgres;
mod sqlite;

pub use self::postgres::PostgresDialect;
pub use self::sqlite::SqliteDialect;

bitflags::bitflags! {
    /// Options for table creation.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct TableFlags: u8 {
        /// Contents may be lost on engine restart in exchange for faster writes
        const IN_MEMORY = 1;
    }
}

impl TableFlags {
    pub const NONE: TableFlags = TableFlags::empty();
}

/// What a statement does; decides how values are embedded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// CREATE / DROP of tables, indexes and databases
    Ddl,
    /// SELECT
    Query,
    /// INSERT / UPDATE / DELETE
    Dml,
}

/// How a value ends up in statement text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterMode {
    /// Bound through a placeholder
    Parameterized,
    /// Rendered as an escaped literal
    Literal,
}

/// How an auto increment column is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoIncrement {
    None,
    /// The column type itself is replaced, e.g. `BIGSERIAL`
    ColumnType(&'static str),
    /// A keyword follows the primary key clause, e.g. `AUTOINCREMENT`
    Keyword(&'static str),
}

/// Where the databases of an engine live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Catalog {
    /// A server that lists and creates databases through SQL issued on a
    /// maintenance database.
    Server {
        maintenance_database: String,
        list_databases: String,
    },
    /// One file per database inside `directory`.
    Files {
        directory: PathBuf,
        extension: &'static str,
    },
}

/// Storage form of canonical values that differ between engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoding {
    /// Booleans are bound as booleans rather than 0/1
    pub native_bool: bool,
    /// UInt64 is stored as an exact NUMERIC rather than the bits of an i64
    pub numeric_unsigned_64: bool,
    /// Decimals are bound as decimals rather than doubles
    pub native_decimal: bool,
    /// Timestamps are bound natively rather than as RFC 3339 text
    pub native_timestamp: bool,
    /// Floating point columns keep NaN instead of turning it into NULL
    pub stores_nan: bool,
}

/// Engine specific SQL generation and value translation.
pub trait Dialect: Send + Sync + fmt::Debug {
    /// Short name used in log output.
    fn name(&self) -> &'static str;

    // --- connections and catalog ---

    /// Connection string for `database`, or for the server itself when
    /// `database` is `None`.
    fn connection_string(
        &self,
        config: &StorageConfig,
        database: Option<&str>,
    ) -> Result<String, DbError>;

    fn catalog(&self, config: &StorageConfig) -> Catalog;

    fn create_database_sql(&self, database: &str) -> String {
        format!("CREATE DATABASE {}", self.escape_identifier(database))
    }

    fn drop_database_sql(&self, database: &str) -> String {
        format!("DROP DATABASE {}", self.escape_identifier(database))
    }

    /// Query listing the tables of `database`, one name per row.
    fn table_names_query(&self, database: &str) -> Statement;

    // --- names and literals ---

    fn escape_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn fully_qualified_name(&self, database: &str, table: &str) -> String;

    /// Renders a storage value as an SQL literal. Values without a literal
    /// form are rejected rather than rendered as something else.
    fn render_literal(&self, value: &SqlValue) -> Result<String, DbError> {
        render_literal_standard(value)
    }

    /// Translates `value` for `field` and renders it as a literal.
    fn escape_literal(&self, field: &FieldProperties, value: Value) -> Result<String, DbError> {
        let value = self.to_database(field, value)?;
        self.render_literal(&value)
    }

    fn parameter_mode(&self, kind: StatementKind) -> ParameterMode {
        match kind {
            StatementKind::Ddl => ParameterMode::Literal,
            StatementKind::Query | StatementKind::Dml => ParameterMode::Parameterized,
        }
    }

    /// Placeholder for the parameter at 1-based `position`.
    fn placeholder(&self, position: usize) -> String;

    // --- type mapping and DDL ---

    /// Chooses storage type and normalises flags. Applying it twice gives
    /// the same field as applying it once.
    fn map_field(&self, field: &FieldProperties) -> FieldProperties;

    fn map_layout(&self, layout: &RowLayout) -> Result<RowLayout, DbError> {
        Ok(layout.map_fields(|f| self.map_field(f))?)
    }

    /// SQL type of a mapped field.
    fn column_type(&self, field: &FieldProperties) -> String;

    /// Range constraint for canonical types narrower than their storage type.
    fn check_constraint(&self, field: &FieldProperties) -> Option<String> {
        range_check(&self.escape_identifier(&field.name_at_database), field)
    }

    fn auto_increment(&self, field: &FieldProperties) -> Result<AutoIncrement, DbError>;

    /// Rejects fields the dialect cannot create.
    fn validate_field(&self, field: &FieldProperties) -> Result<(), DbError> {
        validate_field_common(field)?;
        self.auto_increment(field)?;
        Ok(())
    }

    /// Rejects layouts or table options the dialect cannot create. Runs
    /// before any statement is sent.
    fn validate_layout(&self, layout: &RowLayout, flags: TableFlags) -> Result<(), DbError> {
        if flags.contains(TableFlags::IN_MEMORY) && !self.supports_in_memory() {
            return Err(DbError::unsupported(format!(
                "{} cannot create in-memory table '{}'",
                self.name(),
                layout.name()
            )));
        }
        for field in layout.fields() {
            self.validate_field(field)?;
        }
        Ok(())
    }

    /// Column definition of one field. The primary key clause is inlined
    /// when `inline_primary_key` is set.
    fn column_ddl(
        &self,
        field: &FieldProperties,
        inline_primary_key: bool,
    ) -> Result<String, DbError> {
        let field = self.map_field(field);
        let auto_increment = self.auto_increment(&field)?;
        let column_type = match auto_increment {
            AutoIncrement::ColumnType(ty) => ty.to_string(),
            _ => self.column_type(&field),
        };
        let mut ddl = format!(
            "{} {}",
            self.escape_identifier(&field.name_at_database),
            column_type
        );
        if !field.is_nullable() {
            ddl.push_str(" NOT NULL");
        }
        if field.is_identifier() && inline_primary_key {
            ddl.push_str(" PRIMARY KEY");
            if let AutoIncrement::Keyword(keyword) = auto_increment {
                ddl.push(' ');
                ddl.push_str(keyword);
            }
        }
        if field.is_unique() {
            ddl.push_str(" UNIQUE");
        }
        if let Some(check) = self.check_constraint(&field) {
            ddl.push_str(&format!(" CHECK ({})", check));
        }
        Ok(ddl)
    }

    fn supports_in_memory(&self) -> bool {
        false
    }

    /// Leading keywords of a CREATE TABLE statement.
    fn create_table_keyword(&self, _flags: TableFlags) -> &'static str {
        "CREATE TABLE"
    }

    // --- upsert and generated keys ---

    /// Whether [`Dialect::upsert_clause`] is available. Without it tables
    /// replace rows by reading before writing.
    fn supports_native_upsert(&self) -> bool {
        true
    }

    /// `ON CONFLICT` clause turning an insert of `layout` into an upsert.
    fn upsert_clause(&self, layout: &RowLayout) -> Result<String, DbError> {
        on_conflict_clause(self, layout)
    }

    /// Query returning the key generated by the last insert on the session.
    fn last_inserted_id_query(&self) -> &'static str;

    // --- introspection ---

    /// Query describing the columns of `table`, one row per column in
    /// ordinal order, with the columns `name`, `data_type`, `nullable`,
    /// `max_length`, `numeric_precision`, `numeric_scale`, `auto_increment`,
    /// `identifier`, `is_unique` and `indexed`.
    fn schema_introspection_query(&self, database: &str, table: &str) -> Statement;

    /// Storage type for an introspected column type name.
    fn type_from_database(&self, type_name: &str) -> DataType;

    /// Canonical type recorded in a declared column type, for engines whose
    /// storage classes cannot tell canonical types apart.
    fn canonical_type_from_database(&self, _type_name: &str) -> Option<DataType> {
        None
    }

    /// Whether introspected layouts carry canonical types worth comparing.
    fn records_canonical_types(&self) -> bool {
        false
    }

    /// Flags the introspection query reports reliably.
    fn introspected_flags(&self) -> FieldFlags {
        FieldFlags::ALL
    }

    /// Builds the live layout of `table` from its introspection result.
    fn layout_from_schema(&self, table: &str, schema: &ResultSet) -> Result<RowLayout, DbError> {
        if schema.is_empty() {
            return Err(DbError::not_found(format!(
                "Table '{}' does not exist",
                table
            )));
        }
        let column = |name: &str| {
            schema.column_index(name).ok_or_else(|| {
                DbError::schema_mismatch(format!("introspection result lacks column '{}'", name))
            })
        };
        let name_at = column("name")?;
        let type_at = column("data_type")?;
        let length_at = column("max_length")?;
        let precision_at = column("numeric_precision")?;
        let scale_at = column("numeric_scale")?;
        let flag_columns = [
            (column("nullable")?, FieldFlags::NULLABLE),
            (column("auto_increment")?, FieldFlags::AUTO_INCREMENT),
            (column("identifier")?, FieldFlags::IDENTIFIER),
            (column("is_unique")?, FieldFlags::UNIQUE),
            (column("indexed")?, FieldFlags::INDEXED),
        ];

        let mut fields = Vec::with_capacity(schema.len());
        for (index, row) in schema.rows.iter().enumerate() {
            let name = row[name_at].as_str().ok_or_else(|| {
                DbError::schema_mismatch(format!("column {} of '{}' has no name", index, table))
            })?;
            let declared = row[type_at].as_str().unwrap_or_default();
            let stored = self.type_from_database(declared);
            let data_type = self.canonical_type_from_database(declared).unwrap_or(stored);
            let mut flags = FieldFlags::NONE;
            for &(at, flag) in &flag_columns {
                if row[at].as_bool().unwrap_or(false) {
                    flags |= flag;
                }
            }
            if flags.contains(FieldFlags::IDENTIFIER) {
                flags.remove(FieldFlags::NULLABLE | FieldFlags::UNIQUE | FieldFlags::INDEXED);
            }
            let size = match (
                stored,
                row[length_at].as_i64(),
                row[precision_at].as_i64(),
                row[scale_at].as_i64(),
            ) {
                (DataType::String, Some(length), _, _) if length > 0 => {
                    FieldSize::Length(u32::try_from(length).unwrap_or(u32::MAX))
                }
                (DataType::Decimal, _, Some(precision), scale) => {
                    match (u8::try_from(precision), u8::try_from(scale.unwrap_or(0))) {
                        (Ok(precision), Ok(scale)) => FieldSize::Precision { precision, scale },
                        _ => FieldSize::Unbounded,
                    }
                }
                _ => FieldSize::Unbounded,
            };
            fields.push(FieldProperties {
                index,
                name: name.to_string(),
                name_at_database: name.to_string(),
                data_type,
                type_at_database: stored,
                flags,
                size,
                description: None,
            });
        }
        RowLayout::new(table, fields).map_err(|e| DbError::schema_mismatch(e.to_string()))
    }

    // --- values ---

    fn encoding(&self) -> Encoding;

    /// Validates `value` for `field` and converts it to storage form.
    fn to_database(&self, field: &FieldProperties, value: Value) -> Result<SqlValue, DbError> {
        marshal::encode(self, field, value)
    }

    /// Converts a stored value back to the canonical type of `field`.
    fn from_database(&self, field: &FieldProperties, value: SqlValue) -> Result<Value, DbError> {
        marshal::decode(self, field, value)
    }

    // --- precision facts ---

    /// Significant decimal digits a Double keeps.
    fn float_precision(&self) -> u32 {
        15
    }

    /// Smallest step a DateTime keeps.
    fn date_time_precision(&self) -> Duration {
        Duration::microseconds(1)
    }

    /// Smallest step a TimeSpan keeps.
    fn time_span_precision(&self) -> Duration {
        Duration::microseconds(1)
    }

    /// Precision a Decimal declared with `requested` actually keeps.
    fn decimal_precision(&self, requested: FieldSize) -> FieldSize;

    // --- errors ---

    /// Maps a driver error to an error category.
    fn classify_error(&self, error: &DriverError) -> ErrorKind;
}

/// Checks shared by every dialect.
fn validate_field_common(field: &FieldProperties) -> Result<(), DbError> {
    if field.is_auto_increment()
        && !matches!(
            field.data_type,
            DataType::Int16 | DataType::Int32 | DataType::Int64
        )
    {
        return Err(DbError::unsupported(format!(
            "field '{}': auto increment needs a 16, 32 or 64 bit signed integer, not {}",
            field.name, field.data_type
        )));
    }
    if field.is_unique() && field.data_type.is_text() && field.max_length().is_none() {
        return Err(DbError::invalid_argument(format!(
            "field '{}': unique text fields need a maximum length",
            field.name
        )));
    }
    Ok(())
}

/// `ON CONFLICT (keys) DO UPDATE SET ...`, or `DO NOTHING` when every
/// column is part of the key.
fn on_conflict_clause<D: Dialect + ?Sized>(dialect: &D, layout: &RowLayout) -> Result<String, DbError> {
    let keys: Vec<String> = layout
        .identifier_fields()
        .map(|f| dialect.escape_identifier(&f.name_at_database))
        .collect();
    if keys.is_empty() {
        return Err(DbError::unsupported(format!(
            "table '{}' has no identifier to replace on",
            layout.name()
        )));
    }
    let updates: Vec<String> = layout
        .fields()
        .iter()
        .filter(|f| !f.is_identifier())
        .map(|f| {
            let column = dialect.escape_identifier(&f.name_at_database);
            format!("{} = EXCLUDED.{}", column, column)
        })
        .collect();
    if updates.is_empty() {
        return Ok(format!(" ON CONFLICT ({}) DO NOTHING", keys.join(", ")));
    }
    Ok(format!(
        " ON CONFLICT ({}) DO UPDATE SET {}",
        keys.join(", "),
        updates.join(", ")
    ))
}

/// Clears flags that an identifier implies.
fn normalize_identifier(field: &mut FieldProperties) {
    if field.is_identifier() {
        field
            .flags
            .remove(FieldFlags::NULLABLE | FieldFlags::UNIQUE | FieldFlags::INDEXED);
    }
}

/// `CHECK` condition limiting `column` to the range of the canonical type
/// when it is narrower than the storage type.
fn range_check(column: &str, field: &FieldProperties) -> Option<String> {
    let (storage_min, storage_max) = field.type_at_database.integer_range()?;
    let (min, max) = field.data_type.integer_range()?;
    // Wider canonical ranges are stored reinterpreted, not range checked.
    if max > storage_max || (min <= storage_min && max >= storage_max) {
        return None;
    }
    Some(format!("{} >= {} AND {} <= {}", column, min, column, max))
}

/// SQL standard literal syntax.
fn render_literal_standard(value: &SqlValue) -> Result<String, DbError> {
    let literal = match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(true) => "TRUE".to_string(),
        SqlValue::Bool(false) => "FALSE".to_string(),
        SqlValue::Integer(v) => v.to_string(),
        SqlValue::Real(v) => render_real(*v)?,
        SqlValue::Decimal(d) => d.to_string(),
        SqlValue::Text(s) => quote_text(s),
        SqlValue::Blob(b) => format!("X'{}'", hex::encode_upper(b)),
        SqlValue::Timestamp(t) => quote_text(&t.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)),
    };
    Ok(literal)
}

pub(crate) fn quote_text(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

fn render_real(v: f64) -> Result<String, DbError> {
    if !v.is_finite() {
        return Err(DbError::invalid_argument(format!(
            "{} has no standard SQL literal",
            v
        )));
    }
    // Debug keeps the shortest form that parses back to the same bits.
    Ok(format!("{:?}", v))
}
