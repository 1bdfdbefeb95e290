use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use xdb_types::{DataType, FieldProperties, FieldSize, RowLayout};

use super::{
    normalize_identifier, on_conflict_clause, AutoIncrement, Catalog, Dialect, Encoding, ParameterMode,
    StatementKind, TableFlags,
};
use crate::config::StorageConfig;
use crate::driver::DriverError;
use crate::error::{DbError, ErrorKind};
use crate::statement::{Statement, StatementBuilder};

/// File extension of database files.
pub const DATABASE_EXTENSION: &str = "db";

/// Significant digits kept by a REAL column.
const REAL_DIGITS: u8 = 15;

/// Declared column type per canonical type. Each name resolves to the
/// storage class of the canonical type under the column affinity rules and
/// is read back to recover the canonical type.
const DECLARED_TYPES: [(DataType, &str); 19] = [
    (DataType::Bool, "BOOL INTEGER"),
    (DataType::Int8, "INT8"),
    (DataType::Int16, "INT16"),
    (DataType::Int32, "INT32"),
    (DataType::Int64, "INTEGER"),
    (DataType::UInt8, "UINT8"),
    (DataType::UInt16, "UINT16"),
    (DataType::UInt32, "UINT32"),
    (DataType::UInt64, "UINT64"),
    (DataType::Enum, "ENUM INTEGER"),
    (DataType::TimeSpan, "TIMESPAN INTEGER"),
    (DataType::Single, "SINGLE REAL"),
    (DataType::Double, "REAL"),
    (DataType::Decimal, "DECIMAL REAL"),
    (DataType::String, "TEXT"),
    (DataType::Char, "CHAR TEXT"),
    (DataType::User, "USER TEXT"),
    (DataType::DateTime, "DATETIME TEXT"),
    (DataType::Binary, "BLOB"),
];

/// Characters with a meaning inside `file:` URIs.
const URI_PATH: &AsciiSet = &CONTROLS.add(b' ').add(b'#').add(b'%').add(b'?');

/// SQLite adapter.
///
/// Each database is a file named `<database>.db` in the configured
/// location. Tables are addressed without a qualifier because every
/// connection is bound to one file.
#[derive(Debug, Clone)]
pub struct SqliteDialect {
    native_upsert: bool,
    use_parameters: bool,
}

impl SqliteDialect {
    pub fn new() -> Self {
        Self {
            native_upsert: true,
            use_parameters: true,
        }
    }

    /// Disables `ON CONFLICT` so replacements take the read-modify-write path.
    #[must_use]
    pub fn without_native_upsert(mut self) -> Self {
        self.native_upsert = false;
        self
    }

    /// Renders every value as a literal instead of binding parameters.
    #[must_use]
    pub fn without_parameters(mut self) -> Self {
        self.use_parameters = false;
        self
    }

    /// SQLite extended result codes.
    fn classify_code(code: i32) -> Option<ErrorKind> {
        let kind = match code {
            // SQLITE_CONSTRAINT_UNIQUE, SQLITE_CONSTRAINT_PRIMARYKEY
            2067 | 1555 => ErrorKind::DuplicateKey,
            // SQLITE_CONSTRAINT_CHECK, _NOTNULL, _FOREIGNKEY, SQLITE_MISMATCH, SQLITE_TOOBIG
            275 | 1299 | 787 | 20 | 18 => ErrorKind::InvalidArgument,
            _ => match code & 0xff {
                // CANTOPEN, NOTADB, IOERR, PERM, AUTH, BUSY, LOCKED, READONLY
                14 | 26 | 10 | 3 | 23 | 5 | 6 | 8 => ErrorKind::ConnectionFailure,
                // CONSTRAINT
                19 => ErrorKind::InvalidArgument,
                _ => return None,
            },
        };
        Some(kind)
    }
}

impl Default for SqliteDialect {
    fn default() -> Self {
        Self::new()
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn connection_string(
        &self,
        config: &StorageConfig,
        database: Option<&str>,
    ) -> Result<String, DbError> {
        let database = database.ok_or_else(|| {
            DbError::unsupported("sqlite has no server to connect to without a database")
        })?;
        let path = config
            .location
            .join(format!("{}.{}", database, DATABASE_EXTENSION));
        let path = path.to_string_lossy().replace('\\', "/");
        Ok(format!(
            "file:{}?mode=rw",
            utf8_percent_encode(&path, URI_PATH)
        ))
    }

    fn catalog(&self, config: &StorageConfig) -> Catalog {
        Catalog::Files {
            directory: config.location.clone(),
            extension: DATABASE_EXTENSION,
        }
    }

    fn table_names_query(&self, _database: &str) -> Statement {
        Statement::new(
            StatementKind::Query,
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' ORDER BY name",
        )
    }

    fn fully_qualified_name(&self, _database: &str, table: &str) -> String {
        self.escape_identifier(table)
    }

    fn parameter_mode(&self, kind: StatementKind) -> ParameterMode {
        if self.use_parameters && kind != StatementKind::Ddl {
            ParameterMode::Parameterized
        } else {
            ParameterMode::Literal
        }
    }

    fn placeholder(&self, position: usize) -> String {
        format!("?{}", position)
    }

    fn map_field(&self, field: &FieldProperties) -> FieldProperties {
        let mut mapped = field.clone();
        mapped.type_at_database = match field.data_type {
            DataType::Single | DataType::Double | DataType::Decimal => DataType::Double,
            DataType::String | DataType::Char | DataType::User | DataType::DateTime => {
                DataType::String
            }
            DataType::Binary => DataType::Binary,
            _ => DataType::Int64,
        };
        if field.data_type == DataType::Decimal {
            mapped.size = self.decimal_precision(field.size);
        }
        normalize_identifier(&mut mapped);
        mapped
    }

    fn column_type(&self, field: &FieldProperties) -> String {
        // Only INTEGER PRIMARY KEY aliases the rowid.
        if field.is_auto_increment() {
            return "INTEGER".to_string();
        }
        DECLARED_TYPES
            .iter()
            .find(|(ty, _)| *ty == field.data_type)
            .map_or("BLOB", |(_, declared)| declared)
            .to_string()
    }

    fn auto_increment(&self, field: &FieldProperties) -> Result<AutoIncrement, DbError> {
        if !field.is_auto_increment() {
            return Ok(AutoIncrement::None);
        }
        if !field.is_identifier() {
            return Err(DbError::unsupported(format!(
                "field '{}': sqlite only auto increments the primary key",
                field.name
            )));
        }
        Ok(AutoIncrement::Keyword("AUTOINCREMENT"))
    }

    fn validate_layout(&self, layout: &RowLayout, flags: TableFlags) -> Result<(), DbError> {
        if flags.contains(TableFlags::IN_MEMORY) {
            return Err(DbError::unsupported(format!(
                "sqlite cannot create in-memory table '{}' inside a database file",
                layout.name()
            )));
        }
        for field in layout.fields() {
            self.validate_field(field)?;
        }
        if layout.auto_increment_identifier().is_some() && layout.identifier_fields().count() > 1
        {
            return Err(DbError::unsupported(format!(
                "table '{}': sqlite cannot auto increment part of a composite key",
                layout.name()
            )));
        }
        Ok(())
    }

    fn supports_native_upsert(&self) -> bool {
        self.native_upsert
    }

    fn upsert_clause(&self, layout: &RowLayout) -> Result<String, DbError> {
        if !self.native_upsert {
            return Err(DbError::unsupported("native upsert disabled"));
        }
        on_conflict_clause(self, layout)
    }

    fn last_inserted_id_query(&self) -> &'static str {
        "SELECT last_insert_rowid()"
    }

    fn schema_introspection_query(&self, _database: &str, table: &str) -> Statement {
        let mut builder = StatementBuilder::new(self, StatementKind::Query);
        builder
            .push(
                "SELECT p.name AS name, p.type AS data_type, (p.\"notnull\" = 0) AS nullable, \
                 NULL AS max_length, NULL AS numeric_precision, NULL AS numeric_scale, \
                 (p.pk > 0 AND EXISTS (SELECT 1 FROM sqlite_master m \
                 WHERE m.type = 'table' AND m.name = ",
            )
            .push_text(table)
            .push(
                " AND upper(m.sql) LIKE '%AUTOINCREMENT%')) AS auto_increment, \
                 (p.pk > 0) AS identifier, \
                 EXISTS (SELECT 1 FROM pragma_index_list(",
            )
            .push_text(table)
            .push(
                ") il WHERE il.\"unique\" = 1 AND il.origin <> 'pk' \
                 AND (SELECT count(*) FROM pragma_index_info(il.name)) = 1 \
                 AND (SELECT ii.name FROM pragma_index_info(il.name) ii) = p.name) AS is_unique, \
                 EXISTS (SELECT 1 FROM pragma_index_list(",
            )
            .push_text(table)
            .push(
                ") il WHERE il.\"unique\" = 0 \
                 AND (SELECT count(*) FROM pragma_index_info(il.name)) = 1 \
                 AND (SELECT ii.name FROM pragma_index_info(il.name) ii) = p.name) AS indexed \
                 FROM pragma_table_info(",
            )
            .push_text(table)
            .push(") p ORDER BY p.cid");
        builder.finish()
    }

    fn type_from_database(&self, type_name: &str) -> DataType {
        // Column affinity rules.
        let upper = type_name.to_ascii_uppercase();
        if upper.contains("INT") {
            DataType::Int64
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            DataType::String
        } else if upper.is_empty() || upper.contains("BLOB") {
            DataType::Binary
        } else {
            DataType::Double
        }
    }

    fn canonical_type_from_database(&self, type_name: &str) -> Option<DataType> {
        DECLARED_TYPES
            .iter()
            .find(|(_, declared)| declared.eq_ignore_ascii_case(type_name.trim()))
            .map(|(ty, _)| *ty)
    }

    fn records_canonical_types(&self) -> bool {
        true
    }

    fn encoding(&self) -> Encoding {
        Encoding {
            native_bool: false,
            numeric_unsigned_64: false,
            native_decimal: false,
            native_timestamp: false,
            stores_nan: false,
        }
    }

    /// A REAL keeps about 15 significant digits. Integer digits are kept
    /// first and the scale shrinks to fit; undeclared precision stays
    /// undeclared.
    fn decimal_precision(&self, requested: FieldSize) -> FieldSize {
        let FieldSize::Precision { precision, scale } = requested else {
            return requested;
        };
        let integer = precision.saturating_sub(scale).min(REAL_DIGITS);
        let scale = scale.min(REAL_DIGITS - integer);
        FieldSize::Precision {
            precision: integer + scale,
            scale,
        }
    }

    fn classify_error(&self, error: &DriverError) -> ErrorKind {
        if let Some(kind) = error
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .and_then(Self::classify_code)
        {
            return kind;
        }
        let message = error.message().to_ascii_lowercase();
        if message.contains("no such table") {
            ErrorKind::NotFound
        } else if message.contains("already exists") {
            ErrorKind::AlreadyExists
        } else if message.contains("no such column") || message.contains("has no column") {
            ErrorKind::SchemaMismatch
        } else if error.is_connection_lost() {
            ErrorKind::ConnectionFailure
        } else {
            ErrorKind::UnsupportedOperation
        }
    }
}
