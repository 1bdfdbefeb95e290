use xdb_types::{DataType, FieldProperties, FieldSize};

use super::{
    normalize_identifier, quote_text, range_check, render_literal_standard, AutoIncrement,
    Catalog, Dialect, Encoding, StatementKind, TableFlags,
};
use crate::config::StorageConfig;
use crate::driver::{DriverError, SqlValue};
use crate::error::{DbError, ErrorKind};
use crate::statement::{Statement, StatementBuilder};

const DEFAULT_PORT: u16 = 5432;
const MAINTENANCE_DATABASE: &str = "postgres";
const DEFAULT_DECIMAL: FieldSize = FieldSize::Precision {
    precision: 65,
    scale: 30,
};

/// PostgreSQL adapter.
///
/// Tables live in `schema` (default `public`) of the connected database.
#[derive(Debug, Clone)]
pub struct PostgresDialect {
    schema: String,
}

impl PostgresDialect {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// `sslmode` for a connection: encrypted unless the server is local or
    /// the caller opted out for remote hosts.
    fn ssl_mode(config: &StorageConfig) -> &'static str {
        if config.require_secure_transport {
            "require"
        } else if config.is_loopback() || config.allow_insecure_transport {
            "prefer"
        } else {
            "require"
        }
    }
}

impl Default for PostgresDialect {
    fn default() -> Self {
        Self::new("public")
    }
}

/// Quotes a libpq key/value connection parameter when needed.
fn conn_value(value: &str) -> String {
    if !value.is_empty()
        && !value
            .chars()
            .any(|c| c.is_whitespace() || c == '\'' || c == '\\')
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn connection_string(
        &self,
        config: &StorageConfig,
        database: Option<&str>,
    ) -> Result<String, DbError> {
        let mut parts = vec![
            format!("host={}", conn_value(&config.server)),
            format!("port={}", config.port.unwrap_or(DEFAULT_PORT)),
            format!(
                "dbname={}",
                conn_value(database.unwrap_or(MAINTENANCE_DATABASE))
            ),
        ];
        if let Some(user) = &config.username {
            parts.push(format!("user={}", conn_value(user)));
        }
        if let Some(password) = &config.password {
            parts.push(format!("password={}", conn_value(password)));
        }
        parts.push(format!("sslmode={}", Self::ssl_mode(config)));
        parts.push(format!(
            "connect_timeout={}",
            config.connect_timeout_ms.div_ceil(1000).max(1)
        ));
        Ok(parts.join(" "))
    }

    fn catalog(&self, _config: &StorageConfig) -> Catalog {
        Catalog::Server {
            maintenance_database: MAINTENANCE_DATABASE.to_string(),
            list_databases: "SELECT datname::text FROM pg_database \
                             WHERE NOT datistemplate ORDER BY datname"
                .to_string(),
        }
    }

    fn table_names_query(&self, _database: &str) -> Statement {
        let mut builder = StatementBuilder::new(self, StatementKind::Query);
        builder
            .push(
                "SELECT table_name::text FROM information_schema.tables \
                 WHERE table_type = 'BASE TABLE' AND table_schema = ",
            )
            .push_text(&self.schema)
            .push(" ORDER BY table_name");
        builder.finish()
    }

    fn fully_qualified_name(&self, _database: &str, table: &str) -> String {
        format!(
            "{}.{}",
            self.escape_identifier(&self.schema),
            self.escape_identifier(table)
        )
    }

    fn render_literal(&self, value: &SqlValue) -> Result<String, DbError> {
        let literal = match value {
            SqlValue::Real(v) if v.is_nan() => "'NaN'::double precision".to_string(),
            SqlValue::Real(v) if v.is_infinite() => {
                let text = if *v > 0.0 { "'Infinity'" } else { "'-Infinity'" };
                format!("{}::double precision", text)
            }
            SqlValue::Blob(b) => format!("'\\x{}'::bytea", hex::encode(b)),
            SqlValue::Timestamp(t) => format!(
                "{}::timestamptz",
                quote_text(&t.to_rfc3339_opts(chrono::SecondsFormat::Micros, true))
            ),
            other => return render_literal_standard(other),
        };
        Ok(literal)
    }

    fn placeholder(&self, position: usize) -> String {
        format!("${}", position)
    }

    fn map_field(&self, field: &FieldProperties) -> FieldProperties {
        let mut mapped = field.clone();
        mapped.type_at_database = match field.data_type {
            DataType::Bool => DataType::Bool,
            DataType::Int8 | DataType::Int16 | DataType::UInt8 => DataType::Int16,
            DataType::Int32 | DataType::UInt16 => DataType::Int32,
            DataType::Int64 | DataType::UInt32 | DataType::TimeSpan | DataType::Enum => {
                DataType::Int64
            }
            DataType::UInt64 | DataType::Decimal => DataType::Decimal,
            DataType::Single => DataType::Single,
            DataType::Double => DataType::Double,
            DataType::String | DataType::Char | DataType::User => DataType::String,
            DataType::Binary => DataType::Binary,
            DataType::DateTime => DataType::DateTime,
        };
        if field.data_type == DataType::Decimal {
            mapped.size = self.decimal_precision(field.size);
        }
        normalize_identifier(&mut mapped);
        mapped
    }

    fn column_type(&self, field: &FieldProperties) -> String {
        match (field.type_at_database, field.data_type) {
            (DataType::Bool, _) => "BOOLEAN".to_string(),
            (DataType::Int16, _) => "SMALLINT".to_string(),
            (DataType::Int32, _) => "INTEGER".to_string(),
            (DataType::Int64, _) => "BIGINT".to_string(),
            (DataType::Single, _) => "REAL".to_string(),
            (DataType::Double, _) => "DOUBLE PRECISION".to_string(),
            (DataType::Decimal, DataType::UInt64) => "NUMERIC(20,0)".to_string(),
            (DataType::Decimal, _) => match self.decimal_precision(field.size) {
                FieldSize::Precision { precision, scale } => {
                    format!("NUMERIC({},{})", precision, scale)
                }
                _ => "NUMERIC".to_string(),
            },
            (DataType::String, DataType::Char) => "CHAR(1)".to_string(),
            (DataType::String, _) => match field.max_length() {
                Some(length) => format!("VARCHAR({})", length),
                None => "TEXT".to_string(),
            },
            (DataType::Binary, _) => "BYTEA".to_string(),
            (DataType::DateTime, _) => "TIMESTAMP WITH TIME ZONE".to_string(),
            _ => "TEXT".to_string(),
        }
    }

    fn check_constraint(&self, field: &FieldProperties) -> Option<String> {
        let column = self.escape_identifier(&field.name_at_database);
        if field.data_type == DataType::UInt64 {
            return Some(format!("{} >= 0 AND {} <= {}", column, column, u64::MAX));
        }
        range_check(&column, field)
    }

    fn auto_increment(&self, field: &FieldProperties) -> Result<AutoIncrement, DbError> {
        if !field.is_auto_increment() {
            return Ok(AutoIncrement::None);
        }
        match field.data_type {
            DataType::Int16 => Ok(AutoIncrement::ColumnType("SMALLSERIAL")),
            DataType::Int32 => Ok(AutoIncrement::ColumnType("SERIAL")),
            DataType::Int64 => Ok(AutoIncrement::ColumnType("BIGSERIAL")),
            other => Err(DbError::unsupported(format!(
                "field '{}': {} cannot auto increment",
                field.name, other
            ))),
        }
    }

    fn supports_in_memory(&self) -> bool {
        true
    }

    fn create_table_keyword(&self, flags: TableFlags) -> &'static str {
        if flags.contains(TableFlags::IN_MEMORY) {
            "CREATE UNLOGGED TABLE"
        } else {
            "CREATE TABLE"
        }
    }

    fn last_inserted_id_query(&self) -> &'static str {
        "SELECT lastval()"
    }

    fn schema_introspection_query(&self, _database: &str, table: &str) -> Statement {
        let mut builder = StatementBuilder::new(self, StatementKind::Query);
        builder
            .push(
                "SELECT c.column_name::text AS name, \
                 c.data_type::text AS data_type, \
                 (c.is_nullable = 'YES') AS nullable, \
                 c.character_maximum_length::int4 AS max_length, \
                 c.numeric_precision::int4 AS numeric_precision, \
                 c.numeric_scale::int4 AS numeric_scale, \
                 COALESCE(c.column_default LIKE 'nextval(%', false) AS auto_increment, \
                 EXISTS (SELECT 1 FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage k \
                 ON k.constraint_schema = tc.constraint_schema \
                 AND k.constraint_name = tc.constraint_name \
                 WHERE tc.constraint_type = 'PRIMARY KEY' \
                 AND tc.table_schema = c.table_schema AND tc.table_name = c.table_name \
                 AND k.column_name = c.column_name) AS identifier, \
                 EXISTS (SELECT 1 FROM pg_index i \
                 JOIN pg_class t ON t.oid = i.indrelid \
                 JOIN pg_namespace n ON n.oid = t.relnamespace \
                 JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = i.indkey[0] \
                 WHERE n.nspname = c.table_schema AND t.relname = c.table_name \
                 AND i.indnatts = 1 AND i.indisunique AND NOT i.indisprimary \
                 AND a.attname = c.column_name) AS is_unique, \
                 EXISTS (SELECT 1 FROM pg_index i \
                 JOIN pg_class t ON t.oid = i.indrelid \
                 JOIN pg_namespace n ON n.oid = t.relnamespace \
                 JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = i.indkey[0] \
                 WHERE n.nspname = c.table_schema AND t.relname = c.table_name \
                 AND i.indnatts = 1 AND NOT i.indisunique \
                 AND a.attname = c.column_name) AS indexed \
                 FROM information_schema.columns c WHERE c.table_schema = ",
            )
            .push_text(&self.schema)
            .push(" AND c.table_name = ")
            .push_text(table)
            .push(" ORDER BY c.ordinal_position");
        builder.finish()
    }

    fn type_from_database(&self, type_name: &str) -> DataType {
        match type_name.to_ascii_lowercase().as_str() {
            "boolean" => DataType::Bool,
            "smallint" => DataType::Int16,
            "integer" => DataType::Int32,
            "bigint" => DataType::Int64,
            "numeric" => DataType::Decimal,
            "real" => DataType::Single,
            "double precision" => DataType::Double,
            "text" | "character varying" | "character" => DataType::String,
            "bytea" => DataType::Binary,
            "timestamp with time zone" | "timestamp without time zone" => DataType::DateTime,
            _ => DataType::User,
        }
    }

    fn encoding(&self) -> Encoding {
        Encoding {
            native_bool: true,
            numeric_unsigned_64: true,
            native_decimal: true,
            native_timestamp: true,
            stores_nan: true,
        }
    }

    fn decimal_precision(&self, requested: FieldSize) -> FieldSize {
        match requested {
            FieldSize::Precision { .. } => requested,
            _ => DEFAULT_DECIMAL,
        }
    }

    fn classify_error(&self, error: &DriverError) -> ErrorKind {
        let code = error.code().unwrap_or_default();
        match code {
            "23505" => ErrorKind::DuplicateKey,
            "42P01" | "3D000" => ErrorKind::NotFound,
            "42P07" | "42P04" | "42710" => ErrorKind::AlreadyExists,
            "42703" | "42804" => ErrorKind::SchemaMismatch,
            "0A000" => ErrorKind::UnsupportedOperation,
            "57P01" | "57P02" | "57P03" => ErrorKind::ConnectionFailure,
            _ if code.starts_with("23") || code.starts_with("22") => ErrorKind::InvalidArgument,
            _ if code.starts_with("08") || code.starts_with("28") || code.starts_with("53") => {
                ErrorKind::ConnectionFailure
            }
            _ if error.is_connection_lost() => ErrorKind::ConnectionFailure,
            _ => ErrorKind::UnsupportedOperation,
        }
    }
}
