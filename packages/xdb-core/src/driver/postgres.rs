//! PostgreSQL driver built on the synchronous postgres client.

use std::error::Error as StdError;
use std::str::FromStr;
use std::time::Duration;

use ::postgres::config::SslMode;
use ::postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use ::postgres::{Client, Config, NoTls, Row};
use bytes::BytesMut;
use chrono::{DateTime, NaiveDateTime, Utc};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use super::{Driver, DriverConnection, DriverError, ResultSet, SqlValue};

/// Opens PostgreSQL sessions.
///
/// Connection strings use the libpq key/value format. TLS follows the
/// `sslmode` of the string: `disable` connects in plain text, every other
/// mode negotiates TLS through native-tls.
#[derive(Debug, Clone)]
pub struct PostgresDriver {
    connect_timeout: Duration,
}

impl PostgresDriver {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Driver for PostgresDriver {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn open(&self, connection_string: &str) -> Result<Box<dyn DriverConnection>, DriverError> {
        let mut config = Config::from_str(connection_string)
            .map_err(|e| DriverError::wrap(None, e).connection_lost())?;
        config.connect_timeout(self.connect_timeout);
        let client = if config.get_ssl_mode() == SslMode::Disable {
            config.connect(NoTls)
        } else {
            let connector = TlsConnector::builder()
                .build()
                .map_err(|e| DriverError::wrap(None, e).connection_lost())?;
            config.connect(MakeTlsConnector::new(connector))
        }
        .map_err(|e| map_error(e).connection_lost())?;
        Ok(Box::new(PostgresConnection { client }))
    }
}

struct PostgresConnection {
    client: Client,
}

impl PostgresConnection {
    fn bind(params: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
        params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
    }
}

impl DriverConnection for PostgresConnection {
    fn execute(&mut self, sql: &str, params: &[SqlValue]) -> Result<u64, DriverError> {
        if params.is_empty() {
            // Simple protocol: allows multi-statement DDL without a prepare round trip.
            return self
                .client
                .simple_query(sql)
                .map(|messages| {
                    messages
                        .iter()
                        .filter_map(|m| match m {
                            ::postgres::SimpleQueryMessage::CommandComplete(n) => Some(*n),
                            _ => None,
                        })
                        .sum()
                })
                .map_err(map_error);
        }
        self.client
            .execute(sql, &Self::bind(params))
            .map_err(map_error)
    }

    fn query(&mut self, sql: &str, params: &[SqlValue]) -> Result<ResultSet, DriverError> {
        let statement = self.client.prepare(sql).map_err(map_error)?;
        let columns = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let rows = self
            .client
            .query(&statement, &Self::bind(params))
            .map_err(map_error)?;
        let rows = rows
            .iter()
            .map(read_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ResultSet { columns, rows })
    }

    fn close(self: Box<Self>) -> Result<(), DriverError> {
        self.client.close().map_err(map_error)
    }
}

fn read_row(row: &Row) -> Result<Vec<SqlValue>, DriverError> {
    (0..row.len())
        .map(|i| read_column(row, i).map_err(map_error))
        .collect()
}

fn read_column(row: &Row, i: usize) -> Result<SqlValue, ::postgres::Error> {
    let ty = row.columns()[i].type_().clone();
    let value = match ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(i)?.map(SqlValue::Bool),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(i)?
            .map(|v| SqlValue::Integer(v as i64)),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(i)?
            .map(|v| SqlValue::Integer(v as i64)),
        Type::INT8 => row.try_get::<_, Option<i64>>(i)?.map(SqlValue::Integer),
        Type::OID => row
            .try_get::<_, Option<u32>>(i)?
            .map(|v| SqlValue::Integer(v as i64)),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(i)?
            .map(|v| SqlValue::Real(v as f64)),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(i)?.map(SqlValue::Real),
        Type::NUMERIC => row.try_get::<_, Option<Decimal>>(i)?.map(SqlValue::Decimal),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(i)?.map(SqlValue::Blob),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(i)?
            .map(SqlValue::Timestamp),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(i)?
            .map(|v| SqlValue::Timestamp(v.and_utc())),
        _ => row.try_get::<_, Option<String>>(i)?.map(SqlValue::Text),
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        // Parameters are typed by the server from the column they bind to,
        // so integers and reals are narrowed or widened to that type here.
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(v) => v.to_sql(ty, out),
            SqlValue::Integer(v) => match *ty {
                Type::INT2 => i16::try_from(*v)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*v)?.to_sql(ty, out),
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                Type::FLOAT8 => (*v as f64).to_sql(ty, out),
                Type::NUMERIC => Decimal::from(*v).to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            SqlValue::Real(v) => match *ty {
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                Type::NUMERIC => Decimal::from_f64(*v)
                    .ok_or("real value does not fit numeric")?
                    .to_sql(ty, out),
                _ => v.to_sql(ty, out),
            },
            SqlValue::Decimal(d) => d.to_sql(ty, out),
            SqlValue::Text(s) => s.as_str().to_sql(ty, out),
            SqlValue::Blob(b) => b.as_slice().to_sql(ty, out),
            SqlValue::Timestamp(t) => match *ty {
                Type::TIMESTAMP => t.naive_utc().to_sql(ty, out),
                _ => t.to_sql(ty, out),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn map_error(e: ::postgres::Error) -> DriverError {
    let code = e.code().map(|state| state.code().to_string());
    let lost = e.is_closed();
    let error = DriverError::wrap(code, e);
    if lost {
        error.connection_lost()
    } else {
        error
    }
}
