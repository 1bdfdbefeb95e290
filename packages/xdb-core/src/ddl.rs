//! Compiles row layouts into DDL.

use xdb_types::{RowLayout, MAX_NAME_LENGTH};

use crate::dialect::{Dialect, StatementKind, TableFlags};
use crate::error::DbError;
use crate::statement::Statement;

/// Statements creating `layout` in `database`: the CREATE TABLE followed by
/// one CREATE INDEX per indexed field.
///
/// The whole layout is validated first, so an invalid layout yields an
/// error and no statements.
pub fn create_table(
    dialect: &dyn Dialect,
    database: &str,
    layout: &RowLayout,
    flags: TableFlags,
) -> Result<Vec<Statement>, DbError> {
    let mapped = dialect.map_layout(layout)?;
    dialect.validate_layout(&mapped, flags)?;

    let table = dialect.fully_qualified_name(database, mapped.name());
    let keys: Vec<String> = mapped
        .identifier_fields()
        .map(|f| dialect.escape_identifier(&f.name_at_database))
        .collect();
    let inline_primary_key = keys.len() == 1;

    let mut columns = Vec::with_capacity(mapped.field_count() + 1);
    for field in mapped.fields() {
        columns.push(dialect.column_ddl(field, inline_primary_key)?);
    }
    if keys.len() > 1 {
        columns.push(format!("PRIMARY KEY ({})", keys.join(", ")));
    }

    let mut statements = vec![Statement::new(
        StatementKind::Ddl,
        format!(
            "{} {} ({})",
            dialect.create_table_keyword(flags),
            table,
            columns.join(", ")
        ),
    )];
    // Identifiers are indexed by their primary key already.
    for field in mapped.fields().iter().filter(|f| f.is_indexed()) {
        let index = index_name(mapped.name(), &field.name_at_database);
        statements.push(Statement::new(
            StatementKind::Ddl,
            format!(
                "CREATE INDEX {} ON {} ({})",
                dialect.escape_identifier(&index),
                table,
                dialect.escape_identifier(&field.name_at_database)
            ),
        ));
    }
    Ok(statements)
}

/// `ix_<table>_<column>`, shortened to the identifier limit with a checksum
/// of the full name so that shortened names stay distinct.
fn index_name(table: &str, column: &str) -> String {
    let name = format!("ix_{}_{}", table, column);
    if name.len() <= MAX_NAME_LENGTH {
        return name;
    }
    let checksum = crc32fast::hash(name.as_bytes());
    let mut end = MAX_NAME_LENGTH - 9;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}_{:08x}", &name[..end], checksum)
}

pub fn drop_table(dialect: &dyn Dialect, database: &str, table: &str) -> Statement {
    Statement::new(
        StatementKind::Ddl,
        format!(
            "DROP TABLE {}",
            dialect.fully_qualified_name(database, table)
        ),
    )
}
