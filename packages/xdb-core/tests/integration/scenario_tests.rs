//! End-to-end scenarios: identifier generation, unsigned bounds and
//! non-durable tables.

use ntest::timeout;

use xdb_core::{
    DataType, ErrorKind, FieldBuilder, Row, RowLayout, Statement, StatementKind, TableFlags,
    Value,
};

use super::helpers::{users_layout, Fixture};

#[timeout(5000)]
#[test]
fn test_generated_identifier_and_unique_name() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let users = fixture
        .database()?
        .create_table(&users_layout()?, TableFlags::NONE)?;

    let row = users.insert(Row::new(vec![Value::Null, "a".into()]))?;
    assert_eq!(row[0], Value::Int64(1));

    let err = users
        .insert(Row::new(vec![Value::Null, "a".into()]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateKey);

    users.update(Row::new(vec![Value::Int64(1), "b".into()]))?;
    assert_eq!(users.get_row_by_id(1i64)?[1], Value::from("b"));
    Ok(())
}

fn unsigned_layout(ty: DataType) -> anyhow::Result<RowLayout> {
    Ok(RowLayout::builder(format!("t_{}", ty.to_string().to_lowercase()))
        .field(FieldBuilder::new("id", DataType::Int32).identifier())
        .field(FieldBuilder::new("value", ty))
        .build()?)
}

#[timeout(5000)]
#[test]
fn test_unsigned_32_bounds() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let table = fixture
        .database()?
        .create_table(&unsigned_layout(DataType::UInt32)?, TableFlags::NONE)?;

    table.insert(Row::new(vec![Value::Int32(1), Value::UInt32(u32::MAX)]))?;
    assert_eq!(table.get_row_by_id(1)?[1], Value::UInt32(4_294_967_295));

    let err = table
        .insert(Row::new(vec![Value::Int32(2), Value::Int32(-1)]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.driver_error().is_none());
    assert_eq!(table.count()?, 1);
    Ok(())
}

#[timeout(5000)]
#[test]
fn test_unsigned_maximums() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let database = fixture.database()?;
    let cases = [
        (DataType::UInt8, u8::MAX as i64),
        (DataType::UInt16, u16::MAX as i64),
        (DataType::UInt32, u32::MAX as i64),
    ];
    for (ty, max) in cases {
        let table = database.create_table(&unsigned_layout(ty)?, TableFlags::NONE)?;
        table.insert(Row::new(vec![Value::Int32(1), Value::Int64(max)]))?;
        assert_eq!(table.get_row_by_id(1)?[1].as_i64(), Some(max), "{}", ty);

        let err = table
            .insert(Row::new(vec![Value::Int32(2), Value::Int64(max + 1)]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{}", ty);
    }

    let table = database.create_table(&unsigned_layout(DataType::UInt64)?, TableFlags::NONE)?;
    table.insert(Row::new(vec![Value::Int32(1), Value::UInt64(u64::MAX)]))?;
    assert_eq!(table.get_row_by_id(1)?[1], Value::UInt64(u64::MAX));
    Ok(())
}

#[timeout(5000)]
#[test]
fn test_engine_enforces_unsigned_range() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let database = fixture.database()?;
    let table = database.create_table(&unsigned_layout(DataType::UInt8)?, TableFlags::NONE)?;

    // Bypass the value checks to reach the CHECK constraint.
    let statement = Statement::new(
        StatementKind::Dml,
        format!("INSERT INTO {} (\"id\", \"value\") VALUES (1, 256)", table.qualified_name()),
    );
    let err = fixture
        .storage
        .execute(Some(database.name()), Some(table.name()), &statement)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert!(err.driver_error().is_some());
    Ok(())
}

#[timeout(5000)]
#[test]
fn test_in_memory_table_is_refused_before_ddl() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let database = fixture.database()?;
    let err = database
        .create_table(&users_layout()?, TableFlags::IN_MEMORY)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    assert!(!database.has_table("users")?);
    Ok(())
}

#[timeout(5000)]
#[test]
fn test_invalid_layout_sends_no_ddl() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let database = fixture.database()?;
    let layout = RowLayout::builder("broken")
        .field(FieldBuilder::new("id", DataType::Int32).identifier())
        .field(FieldBuilder::new("ok", DataType::Int32).indexed())
        .field(FieldBuilder::new("bad", DataType::Double).auto_increment())
        .build()?;
    let err = database.create_table(&layout, TableFlags::NONE).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedOperation);
    assert!(database.table_names()?.is_empty());
    Ok(())
}
