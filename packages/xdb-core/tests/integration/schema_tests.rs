//! Opening existing tables against an expected layout.

use ntest::timeout;

use xdb_core::{DataType, ErrorKind, FieldBuilder, Row, RowLayout, TableFlags, Value};

use super::helpers::{users_layout, Fixture};

fn customers() -> RowLayout {
    RowLayout::builder("customers")
        .field(FieldBuilder::new("id", DataType::Int32).identifier())
        .field(FieldBuilder::new("email", DataType::String).max_length(64).unique())
        .field(FieldBuilder::new("city", DataType::String).indexed().nullable())
        .field(FieldBuilder::new("joined", DataType::DateTime))
        .build()
        .unwrap()
}

fn assert_mismatch(result: Result<xdb_core::Table, xdb_core::DbError>) {
    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaMismatch, "{}", err);
}

#[timeout(5000)]
#[test]
fn test_open_table_with_matching_layout() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let database = fixture.database()?;
    database.create_table(&customers(), TableFlags::NONE)?;
    database.create_table(&users_layout()?, TableFlags::NONE)?;

    let opened = database.open_table(&customers())?;
    assert_eq!(opened.layout(), &customers());
    let users = database.open_table(&users_layout()?)?;
    let row = users.insert(Row::new(vec![Value::Null, "a".into()]))?;
    assert_eq!(row[0], Value::Int64(1));
    Ok(())
}

#[timeout(5000)]
#[test]
fn test_open_table_detects_differences() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let database = fixture.database()?;
    database.create_table(&customers(), TableFlags::NONE)?;

    let extra_field = RowLayout::builder("customers")
        .field(FieldBuilder::new("id", DataType::Int32).identifier())
        .field(FieldBuilder::new("email", DataType::String).max_length(64).unique())
        .field(FieldBuilder::new("city", DataType::String).indexed().nullable())
        .field(FieldBuilder::new("joined", DataType::DateTime))
        .field(FieldBuilder::new("vip", DataType::Bool))
        .build()?;
    assert_mismatch(database.open_table(&extra_field));

    let swapped = RowLayout::builder("customers")
        .field(FieldBuilder::new("id", DataType::Int32).identifier())
        .field(FieldBuilder::new("city", DataType::String).indexed().nullable())
        .field(FieldBuilder::new("email", DataType::String).max_length(64).unique())
        .field(FieldBuilder::new("joined", DataType::DateTime))
        .build()?;
    assert_mismatch(database.open_table(&swapped));

    let retyped = RowLayout::builder("customers")
        .field(FieldBuilder::new("id", DataType::Int32).identifier())
        .field(FieldBuilder::new("email", DataType::Binary).unique())
        .field(FieldBuilder::new("city", DataType::String).indexed().nullable())
        .field(FieldBuilder::new("joined", DataType::DateTime))
        .build()?;
    assert_mismatch(database.open_table(&retyped));

    let not_unique = RowLayout::builder("customers")
        .field(FieldBuilder::new("id", DataType::Int32).identifier())
        .field(FieldBuilder::new("email", DataType::String).max_length(64))
        .field(FieldBuilder::new("city", DataType::String).indexed().nullable())
        .field(FieldBuilder::new("joined", DataType::DateTime))
        .build()?;
    assert_mismatch(database.open_table(&not_unique));

    let not_indexed = RowLayout::builder("customers")
        .field(FieldBuilder::new("id", DataType::Int32).identifier())
        .field(FieldBuilder::new("email", DataType::String).max_length(64).unique())
        .field(FieldBuilder::new("city", DataType::String).nullable())
        .field(FieldBuilder::new("joined", DataType::DateTime))
        .build()?;
    assert_mismatch(database.open_table(&not_indexed));

    let required = RowLayout::builder("customers")
        .field(FieldBuilder::new("id", DataType::Int32).identifier())
        .field(FieldBuilder::new("email", DataType::String).max_length(64).unique())
        .field(FieldBuilder::new("city", DataType::String).indexed())
        .field(FieldBuilder::new("joined", DataType::DateTime))
        .build()?;
    assert_mismatch(database.open_table(&required));
    Ok(())
}

#[timeout(5000)]
#[test]
fn test_open_table_detects_same_storage_class_retyping() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let database = fixture.database()?;
    let readings = |value: DataType, label: DataType| {
        RowLayout::builder("readings")
            .field(FieldBuilder::new("id", DataType::Int32).identifier().auto_increment())
            .field(FieldBuilder::new("value", value))
            .field(FieldBuilder::new("label", label))
            .build()
    };
    database.create_table(&readings(DataType::Int32, DataType::String)?, TableFlags::NONE)?;

    let table = database.open_table(&readings(DataType::Int32, DataType::String)?)?;
    let row = table.insert(Row::new(vec![Value::Null, Value::Int32(7), "seven".into()]))?;
    assert_eq!(row[0], Value::Int32(1));

    assert_mismatch(database.open_table(&readings(DataType::Bool, DataType::String)?));
    assert_mismatch(database.open_table(&readings(DataType::Int32, DataType::DateTime)?));
    assert_mismatch(database.open_table(&readings(DataType::Int64, DataType::String)?));

    let live = database.get_table("readings")?;
    let types: Vec<DataType> = live.layout().fields().iter().map(|f| f.data_type).collect();
    // The generated key is declared INTEGER whatever its width.
    assert_eq!(types, vec![DataType::Int64, DataType::Int32, DataType::String]);
    Ok(())
}

#[timeout(5000)]
#[test]
fn test_open_missing_table() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let database = fixture.database()?;
    let err = database.open_table(&customers()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    Ok(())
}

#[timeout(5000)]
#[test]
fn test_drop_then_recreate_with_new_layout() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let database = fixture.database()?;
    database.create_table(&customers(), TableFlags::NONE)?;
    database.drop_table("customers")?;

    let slim = RowLayout::builder("customers")
        .field(FieldBuilder::new("id", DataType::Int32).identifier())
        .build()?;
    database.create_table(&slim, TableFlags::NONE)?;
    assert_mismatch(database.open_table(&customers()));
    let table = database.open_table(&slim)?;
    table.insert(Row::new(vec![Value::Int32(4)]))?;
    assert!(table.exists_by_id(4)?);
    // Only key columns: update just checks presence.
    table.update(Row::new(vec![Value::Int32(4)]))?;
    assert_eq!(
        table.update(Row::new(vec![Value::Int32(5)])).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    Ok(())
}
