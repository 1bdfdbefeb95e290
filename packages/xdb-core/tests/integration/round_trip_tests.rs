//! Every data type written and read back, including boundary values.

use ntest::timeout;

use xdb_core::{
    DataType, Dialect, ErrorKind, FieldBuilder, Row, RowLayout, SqliteDialect, TableFlags, Value,
};
use xdb_types::chrono::{Duration, TimeZone, Utc};
use xdb_types::rust_decimal::Decimal;

use super::helpers::Fixture;

fn samples_layout() -> anyhow::Result<RowLayout> {
    Ok(RowLayout::builder("samples")
        .field(FieldBuilder::new("id", DataType::Int32).identifier())
        .field(FieldBuilder::new("b", DataType::Bool))
        .field(FieldBuilder::new("i8", DataType::Int8))
        .field(FieldBuilder::new("i16", DataType::Int16))
        .field(FieldBuilder::new("i32", DataType::Int32))
        .field(FieldBuilder::new("i64", DataType::Int64))
        .field(FieldBuilder::new("u8", DataType::UInt8))
        .field(FieldBuilder::new("u16", DataType::UInt16))
        .field(FieldBuilder::new("u32", DataType::UInt32))
        .field(FieldBuilder::new("u64", DataType::UInt64))
        .field(FieldBuilder::new("f", DataType::Single))
        .field(FieldBuilder::new("d", DataType::Double))
        .field(FieldBuilder::new("m", DataType::Decimal).precision(12, 4))
        .field(FieldBuilder::new("s", DataType::String).nullable())
        .field(FieldBuilder::new("c", DataType::Char))
        .field(FieldBuilder::new("bin", DataType::Binary))
        .field(FieldBuilder::new("at", DataType::DateTime))
        .field(FieldBuilder::new("span", DataType::TimeSpan))
        .field(FieldBuilder::new("e", DataType::Enum))
        .field(FieldBuilder::new("u", DataType::User))
        .build()?)
}

fn minimums(id: i32) -> Row {
    Row::new(vec![
        Value::Int32(id),
        Value::Bool(false),
        Value::Int8(i8::MIN),
        Value::Int16(i16::MIN),
        Value::Int32(i32::MIN),
        Value::Int64(i64::MIN),
        Value::UInt8(0),
        Value::UInt16(0),
        Value::UInt32(0),
        Value::UInt64(0),
        Value::Single(-3.25),
        Value::Double(-0.125),
        Value::Decimal(Decimal::new(-99_999_999_9999, 4)),
        Value::Null,
        Value::Char('\''),
        Value::Binary(vec![0]),
        Value::DateTime(Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 0).unwrap()),
        Value::TimeSpan(Duration::microseconds(-1)),
        Value::Enum(i64::MIN),
        Value::User(String::new()),
    ])
}

fn maximums(id: i32) -> Row {
    Row::new(vec![
        Value::Int32(id),
        Value::Bool(true),
        Value::Int8(i8::MAX),
        Value::Int16(i16::MAX),
        Value::Int32(i32::MAX),
        Value::Int64(i64::MAX),
        Value::UInt8(u8::MAX),
        Value::UInt16(u16::MAX),
        Value::UInt32(u32::MAX),
        Value::UInt64(u64::MAX),
        Value::Single(1024.5),
        Value::Double(1.0e15),
        Value::Decimal(Decimal::new(99_999_999_9999, 4)),
        Value::String("ünïcödé 'quoted' \"double\"".to_string()),
        Value::Char('€'),
        Value::Binary((0..=255).collect()),
        Value::DateTime(
            Utc.with_ymd_and_hms(2038, 1, 19, 3, 14, 7).unwrap() + Duration::microseconds(999_999),
        ),
        Value::TimeSpan(Duration::days(365 * 100)),
        Value::Enum(i64::MAX),
        Value::User("{\"kind\":\"custom\"}".to_string()),
    ])
}

fn check_round_trip(dialect: SqliteDialect) -> anyhow::Result<()> {
    let fixture = Fixture::with(dialect, |_| {})?;
    let table = fixture
        .database()?
        .create_table(&samples_layout()?, TableFlags::NONE)?;

    for row in [minimums(1), maximums(2)] {
        table.insert(row.clone())?;
        let id = row[0].clone();
        assert_eq!(table.get_row(&[id])?, row);
    }
    Ok(())
}

#[timeout(5000)]
#[test]
fn test_round_trip_parameterized() -> anyhow::Result<()> {
    check_round_trip(SqliteDialect::new())
}

#[timeout(5000)]
#[test]
fn test_round_trip_literal() -> anyhow::Result<()> {
    check_round_trip(SqliteDialect::new().without_parameters())
}

#[timeout(5000)]
#[test]
fn test_date_time_is_truncated_to_dialect_precision() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let layout = RowLayout::builder("events")
        .field(FieldBuilder::new("id", DataType::Int32).identifier())
        .field(FieldBuilder::new("at", DataType::DateTime))
        .build()?;
    let table = fixture.database()?.create_table(&layout, TableFlags::NONE)?;

    let precise = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap() + Duration::nanoseconds(123_456_789);
    table.insert(Row::new(vec![Value::Int32(1), Value::DateTime(precise)]))?;
    let stored = table.get_row_by_id(1)?;
    let Value::DateTime(at) = stored[1] else {
        panic!("expected a date time, got {:?}", stored[1]);
    };
    let precision = SqliteDialect::default().date_time_precision();
    assert!(precise - at < precision);
    assert_eq!(at, precise - Duration::nanoseconds(789));
    Ok(())
}

#[timeout(5000)]
#[test]
fn test_decimal_within_double_precision() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let layout = RowLayout::builder("prices")
        .field(FieldBuilder::new("id", DataType::Int32).identifier())
        .field(FieldBuilder::new("amount", DataType::Decimal))
        .build()?;
    let table = fixture.database()?.create_table(&layout, TableFlags::NONE)?;

    // 20 significant digits, more than a REAL keeps.
    let amount: Decimal = "1234567890.1234567891".parse()?;
    table.insert(Row::new(vec![Value::Int32(1), Value::Decimal(amount)]))?;
    let Value::Decimal(stored) = table.get_row_by_id(1)?[1] else {
        panic!("expected a decimal");
    };
    let tolerance = Decimal::new(1, 5);
    assert!((stored - amount).abs() < tolerance, "{} vs {}", stored, amount);
    Ok(())
}

#[timeout(5000)]
#[test]
fn test_nan_decimal_is_rejected() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let layout = RowLayout::builder("ratios")
        .field(FieldBuilder::new("id", DataType::Int32).identifier())
        .field(FieldBuilder::new("r", DataType::Decimal))
        .build()?;
    let table = fixture.database()?.create_table(&layout, TableFlags::NONE)?;
    let err = table
        .insert(Row::new(vec![Value::Int32(1), Value::Double(f64::NAN)]))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    Ok(())
}

#[timeout(5000)]
#[test]
fn test_nan_double_is_rejected_not_nulled() -> anyhow::Result<()> {
    let layout = RowLayout::builder("ratios")
        .field(FieldBuilder::new("id", DataType::Int32).identifier())
        .field(FieldBuilder::new("r", DataType::Double).nullable())
        .build()?;
    for dialect in [SqliteDialect::new(), SqliteDialect::new().without_parameters()] {
        let fixture = Fixture::with(dialect, |_| {})?;
        let table = fixture.database()?.create_table(&layout, TableFlags::NONE)?;
        let err = table
            .insert(Row::new(vec![Value::Int32(1), Value::Double(f64::NAN)]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert_eq!(table.count()?, 0);
    }
    Ok(())
}
