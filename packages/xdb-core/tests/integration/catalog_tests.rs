//! Databases and tables as seen through the catalog.

use ntest::timeout;

use xdb_core::{ErrorKind, TableFlags};

use super::helpers::{settings_layout, users_layout, Fixture};

#[timeout(5000)]
#[test]
fn test_database_lifecycle() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let storage = &fixture.storage;
    assert!(storage.database_names()?.is_empty());

    storage.create_database("beta")?;
    storage.create_database("alpha")?;
    assert_eq!(storage.database_names()?, vec!["alpha", "beta"]);
    assert!(storage.has_database("alpha")?);
    assert!(fixture.dir.path().join("alpha.db").is_file());

    let err = storage.create_database("alpha").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    let alpha = storage.get_database("alpha")?;
    alpha.create_table(&users_layout()?, TableFlags::NONE)?;
    storage.drop_database("alpha")?;
    assert!(!fixture.dir.path().join("alpha.db").exists());
    assert_eq!(storage.get_database("alpha").unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(storage.drop_database("alpha").unwrap_err().kind(), ErrorKind::NotFound);
    Ok(())
}

#[test]
fn test_invalid_names_are_rejected() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    for name in ["", "1st", "with space", "semi;colon", "dash-ed"] {
        let err = fixture.storage.create_database(name).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{:?}", name);
    }
    let database = fixture.database()?;
    let err = database.has_table("bad name").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    Ok(())
}

#[timeout(5000)]
#[test]
fn test_table_lifecycle() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let database = fixture.database()?;
    assert!(database.table_names()?.is_empty());

    database.create_table(&users_layout()?, TableFlags::NONE)?;
    database.create_table(&settings_layout()?, TableFlags::NONE)?;
    assert_eq!(database.table_names()?, vec!["settings", "users"]);
    assert!(database.has_table("users")?);

    let err = database
        .create_table(&users_layout()?, TableFlags::NONE)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    database.drop_table("users")?;
    assert!(!database.has_table("users")?);
    assert_eq!(database.drop_table("users").unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(database.get_table("users").unwrap_err().kind(), ErrorKind::NotFound);
    Ok(())
}

#[timeout(5000)]
#[test]
fn test_get_table_reads_live_layout() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let database = fixture.database()?;
    database.create_table(&users_layout()?, TableFlags::NONE)?;

    let users = database.get_table("users")?;
    let layout = users.layout();
    assert_eq!(layout.field_count(), 2);
    assert!(layout.field(0).is_some_and(|f| f.is_identifier() && f.is_auto_increment()));
    assert!(layout.field(1).is_some_and(|f| f.is_unique()));

    let row = users.insert(xdb_core::Row::new(vec![
        xdb_core::Value::Null,
        "live".into(),
    ]))?;
    assert_eq!(row[0], xdb_core::Value::Int64(1));
    Ok(())
}

#[timeout(5000)]
#[test]
fn test_shutdown() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let database = fixture.database()?;
    database.create_table(&users_layout()?, TableFlags::NONE)?;

    fixture.storage.shutdown();
    let err = database.table_names().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConnectionFailure);
    Ok(())
}
