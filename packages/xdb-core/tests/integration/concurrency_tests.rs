//! Several threads sharing one storage.

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use ntest::timeout;

use xdb_core::{ErrorKind, Row, SqliteDialect, TableFlags, Value};

use super::helpers::{settings_layout, users_layout, Fixture};

const THREADS: usize = 4;

#[timeout(20000)]
#[test]
fn test_concurrent_inserts_get_distinct_identifiers() -> anyhow::Result<()> {
    const ROWS: usize = 25;
    let fixture = Fixture::new()?;
    let users = fixture
        .database()?
        .create_table(&users_layout()?, TableFlags::NONE)?;

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let users = users.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..ROWS)
                    .map(|i| {
                        let row = Row::new(vec![Value::Null, format!("user-{}-{}", t, i).into()]);
                        users.insert(row).map(|row| row[0].clone())
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        for id in handle.join().expect("inserting thread panicked")? {
            assert!(ids.insert(id.as_i64()), "identifier {} handed out twice", id);
        }
    }
    assert_eq!(ids.len(), THREADS * ROWS);
    assert_eq!(users.count()?, (THREADS * ROWS) as u64);
    Ok(())
}

/// Two writers replace the same absent key at once without a native upsert.
/// Either both succeed, or the slower one collides on the insert. The stored
/// row is always one of the two written.
#[timeout(20000)]
#[test]
fn test_concurrent_emulated_replace() -> anyhow::Result<()> {
    let fixture = Fixture::with(SqliteDialect::new().without_native_upsert(), |_| {})?;
    let settings = fixture
        .database()?
        .create_table(&settings_layout()?, TableFlags::NONE)?;

    for round in 0..20 {
        let key = format!("key-{}", round);
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [1, 2]
            .into_iter()
            .map(|value| {
                let settings = settings.clone();
                let barrier = Arc::clone(&barrier);
                let row = Row::new(vec![key.clone().into(), Value::Int32(value)]);
                thread::spawn(move || {
                    barrier.wait();
                    settings.replace(row)
                })
            })
            .collect();
        let results: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().expect("replacing thread panicked"))
            .collect();

        let failures: Vec<_> = results.iter().filter_map(|r| r.as_ref().err()).collect();
        assert!(failures.len() < 2, "both writers failed: {:?}", failures);
        for err in failures {
            assert_eq!(err.kind(), ErrorKind::DuplicateKey, "{}", err);
        }
        let stored = settings.get_row_by_id(key.as_str())?;
        assert!(
            stored[1] == Value::Int32(1) || stored[1] == Value::Int32(2),
            "unexpected value {}",
            stored[1]
        );
    }
    assert_eq!(settings.count()?, 20);
    Ok(())
}

#[timeout(20000)]
#[test]
fn test_concurrent_native_replace_never_collides() -> anyhow::Result<()> {
    let fixture = Fixture::new()?;
    let settings = fixture
        .database()?
        .create_table(&settings_layout()?, TableFlags::NONE)?;

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let settings = settings.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..10 {
                    let row = Row::new(vec!["shared".into(), Value::Int32((t * 100 + i) as i32)]);
                    settings.replace(row)?;
                }
                Ok::<_, xdb_core::DbError>(())
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("replacing thread panicked")?;
    }
    assert_eq!(settings.count()?, 1);
    Ok(())
}
