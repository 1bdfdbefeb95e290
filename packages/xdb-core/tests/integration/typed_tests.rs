//! Records stored through `TypedTable`.

use ntest::timeout;

use xdb_core::{
    DataType, DbError, ErrorKind, FieldBuilder, Record, Row, RowLayout, TableFlags, TypedTable,
    Value,
};

#[derive(Debug, Clone, PartialEq)]
struct Book {
    id: Option<i64>,
    title: String,
    pages: u16,
    isbn: Option<String>,
}

impl Record for Book {
    fn layout() -> Result<RowLayout, DbError> {
        Ok(RowLayout::builder("books")
            .field(FieldBuilder::new("id", DataType::Int64).identifier().auto_increment())
            .field(FieldBuilder::new("title", DataType::String).max_length(200))
            .field(FieldBuilder::new("pages", DataType::UInt16))
            .field(FieldBuilder::new("isbn", DataType::String).max_length(17).nullable().unique())
            .build()?)
    }

    fn to_row(&self) -> Row {
        Row::new(vec![
            self.id.into(),
            self.title.as_str().into(),
            self.pages.into(),
            self.isbn.clone().into(),
        ])
    }

    fn from_row(row: Row) -> Result<Self, DbError> {
        let invalid = |what: &str| DbError::invalid_argument(format!("book row has no {}", what));
        let values = row.into_values();
        let [id, title, pages, isbn] = <[Value; 4]>::try_from(values)
            .map_err(|_| invalid("four values"))?;
        Ok(Book {
            id: id.as_i64(),
            title: title.as_str().ok_or_else(|| invalid("title"))?.to_string(),
            pages: match pages {
                Value::UInt16(pages) => pages,
                _ => return Err(invalid("page count")),
            },
            isbn: isbn.as_str().map(str::to_string),
        })
    }
}

fn book(title: &str, pages: u16) -> Book {
    Book {
        id: None,
        title: title.to_string(),
        pages,
        isbn: None,
    }
}

#[timeout(5000)]
#[test]
fn test_typed_table_crud() -> anyhow::Result<()> {
    let fixture = super::helpers::Fixture::new()?;
    let database = fixture.database()?;
    let books = TypedTable::<Book>::create(&database, TableFlags::NONE)?;

    let dune = books.insert(&book("Dune", 412))?;
    assert_eq!(dune.id, Some(1));
    let mut emma = books.insert(&book("Emma", 474))?;
    assert_eq!(books.count()?, 2);

    emma.isbn = Some("978-0141439587".to_string());
    books.update(&emma)?;
    assert_eq!(books.get(&[Value::Int64(2)])?, emma);

    let mut copy = dune.clone();
    copy.id = None;
    copy.isbn = emma.isbn.clone();
    let err = books.insert(&copy).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateKey);

    books.delete(&[Value::Int64(1)])?;
    assert!(books.try_get(&[Value::Int64(1)])?.is_none());
    assert_eq!(books.all()?, vec![emma]);
    Ok(())
}

#[timeout(5000)]
#[test]
fn test_typed_table_open_checks_layout() -> anyhow::Result<()> {
    let fixture = super::helpers::Fixture::new()?;
    let database = fixture.database()?;
    assert_eq!(
        TypedTable::<Book>::open(&database).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    TypedTable::<Book>::create(&database, TableFlags::NONE)?;
    let books = TypedTable::<Book>::open(&database)?;
    assert_eq!(books.table().name(), "books");
    books.replace(&Book {
        id: Some(10),
        ..book("Ulysses", 730)
    })?;
    assert_eq!(books.get(&[Value::Int64(10)])?.pages, 730);
    Ok(())
}
