//! Row level access to one table: inserts, updates, upserts, deletes and
//! lookups.

mod query;
#[allow(clippy::module_inception)]
mod table;

pub use query::Rows;
pub use table::Table;

#[cfg(test)]
mod tests {
    include!("tests.rs");
}
