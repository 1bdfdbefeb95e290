//! Integration test suite against embedded SQLite databases.
//!
//! 1. Catalog: databases and tables
//! 2. Scenarios: identifier generation, unsigned bounds, in-memory tables
//! 3. Round trips of every data type
//! 4. Schema compatibility on open
//! 5. Concurrent writers and the emulated upsert race
//! 6. Typed tables of user records

pub mod catalog_tests;
pub mod concurrency_tests;
pub mod helpers;
pub mod round_trip_tests;
pub mod scenario_tests;
pub mod schema_tests;
pub mod typed_tests;
