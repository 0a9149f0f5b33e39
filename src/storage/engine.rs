use crate::common::Result;
use crate::storage::tuple::Row;
use crate::types::Table;
use serde::{Deserialize, Serialize};

/// A table storage engine backing the query engine's data sources.
///
/// Tables are append-only row collections addressed by name. The engine is
/// single-threaded; callers share it behind a lock (see `sql::engine::Local`).
pub trait Engine: Send {
    /// The iterator returned by scan()
    type ScanIterator<'a>: ScanIterator + 'a
    where
        Self: Sized + 'a;

    /// Creates a table. Errors if it already exists.
    fn create_table(&mut self, table: Table) -> Result<()>;

    /// Deletes a table. Returns true if it exists and false otherwise.
    fn delete_table(&mut self, table_name: &str) -> Result<bool>;

    /// Gets a table with the given table name.
    fn get_table(&mut self, table_name: &str) -> Result<Option<Table>>;

    /// Appends rows to the table with name `table_name`, returning the
    /// number of rows appended.
    fn insert(&mut self, table_name: &str, rows: Vec<Row>) -> Result<usize>;

    /// Creates an iterator over the table's rows, in insertion order.
    fn scan(&mut self, table_name: &str) -> Result<Self::ScanIterator<'_>>
    where
        Self: Sized;

    /// Returns engine status.
    fn status(&mut self) -> Result<Status>;
}

/// A scan iterator over a table
pub trait ScanIterator: Iterator<Item = Result<Row>> {}
/// Blanket implementation of ScanIterator for any `I` satisfying the trait bound.
impl<I: Iterator<Item = Result<Row>>> ScanIterator for I {}

/// Engine status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Status {
    /// The name of the storage engine.
    pub name: String,
    /// The number of tables.
    pub tables: u64,
    /// The number of rows across all tables.
    pub rows: u64,
}
