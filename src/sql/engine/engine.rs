use crate::common::Result;
use crate::errinput;
use crate::storage::tuple::{Row, Rows};
use crate::types::Table;

/// Stores table schema information.
pub trait Catalog {
    /// Creates a new table. Errors if the specified table already exists.
    fn create_table(&self, table: Table) -> Result<()>;
    /// Drops the table corresponding to `table_name`.
    /// If such a table exists and was dropped, returns `true`.
    /// Returns `false` otherwise, or errors unless `if_exists` is set.
    fn drop_table(&self, table_name: &str, if_exists: bool) -> Result<bool>;
    /// Fetches the schema for the table corresponding to `table_name`.
    /// Returns `None` if no such table exists.
    fn get_table(&self, table_name: &str) -> Result<Option<Table>>;

    /// Fetches the schema for the table corresponding to `table_name`.
    /// Errors if no such table exists.
    fn must_get_table(&self, table_name: &str) -> Result<Table> {
        self.get_table(table_name)?
            .ok_or_else(|| errinput!("No table with name {table_name} exists."))
    }
}

/// Pull-based row sources, addressed by table name.
///
/// Sources are shared by the threads of one query run (parallel CTE levels),
/// so implementations must be thread-safe.
pub trait Sources: Send + Sync {
    /// Sequentially scans a table's rows, in insertion order.
    fn scan(&self, table_name: &str) -> Result<Rows>;
}

/// A query engine: a catalog of tables plus the row sources behind them.
pub trait Engine: Catalog + Sources {
    /// Appends rows to a table, returning the number of rows inserted.
    fn insert(&self, table_name: &str, rows: Vec<Row>) -> Result<usize>;
}
