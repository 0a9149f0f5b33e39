mod row;

pub use row::{Row, RowIterator, Rows};
