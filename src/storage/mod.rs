pub mod engine;
pub mod memory;
pub mod tuple;

pub use engine::{Engine, ScanIterator, Status};
pub use memory::Memory;
