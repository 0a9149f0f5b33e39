#![crate_type = "lib"]
#![crate_name = "rustyquery"]

pub mod common;
pub mod config;
pub mod sql;
pub mod storage;
pub mod types;
