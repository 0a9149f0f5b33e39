//! The query engine: logical plans, their optimization, and execution over
//! pluggable row sources.
pub mod engine;
pub mod execution;
pub mod planner;
