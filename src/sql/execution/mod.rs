//! Query execution: assembles a physical pipeline from a plan node tree and
//! runs it.
mod aggregate;
mod cte;
mod execute;
pub mod join;
mod set;
mod source;
mod transform;

pub use cte::{plan_ctes, CteExecutionPlan};
pub use execute::{execute, execute_plan, materialize, ExecutionContext, QueryContext, ResultTable};
pub use join::{JoinPredicate, JoinStrategy};
