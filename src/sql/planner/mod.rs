mod builder;
mod expression;
pub mod functions;
mod node;
pub mod optimizer;
mod plan;

pub use builder::Select;
pub use expression::{Expression, RowContext, SlotCache};
pub use node::{BoxedNode, Node};
pub use plan::{Aggregate, Cte, Direction, JoinType, Plan, SetOperator};
