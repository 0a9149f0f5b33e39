use crate::common::{CancellationToken, Error, Result};
use crate::config::Settings;
use crate::errprecondition;
use crate::sql::engine::{QueryObserver, Sources};
use crate::sql::execution::{self, ResultTable};
use crate::sql::planner::optimizer::OPTIMIZERS;
use crate::sql::planner::{BoxedNode, Expression, Node};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A resolved query: its common table expressions, in declaration order,
/// and the main query that may read them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub ctes: Vec<Cte>,
    pub root: BoxedNode,
}

/// A named common table expression.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cte {
    pub name: String,
    pub query: BoxedNode,
}

impl Cte {
    pub fn new(name: &str, query: impl Into<BoxedNode>) -> Self {
        Self {
            name: name.to_string(),
            query: query.into(),
        }
    }
}

impl Plan {
    /// A plan without common table expressions.
    pub fn new(root: impl Into<BoxedNode>) -> Self {
        Self {
            ctes: Vec::new(),
            root: root.into(),
        }
    }

    pub fn with_ctes(ctes: Vec<Cte>, root: impl Into<BoxedNode>) -> Self {
        Self {
            ctes,
            root: root.into(),
        }
    }

    /// Executes the plan, consuming it.
    pub fn execute(
        self,
        sources: &dyn Sources,
        settings: &Settings,
        observer: Arc<dyn QueryObserver>,
        cancel: CancellationToken,
    ) -> Result<ResultTable> {
        execution::execute_plan(self, sources, settings, observer, cancel)
    }

    /// Optimizes the CTE bodies and the main query, consuming the plan.
    pub fn optimize(self, settings: &Settings) -> Result<Self> {
        let optimize = |node| {
            OPTIMIZERS
                .iter()
                .try_fold(node, |node, (_, opt)| opt(node, settings))
        };
        Ok(Self {
            ctes: self
                .ctes
                .into_iter()
                .map(|cte| {
                    Ok(Cte {
                        name: cte.name,
                        query: optimize(cte.query)?,
                    })
                })
                .collect::<Result<_>>()?,
            root: optimize(self.root)?,
        })
    }
}

/// An aggregate function.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Aggregate {
    Average(Expression),
    Count(Expression),
    Max(Expression),
    Min(Expression),
    Sum(Expression),
}

impl Aggregate {
    pub fn expression(&self) -> &Expression {
        match self {
            Self::Average(expr)
            | Self::Count(expr)
            | Self::Max(expr)
            | Self::Min(expr)
            | Self::Sum(expr) => expr,
        }
    }

    pub fn into_expression(self) -> Expression {
        match self {
            Self::Average(expr)
            | Self::Count(expr)
            | Self::Max(expr)
            | Self::Min(expr)
            | Self::Sum(expr) => expr,
        }
    }

    /// Rebuilds the same aggregate kind around a new expression.
    pub fn with_expression(&self, expr: Expression) -> Self {
        match self {
            Self::Average(_) => Self::Average(expr),
            Self::Count(_) => Self::Count(expr),
            Self::Max(_) => Self::Max(expr),
            Self::Min(_) => Self::Min(expr),
            Self::Sum(_) => Self::Sum(expr),
        }
    }

    pub fn format(&self, node: &Node) -> String {
        match self {
            Self::Average(expr) => format!("avg({})", expr.format(node)),
            Self::Count(expr) => format!("count({})", expr.format(node)),
            Self::Max(expr) => format!("max({})", expr.format(node)),
            Self::Min(expr) => format!("min({})", expr.format(node)),
            Self::Sum(expr) => format!("sum({})", expr.format(node)),
        }
    }
}

/// A sort order direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Ascending,
    Descending,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ascending => f.write_str("asc"),
            Self::Descending => f.write_str("desc"),
        }
    }
}

/// The logical join type. Outer joins preserve every row of one side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    LeftOuter,
    RightOuter,
}

impl std::fmt::Display for JoinType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Inner => f.write_str("inner"),
            Self::LeftOuter => f.write_str("left outer"),
            Self::RightOuter => f.write_str("right outer"),
        }
    }
}

impl TryFrom<&str> for JoinType {
    type Error = Error;

    fn try_from(tag: &str) -> Result<Self> {
        match tag.to_lowercase().as_str() {
            "inner" => Ok(Self::Inner),
            "left" | "left outer" => Ok(Self::LeftOuter),
            "right" | "right outer" => Ok(Self::RightOuter),
            _ => errprecondition!("unsupported join type {tag}"),
        }
    }
}

/// A set operator combining two queries of equal width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SetOperator {
    Union,
    UnionAll,
    Except,
    Intersect,
}

impl std::fmt::Display for SetOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Union => f.write_str("union"),
            Self::UnionAll => f.write_str("union all"),
            Self::Except => f.write_str("except"),
            Self::Intersect => f.write_str("intersect"),
        }
    }
}

impl TryFrom<&str> for SetOperator {
    type Error = Error;

    fn try_from(tag: &str) -> Result<Self> {
        match tag.to_lowercase().as_str() {
            "union" => Ok(Self::Union),
            "union all" => Ok(Self::UnionAll),
            "except" => Ok(Self::Except),
            "intersect" => Ok(Self::Intersect),
            _ => errprecondition!("unsupported set operator {tag}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use predicates::prelude::*;

    #[test]
    fn test_tags() {
        assert_eq!(JoinType::try_from("LEFT"), Ok(JoinType::LeftOuter));
        assert_eq!(SetOperator::try_from("Union All"), Ok(SetOperator::UnionAll));

        let err = JoinType::try_from("full outer").unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
        assert!(predicate::str::contains("full outer").eval(&err.to_string()));

        let err = SetOperator::try_from("minus").unwrap_err();
        assert!(predicate::str::contains("unsupported set operator").eval(&err.to_string()));
    }
}
