use crate::common::Result;
use crate::sql::planner::{Aggregate, Direction, Expression, JoinType, SetOperator};
use crate::types::field::{Field, Label};
use crate::types::{DataType, Table};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// A wrapper object holding a logical query node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxedNode {
    pub(crate) inner: Box<Node>,
}

impl From<Node> for BoxedNode {
    fn from(node: Node) -> Self {
        Self {
            inner: Box::new(node),
        }
    }
}

impl Deref for BoxedNode {
    type Target = Node;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// A logical query node. The tree is resolved and type-bound upstream and
/// read-only here, apart from optimizer rewrites.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Node {
    /// Groups source rows by the group_by expressions and computes the given
    /// aggregates per group. The group_by columns are emitted first, followed
    /// by the aggregate columns, in the given order. The having predicate is
    /// evaluated against that output layout.
    Aggregate {
        source: BoxedNode,
        group_by: Vec<Expression>,
        aggregates: Vec<Aggregate>,
        having: Option<Expression>,
    },
    /// Reads the materialized result of a common table expression.
    CteScan {
        name: String,
        table: Table,
        alias: Option<String>,
    },
    /// Filters source rows, by discarding rows for which the predicate
    /// evaluates to false or NULL.
    Filter {
        source: BoxedNode,
        predicate: Expression,
    },
    /// Joins the left and right sources. The predicate is evaluated against
    /// the concatenated left and right columns. Outer joins emit preserved
    /// rows without a match once, padded with NULLs for the other side. The
    /// physical strategy is picked when the pipeline is assembled.
    Join {
        left: BoxedNode,
        right: BoxedNode,
        join_type: JoinType,
        predicate: Option<Expression>,
    },
    /// Only emits the first limit rows from the source, discards the rest.
    Limit { source: BoxedNode, limit: usize },
    /// Nothing does not emit anything. It retains the column names of any
    /// replaced nodes for results headers.
    Nothing { columns: Vec<Label> },
    /// Discards the first offset rows from source, emits the rest.
    Offset { source: BoxedNode, offset: usize },
    /// Sorts the source rows by the given sort key. Buffers the entire row set
    /// in memory.
    Order {
        source: BoxedNode,
        key: Vec<(Expression, Direction)>,
    },
    /// Projects the input rows by evaluating the given expressions. Aliases are
    /// only used when labelling result columns.
    Projection {
        source: BoxedNode,
        expressions: Vec<Expression>,
        aliases: Vec<Label>,
    },
    /// A full table scan, with an optional pushed-down filter. The alias is
    /// only used for labels.
    Scan {
        table: Table,
        filter: Option<Expression>,
        alias: Option<String>,
    },
    /// Combines two sources of equal width. Rows are compared on the given
    /// output column indexes.
    SetOperation {
        op: SetOperator,
        left: BoxedNode,
        right: BoxedNode,
        key: Vec<usize>,
    },
    /// A constant set of values.
    Values { rows: Vec<Vec<Expression>> },
}

impl Node {
    /// Returns the number of columns emitted by the node.
    pub fn columns(&self) -> usize {
        match self {
            // Source nodes emit all table columns.
            Self::Scan { table, .. } | Self::CteScan { table, .. } => table.col_count(),

            // Some nodes modify the column set.
            Self::Aggregate {
                aggregates,
                group_by,
                ..
            } => aggregates.len() + group_by.len(),
            Self::Projection { expressions, .. } => expressions.len(),

            // Join nodes emit the combined columns.
            Self::Join { left, right, .. } => left.columns() + right.columns(),

            // Set operations emit the left layout.
            Self::SetOperation { left, .. } => left.columns(),

            // Simple nodes just pass through the source columns.
            Self::Filter { source, .. }
            | Self::Limit { source, .. }
            | Self::Offset { source, .. }
            | Self::Order { source, .. } => source.columns(),

            // And some are trivial.
            Self::Nothing { columns } => columns.len(),
            Self::Values { rows } => rows.first().map(|row| row.len()).unwrap_or(0),
        }
    }

    /// Returns a label for a column, if any, by tracing the column through the
    /// plan tree. Only used for result headers and expression formatting.
    pub fn column_label(&self, index: usize) -> Label {
        match self {
            // Source nodes use the table/column name.
            Self::Scan { table, alias, .. } => table.column_label(index, alias.as_ref()),
            Self::CteScan {
                name, table, alias, ..
            } => table.column_label(index, alias.as_ref().or(Some(name))),

            // Some nodes rearrange columns. Route them to the correct
            // upstream column where appropriate.
            Self::Aggregate {
                source, group_by, ..
            } => match group_by.get(index) {
                Some(Expression::Column(index)) => source.column_label(*index),
                Some(_) | None => Label::None,
            },
            Self::Projection {
                source,
                expressions,
                aliases,
            } => match aliases.get(index) {
                Some(Label::None) | None => match expressions.get(index) {
                    // Unaliased column references route to the source.
                    Some(Expression::Column(index)) => source.column_label(*index),
                    // Unaliased expressions don't have a name.
                    Some(_) | None => Label::None,
                },
                // Aliased columns use the alias.
                Some(alias) => alias.clone(),
            },

            // Joins dispatch to the appropriate source.
            Self::Join { left, right, .. } => {
                if index < left.columns() {
                    left.column_label(index)
                } else {
                    right.column_label(index - left.columns())
                }
            }

            // Simple nodes just dispatch to the source.
            Self::Filter { source, .. }
            | Self::Limit { source, .. }
            | Self::Offset { source, .. }
            | Self::Order { source, .. }
            | Self::SetOperation { left: source, .. } => source.column_label(index),

            // Nothing nodes contain the original columns of replaced nodes.
            Self::Nothing { columns } => columns.get(index).cloned().unwrap_or(Label::None),

            // And some don't have any names at all.
            Self::Values { .. } => Label::None,
        }
    }

    /// Returns the static types of the emitted columns.
    pub fn column_types(&self) -> Vec<DataType> {
        match self {
            Self::Scan { table, .. } | Self::CteScan { table, .. } => table.column_types(),

            Self::Aggregate {
                source,
                group_by,
                aggregates,
                ..
            } => {
                let inputs = source.column_types();
                group_by
                    .iter()
                    .map(|expr| expr.data_type(&inputs))
                    .chain(aggregates.iter().map(|aggregate| match aggregate {
                        Aggregate::Count(_) => DataType::Int,
                        Aggregate::Average(_) => DataType::Float,
                        Aggregate::Max(expr) | Aggregate::Min(expr) | Aggregate::Sum(expr) => {
                            expr.data_type(&inputs)
                        }
                    }))
                    .collect()
            }
            Self::Projection {
                source,
                expressions,
                ..
            } => {
                let inputs = source.column_types();
                expressions
                    .iter()
                    .map(|expr| expr.data_type(&inputs))
                    .collect()
            }

            Self::Join { left, right, .. } => {
                let mut types = left.column_types();
                types.extend(right.column_types());
                types
            }

            Self::Filter { source, .. }
            | Self::Limit { source, .. }
            | Self::Offset { source, .. }
            | Self::Order { source, .. }
            | Self::SetOperation { left: source, .. } => source.column_types(),

            Self::Nothing { columns } => vec![DataType::Null; columns.len()],
            Self::Values { rows } => rows
                .first()
                .map(|row| row.iter().map(|expr| expr.data_type(&[])).collect())
                .unwrap_or_default(),
        }
    }

    /// Returns the labels of every emitted column.
    pub fn column_labels(&self) -> Vec<Label> {
        (0..self.columns()).map(|i| self.column_label(i)).collect()
    }

    /// Returns the names of the common table expressions read anywhere in
    /// this subtree.
    pub fn cte_references(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_cte_references(&mut names);
        names
    }

    fn collect_cte_references(&self, names: &mut Vec<String>) {
        match self {
            Self::CteScan { name, .. } => {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            Self::Aggregate { source, .. }
            | Self::Filter { source, .. }
            | Self::Limit { source, .. }
            | Self::Offset { source, .. }
            | Self::Order { source, .. }
            | Self::Projection { source, .. } => source.collect_cte_references(names),
            Self::Join { left, right, .. } | Self::SetOperation { left, right, .. } => {
                left.collect_cte_references(names);
                right.collect_cte_references(names);
            }
            Self::Nothing { .. } | Self::Scan { .. } | Self::Values { .. } => {}
        }
    }

    /// Recursively transforms query nodes depth-first by applying the given
    /// closures before and after descending.
    pub fn transform(
        mut self,
        before: &impl Fn(Self) -> Result<Self>,
        after: &impl Fn(Self) -> Result<Self>,
    ) -> Result<Self> {
        // Helper for transforming boxed nodes.
        let xform = |mut node: BoxedNode| -> Result<BoxedNode> {
            *node.inner = node.inner.transform(before, after)?;
            Ok(node)
        };

        self = before(self)?;
        self = match self {
            Self::Aggregate {
                source,
                group_by,
                aggregates,
                having,
            } => Self::Aggregate {
                source: xform(source)?,
                group_by,
                aggregates,
                having,
            },
            Self::Filter { source, predicate } => Self::Filter {
                source: xform(source)?,
                predicate,
            },
            Self::Join {
                left,
                right,
                join_type,
                predicate,
            } => Self::Join {
                left: xform(left)?,
                right: xform(right)?,
                join_type,
                predicate,
            },
            Self::Limit { source, limit } => Self::Limit {
                source: xform(source)?,
                limit,
            },
            Self::Offset { source, offset } => Self::Offset {
                source: xform(source)?,
                offset,
            },
            Self::Order { source, key } => Self::Order {
                source: xform(source)?,
                key,
            },
            Self::Projection {
                source,
                expressions,
                aliases,
            } => Self::Projection {
                source: xform(source)?,
                expressions,
                aliases,
            },
            Self::SetOperation {
                op,
                left,
                right,
                key,
            } => Self::SetOperation {
                op,
                left: xform(left)?,
                right: xform(right)?,
                key,
            },

            Self::CteScan { .. } | Self::Nothing { .. } | Self::Scan { .. } | Self::Values { .. } => {
                self
            }
        };
        self = after(self)?;
        Ok(self)
    }

    /// Recursively transforms all node expressions by calling the given
    /// closures on them before and after descending.
    pub fn transform_expressions(
        self,
        before: &impl Fn(Expression) -> Result<Expression>,
        after: &impl Fn(Expression) -> Result<Expression>,
    ) -> Result<Self> {
        Ok(match self {
            Self::Aggregate {
                source,
                group_by,
                aggregates,
                having,
            } => Self::Aggregate {
                source,
                group_by: group_by
                    .into_iter()
                    .map(|expr| expr.transform(before, after))
                    .collect::<Result<_>>()?,
                aggregates: aggregates
                    .into_iter()
                    .map(|aggregate| {
                        let expr = aggregate.expression().clone().transform(before, after)?;
                        Ok(aggregate.with_expression(expr))
                    })
                    .collect::<Result<_>>()?,
                having: having.map(|expr| expr.transform(before, after)).transpose()?,
            },
            Self::Filter {
                source,
                mut predicate,
            } => {
                predicate = predicate.transform(before, after)?;
                Self::Filter { source, predicate }
            }
            Self::Join {
                left,
                right,
                join_type,
                predicate: Some(predicate),
            } => {
                let predicate = Some(predicate.transform(before, after)?);
                Self::Join {
                    left,
                    right,
                    join_type,
                    predicate,
                }
            }
            Self::Order { source, mut key } => {
                key = key
                    .into_iter()
                    .map(|(expr, dir)| Ok((expr.transform(before, after)?, dir)))
                    .collect::<Result<_>>()?;
                Self::Order { source, key }
            }
            Self::Projection {
                source,
                mut expressions,
                aliases,
            } => {
                expressions = expressions
                    .into_iter()
                    .map(|expr| expr.transform(before, after))
                    .collect::<Result<_>>()?;
                Self::Projection {
                    source,
                    expressions,
                    aliases,
                }
            }
            Self::Scan {
                table,
                alias,
                filter: Some(filter),
            } => {
                let filter = Some(filter.transform(before, after)?);
                Self::Scan {
                    table,
                    alias,
                    filter,
                }
            }
            Self::Values { mut rows } => {
                rows = rows
                    .into_iter()
                    .map(|row| {
                        row.into_iter()
                            .map(|expr| expr.transform(before, after))
                            .collect()
                    })
                    .collect::<Result<_>>()?;
                Self::Values { rows }
            }

            Self::CteScan { .. }
            | Self::Join {
                predicate: None, ..
            }
            | Self::Limit { .. }
            | Self::Nothing { .. }
            | Self::Offset { .. }
            | Self::Scan { filter: None, .. }
            | Self::SetOperation { .. } => self,
        })
    }
}

/// Constructors for the common node shapes.
impl Node {
    pub fn scan(table: &Table) -> Self {
        Self::Scan {
            table: table.clone(),
            filter: None,
            alias: None,
        }
    }

    pub fn cte_scan(name: &str, table: &Table) -> Self {
        Self::CteScan {
            name: name.to_string(),
            table: table.clone(),
            alias: None,
        }
    }

    pub fn join(
        left: impl Into<BoxedNode>,
        right: impl Into<BoxedNode>,
        join_type: JoinType,
        predicate: Option<Expression>,
    ) -> Self {
        Self::Join {
            left: left.into(),
            right: right.into(),
            join_type,
            predicate,
        }
    }

    /// A set operation keyed on every output column.
    pub fn set_operation(
        op: SetOperator,
        left: impl Into<BoxedNode>,
        right: impl Into<BoxedNode>,
    ) -> Self {
        let left = left.into();
        let key = (0..left.columns()).collect();
        Self::SetOperation {
            op,
            left,
            right: right.into(),
            key,
        }
    }

    /// Folds a chain like `a UNION b EXCEPT c` left to right, so each
    /// operator applies to the result of everything before it.
    pub fn set_chain(first: impl Into<BoxedNode>, rest: Vec<(SetOperator, Node)>) -> Self {
        let first: BoxedNode = first.into();
        rest.into_iter().fold(*first.inner, |left, (op, right)| {
            Self::set_operation(op, left, right)
        })
    }

    pub fn values(rows: Vec<Vec<Field>>) -> Self {
        Self::Values {
            rows: rows
                .into_iter()
                .map(|row| row.into_iter().map(Expression::Constant).collect())
                .collect(),
        }
    }
}
