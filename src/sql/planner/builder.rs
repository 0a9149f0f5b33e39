use crate::common::Result;
use crate::errprecondition;
use crate::sql::planner::{Aggregate, BoxedNode, Direction, Expression, JoinType, Node};
use crate::types::field::Label;

/// Assembles one query block in pipeline order: from (and joins), where,
/// group by and having, select, skip, take, order by. Stages may be set in
/// any order; `build` always stacks them in that sequence, so skip and take
/// apply to the selected rows before they are sorted.
///
/// Expressions at each stage refer to the columns produced by the stage
/// below it. Having and the projection see the aggregate layout (group by
/// columns first, then aggregates) when grouping is used, and order keys see
/// the projection output.
#[derive(Clone, Debug)]
pub struct Select {
    from: BoxedNode,
    filter: Option<Expression>,
    group_by: Vec<Expression>,
    aggregates: Vec<Aggregate>,
    having: Option<Expression>,
    projection: Option<(Vec<Expression>, Vec<Label>)>,
    order: Vec<(Expression, Direction)>,
    skip: Option<usize>,
    take: Option<usize>,
}

impl Select {
    pub fn from(source: impl Into<BoxedNode>) -> Self {
        Self {
            from: source.into(),
            filter: None,
            group_by: Vec::new(),
            aggregates: Vec::new(),
            having: None,
            projection: None,
            order: Vec::new(),
            skip: None,
            take: None,
        }
    }

    /// Joins another source onto the current from clause.
    pub fn join(
        mut self,
        right: impl Into<BoxedNode>,
        join_type: JoinType,
        predicate: Option<Expression>,
    ) -> Self {
        self.from = Node::join(self.from, right, join_type, predicate).into();
        self
    }

    /// Adds a where predicate, ANDed with any existing one.
    pub fn filter(mut self, predicate: Expression) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => Expression::And(Box::new(existing), Box::new(predicate)),
            None => predicate,
        });
        self
    }

    pub fn group_by(mut self, group_by: Vec<Expression>, aggregates: Vec<Aggregate>) -> Self {
        self.group_by = group_by;
        self.aggregates = aggregates;
        self
    }

    pub fn having(mut self, predicate: Expression) -> Self {
        self.having = Some(predicate);
        self
    }

    /// Sets the output expressions with their result labels.
    pub fn select(mut self, columns: Vec<(Expression, Label)>) -> Self {
        self.projection = Some(columns.into_iter().unzip());
        self
    }

    pub fn order_by(mut self, key: Vec<(Expression, Direction)>) -> Self {
        self.order = key;
        self
    }

    pub fn skip(mut self, offset: usize) -> Self {
        self.skip = Some(offset);
        self
    }

    pub fn take(mut self, limit: usize) -> Self {
        self.take = Some(limit);
        self
    }

    /// Stacks the stages into a node tree.
    pub fn build(self) -> Result<Node> {
        let mut node: Node = match self.filter {
            Some(predicate) => Node::Filter {
                source: self.from,
                predicate,
            },
            None => *self.from.inner,
        };

        if !self.group_by.is_empty() || !self.aggregates.is_empty() {
            node = Node::Aggregate {
                source: node.into(),
                group_by: self.group_by,
                aggregates: self.aggregates,
                having: self.having,
            };
        } else if self.having.is_some() {
            return errprecondition!("having clause without group by or aggregates");
        }

        if let Some((expressions, aliases)) = self.projection {
            node = Node::Projection {
                source: node.into(),
                expressions,
                aliases,
            };
        }
        if let Some(offset) = self.skip {
            node = Node::Offset {
                source: node.into(),
                offset,
            };
        }
        if let Some(limit) = self.take {
            node = Node::Limit {
                source: node.into(),
                limit,
            };
        }
        if !self.order.is_empty() {
            node = Node::Order {
                source: node.into(),
                key: self.order,
            };
        }
        Ok(node)
    }
}
