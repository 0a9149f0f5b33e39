use crate::common::constants::MAIN_QUERY_SCOPE;
use crate::common::{CancellationToken, Result};
use crate::config::Settings;
use crate::sql::engine::{Phase, QueryObserver, Sources};
use crate::sql::execution::join::{self, JoinSpec};
use crate::sql::execution::{aggregate, cte, set, source, transform};
use crate::sql::planner::{BoxedNode, Node, Plan};
use crate::storage::tuple::{Row, Rows};
use crate::types::field::Label;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;

/// Executes a query plan: materializes its common table expressions level by
/// level, then the main query.
pub fn execute_plan(
    plan: Plan,
    sources: &dyn Sources,
    settings: &Settings,
    observer: Arc<dyn QueryObserver>,
    cancel: CancellationToken,
) -> Result<ResultTable> {
    let query = QueryContext {
        sources,
        settings,
        observer,
        cancel,
    };
    let ctes = cte::evaluate(plan.ctes, &query)?;
    materialize(plan.root, MAIN_QUERY_SCOPE, &query, &ctes)
}

/// Runs one scope's node tree to completion and collects its rows into a
/// result table, reporting the Begin and End phases around it.
pub fn materialize(
    root: BoxedNode,
    scope: &str,
    query: &QueryContext,
    ctes: &HashMap<String, ResultTable>,
) -> Result<ResultTable> {
    let ctx = ExecutionContext::new(query, ctes, scope);
    ctx.enter(Phase::Begin);
    let mut table = ResultTable::new(root.column_labels());
    let mut rows = execute(root, &ctx)?;
    while let Some(row) = rows.next().transpose()? {
        query.cancel.check()?;
        table.push(row);
    }
    ctx.enter(Phase::End);
    Ok(table)
}

/// State shared by every scope of one query run. Shared across threads when
/// CTEs run in parallel.
#[derive(Clone)]
pub struct QueryContext<'a> {
    pub sources: &'a dyn Sources,
    pub settings: &'a Settings,
    pub observer: Arc<dyn QueryObserver>,
    pub cancel: CancellationToken,
}

/// The execution context of one scope: the main query or a single CTE body.
pub struct ExecutionContext<'a> {
    query: &'a QueryContext<'a>,
    /// Materialized results of the CTEs this scope may read.
    ctes: &'a HashMap<String, ResultTable>,
    scope: &'a str,
    /// The last phase reported for this scope. Phases only move forward.
    phase: Cell<Phase>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        query: &'a QueryContext<'a>,
        ctes: &'a HashMap<String, ResultTable>,
        scope: &'a str,
    ) -> Self {
        Self {
            query,
            ctes,
            scope,
            phase: Cell::new(Phase::Begin),
        }
    }

    pub fn settings(&self) -> &Settings {
        self.query.settings
    }

    pub fn cancel(&self) -> &CancellationToken {
        &self.query.cancel
    }

    /// Notifies the observer that the scope entered a phase, unless it has
    /// already reached it or a later one. Begin is always reported.
    fn enter(&self, phase: Phase) {
        if phase == Phase::Begin || phase > self.phase.get() {
            self.phase.set(phase);
            log::debug!("{}: entering phase {phase}", self.scope);
            self.query.observer.phase_changed(self.scope, phase);
        }
    }
}

/// Recursively assembles a node's pipeline, returning a row iterator.
///
/// Children are assembled first, and each operator receives its children's
/// iterators directly. Rows then stream through the tree from the leaves to
/// the root as the root is pulled.
pub fn execute(node: BoxedNode, ctx: &ExecutionContext) -> Result<Rows> {
    Ok(match *node.inner {
        Node::Aggregate {
            source,
            group_by,
            aggregates,
            having,
        } => {
            let key_names = group_by.iter().map(|expr| expr.format(&source)).collect();
            let source = execute(source, ctx)?;
            aggregate::aggregate(source, group_by, key_names, aggregates, having, ctx.cancel())?
        }

        Node::CteScan { name, .. } => {
            ctx.enter(Phase::From);
            source::cte_scan(ctx.ctes, &name)?
        }

        Node::Filter { source, predicate } => {
            let source = execute(source, ctx)?;
            ctx.enter(Phase::Where);
            transform::filter(source, predicate)
        }

        Node::Join {
            left,
            right,
            join_type,
            predicate,
        } => {
            let spec = JoinSpec::new(
                join_type,
                predicate,
                &left.column_types(),
                &right.column_types(),
            );
            let strategy = join::choose_strategy(&spec.shape, ctx.settings());
            log::debug!("{}: {join_type} join using {strategy:?}", ctx.scope);
            let left = execute(left, ctx)?;
            let right = execute(right, ctx)?;
            ctx.enter(Phase::From);
            join::join(
                left,
                right,
                spec,
                strategy,
                ctx.settings().merge_partitions,
                ctx.cancel().clone(),
            )?
        }

        Node::Limit { source, limit } => transform::limit(execute(source, ctx)?, limit),

        Node::Nothing { .. } => source::nothing(),

        Node::Offset { source, offset } => transform::offset(execute(source, ctx)?, offset),

        Node::Order { source, key } => transform::order(execute(source, ctx)?, key)?,

        Node::Projection {
            source,
            expressions,
            aliases: _,
        } => {
            let source = execute(source, ctx)?;
            ctx.enter(Phase::Select);
            transform::project(source, expressions)
        }

        Node::Scan { table, filter, .. } => {
            ctx.enter(Phase::From);
            let rows = source::scan(ctx.query, &table)?;
            match filter {
                Some(filter) => transform::filter(rows, filter),
                None => rows,
            }
        }

        Node::SetOperation {
            op,
            left,
            right,
            key,
        } => {
            let widths = (left.columns(), right.columns());
            let left = execute(left, ctx)?;
            let right = execute(right, ctx)?;
            set::evaluate(op, left, right, widths, &key, ctx.cancel())?
        }

        Node::Values { rows } => source::values(rows),
    })
}

/// An append-only result table for the main query or one CTE.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    columns: Vec<Label>,
    rows: Vec<Row>,
}

impl ResultTable {
    pub fn new(columns: Vec<Label>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[Label] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Streams a copy of the table's rows.
    pub fn scan(&self) -> Rows {
        Box::new(self.rows.clone().into_iter().map(Ok))
    }

    pub fn into_parts(self) -> (Vec<Label>, Vec<Row>) {
        (self.columns, self.rows)
    }
}
