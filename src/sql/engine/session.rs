use super::{Engine, NoopObserver, QueryObserver};
use crate::common::{CancellationToken, Result};
use crate::config::Settings;
use crate::sql::execution::ResultTable;
use crate::sql::planner::Plan;
use crate::storage::tuple::Row;
use crate::types::field::Label;
use crate::types::Table;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A statement for a session: a resolved query plan, or one of the table
/// management operations needed to populate sources.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    CreateTable(Table),
    DropTable { name: String, if_exists: bool },
    Insert { table: String, rows: Vec<Row> },
    Select(Plan),
}

/// A query session, which executes statements against a query engine.
pub struct Session<'a, E: Engine> {
    engine: &'a E,
    settings: Settings,
    observer: Arc<dyn QueryObserver>,
    cancel: CancellationToken,
}

impl<'a, E: Engine> Session<'a, E> {
    /// Creates a new session with the given query engine and settings.
    pub fn new(engine: &'a E, settings: Settings) -> Self {
        Self {
            engine,
            settings,
            observer: Arc::new(NoopObserver),
            cancel: CancellationToken::new(),
        }
    }

    /// Routes phase and progress notifications to the given observer.
    pub fn with_observer(mut self, observer: Arc<dyn QueryObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Returns the session's cancellation token. Cancelling it aborts the
    /// running query, and every query after it until `reset_cancellation`.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Replaces a tripped cancellation token with a fresh one.
    pub fn reset_cancellation(&mut self) {
        self.cancel = CancellationToken::new();
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Executes a statement.
    pub fn execute(&mut self, statement: Statement) -> Result<StatementResult> {
        Ok(match statement {
            Statement::CreateTable(table) => {
                let name = table.name().to_string();
                self.engine.create_table(table)?;
                StatementResult::CreateTable { name }
            }
            Statement::DropTable { name, if_exists } => {
                let existed = self.engine.drop_table(&name, if_exists)?;
                StatementResult::DropTable { name, existed }
            }
            Statement::Insert { table, rows } => {
                let count = self.engine.insert(&table, rows)? as u64;
                StatementResult::Insert { count }
            }
            Statement::Select(plan) => plan
                .optimize(&self.settings)?
                .execute(
                    self.engine,
                    &self.settings,
                    self.observer.clone(),
                    self.cancel.clone(),
                )?
                .into(),
        })
    }
}

/// A session statement result.
#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub enum StatementResult {
    CreateTable { name: String },
    DropTable { name: String, existed: bool },
    Insert { count: u64 },
    Select { columns: Vec<Label>, rows: Vec<Row> },
}

impl From<ResultTable> for StatementResult {
    fn from(table: ResultTable) -> Self {
        let (columns, rows) = table.into_parts();
        Self::Select { columns, rows }
    }
}
