use crate::common::constants::MISSING_CTE_RESULT_MSG;
use crate::common::{CancellationToken, Result};
use crate::errprecondition;
use crate::sql::engine::QueryObserver;
use crate::sql::execution::{QueryContext, ResultTable};
use crate::sql::planner::Expression;
use crate::storage::tuple::{Row, Rows};
use crate::types::field::Field;
use crate::types::Table;
use std::collections::HashMap;
use std::sync::Arc;

/// A table source via sequential scan. Forwards progress to the observer
/// and checks for cancellation before every row.
pub fn scan(query: &QueryContext, table: &Table) -> Result<Rows> {
    let rows = query.sources.scan(table.name())?;
    Ok(Box::new(ScanIterator {
        rows,
        table: table.name().to_string(),
        read: 0,
        interval: query.settings.progress_interval.max(1),
        observer: query.observer.clone(),
        cancel: query.cancel.clone(),
        done: false,
    }))
}

/// Reads the materialized rows of a common table expression.
pub fn cte_scan(ctes: &HashMap<String, ResultTable>, name: &str) -> Result<Rows> {
    match ctes.get(name) {
        Some(table) => Ok(table.scan()),
        None => errprecondition!("{MISSING_CTE_RESULT_MSG} {name}"),
    }
}

/// Returns nothing. Used to short-circuit nodes that can't produce any rows.
pub fn nothing() -> Rows {
    Box::new(std::iter::empty())
}

/// Emits predefined constant values.
pub fn values(rows: Vec<Vec<Expression>>) -> Rows {
    let iter = rows.into_iter().map(|row| {
        let evaluated: Result<Vec<Field>> =
            row.into_iter().map(|expr| expr.evaluate(None)).collect();
        evaluated.map(Row::from)
    });
    Box::new(iter)
}

#[derive(Clone)]
struct ScanIterator {
    rows: Rows,
    table: String,
    /// Rows read so far.
    read: usize,
    /// Rows between progress notifications.
    interval: usize,
    observer: Arc<dyn QueryObserver>,
    cancel: CancellationToken,
    done: bool,
}

impl Iterator for ScanIterator {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if let Err(err) = self.cancel.check() {
            self.done = true;
            return Some(Err(err));
        }
        match self.rows.next() {
            Some(Ok(row)) => {
                self.read += 1;
                if self.read % self.interval == 0 {
                    self.observer.source_progress(&self.table, self.read);
                }
                Some(Ok(row))
            }
            Some(Err(err)) => Some(Err(err)),
            None => {
                self.done = true;
                if self.read == 0 || self.read % self.interval != 0 {
                    self.observer.source_progress(&self.table, self.read);
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;
    use crate::config::Settings;
    use crate::sql::engine::{Catalog, Engine, Local, Phase};
    use crate::storage::Memory;
    use crate::types::DataType;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Progress(Mutex<Vec<(String, usize)>>);

    impl QueryObserver for Progress {
        fn phase_changed(&self, _: &str, _: Phase) {}

        fn source_progress(&self, table: &str, rows: usize) {
            self.0.lock().unwrap().push((table.to_string(), rows));
        }
    }

    fn setup(rows: i64) -> (Local<Memory>, Table) {
        let local = Local::new(Memory::new());
        let table = Table::builder()
            .name("t")
            .column("id", DataType::Int, false)
            .build();
        local.create_table(table.clone()).unwrap();
        local
            .insert(
                "t",
                (0..rows).map(|i| Row::from(vec![Field::Integer(i)])).collect(),
            )
            .unwrap();
        (local, table)
    }

    #[test]
    fn test_scan_reports_progress() {
        let (local, table) = setup(5);
        let observer = Arc::new(Progress::default());
        let settings = Settings {
            progress_interval: 2,
            ..Settings::default()
        };
        let query = QueryContext {
            sources: &local,
            settings: &settings,
            observer: observer.clone(),
            cancel: CancellationToken::new(),
        };
        let rows: Vec<Row> = scan(&query, &table).unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(rows.len(), 5);
        let reported: Vec<usize> = observer.0.lock().unwrap().iter().map(|(_, n)| *n).collect();
        assert_eq!(reported, vec![2, 4, 5]);
    }

    #[test]
    fn test_scan_stops_when_cancelled() {
        let (local, table) = setup(3);
        let settings = Settings::default();
        let cancel = CancellationToken::new();
        let query = QueryContext {
            sources: &local,
            settings: &settings,
            observer: Arc::new(Progress::default()),
            cancel: cancel.clone(),
        };
        let mut rows = scan(&query, &table).unwrap();
        assert!(rows.next().unwrap().is_ok());
        cancel.cancel();
        assert_eq!(rows.next(), Some(Err(Error::Cancelled)));
        assert_eq!(rows.next(), None);
    }

    #[test]
    fn test_missing_cte_is_precondition_error() {
        let result = cte_scan(&HashMap::new(), "nope");
        assert!(matches!(result, Err(Error::Precondition(_))));
    }
}
