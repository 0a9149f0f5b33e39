//! Common table expression scheduling.
//!
//! CTEs are ordered into dependency levels: every CTE in a level only reads
//! CTEs from earlier levels. Levels run one after another. Within a level,
//! CTEs run concurrently when parallelization is allowed.
use crate::common::{Error, Result};
use crate::sql::execution::execute::{materialize, QueryContext, ResultTable};
use crate::sql::planner::Cte;
use crossbeam::queue::SegQueue;
use itertools::Itertools as _;
use std::collections::{HashMap, HashSet};

/// The evaluation schedule for a plan's CTEs, as indexes into the
/// declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CteExecutionPlan {
    pub levels: Vec<Vec<usize>>,
    /// True if multi-member levels may run their members concurrently.
    pub can_parallelize: bool,
}

/// Why a set of CTEs can't be layered by dependency.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Hazard {
    DuplicateName(String),
    SelfReference(String),
    UnknownReference { cte: String, reference: String },
    Cycle(Vec<String>),
}

impl std::fmt::Display for Hazard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateName(name) => write!(f, "duplicate CTE name {name}"),
            Self::SelfReference(name) => write!(f, "CTE {name} references itself"),
            Self::UnknownReference { cte, reference } => {
                write!(f, "CTE {cte} references unknown CTE {reference}")
            }
            Self::Cycle(names) => write!(f, "CTEs {} form a cycle", names.join(", ")),
        }
    }
}

/// Schedules CTEs into dependency levels using Kahn's algorithm. CTE A
/// depends on CTE B if A's body scans B, and a CTE may reference one
/// declared after it.
///
/// If the dependencies can't be layered (duplicate names, self or unknown
/// references, cycles) every CTE gets its own level in declaration order,
/// and nothing runs in parallel.
pub fn plan_ctes(ctes: &[Cte], parallel: bool) -> CteExecutionPlan {
    match levels(ctes) {
        Ok(levels) => {
            let can_parallelize = parallel && levels.iter().any(|level| level.len() > 1);
            CteExecutionPlan {
                levels,
                can_parallelize,
            }
        }
        Err(hazard) => {
            log::warn!("{hazard}, evaluating CTEs sequentially in declaration order");
            CteExecutionPlan {
                levels: (0..ctes.len()).map(|i| vec![i]).collect(),
                can_parallelize: false,
            }
        }
    }
}

/// Computes Kahn levels over the CTE dependency graph.
fn levels(ctes: &[Cte]) -> std::result::Result<Vec<Vec<usize>>, Hazard> {
    if let Some(name) = ctes.iter().map(|cte| &cte.name).duplicates().next() {
        return Err(Hazard::DuplicateName(name.clone()));
    }
    let index: HashMap<&str, usize> =
        ctes.iter().enumerate().map(|(i, cte)| (cte.name.as_str(), i)).collect();

    // dependents[b] lists the CTEs reading b; pending[a] counts a's unmet
    // dependencies.
    let mut dependents = vec![Vec::new(); ctes.len()];
    let mut pending = vec![0; ctes.len()];
    for (i, cte) in ctes.iter().enumerate() {
        for reference in cte.query.cte_references() {
            match index.get(reference.as_str()) {
                Some(&j) if j == i => return Err(Hazard::SelfReference(cte.name.clone())),
                Some(&j) => {
                    dependents[j].push(i);
                    pending[i] += 1;
                }
                None => {
                    return Err(Hazard::UnknownReference {
                        cte: cte.name.clone(),
                        reference,
                    })
                }
            }
        }
    }

    let mut levels = Vec::new();
    let mut level: Vec<usize> = (0..ctes.len()).filter(|&i| pending[i] == 0).collect();
    let mut scheduled = 0;
    while !level.is_empty() {
        scheduled += level.len();
        let mut next = Vec::new();
        for &i in &level {
            for &dependent in &dependents[i] {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    next.push(dependent);
                }
            }
        }
        next.sort_unstable();
        levels.push(level);
        level = next;
    }
    if scheduled < ctes.len() {
        let cycle = (0..ctes.len())
            .filter(|&i| pending[i] > 0)
            .map(|i| ctes[i].name.clone())
            .collect();
        return Err(Hazard::Cycle(cycle));
    }
    Ok(levels)
}

/// Materializes all CTEs, level by level, returning their results by name.
/// Cancellation is checked before every level, and a failing CTE fails the
/// query.
pub fn evaluate(
    ctes: Vec<Cte>,
    query: &QueryContext,
) -> Result<HashMap<String, ResultTable>> {
    let plan = plan_ctes(&ctes, query.settings.use_cte_parallelization);
    log::debug!(
        "CTE levels {:?}, parallel: {}",
        plan.levels
            .iter()
            .map(|level| level.iter().map(|&i| ctes[i].name.as_str()).collect_vec())
            .collect_vec(),
        plan.can_parallelize
    );

    let mut ctes: Vec<Option<Cte>> = ctes.into_iter().map(Some).collect();
    let mut results = HashMap::new();
    for level in plan.levels {
        query.cancel.check()?;
        let members: Vec<Cte> = level.iter().filter_map(|&i| ctes[i].take()).collect();
        if plan.can_parallelize && members.len() > 1 {
            let done = evaluate_parallel(members, query, &results)?;
            results.extend(done);
            continue;
        }
        for cte in members {
            let table = materialize(cte.query, &cte.name, query, &results)?;
            results.insert(cte.name, table);
        }
    }
    Ok(results)
}

/// Runs the members of one level concurrently, one thread per CTE, and
/// waits for all of them.
fn evaluate_parallel(
    members: Vec<Cte>,
    query: &QueryContext,
    results: &HashMap<String, ResultTable>,
) -> Result<Vec<(String, ResultTable)>> {
    let queue = SegQueue::new();
    crossbeam::thread::scope(|scope| {
        for (position, cte) in members.into_iter().enumerate() {
            let queue = &queue;
            scope.spawn(move |_| {
                // Stop dispatching work once the query is cancelled.
                let result = query
                    .cancel
                    .check()
                    .and_then(|_| materialize(cte.query, &cte.name, query, results));
                queue.push((position, cte.name, result));
            });
        }
    })
    .map_err(|_| Error::IO("CTE worker panicked".to_string()))?;

    let mut done = Vec::with_capacity(queue.len());
    while let Some(entry) = queue.pop() {
        done.push(entry);
    }
    done.sort_by_key(|(position, _, _)| *position);
    done.into_iter()
        .map(|(_, name, result)| Ok((name, result?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::CancellationToken;
    use crate::config::Settings;
    use crate::sql::engine::{NoopObserver, Sources};
    use crate::sql::planner::{JoinType, Node};
    use crate::storage::tuple::{Row, Rows};
    use crate::types::field::Field;
    use crate::types::{DataType, Table};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct NoSources;

    impl Sources for NoSources {
        fn scan(&self, table_name: &str) -> Result<Rows> {
            crate::errinput!("no table {table_name}")
        }
    }

    fn table(name: &str) -> Table {
        Table::builder().name(name).column("v", DataType::Int, true).build()
    }

    /// A CTE whose body cross joins the given CTEs, or a constant if none.
    fn cte(name: &str, reads: &[&str]) -> Cte {
        let node = reads
            .iter()
            .map(|read| Node::cte_scan(read, &table(read)))
            .reduce(|left, right| Node::join(left, right, JoinType::Inner, None))
            .unwrap_or_else(|| Node::values(vec![vec![Field::Integer(1)]]));
        Cte::new(name, node)
    }

    fn query(settings: &Settings) -> QueryContext<'_> {
        QueryContext {
            sources: &NoSources,
            settings,
            observer: Arc::new(NoopObserver),
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn test_levels_are_topological() {
        // d reads b and c, which both read a. e is independent, and a is
        // declared after its readers.
        let ctes = vec![
            cte("b", &["a"]),
            cte("c", &["a"]),
            cte("d", &["b", "c"]),
            cte("a", &[]),
            cte("e", &[]),
        ];
        let plan = plan_ctes(&ctes, true);
        assert_eq!(plan.levels, vec![vec![3, 4], vec![0, 1], vec![2]]);
        assert!(plan.can_parallelize);

        let plan = plan_ctes(&ctes, false);
        assert_eq!(plan.levels.len(), 3);
        assert!(!plan.can_parallelize);
    }

    #[test]
    fn test_chain_is_not_parallel() {
        let ctes = vec![cte("a", &[]), cte("b", &["a"]), cte("c", &["b"])];
        let plan = plan_ctes(&ctes, true);
        assert_eq!(plan.levels, vec![vec![0], vec![1], vec![2]]);
        assert!(!plan.can_parallelize);
    }

    #[test]
    fn test_hazards_fall_back_to_declaration_order() {
        let cases = vec![
            vec![cte("a", &["b"]), cte("b", &["a"]), cte("c", &[])],
            vec![cte("a", &["a"]), cte("b", &[])],
            vec![cte("a", &["missing"]), cte("b", &[])],
            vec![cte("a", &[]), cte("a", &[]), cte("b", &[])],
        ];
        for ctes in cases {
            let plan = plan_ctes(&ctes, true);
            assert!(!plan.can_parallelize);
            assert_eq!(
                plan.levels,
                (0..ctes.len()).map(|i| vec![i]).collect::<Vec<_>>()
            );
        }
        assert!(matches!(
            levels(&[cte("a", &["b"]), cte("b", &["a"])]),
            Err(Hazard::Cycle(_))
        ));
    }

    #[test]
    fn test_evaluate_parallel_and_sequential_agree() {
        let ctes = vec![
            cte("b", &["a"]),
            cte("c", &["a"]),
            cte("d", &["c"]),
            cte("a", &[]),
        ];
        let mut settings = Settings::default();
        let parallel = evaluate(ctes.clone(), &query(&settings)).unwrap();
        settings.use_cte_parallelization = false;
        let sequential = evaluate(ctes, &query(&settings)).unwrap();

        assert_eq!(parallel, sequential);
        assert_eq!(parallel.len(), 4);
        assert_eq!(parallel["d"].rows(), &[Row::from(vec![Field::Integer(1)])]);
    }

    #[test]
    fn test_unresolvable_reference_fails() {
        let settings = Settings::default();
        let result = evaluate(vec![cte("a", &["missing"])], &query(&settings));
        assert!(matches!(result, Err(Error::Precondition(_))));
    }

    #[test]
    fn test_cancelled_before_first_level() {
        let settings = Settings::default();
        let query = query(&settings);
        query.cancel.cancel();
        let result = evaluate(vec![cte("a", &[]), cte("b", &[])], &query);
        assert_eq!(result, Err(Error::Cancelled));
    }

    /// A source that trips the query's token as soon as a scan starts.
    struct CancellingSources {
        cancel: CancellationToken,
        scans: AtomicUsize,
    }

    impl Sources for CancellingSources {
        fn scan(&self, _: &str) -> Result<Rows> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            self.cancel.cancel();
            let rows = vec![Row::from(vec![Field::Integer(1)]); 3];
            Ok(Box::new(rows.into_iter().map(Ok)))
        }
    }

    #[test]
    fn test_cancelled_within_parallel_level() {
        let settings = Settings::default();
        let cancel = CancellationToken::new();
        let sources = CancellingSources {
            cancel: cancel.clone(),
            scans: AtomicUsize::new(0),
        };
        let query = QueryContext {
            sources: &sources,
            settings: &settings,
            observer: Arc::new(NoopObserver),
            cancel,
        };
        let ctes = vec![
            Cte::new("a", Node::scan(&table("t"))),
            Cte::new("b", Node::scan(&table("t"))),
        ];
        assert_eq!(plan_ctes(&ctes, true).levels, vec![vec![0, 1]]);

        let result = evaluate(ctes, &query);
        assert_eq!(result, Err(Error::Cancelled));
        assert!(sources.scans.load(Ordering::SeqCst) >= 1);
    }
}
