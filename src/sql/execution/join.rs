//! The join compiler.
//!
//! Every join node runs one of three physical strategies. The strategy is
//! picked by a pure function of the predicate's shape and the settings:
//!
//! * hash join, for conjunctions of column equalities,
//! * sort-merge join, for one column inequality plus optional equalities, or
//!   for column equalities when hash joins are disabled,
//! * nested loop join, for anything else.
//!
//! All three emit the same multiset of rows. Joined rows are always laid out
//! as the left columns followed by the right columns, and outer joins emit
//! each unmatched row of the preserved side exactly once, padded with NULLs.
use crate::common::{CancellationToken, Error, Result};
use crate::config::Settings;
use crate::sql::execution::transform::holds;
use crate::sql::planner::{Expression, JoinType, SlotCache};
use crate::storage::tuple::{Row, Rows};
use crate::types::field::Field;
use crate::types::DataType;
use crossbeam::queue::SegQueue;
use itertools::Itertools as _;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::iter::Peekable;

/// A physical join strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JoinStrategy {
    NestedLoop,
    Hash,
    SortMerge,
}

/// A comparison, read as `left <op> right`. Join predicates only classify
/// inequalities; `Equal` is the merge condition of an equi sort-merge join.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Equal,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
}

impl Comparison {
    /// The same comparison with its operands swapped.
    fn flip(self) -> Self {
        match self {
            Self::Equal => Self::Equal,
            Self::Less => Self::Greater,
            Self::LessOrEqual => Self::GreaterOrEqual,
            Self::Greater => Self::Less,
            Self::GreaterOrEqual => Self::LessOrEqual,
        }
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Equal => ordering == Ordering::Equal,
            Self::Less => ordering == Ordering::Less,
            Self::LessOrEqual => ordering != Ordering::Greater,
            Self::Greater => ordering == Ordering::Greater,
            Self::GreaterOrEqual => ordering != Ordering::Less,
        }
    }
}

/// A pair of join key columns, indexed within their own side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyPair {
    pub left: usize,
    pub right: usize,
    /// Compare numerically across integers and floats. False only when
    /// both columns are integers, which compare exactly.
    pub numeric: bool,
}

impl KeyPair {
    fn new(left: usize, right: usize, left_type: DataType, right_type: DataType) -> Self {
        let numeric = !(left_type == DataType::Int && right_type == DataType::Int);
        Self {
            left,
            right,
            numeric,
        }
    }

    /// Returns the key value to hash or sort on.
    fn key(&self, value: &Field) -> Field {
        match self.numeric {
            true => value.to_numeric_key(),
            false => value.clone(),
        }
    }
}

/// The shape of a join predicate, as far as join strategies care.
#[derive(Clone, Debug, PartialEq)]
pub enum JoinPredicate {
    /// A conjunction of equalities between left and right columns, with no
    /// column used twice on either side.
    Equi(Vec<KeyPair>),
    /// One inequality `left <op> right` between a left and a right column,
    /// plus any number of column equalities.
    Ordering {
        inequality: KeyPair,
        op: Comparison,
        equalities: Vec<KeyPair>,
    },
    /// Anything else, including no predicate at all.
    Opaque,
}

impl JoinPredicate {
    /// Classifies a join predicate over the concatenated left and right
    /// columns. Predicates that don't fit a known shape, or compare
    /// incompatible types, are Opaque.
    pub fn analyze(
        predicate: Option<&Expression>,
        left_types: &[DataType],
        right_types: &[DataType],
    ) -> Self {
        let Some(predicate) = predicate else {
            return Self::Opaque;
        };
        let mut conjuncts = Vec::new();
        collect_conjuncts(predicate, &mut conjuncts);

        let mut equalities = Vec::new();
        let mut inequalities = Vec::new();
        for conjunct in conjuncts {
            use Expression::*;
            let (lhs, rhs, op) = match conjunct {
                Equal(lhs, rhs) => (lhs, rhs, None),
                LessThan(lhs, rhs) => (lhs, rhs, Some(Comparison::Less)),
                LessThanOrEqual(lhs, rhs) => (lhs, rhs, Some(Comparison::LessOrEqual)),
                GreaterThan(lhs, rhs) => (lhs, rhs, Some(Comparison::Greater)),
                GreaterThanOrEqual(lhs, rhs) => (lhs, rhs, Some(Comparison::GreaterOrEqual)),
                _ => return Self::Opaque,
            };
            let (left, right, swapped) = match (&**lhs, &**rhs) {
                (Column(l), Column(r)) if *l < left_types.len() && *r >= left_types.len() => {
                    (*l, *r - left_types.len(), false)
                }
                (Column(r), Column(l)) if *l < left_types.len() && *r >= left_types.len() => {
                    (*l, *r - left_types.len(), true)
                }
                _ => return Self::Opaque,
            };
            let (Some(&left_type), Some(&right_type)) = (left_types.get(left), right_types.get(right))
            else {
                return Self::Opaque;
            };
            let pair = KeyPair::new(left, right, left_type, right_type);
            match op {
                None if left_type.is_join_compatible(&right_type) => equalities.push(pair),
                Some(op) if left_type.is_comparable(&right_type) => {
                    inequalities.push((pair, if swapped { op.flip() } else { op }))
                }
                _ => return Self::Opaque,
            }
        }

        match inequalities.as_slice() {
            [] if !equalities.is_empty() => {
                let distinct = equalities.iter().map(|k| k.left).all_unique()
                    && equalities.iter().map(|k| k.right).all_unique();
                match distinct {
                    true => Self::Equi(equalities),
                    false => Self::Opaque,
                }
            }
            [(inequality, op)] => Self::Ordering {
                inequality: *inequality,
                op: *op,
                equalities,
            },
            _ => Self::Opaque,
        }
    }
}

/// Flattens nested ANDs. Cache slot wrappers are looked through.
fn collect_conjuncts<'a>(expr: &'a Expression, out: &mut Vec<&'a Expression>) {
    match expr {
        Expression::And(lhs, rhs) => {
            collect_conjuncts(lhs, out);
            collect_conjuncts(rhs, out);
        }
        Expression::Cached { expr, .. } => collect_conjuncts(expr, out),
        expr => out.push(expr),
    }
}

/// Picks the join strategy: hash join if eligible and enabled, else
/// sort-merge if eligible and enabled, else nested loop. Equi-joins are
/// eligible for both hash and sort-merge joins.
pub fn choose_strategy(predicate: &JoinPredicate, settings: &Settings) -> JoinStrategy {
    match predicate {
        JoinPredicate::Equi(_) if settings.use_hash_join => JoinStrategy::Hash,
        JoinPredicate::Equi(_) | JoinPredicate::Ordering { .. }
            if settings.use_sort_merge_join =>
        {
            JoinStrategy::SortMerge
        }
        _ => JoinStrategy::NestedLoop,
    }
}

/// A join node, resolved for execution.
#[derive(Clone, Debug)]
pub struct JoinSpec {
    pub join_type: JoinType,
    pub predicate: Option<Expression>,
    pub shape: JoinPredicate,
    /// Column widths of the left and right sources.
    pub left_size: usize,
    pub right_size: usize,
}

impl JoinSpec {
    pub fn new(
        join_type: JoinType,
        predicate: Option<Expression>,
        left_types: &[DataType],
        right_types: &[DataType],
    ) -> Self {
        let shape = JoinPredicate::analyze(predicate.as_ref(), left_types, right_types);
        Self {
            join_type,
            predicate,
            shape,
            left_size: left_types.len(),
            right_size: right_types.len(),
        }
    }

    /// True if unmatched rows of the preserved side are emitted.
    fn is_outer(&self) -> bool {
        self.join_type != JoinType::Inner
    }

    /// True if the right side drives the join: it is the side whose rows
    /// are preserved, and the left side is the one buffered or hashed.
    fn right_drives(&self) -> bool {
        self.join_type == JoinType::RightOuter
    }
}

/// Joins the left and right rows using the given strategy. A strategy
/// the predicate shape doesn't support falls back to a nested loop.
pub fn join(
    left: Rows,
    right: Rows,
    spec: JoinSpec,
    strategy: JoinStrategy,
    partitions: usize,
    cancel: CancellationToken,
) -> Result<Rows> {
    match (strategy, &spec.shape) {
        (JoinStrategy::Hash, JoinPredicate::Equi(keys)) => {
            let keys = keys.clone();
            hash(left, right, &spec, &keys, cancel)
        }
        (
            JoinStrategy::SortMerge,
            JoinPredicate::Ordering {
                inequality, op, ..
            },
        ) => {
            let (inequality, op) = (*inequality, *op);
            sort_merge(left, right, &spec, inequality, op, partitions, cancel)
        }
        // Merge on the first equality; the rest are checked by the predicate.
        (JoinStrategy::SortMerge, JoinPredicate::Equi(keys)) if !keys.is_empty() => {
            let key = keys[0];
            sort_merge(left, right, &spec, key, Comparison::Equal, partitions, cancel)
        }
        _ => nested_loop(left, right, &spec, cancel),
    }
}

/// Concatenates a driving row with a row from the other side, left columns
/// first.
fn assemble(driver: &Row, other: &Row, right_drives: bool) -> Row {
    match right_drives {
        true => Row::join(other, driver),
        false => Row::join(driver, other),
    }
}

/// A nested loop join. Iterates over the inner source for every row in the
/// outer source, filtering on the join predicate. The outer source is the
/// left one, except for right outer joins. If the join is outer and an outer
/// row has no match, a row padded with NULLs for the inner source is emitted.
pub fn nested_loop(
    left: Rows,
    right: Rows,
    spec: &JoinSpec,
    cancel: CancellationToken,
) -> Result<Rows> {
    let (outer, inner, inner_size) = match spec.right_drives() {
        true => (right, left, spec.left_size),
        false => (left, right, spec.right_size),
    };
    // Buffer the inner source, so resetting it doesn't rescan the source.
    let inner: Vec<Row> = inner.collect::<Result<_>>()?;
    Ok(Box::new(NestedLoopIterator::new(
        outer,
        Box::new(inner.into_iter().map(Ok)),
        inner_size,
        spec,
        cancel,
    )))
}

/// NestedLoopIterator implements nested loop joins.
///
/// This could be trivially implemented with cartesian_product(), but we need
/// to handle the outer join case where there is no match in the inner
/// source.
#[derive(Clone)]
struct NestedLoopIterator {
    /// The outer source.
    outer: Peekable<Rows>,
    /// The inner source.
    inner: Rows,
    /// The initial inner iterator state. Cloned to reset inner.
    inner_init: Rows,
    /// The column width of the inner source.
    inner_size: usize,
    /// True if an inner match has been seen for the current outer row.
    matched: bool,
    /// The join predicate.
    predicate: Option<Expression>,
    slots: SlotCache,
    /// If true, emit a row when there is no match in the inner source.
    outer_join: bool,
    /// If true, the outer rows are the right side.
    right_drives: bool,
    cancel: CancellationToken,
}

impl NestedLoopIterator {
    fn new(
        outer: Rows,
        inner: Rows,
        inner_size: usize,
        spec: &JoinSpec,
        cancel: CancellationToken,
    ) -> Self {
        let inner_init = inner.clone();
        Self {
            outer: outer.peekable(),
            inner,
            inner_init,
            inner_size,
            matched: false,
            slots: SlotCache::for_expressions(spec.predicate.iter()),
            predicate: spec.predicate.clone(),
            outer_join: spec.is_outer(),
            right_drives: spec.right_drives(),
            cancel,
        }
    }

    /// Returns the next joined row, if any.
    ///
    /// While there is a valid outer row, look for an inner match to return.
    /// If there was no match for that row but this is an outer join, emit a
    /// row with inner NULLs.
    fn try_next(&mut self) -> Result<Option<Row>> {
        while let Some(outer) = self.outer.peek() {
            let outer = outer.clone()?;
            self.cancel.check()?;

            while let Some(inner) = self.inner.next().transpose()? {
                let joined = assemble(&outer, &inner, self.right_drives);
                let matches = match &self.predicate {
                    Some(predicate) => holds(predicate, &joined, &self.slots)?,
                    None => true,
                };
                if matches {
                    self.matched = true;
                    return Ok(Some(joined));
                }
            }

            // Move to the next outer row and reset the inner iterator.
            let unmatched = self.outer_join && !self.matched;
            self.outer.next();
            self.inner = self.inner_init.clone();
            self.matched = false;
            if unmatched {
                let nulls = Row::nulls(self.inner_size);
                return Ok(Some(assemble(&outer, &nulls, self.right_drives)));
            }
        }
        Ok(None)
    }
}

impl Iterator for NestedLoopIterator {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.try_next().transpose()
    }
}

/// Projects a row's join key. Returns None if any key value is NULL or NaN,
/// since those never compare equal.
fn join_key(row: &Row, keys: &[KeyPair], right: bool) -> Result<Option<Vec<Field>>> {
    let mut values = Vec::with_capacity(keys.len());
    for key in keys {
        let value = row.field(if right { key.right } else { key.left })?;
        if value.is_undefined() {
            return Ok(None);
        }
        values.push(key.key(value));
    }
    Ok(Some(values))
}

/// Executes a hash join. This builds a hash table of rows from the build
/// source keyed on the join columns, then iterates over the probe source and
/// looks up matching rows in the hash table. The probe side is the preserved
/// side: the right source for right outer joins, otherwise the left one. If
/// the join is outer and a probe row has no match, a row with NULL values
/// for the build source is emitted instead.
pub fn hash(
    left: Rows,
    right: Rows,
    spec: &JoinSpec,
    keys: &[KeyPair],
    cancel: CancellationToken,
) -> Result<Rows> {
    let right_drives = spec.right_drives();
    let (probe, mut build, build_size) = match right_drives {
        true => (right, left, spec.left_size),
        false => (left, right, spec.right_size),
    };

    // Build the hash table. NULL keys are never inserted.
    let mut table: HashMap<Vec<Field>, Vec<Row>> = HashMap::new();
    while let Some(row) = build.next().transpose()? {
        cancel.check()?;
        if let Some(key) = join_key(&row, keys, !right_drives)? {
            table.entry(key).or_default().push(row);
        }
    }
    log::debug!("hash join built {} keys", table.len());

    let keys = keys.to_vec();
    let outer = spec.is_outer();
    let join = probe.flat_map(move |result| -> Rows {
        let probe_row = match result.and_then(|row| cancel.check().map(|_| row)) {
            Ok(row) => row,
            Err(err) => return Box::new(std::iter::once(Err(err))),
        };
        let key = match join_key(&probe_row, &keys, right_drives) {
            Ok(key) => key,
            Err(err) => return Box::new(std::iter::once(Err(err))),
        };
        // A NULL probe key matches nothing.
        match key.and_then(|key| table.get(&key)) {
            Some(matches) => {
                let rows: Vec<Row> = matches
                    .iter()
                    .map(|row| assemble(&probe_row, row, right_drives))
                    .collect();
                Box::new(rows.into_iter().map(Ok))
            }
            None if outer => Box::new(std::iter::once(Ok(assemble(
                &probe_row,
                &Row::nulls(build_size),
                right_drives,
            )))),
            None => Box::new(std::iter::empty()),
        }
    });
    Ok(Box::new(join))
}

/// Executes a sort-merge join on one key comparison, with any further
/// conjuncts checked on each candidate pair.
///
/// Both sources are buffered and keyed on the merge columns; build rows with
/// NULL or NaN keys are dropped. The build side is sorted so that, for any
/// probe key, the build rows satisfying the comparison form a contiguous
/// range: a prefix for an inequality, the run of equal keys for `Equal`. The
/// probe side is sorted the same way, which makes both ends of that range
/// move monotonically as cursors walk the probe rows. Probe rows are split
/// into index ranges that are merged in parallel against the shared build
/// rows. Each partition's output is collected in a concurrent queue and
/// appended in partition order once every worker has finished.
pub fn sort_merge(
    left: Rows,
    right: Rows,
    spec: &JoinSpec,
    key: KeyPair,
    op: Comparison,
    partitions: usize,
    cancel: CancellationToken,
) -> Result<Rows> {
    let right_drives = spec.right_drives();
    let (probe, build, build_size) = match right_drives {
        true => (right, left, spec.left_size),
        false => (left, right, spec.right_size),
    };
    // Orient the comparison as `probe <op> build`.
    let (probe_column, build_column, op) = match right_drives {
        true => (key.right, key.left, op.flip()),
        false => (key.left, key.right, op),
    };
    let keyed = |rows: Rows, column: usize| -> Result<Vec<(Field, Row)>> {
        rows.map(|result: Result<Row>| -> Result<(Field, Row)> {
            let row = result?;
            cancel.check()?;
            Ok((key.key(row.field(column)?), row))
        })
        .collect()
    };
    let mut build: Vec<(Field, Row)> = keyed(build, build_column)?
        .into_iter()
        .filter(|(key, _)| !key.is_undefined())
        .collect();
    let (mut probe, undefined): (Vec<_>, Vec<_>) = keyed(probe, probe_column)?
        .into_iter()
        .partition(|(key, _)| !key.is_undefined());

    // For probe < build, matches are the largest build keys: sort descending.
    let descending = matches!(op, Comparison::Less | Comparison::LessOrEqual);
    let direction = |ordering: Ordering| match descending {
        true => ordering.reverse(),
        false => ordering,
    };
    build.sort_by(|(a, _), (b, _)| direction(a.cmp(b)));
    probe.sort_by(|(a, _), (b, _)| direction(a.cmp(b)));

    let Some(predicate) = spec.predicate.as_ref() else {
        return nested_loop(
            Box::new(probe.into_iter().map(|(_, row)| Ok(row))),
            Box::new(build.into_iter().map(|(_, row)| Ok(row))),
            spec,
            cancel,
        );
    };
    let merge = Merge {
        build: &build,
        op,
        predicate,
        outer: spec.is_outer(),
        right_drives,
        build_size,
        cancel: &cancel,
    };

    let chunk = probe.len().div_ceil(partitions.max(1)).max(1);
    let queue = SegQueue::new();
    crossbeam::thread::scope(|scope| {
        for (index, partition) in probe.chunks(chunk).enumerate() {
            let (merge, queue) = (&merge, &queue);
            scope.spawn(move |_| {
                log::trace!("merging partition {index} with {} rows", partition.len());
                queue.push((index, merge.partition(partition)));
            });
        }
    })
    .map_err(|_| Error::IO("sort-merge worker panicked".to_string()))?;

    let mut results = Vec::with_capacity(queue.len());
    while let Some(result) = queue.pop() {
        results.push(result);
    }
    results.sort_by_key(|(index, _)| *index);
    let mut rows = Vec::new();
    for (_, result) in results {
        rows.extend(result?);
    }
    if merge.outer {
        let nulls = Row::nulls(build_size);
        rows.extend(
            undefined
                .iter()
                .map(|(_, row)| assemble(row, &nulls, right_drives)),
        );
    }
    Ok(Box::new(rows.into_iter().map(Ok)))
}

/// Shared, read-only state of a sort-merge join's probe phase.
struct Merge<'a> {
    /// Keyed build rows, sorted so that matches form a contiguous range.
    build: &'a [(Field, Row)],
    /// The merge condition, as `probe <op> build`.
    op: Comparison,
    predicate: &'a Expression,
    outer: bool,
    right_drives: bool,
    build_size: usize,
    cancel: &'a CancellationToken,
}

impl Merge<'_> {
    /// Merges one sorted range of probe rows against the build rows.
    fn partition(&self, probe: &[(Field, Row)]) -> Result<Vec<Row>> {
        let Some((first, _)) = probe.first() else {
            return Ok(Vec::new());
        };
        let slots = SlotCache::for_expressions([self.predicate]);
        let (mut start, mut end) = (
            self.build.partition_point(|(key, _)| self.before_start(first, key)),
            self.build.partition_point(|(key, _)| self.before_end(first, key)),
        );
        let mut rows = Vec::new();
        for (key, probe_row) in probe {
            self.cancel.check()?;
            while start < self.build.len() && self.before_start(key, &self.build[start].0) {
                start += 1;
            }
            end = end.max(start);
            while end < self.build.len() && self.before_end(key, &self.build[end].0) {
                end += 1;
            }
            let mut matched = false;
            for (_, build_row) in &self.build[start..end] {
                let joined = assemble(probe_row, build_row, self.right_drives);
                if holds(self.predicate, &joined, &slots)? {
                    matched = true;
                    rows.push(joined);
                }
            }
            if self.outer && !matched {
                let nulls = Row::nulls(self.build_size);
                rows.push(assemble(probe_row, &nulls, self.right_drives));
            }
        }
        Ok(rows)
    }

    /// True if the build key sorts before every match of the probe key.
    /// Inequality matches start at the first build row.
    fn before_start(&self, probe: &Field, build: &Field) -> bool {
        self.op == Comparison::Equal && probe.cmp(build) == Ordering::Greater
    }

    /// True if the build key sorts before the end of the probe key's matches.
    fn before_end(&self, probe: &Field, build: &Field) -> bool {
        match self.op {
            Comparison::Equal => probe.cmp(build) != Ordering::Less,
            op => op.holds(probe.cmp(build)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::utility::{create_n_rows, create_table_definition};

    const STRATEGIES: [JoinStrategy; 3] = [
        JoinStrategy::NestedLoop,
        JoinStrategy::Hash,
        JoinStrategy::SortMerge,
    ];

    fn rows(rows: Vec<Row>) -> Rows {
        Box::new(rows.into_iter().map(Ok))
    }

    fn col(index: usize) -> Box<Expression> {
        Box::new(Expression::Column(index))
    }

    /// Runs the join with the given strategy, returning the sorted rows.
    fn run(
        left: &[Row],
        right: &[Row],
        spec: &JoinSpec,
        strategy: JoinStrategy,
        partitions: usize,
    ) -> Vec<Row> {
        let mut result: Vec<Row> = join(
            rows(left.to_vec()),
            rows(right.to_vec()),
            spec.clone(),
            strategy,
            partitions,
            CancellationToken::new(),
        )
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();
        result.sort();
        result
    }

    fn people(values: &[(i64, &str)]) -> Vec<Row> {
        values
            .iter()
            .map(|(id, val)| Row::from(vec![Field::Integer(*id), Field::from(*val)]))
            .collect()
    }

    #[test]
    fn test_analyze_shapes() {
        let types = [DataType::Int, DataType::Text];
        let analyze = |expr: Expression| JoinPredicate::analyze(Some(&expr), &types, &types);

        // r.id = l.id: operands in either order.
        assert_eq!(
            analyze(Expression::Equal(col(2), col(0))),
            JoinPredicate::Equi(vec![KeyPair {
                left: 0,
                right: 0,
                numeric: false
            }])
        );
        // l.id > r.id AND l.val = r.val
        let ordering = analyze(Expression::And(
            Box::new(Expression::GreaterThan(col(0), col(2))),
            Box::new(Expression::Equal(col(1), col(3))),
        ));
        assert!(matches!(
            ordering,
            JoinPredicate::Ordering {
                op: Comparison::Greater,
                ..
            }
        ));
        // r.id < l.id flips to l.id > r.id.
        assert!(matches!(
            analyze(Expression::LessThan(col(2), col(0))),
            JoinPredicate::Ordering {
                op: Comparison::Greater,
                ..
            }
        ));

        // Same-side comparisons, mixed types, OR, and repeated columns are opaque.
        assert_eq!(analyze(Expression::Equal(col(0), col(1))), JoinPredicate::Opaque);
        assert_eq!(analyze(Expression::Equal(col(0), col(3))), JoinPredicate::Opaque);
        assert_eq!(
            analyze(Expression::Or(
                Box::new(Expression::Equal(col(0), col(2))),
                Box::new(Expression::Equal(col(1), col(3))),
            )),
            JoinPredicate::Opaque
        );
        assert_eq!(
            analyze(Expression::And(
                Box::new(Expression::Equal(col(0), col(2))),
                Box::new(Expression::Equal(col(0), col(2))),
            )),
            JoinPredicate::Opaque
        );
        assert_eq!(
            JoinPredicate::analyze(None, &types, &types),
            JoinPredicate::Opaque
        );
    }

    #[test]
    fn test_choose_strategy() {
        let equi = JoinPredicate::Equi(vec![]);
        let ordering = JoinPredicate::Ordering {
            inequality: KeyPair {
                left: 0,
                right: 0,
                numeric: true,
            },
            op: Comparison::Less,
            equalities: vec![],
        };
        let all = Settings::default();
        let baseline = Settings::baseline();
        assert_eq!(choose_strategy(&equi, &all), JoinStrategy::Hash);
        assert_eq!(choose_strategy(&ordering, &all), JoinStrategy::SortMerge);
        assert_eq!(choose_strategy(&JoinPredicate::Opaque, &all), JoinStrategy::NestedLoop);
        assert_eq!(choose_strategy(&equi, &baseline), JoinStrategy::NestedLoop);
        assert_eq!(choose_strategy(&ordering, &baseline), JoinStrategy::NestedLoop);

        // Equi-joins fall back to sort-merge when hash joins are disabled.
        let sort_merge_only = Settings {
            use_sort_merge_join: true,
            ..Settings::baseline()
        };
        assert_eq!(choose_strategy(&equi, &sort_merge_only), JoinStrategy::SortMerge);
        assert_eq!(choose_strategy(&ordering, &sort_merge_only), JoinStrategy::SortMerge);
        let hash_only = Settings {
            use_hash_join: true,
            ..Settings::baseline()
        };
        assert_eq!(choose_strategy(&equi, &hash_only), JoinStrategy::Hash);
        assert_eq!(choose_strategy(&ordering, &hash_only), JoinStrategy::NestedLoop);
    }

    #[test]
    fn test_left_outer_example() {
        let left = people(&[(1, "a"), (2, "b")]);
        let right = people(&[(2, "x"), (3, "y")]);
        let types = [DataType::Int, DataType::Text];
        let spec = JoinSpec::new(
            JoinType::LeftOuter,
            Some(Expression::Equal(col(0), col(2))),
            &types,
            &types,
        );
        let expected = vec![
            Row::from(vec![Field::Integer(1), Field::from("a"), Field::Null, Field::Null]),
            Row::from(vec![
                Field::Integer(2),
                Field::from("b"),
                Field::Integer(2),
                Field::from("x"),
            ]),
        ];
        // Each settings combination picks a different strategy for the same join.
        for (use_hash_join, use_sort_merge_join, strategy) in [
            (false, false, JoinStrategy::NestedLoop),
            (true, false, JoinStrategy::Hash),
            (false, true, JoinStrategy::SortMerge),
        ] {
            let settings = Settings {
                use_hash_join,
                use_sort_merge_join,
                ..Settings::baseline()
            };
            assert_eq!(choose_strategy(&spec.shape, &settings), strategy);
            assert_eq!(run(&left, &right, &spec, strategy, 1), expected);
        }
    }

    #[test]
    fn test_equi_sort_merge_emits_runs() {
        // Duplicate keys on both sides cross-emit their runs; l1 = r1 is
        // checked through the predicate.
        let left = people(&[(2, "a"), (1, "a"), (2, "b"), (4, "a"), (2, "a")]);
        let right = people(&[(2, "a"), (3, "a"), (2, "a"), (2, "b"), (0, "a")]);
        let types = [DataType::Int, DataType::Text];
        let spec = JoinSpec::new(
            JoinType::Inner,
            Some(Expression::And(
                Box::new(Expression::Equal(col(0), col(2))),
                Box::new(Expression::Equal(col(1), col(3))),
            )),
            &types,
            &types,
        );
        let JoinPredicate::Equi(keys) = &spec.shape else {
            panic!("expected an equi-join, got {:?}", spec.shape);
        };
        for partitions in [1, 2, 8] {
            let mut result: Vec<Row> = sort_merge(
                rows(left.clone()),
                rows(right.clone()),
                &spec,
                keys[0],
                Comparison::Equal,
                partitions,
                CancellationToken::new(),
            )
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
            result.sort();
            let pair = |id: i64, val: &str| {
                Row::from(vec![
                    Field::Integer(id),
                    Field::from(val),
                    Field::Integer(id),
                    Field::from(val),
                ])
            };
            let expected = vec![
                pair(2, "a"),
                pair(2, "a"),
                pair(2, "a"),
                pair(2, "a"),
                pair(2, "b"),
            ];
            assert_eq!(result, expected);
            assert_eq!(result, run(&left, &right, &spec, JoinStrategy::NestedLoop, 1));
        }
    }

    #[test]
    fn test_right_outer_keeps_column_order() {
        let left = people(&[(1, "a"), (2, "b")]);
        let right = people(&[(2, "x"), (3, "y")]);
        let types = [DataType::Int, DataType::Text];
        let spec = JoinSpec::new(
            JoinType::RightOuter,
            Some(Expression::Equal(col(0), col(2))),
            &types,
            &types,
        );
        let mut expected = vec![
            Row::from(vec![Field::Null, Field::Null, Field::Integer(3), Field::from("y")]),
            Row::from(vec![
                Field::Integer(2),
                Field::from("b"),
                Field::Integer(2),
                Field::from("x"),
            ]),
        ];
        expected.sort();
        for strategy in STRATEGIES {
            assert_eq!(run(&left, &right, &spec, strategy, 1), expected);
        }
    }

    #[test]
    fn test_strategy_equivalence() {
        let left_table = create_table_definition("l", &[DataType::Int, DataType::Float, DataType::Text]);
        let right_table = create_table_definition("r", &[DataType::Int, DataType::Int, DataType::Text]);
        let left = create_n_rows(60, &left_table, 8, 15, Some(1));
        let right = create_n_rows(50, &right_table, 8, 15, Some(2));
        let (lt, rt) = (left_table.column_types(), right_table.column_types());

        let predicates = vec![
            // l0 = r0
            Expression::Equal(col(0), col(3)),
            // l1 = r1 AND l2 = r2 (float against int)
            Expression::And(
                Box::new(Expression::Equal(col(1), col(4))),
                Box::new(Expression::Equal(col(2), col(5))),
            ),
            // l0 < r1
            Expression::LessThan(col(0), col(4)),
            // l1 >= r0 AND l2 = r2
            Expression::And(
                Box::new(Expression::GreaterThanOrEqual(col(1), col(3))),
                Box::new(Expression::Equal(col(2), col(5))),
            ),
            // r2 > l2
            Expression::GreaterThan(col(5), col(2)),
            // l0 <= r0
            Expression::LessThanOrEqual(col(0), col(3)),
        ];

        for predicate in predicates {
            for join_type in [JoinType::Inner, JoinType::LeftOuter, JoinType::RightOuter] {
                let spec = JoinSpec::new(join_type, Some(predicate.clone()), &lt, &rt);
                assert_ne!(spec.shape, JoinPredicate::Opaque);
                let baseline = run(&left, &right, &spec, JoinStrategy::NestedLoop, 1);
                for strategy in STRATEGIES {
                    for partitions in [1, 3, 64] {
                        let result = run(&left, &right, &spec, strategy, partitions);
                        assert_eq!(
                            result, baseline,
                            "{strategy:?} {join_type} join on {predicate:?} differs"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_null_keys_never_match() {
        let left = people(&[(1, "a")])
            .into_iter()
            .chain([Row::from(vec![Field::Null, Field::from("b")])])
            .collect::<Vec<_>>();
        let right = vec![
            Row::from(vec![Field::Null]),
            Row::from(vec![Field::Float(f64::NAN)]),
            Row::from(vec![Field::Integer(1)]),
        ];
        let (lt, rt) = ([DataType::Int, DataType::Text], [DataType::Float]);
        let matched = Row::from(vec![Field::Integer(1), Field::from("a"), Field::Integer(1)]);
        let left_padded = Row::from(vec![Field::Null, Field::from("b"), Field::Null]);
        let right_padded = |value: Field| Row::from(vec![Field::Null, Field::Null, value]);

        for predicate in [
            Expression::Equal(col(0), col(2)),
            Expression::LessThanOrEqual(col(0), col(2)),
        ] {
            for join_type in [JoinType::Inner, JoinType::LeftOuter, JoinType::RightOuter] {
                let spec = JoinSpec::new(join_type, Some(predicate.clone()), &lt, &rt);
                // Undefined keys are padded exactly once on the preserved side.
                let mut expected = match join_type {
                    JoinType::Inner => vec![matched.clone()],
                    JoinType::LeftOuter => vec![matched.clone(), left_padded.clone()],
                    JoinType::RightOuter => vec![
                        matched.clone(),
                        right_padded(Field::Null),
                        right_padded(Field::Float(f64::NAN)),
                    ],
                };
                expected.sort();
                for strategy in STRATEGIES {
                    for partitions in [1, 2] {
                        assert_eq!(
                            run(&left, &right, &spec, strategy, partitions),
                            expected,
                            "{strategy:?} {join_type} join on {predicate:?}"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_outer_join_completeness() {
        let table = create_table_definition("t", &[DataType::Int]);
        let left = create_n_rows(40, &table, 10, 10, Some(3));
        let right = create_n_rows(40, &table, 10, 10, Some(4));
        let spec = JoinSpec::new(
            JoinType::LeftOuter,
            Some(Expression::GreaterThan(col(0), col(1))),
            &[DataType::Int],
            &[DataType::Int],
        );
        for strategy in STRATEGIES {
            let result = run(&left, &right, &spec, strategy, 4);
            for row in &left {
                let value = &row.values()[0];
                let matches = right
                    .iter()
                    .filter(|r| value.sql_cmp(&r.values()[0]).unwrap() == Some(Ordering::Greater))
                    .count();
                let emitted = result.iter().filter(|r| &r.values()[0] == value).count();
                let occurrences = left.iter().filter(|r| &r.values()[0] == value).count();
                assert_eq!(emitted, occurrences * matches.max(1), "{strategy:?}");
            }
        }
    }

    #[test]
    fn test_cancelled_join_errors() {
        let left = people(&[(1, "a")]);
        let right = people(&[(1, "x")]);
        let types = [DataType::Int, DataType::Text];
        let spec = JoinSpec::new(
            JoinType::Inner,
            Some(Expression::LessThanOrEqual(col(0), col(2))),
            &types,
            &types,
        );
        for strategy in STRATEGIES {
            let cancel = CancellationToken::new();
            cancel.cancel();
            let result = join(
                rows(left.clone()),
                rows(right.clone()),
                spec.clone(),
                strategy,
                2,
                cancel,
            )
            .and_then(|rows| rows.collect::<Result<Vec<_>>>());
            assert_eq!(result, Err(Error::Cancelled));
        }
    }
}
