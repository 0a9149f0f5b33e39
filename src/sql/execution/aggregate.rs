//! The grouping engine.
//!
//! GROUP BY keys are resolved through a group hierarchy: for N group-by
//! expressions, each row walks N progressively longer key prefixes from the
//! root, creating the groups it doesn't find. The group at the end of the
//! walk is the row's full-key group, which carries the aggregate state. Groups
//! live in an arena and refer to their parents by index.
use crate::common::{CancellationToken, Result};
use crate::sql::execution::transform::{evaluate_all, holds};
use crate::sql::planner::{Aggregate, Expression, SlotCache};
use crate::storage::tuple::{Row, Rows};
use crate::types::field::Field;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// Aggregates row values from the source according to the aggregates, using
/// the group_by expressions as keys. Emits rows with group_by values then
/// aggregates in the given order, one row per distinct full key, in the order
/// the keys were first seen.
pub fn aggregate(
    mut source: Rows,
    group_by: Vec<Expression>,
    key_names: Vec<String>,
    aggregates: Vec<Aggregate>,
    having: Option<Expression>,
    cancel: &CancellationToken,
) -> Result<Rows> {
    let mut groups = GroupHierarchy::new(group_by, key_names, aggregates, having);
    while let Some(row) = source.next().transpose()? {
        cancel.check()?;
        groups.add(row)?;
    }
    groups.into_rows()
}

/// A handle to a group in the hierarchy's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GroupId(usize);

impl GroupId {
    /// The root sentinel, with an empty key.
    pub const ROOT: GroupId = GroupId(0);
}

/// A group for one key prefix.
#[derive(Clone, Debug)]
pub struct Group {
    /// The enclosing group, one key column shorter. None for the root.
    pub parent: Option<GroupId>,
    /// Names of the key columns, from the outermost in.
    pub key_names: Vec<String>,
    /// The key prefix values.
    pub values: Vec<Field>,
    /// Aggregate state. Only full-key groups accumulate.
    accumulators: Vec<Accumulator>,
}

/// Builds the group hierarchy for a GROUP BY, one source row at a time.
struct GroupHierarchy {
    /// The group arena. Index 0 is the root.
    groups: Vec<Group>,
    /// Key prefix to group lookup, for every prefix length.
    index: HashMap<Vec<Field>, GroupId>,
    /// Full-key groups that already have an output row.
    used_groups: HashSet<GroupId>,
    /// Output groups, in first-seen order.
    output: Vec<GroupId>,
    /// The set of empty accumulators. Used to create new full-key groups.
    empty: Vec<Accumulator>,
    group_by: Vec<Expression>,
    key_names: Vec<String>,
    /// Group by expressions followed by the aggregate arguments. They share
    /// one evaluation scope.
    expressions: Vec<Expression>,
    slots: SlotCache,
    having: Option<Expression>,
    having_slots: SlotCache,
}

impl GroupHierarchy {
    fn new(
        group_by: Vec<Expression>,
        key_names: Vec<String>,
        aggregates: Vec<Aggregate>,
        having: Option<Expression>,
    ) -> Self {
        let empty: Vec<Accumulator> = aggregates.iter().map(Accumulator::new).collect();
        let expressions: Vec<Expression> = group_by
            .iter()
            .cloned()
            .chain(aggregates.into_iter().map(Aggregate::into_expression))
            .collect();
        let root = Group {
            parent: None,
            key_names: Vec::new(),
            values: Vec::new(),
            accumulators: if group_by.is_empty() {
                empty.clone()
            } else {
                Vec::new()
            },
        };
        Self {
            groups: vec![root],
            index: HashMap::new(),
            used_groups: HashSet::new(),
            output: Vec::new(),
            empty,
            slots: SlotCache::for_expressions(&expressions),
            having_slots: SlotCache::for_expressions(having.iter()),
            group_by,
            key_names,
            expressions,
            having,
        }
    }

    fn group(&self, id: GroupId) -> &Group {
        &self.groups[id.0]
    }

    /// Returns the group for the key prefix, creating it under the parent if
    /// it doesn't exist yet.
    fn get_or_create(&mut self, parent: GroupId, prefix: &[Field]) -> GroupId {
        if let Some(id) = self.index.get(prefix) {
            return *id;
        }
        let depth = prefix.len();
        let id = GroupId(self.groups.len());
        self.groups.push(Group {
            parent: Some(parent),
            key_names: self.key_names[..depth].to_vec(),
            values: prefix.to_vec(),
            accumulators: if depth == self.group_by.len() {
                self.empty.clone()
            } else {
                Vec::new()
            },
        });
        self.index.insert(prefix.to_vec(), id);
        id
    }

    /// Adds a row to the hierarchy.
    fn add(&mut self, row: Row) -> Result<()> {
        let mut values = evaluate_all(&self.expressions, &row, &self.slots)?;
        let arguments = values.split_off(self.group_by.len());
        let keys = values;

        let mut current = GroupId::ROOT;
        for depth in 1..=keys.len() {
            current = self.get_or_create(current, &keys[..depth]);
        }

        let group = &mut self.groups[current.0];
        for (accumulator, value) in group.accumulators.iter_mut().zip(arguments) {
            accumulator.add(value)?;
        }

        if let Some(having) = &self.having {
            let group = self.group(current);
            let row = Row::from(
                group
                    .values
                    .iter()
                    .cloned()
                    .map(Ok)
                    .chain(group.accumulators.iter().map(Accumulator::value))
                    .collect::<Result<Vec<_>>>()?,
            );
            if !holds(having, &row, &self.having_slots)? {
                return Ok(());
            }
        }

        if self.used_groups.insert(current) {
            self.output.push(current);
        }
        Ok(())
    }

    /// Returns a row iterator over the aggregate result.
    fn into_rows(mut self) -> Result<Rows> {
        // If there were no rows and no group_by expressions, return a row of
        // empty accumulators, e.g. SELECT COUNT(*) FROM t WHERE FALSE
        if self.group_by.is_empty() && self.groups[0].accumulators.iter().all(|a| a.is_empty()) {
            let row = Row::from(
                self.empty
                    .iter()
                    .map(Accumulator::value)
                    .collect::<Result<Vec<_>>>()?,
            );
            let passes = match &self.having {
                Some(having) => holds(having, &row, &self.having_slots)?,
                None => true,
            };
            return Ok(Box::new(passes.then_some(Ok(row)).into_iter()));
        }

        // A group enters the output once HAVING held on a running value, but
        // it is emitted with its final values, so HAVING must hold on those.
        let output = std::mem::take(&mut self.output);
        let mut rows = Vec::with_capacity(output.len());
        for id in output {
            let group = self.group(id);
            let row = Row::from(
                group
                    .values
                    .iter()
                    .cloned()
                    .map(Ok)
                    .chain(group.accumulators.iter().map(Accumulator::value))
                    .collect::<Result<Vec<_>>>()?,
            );
            if let Some(having) = &self.having {
                if !holds(having, &row, &self.having_slots)? {
                    continue;
                }
            }
            rows.push(row);
        }
        Ok(Box::new(rows.into_iter().map(Ok)))
    }
}

/// Accumulates aggregate values. Uses an enum rather than a trait since we need
/// to keep these in a vector. NULL inputs are ignored by every accumulator.
#[derive(Clone, Debug)]
enum Accumulator {
    Average { count: i64, sum: Field },
    Count(i64),
    Max(Option<Field>),
    Min(Option<Field>),
    Sum(Option<Field>),
}

impl Accumulator {
    /// Creates a new accumulator from an aggregate kind.
    fn new(aggregate: &Aggregate) -> Self {
        match aggregate {
            Aggregate::Average(_) => Self::Average {
                count: 0,
                sum: Field::Integer(0),
            },
            Aggregate::Count(_) => Self::Count(0),
            Aggregate::Max(_) => Self::Max(None),
            Aggregate::Min(_) => Self::Min(None),
            Aggregate::Sum(_) => Self::Sum(None),
        }
    }

    /// Returns true if no value has been accumulated.
    fn is_empty(&self) -> bool {
        match self {
            Self::Average { count, .. } | Self::Count(count) => *count == 0,
            Self::Max(value) | Self::Min(value) | Self::Sum(value) => value.is_none(),
        }
    }

    /// Adds a value to the accumulator.
    fn add(&mut self, value: Field) -> Result<()> {
        if value.is_null() {
            return Ok(());
        }
        match self {
            Self::Average { count, sum } => {
                *sum = sum.checked_add(&value)?;
                *count += 1;
            }
            Self::Count(count) => *count += 1,
            Self::Max(Some(max)) => {
                if value.sql_cmp(max)? == Some(Ordering::Greater) {
                    *max = value;
                }
            }
            Self::Min(Some(min)) => {
                if value.sql_cmp(min)? == Some(Ordering::Less) {
                    *min = value;
                }
            }
            Self::Max(current @ None) | Self::Min(current @ None) => *current = Some(value),
            Self::Sum(Some(sum)) => *sum = sum.checked_add(&value)?,
            Self::Sum(sum @ None) => *sum = Some(Field::Integer(0).checked_add(&value)?),
        }
        Ok(())
    }

    /// Returns the aggregate value.
    fn value(&self) -> Result<Field> {
        Ok(match self {
            Self::Average { count: 0, .. } => Field::Null,
            Self::Average { count, sum } => match sum {
                Field::Integer(sum) => Field::Float(*sum as f64 / *count as f64),
                Field::Float(sum) => Field::Float(sum / *count as f64),
                sum => sum.clone(),
            },
            Self::Count(count) => Field::Integer(*count),
            Self::Max(value) | Self::Min(value) | Self::Sum(value) => {
                value.clone().unwrap_or(Field::Null)
            }
        })
    }
}
