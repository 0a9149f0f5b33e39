use crate::common::Result;
use crate::errinput;
use crate::sql::planner::{Direction, Expression, RowContext, SlotCache};
use crate::storage::tuple::{Row, Rows};
use crate::types::field::Field;
use itertools::{izip, Itertools as _};

/// Filters the input rows (i.e. WHERE).
pub fn filter(source: Rows, predicate: Expression) -> Rows {
    let slots = SlotCache::for_expressions([&predicate]);
    Box::new(source.filter_map(move |result| {
        result
            .and_then(|row| Ok(holds(&predicate, &row, &slots)?.then_some(row)))
            .transpose()
    }))
}

/// Evaluates a predicate against a row as its own cache row. NULL counts
/// as false; any other non-boolean is an error.
pub(super) fn holds(predicate: &Expression, row: &Row, slots: &SlotCache) -> Result<bool> {
    slots.next_row();
    match predicate.evaluate_in(&RowContext::with_slots(Some(row), slots))? {
        Field::Boolean(matched) => Ok(matched),
        Field::Null => Ok(false),
        value => errinput!("predicate returned {value}, expected boolean"),
    }
}

/// Evaluates a set of expressions against one row sharing one cache row.
pub(super) fn evaluate_all(
    expressions: &[Expression],
    row: &Row,
    slots: &SlotCache,
) -> Result<Vec<Field>> {
    slots.next_row();
    let ctx = RowContext::with_slots(Some(row), slots);
    expressions.iter().map(|expr| expr.evaluate_in(&ctx)).collect()
}

/// Limits the result to the given number of rows (i.e. LIMIT).
pub fn limit(source: Rows, limit: usize) -> Rows {
    Box::new(source.take(limit))
}

/// Skips the given number of rows (i.e. OFFSET).
pub fn offset(source: Rows, offset: usize) -> Rows {
    Box::new(source.skip(offset))
}

/// Sorts the rows (i.e. ORDER BY). The sort is stable.
pub fn order(source: Rows, order: Vec<(Expression, Direction)>) -> Result<Rows> {
    // We can't use sort_by_cached_key(), since expression evaluation is
    // fallible, and since we may have to vary the sort direction of each
    // expression. Precompute the sort values instead, and map them based on
    // the row index.
    let (expressions, directions): (Vec<_>, Vec<_>) = order.into_iter().unzip();
    let slots = SlotCache::for_expressions(&expressions);
    let mut irows: Vec<_> = source.enumerate().map(|(i, r)| r.map(|row| (i, row))).try_collect()?;
    let mut sort_values = Vec::with_capacity(irows.len());
    for (_, row) in &irows {
        sort_values.push(evaluate_all(&expressions, row, &slots)?);
    }

    irows.sort_by(|&(a, _), &(b, _)| {
        for (a, b, dir) in izip!(&sort_values[a], &sort_values[b], &directions) {
            match a.cmp(b) {
                std::cmp::Ordering::Equal => {}
                order if *dir == Direction::Descending => return order.reverse(),
                order => return order,
            }
        }
        std::cmp::Ordering::Equal
    });

    Ok(Box::new(irows.into_iter().map(|(_, row)| Ok(row))))
}

/// Projects the rows using the given expressions (i.e. SELECT).
pub fn project(source: Rows, expressions: Vec<Expression>) -> Rows {
    let slots = SlotCache::for_expressions(&expressions);
    Box::new(source.map(move |result| {
        result.and_then(|row| Ok(Row::from(evaluate_all(&expressions, &row, &slots)?)))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;

    fn rows(values: &[(i64, &str)]) -> Rows {
        let rows: Vec<Row> = values
            .iter()
            .map(|(i, s)| Row::from(vec![Field::Integer(*i), Field::from(*s)]))
            .collect();
        Box::new(rows.into_iter().map(Ok))
    }

    fn collect(rows: Rows) -> Vec<String> {
        rows.map(|r| r.unwrap().to_string(None)).collect()
    }

    #[test]
    fn test_filter_treats_null_as_false() {
        let predicate = Expression::GreaterThan(
            Box::new(Expression::Column(0)),
            Box::new(Expression::Constant(Field::Null)),
        );
        assert!(collect(filter(rows(&[(1, "a")]), predicate)).is_empty());

        let not_boolean = filter(rows(&[(1, "a")]), Expression::Column(0));
        assert!(matches!(
            not_boolean.collect::<Result<Vec<_>>>(),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_offset_limit_then_order() {
        // Skip and take pick rows in source order; only those are sorted.
        let source = rows(&[(2, "b"), (1, "x"), (3, "c"), (1, "a")]);
        let sorted = order(
            limit(offset(source, 1), 2),
            vec![
                (Expression::Column(0), Direction::Descending),
                (Expression::Column(1), Direction::Ascending),
            ],
        )
        .unwrap();
        assert_eq!(collect(sorted), vec!["3, c", "1, x"]);
    }

    #[test]
    fn test_project() {
        let projected = project(
            rows(&[(2, "b")]),
            vec![
                Expression::Column(1),
                Expression::Multiply(
                    Box::new(Expression::Column(0)),
                    Box::new(Expression::Constant(Field::Integer(10))),
                ),
            ],
        );
        assert_eq!(collect(projected), vec!["b, 20"]);
    }
}
