use crate::common::constants::{SET_KEY_OUT_OF_RANGE_MSG, SET_OPERAND_WIDTH_MSG};
use crate::common::{CancellationToken, Result};
use crate::errprecondition;
use crate::sql::planner::SetOperator;
use crate::storage::tuple::{Row, Rows};
use crate::types::field::Field;
use std::collections::HashSet;

/// Combines two row sources with a set operator. Rows are compared on the
/// key columns only, value by value, with integers and floats comparing
/// numerically and NULLs comparing equal to each other.
///
/// Every operator but UNION ALL removes duplicate keys, keeping the first
/// row seen for each. Output follows left then right input order.
pub fn evaluate(
    op: SetOperator,
    left: Rows,
    right: Rows,
    (left_width, right_width): (usize, usize),
    key: &[usize],
    cancel: &CancellationToken,
) -> Result<Rows> {
    if left_width != right_width {
        return errprecondition!("{SET_OPERAND_WIDTH_MSG}: {left_width} and {right_width}");
    }
    if let Some(index) = key.iter().find(|&&index| index >= left_width) {
        return errprecondition!("{SET_KEY_OUT_OF_RANGE_MSG}: {index} >= {left_width}");
    }
    let key = key.to_vec();

    Ok(match op {
        SetOperator::UnionAll => Box::new(left.chain(right)),
        SetOperator::Union => distinct(Box::new(left.chain(right)), key),
        SetOperator::Except | SetOperator::Intersect => {
            let mut right_keys = HashSet::new();
            for row in right {
                cancel.check()?;
                right_keys.insert(row_key(&row?, &key)?);
            }
            // INTERSECT keeps left rows found on the right, EXCEPT the others.
            let keep = op == SetOperator::Intersect;
            let probe = key.clone();
            let filtered = left.filter_map(move |result| {
                let row = match result {
                    Ok(row) => row,
                    Err(err) => return Some(Err(err)),
                };
                match row_key(&row, &probe) {
                    Ok(k) => (right_keys.contains(&k) == keep).then_some(Ok(row)),
                    Err(err) => Some(Err(err)),
                }
            });
            distinct(Box::new(filtered), key)
        }
    })
}

/// Projects and normalizes a row's comparison key.
fn row_key(row: &Row, key: &[usize]) -> Result<Vec<Field>> {
    key.iter()
        .map(|&index| Ok(row.field(index)?.to_numeric_key()))
        .collect()
}

/// Drops rows whose key was already emitted.
fn distinct(rows: Rows, key: Vec<usize>) -> Rows {
    let mut seen = HashSet::new();
    Box::new(rows.filter_map(move |result| match result {
        Ok(row) => match row_key(&row, &key) {
            Ok(k) => seen.insert(k).then_some(Ok(row)),
            Err(err) => Some(Err(err)),
        },
        Err(err) => Some(Err(err)),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::utility::{create_n_rows, create_table_definition};
    use crate::common::Error;
    use crate::types::DataType;
    use itertools::Itertools as _;

    fn rows(rows: &[Row]) -> Rows {
        Box::new(rows.to_vec().into_iter().map(Ok))
    }

    fn run(op: SetOperator, left: &[Row], right: &[Row], key: &[usize]) -> Result<Vec<Row>> {
        let width = left.first().or(right.first()).map_or(0, Row::size);
        evaluate(op, rows(left), rows(right), (width, width), key, &CancellationToken::new())?
            .collect()
    }

    fn sample(seed: u64) -> Vec<Row> {
        let table = create_table_definition("t", &[DataType::Int, DataType::Text]);
        create_n_rows(40, &table, 3, 10, Some(seed))
    }

    #[test]
    fn test_set_laws() {
        let (a, b) = (sample(1), sample(2));
        let all = [0, 1];
        let dedup: Vec<Row> = a.iter().unique().cloned().collect();

        assert_eq!(run(SetOperator::Union, &a, &a, &all).unwrap(), dedup);
        assert_eq!(run(SetOperator::Except, &a, &a, &all).unwrap(), vec![]);
        assert_eq!(run(SetOperator::Intersect, &a, &a, &all).unwrap(), dedup);
        assert_eq!(
            run(SetOperator::UnionAll, &a, &b, &all).unwrap().len(),
            a.len() + b.len()
        );
    }

    #[test]
    fn test_except_and_intersect_partition_left() {
        let (a, b) = (sample(3), sample(4));
        let all = [0, 1];
        let except = run(SetOperator::Except, &a, &b, &all).unwrap();
        let intersect = run(SetOperator::Intersect, &a, &b, &all).unwrap();
        assert!(except.iter().all(|row| !b.contains(row)));
        assert!(intersect.iter().all(|row| b.contains(row)));

        let mut both: Vec<Row> = except.into_iter().chain(intersect).collect();
        both.sort();
        let mut dedup: Vec<Row> = a.iter().unique().cloned().collect();
        dedup.sort();
        assert_eq!(both, dedup);
    }

    #[test]
    fn test_key_subset_and_numeric_equality() {
        let left = vec![
            Row::from(vec![Field::Integer(1), Field::from("a")]),
            Row::from(vec![Field::Integer(2), Field::from("b")]),
            Row::from(vec![Field::Null, Field::from("c")]),
        ];
        let right = vec![
            Row::from(vec![Field::Float(1.0), Field::from("z")]),
            Row::from(vec![Field::Null, Field::from("y")]),
        ];
        // Only the first column is compared. NULLs match each other.
        assert_eq!(
            run(SetOperator::Except, &left, &right, &[0]).unwrap(),
            vec![left[1].clone()]
        );
        assert_eq!(
            run(SetOperator::Intersect, &left, &right, &[0]).unwrap(),
            vec![left[0].clone(), left[2].clone()]
        );
        // UNION keeps the first row for each key.
        assert_eq!(
            run(SetOperator::Union, &left, &right, &[0]).unwrap(),
            left
        );
    }

    #[test]
    fn test_invalid_operands() {
        let row = Row::from(vec![Field::Integer(1)]);
        let cancel = CancellationToken::new();
        let width = evaluate(
            SetOperator::Union,
            rows(&[row.clone()]),
            rows(&[row.clone()]),
            (1, 2),
            &[0],
            &cancel,
        );
        assert!(matches!(width, Err(Error::Precondition(msg)) if msg.starts_with(SET_OPERAND_WIDTH_MSG)));

        let key = evaluate(SetOperator::Except, rows(&[row.clone()]), rows(&[row]), (1, 1), &[1], &cancel);
        assert!(matches!(key, Err(Error::Precondition(msg)) if msg.starts_with(SET_KEY_OUT_OF_RANGE_MSG)));
    }
}
