use crate::storage::tuple::Row;
use crate::types::field::Field;
use crate::types::{Column, DataType, Table};
use rand::{random, Rng};
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;

/// Creates a table definition with one column per given type, named
/// `{table_name}{i}`. Every column is nullable.
pub fn create_table_definition(table_name: &str, types: &[DataType]) -> Table {
    let mut table = Table::new(table_name);
    for (i, data_type) in types.iter().enumerate() {
        table.add_column(
            &Column::builder()
                .name(&format!("{table_name}{i}"))
                .data_type(*data_type)
                .build(),
        );
    }
    table
}

/// Creates a random field of the given type. Values are drawn from
/// `0..domain` (halved for floats, so some floats equal integers), which
/// keeps duplicate and matching keys frequent. Nullable columns produce
/// NULL roughly `null_percent` percent of the time.
pub fn create_random_field(
    column: &Column,
    rng: &mut ChaCha8Rng,
    domain: i64,
    null_percent: u32,
) -> Field {
    if column.is_nullable() && rng.gen_range(0..100) < null_percent {
        return Field::Null;
    }
    match column.get_data_type() {
        DataType::Bool => Field::Boolean(rng.gen()),
        DataType::Int => Field::Integer(rng.gen_range(0..domain)),
        DataType::Float => Field::Float(rng.gen_range(0..domain * 2) as f64 / 2.0),
        DataType::Text => {
            let len = rng.gen_range(1..3);
            // A tiny alphabet, so strings collide.
            let s: String = (0..len)
                .map(|_| (b'a' + rng.gen_range(0..domain.clamp(1, 26)) as u8) as char)
                .collect();
            Field::from(s)
        }
        DataType::Null => Field::Null,
    }
}

/// Create a row for the given table schema
pub fn create_random_row(
    schema: &Table,
    rng: &mut ChaCha8Rng,
    domain: i64,
    null_percent: u32,
) -> Row {
    Row::from(
        schema
            .columns()
            .iter()
            .map(|column| create_random_field(column, rng, domain, null_percent))
            .collect::<Vec<_>>(),
    )
}

/// Creates n random rows for the schema. A fixed seed yields the same rows
/// on every run; None picks a random seed.
pub fn create_n_rows(
    n: usize,
    schema: &Table,
    domain: i64,
    null_percent: u32,
    seed: Option<u64>,
) -> Vec<Row> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed.unwrap_or_else(random));
    (0..n)
        .map(|_| create_random_row(schema, &mut rng, domain, null_percent))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_rows_are_reproducible() {
        let table = create_table_definition(
            "t",
            &[DataType::Int, DataType::Float, DataType::Text, DataType::Bool],
        );
        assert_eq!(table.get_column_name(2), "t2");

        let a = create_n_rows(50, &table, 5, 20, Some(7));
        let b = create_n_rows(50, &table, 5, 20, Some(7));
        assert_eq!(a, b);
        assert!(a.iter().all(|row| row.size() == 4));
        assert!(a.iter().any(|row| row.values()[0].is_null()));
    }
}
