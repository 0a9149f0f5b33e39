use itertools::Itertools;
use rustyquery::common::Result;
use rustyquery::config::Settings;
use rustyquery::sql::engine::{Local, Statement, StatementResult};
use rustyquery::sql::execution::join::{choose_strategy, JoinSpec};
use rustyquery::sql::planner::{Expression, JoinType, Node, Plan};
use rustyquery::storage::tuple::Row;
use rustyquery::storage::Memory;
use rustyquery::types::field::{Field, Label};
use rustyquery::types::{DataType, Table};
use std::path::Path;

/// Runs a sample left outer join under each join setting, printing the
/// strategy the join compiler picked. Takes an optional settings file path;
/// environment variables override it.
fn main() -> Result<()> {
    let path = std::env::args().nth(1);
    let settings = Settings::load(path.as_deref().map(Path::new))?;

    let people = Table::builder()
        .name("people")
        .column("id", DataType::Int, false)
        .column("name", DataType::Text, true)
        .build();
    let orders = Table::builder()
        .name("orders")
        .column("id", DataType::Int, true)
        .column("item", DataType::Text, true)
        .build();

    let engine = Local::new(Memory::new());
    let mut session = engine.session(settings.clone());
    for (table, rows) in [
        (&people, vec![(1, "a"), (2, "b")]),
        (&orders, vec![(2, "x"), (3, "y")]),
    ] {
        session.execute(Statement::CreateTable(table.clone()))?;
        let rows = rows
            .into_iter()
            .map(|(id, value)| Row::from(vec![Field::Integer(id), Field::from(value)]))
            .collect();
        session.execute(Statement::Insert {
            table: table.name().to_string(),
            rows,
        })?;
    }

    // SELECT * FROM people LEFT JOIN orders ON people.id = orders.id
    let predicate = Expression::Equal(
        Box::new(Expression::Column(0)),
        Box::new(Expression::Column(2)),
    );
    let spec = JoinSpec::new(
        JoinType::LeftOuter,
        Some(predicate.clone()),
        &people.column_types(),
        &orders.column_types(),
    );
    let plan = Plan::new(Node::join(
        Node::scan(&people),
        Node::scan(&orders),
        JoinType::LeftOuter,
        Some(predicate),
    ));
    for (hash, sort_merge) in [(false, false), (true, false), (false, true)] {
        let settings = Settings {
            use_hash_join: hash,
            use_sort_merge_join: sort_merge,
            ..settings.clone()
        };
        let strategy = choose_strategy(&spec.shape, &settings);
        println!("[console] {strategy:?} join (hash: {hash}, sort-merge: {sort_merge}):");
        match engine.session(settings).execute(Statement::Select(plan.clone()))? {
            StatementResult::Select { columns, rows } => {
                print_columns(&columns);
                print_rows(&rows);
            }
            result => println!("[console] unexpected result {result:?}"),
        }
    }
    Ok(())
}

fn print_columns(columns: &[Label]) {
    println!("  [{}]", columns.iter().map(|c| c.to_string()).join(", "));
}

fn print_rows(rows: &[Row]) {
    rows.iter().for_each(|row| println!("  {}", row.to_string(None)));
}
