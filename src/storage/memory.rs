use crate::common::{Error, Result};
use crate::errinput;
use crate::storage::engine::Status;
use crate::storage::tuple::Row;
use crate::storage::Engine;
use crate::types::Table;
use std::collections::BTreeMap;

/// An in-memory table store. Each table keeps its schema and rows in
/// insertion order.
#[derive(Default)]
pub struct Memory {
    tables: BTreeMap<String, MemoryTable>,
}

struct MemoryTable {
    schema: Table,
    rows: Vec<Row>,
}

impl Memory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Engine for Memory {
    type ScanIterator<'a> = ScanIterator<'a>
    where
        Self: Sized + 'a;

    fn create_table(&mut self, table: Table) -> Result<()> {
        if self.tables.contains_key(table.name()) {
            return errinput!("table {} already exists", table.name());
        }
        self.tables.insert(
            table.name().to_string(),
            MemoryTable {
                schema: table,
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    fn delete_table(&mut self, table_name: &str) -> Result<bool> {
        Ok(self.tables.remove(table_name).is_some())
    }

    fn get_table(&mut self, table_name: &str) -> Result<Option<Table>> {
        Ok(self.tables.get(table_name).map(|t| t.schema.clone()))
    }

    fn insert(&mut self, table_name: &str, rows: Vec<Row>) -> Result<usize> {
        let table = self
            .tables
            .get_mut(table_name)
            .ok_or_else(|| Error::InvalidData(table_name.to_string()))?;
        let width = table.schema.col_count();
        if let Some(row) = rows.iter().find(|row| row.size() != width) {
            return errinput!(
                "row has {} values, table {table_name} has {width} columns",
                row.size()
            );
        }
        let count = rows.len();
        table.rows.extend(rows);
        Ok(count)
    }

    fn scan(&mut self, table_name: &str) -> Result<Self::ScanIterator<'_>>
    where
        Self: Sized,
    {
        let table = self
            .tables
            .get(table_name)
            .ok_or_else(|| Error::InvalidData(table_name.to_string()))?;
        Ok(ScanIterator {
            inner: table.rows.iter(),
        })
    }

    fn status(&mut self) -> Result<Status> {
        Ok(Status {
            name: "memory".to_string(),
            tables: self.tables.len() as u64,
            rows: self.tables.values().map(|t| t.rows.len() as u64).sum(),
        })
    }
}

pub struct ScanIterator<'a> {
    inner: std::slice::Iter<'a, Row>,
}

impl Iterator for ScanIterator<'_> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().cloned().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::field::Field;
    use crate::types::DataType;

    fn people() -> Table {
        Table::builder()
            .name("people")
            .column("id", DataType::Int, false)
            .column("name", DataType::Text, true)
            .build()
    }

    #[test]
    fn test_create_insert_scan() {
        let mut memory = Memory::new();
        memory.create_table(people()).unwrap();
        assert!(memory.create_table(people()).is_err());

        let rows = vec![
            Row::from(vec![Field::Integer(1), Field::from("a")]),
            Row::from(vec![Field::Integer(2), Field::Null]),
        ];
        assert_eq!(memory.insert("people", rows.clone()).unwrap(), 2);
        assert!(memory.insert("people", vec![Row::nulls(3)]).is_err());

        let scanned: Vec<Row> = memory.scan("people").unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(scanned, rows);
        assert_eq!(memory.status().unwrap().rows, 2);

        assert!(memory.delete_table("people").unwrap());
        assert!(!memory.delete_table("people").unwrap());
        assert!(memory.scan("people").is_err());
    }
}
