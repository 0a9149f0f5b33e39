use crate::common::Result;
use crate::config::Settings;
use crate::sql::engine::{Catalog, Engine, Session, Sources};
use crate::storage::tuple::{Row, Rows};
use crate::types::Table;
use crate::{errinput, storage};
use std::sync::{Arc, Mutex};

/// A query engine over local storage. The storage engine sits behind a
/// mutex; scans copy the table's rows out under the lock, so no lock is held
/// while rows stream through a pipeline.
pub struct Local<E: storage::Engine + 'static> {
    /// The shared storage engine.
    engine: Arc<Mutex<E>>,
}

impl<E: storage::Engine> Clone for Local<E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

impl<E: storage::Engine> Local<E> {
    /// Creates a new local query engine using the given storage engine.
    pub fn new(engine: E) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
        }
    }

    /// Creates a session which executes statements with the given settings.
    /// Does not outlive the engine.
    pub fn session(&self, settings: Settings) -> Session<'_, Self> {
        Session::new(self, settings)
    }
}

impl<E: storage::Engine> Catalog for Local<E> {
    fn create_table(&self, table: Table) -> Result<()> {
        self.engine.lock()?.create_table(table)
    }

    fn drop_table(&self, table_name: &str, if_exists: bool) -> Result<bool> {
        let existed = self.engine.lock()?.delete_table(table_name)?;
        if !existed && !if_exists {
            return errinput!("Table {table_name} does not exist");
        }
        Ok(existed)
    }

    fn get_table(&self, table_name: &str) -> Result<Option<Table>> {
        self.engine.lock()?.get_table(table_name)
    }
}

impl<E: storage::Engine> Sources for Local<E> {
    fn scan(&self, table_name: &str) -> Result<Rows> {
        let rows: Vec<Row> = {
            let mut engine = self.engine.lock()?;
            if engine.get_table(table_name)?.is_none() {
                return errinput!("No table with name {table_name} exists.");
            }
            let rows = engine.scan(table_name)?.collect::<Result<_>>()?;
            rows
        };
        Ok(Box::new(rows.into_iter().map(Ok)))
    }
}

impl<E: storage::Engine> Engine for Local<E> {
    fn insert(&self, table_name: &str, rows: Vec<Row>) -> Result<usize> {
        self.engine.lock()?.insert(table_name, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;
    use crate::storage::Memory;
    use crate::types::field::Field;
    use crate::types::DataType;

    #[test]
    fn test_catalog_and_scan() -> Result<()> {
        let local = Local::new(Memory::new());
        let table = Table::builder()
            .name("t")
            .column("id", DataType::Int, false)
            .build();
        local.create_table(table.clone())?;
        assert_eq!(local.must_get_table("t")?, table);
        assert!(matches!(
            local.create_table(table),
            Err(Error::InvalidInput(_))
        ));

        local.insert("t", vec![Row::from(vec![Field::Integer(1)])])?;
        let rows: Vec<Row> = local.scan("t")?.collect::<Result<_>>()?;
        assert_eq!(rows, vec![Row::from(vec![Field::Integer(1)])]);

        assert!(local.drop_table("t", false)?);
        assert!(!local.drop_table("t", true)?);
        assert!(local.drop_table("t", false).is_err());
        assert!(local.scan("t").is_err());
        Ok(())
    }
}
