use crate::types::field::Label;
use core::ops::Deref;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The static type of a column or expression.
#[derive(PartialEq, Eq, Hash, Clone, Debug, Copy, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Int,
    Float,
    Text,
    /// The type of the NULL literal, or an expression whose type is unknown.
    Null,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Bool => write!(f, "bool"),
            DataType::Int => write!(f, "int"),
            DataType::Float => write!(f, "float"),
            DataType::Text => write!(f, "varchar"),
            DataType::Null => write!(f, "null"),
        }
    }
}

impl DataType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Int | DataType::Float)
    }

    /// Returns true if values of the two types can be matched by a hash or
    /// merge join key: identical types, a numeric mix, or a NULL-typed side
    /// (which never matches anything).
    pub fn is_join_compatible(&self, other: &DataType) -> bool {
        self == other
            || (self.is_numeric() && other.is_numeric())
            || *self == DataType::Null
            || *other == DataType::Null
    }

    /// Returns true if values of the two types can be ordered against each
    /// other by a sort-merge join.
    pub fn is_comparable(&self, other: &DataType) -> bool {
        self.is_join_compatible(other) && *self != DataType::Bool
    }
}

/// A column of a data source's schema catalogue.
#[derive(PartialEq, Eq, Hash, Clone, Debug, Serialize, Deserialize)]
pub struct Column {
    /// Column name. Can't be empty.
    name: String,
    /// Column datatype.
    data_type: DataType,
    /// Whether the column allows null values.
    nullable: bool,
}

impl Column {
    pub fn new(column_name: &str, data_type: DataType, nullable: bool) -> Column {
        Column {
            name: column_name.to_string(),
            data_type,
            nullable,
        }
    }

    pub fn builder() -> ColumnBuilder {
        ColumnBuilder::new()
    }

    pub fn to_string(&self) -> String {
        format!("{}:{}", self.name, self.data_type)
    }

    pub fn get_data_type(&self) -> DataType {
        self.data_type
    }

    pub fn get_name(&self) -> String {
        self.name.clone()
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
}

pub struct ColumnBuilder {
    name: Option<String>,
    data_type: Option<DataType>,
    nullable: Option<bool>,
}

impl ColumnBuilder {
    fn new() -> Self {
        Self {
            name: None,
            data_type: None,
            nullable: None,
        }
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn data_type(mut self, data_type: DataType) -> Self {
        self.data_type = Some(data_type);
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }

    pub fn build(self) -> Column {
        Column {
            name: self.name.expect("name must be specified before building."),
            data_type: self
                .data_type
                .expect("data_type must be specified before building."),
            nullable: self.nullable.unwrap_or(true),
        }
    }
}

/// A data source schema: a name and its ordered columns. A column's
/// position is its index into source rows.
#[derive(PartialEq, Eq, Hash, Clone, Debug, Serialize, Deserialize)]
pub struct Table {
    /// The name of the table
    name: String,
    /// The column definitions of the table
    columns: Vec<Column>,
}

impl Table {
    pub fn new(table_name: &str) -> Table {
        Table {
            name: table_name.to_string(),
            columns: Vec::new(),
        }
    }

    pub fn builder() -> TableBuilder {
        TableBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_column(&mut self, column: &Column) {
        self.columns.push(column.clone());
    }

    pub fn get_column(&self, index: usize) -> &Column {
        &self.columns[index]
    }

    pub fn columns(&self) -> &Vec<Column> {
        &self.columns
    }

    pub fn to_string(&self) -> String {
        format!(
            "{}({})",
            self.name,
            self.columns
                .iter()
                .map(|c| c.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }

    pub fn col_count(&self) -> usize {
        self.columns.len()
    }

    pub fn get_column_name(&self, index: usize) -> String {
        self.columns[index].get_name()
    }

    pub fn get_field_type(&self, index: usize) -> DataType {
        self.columns[index].get_data_type()
    }

    pub fn column_types(&self) -> Vec<DataType> {
        self.columns.iter().map(|c| c.get_data_type()).collect()
    }

    /// Returns the qualified label of a column, using the alias if given.
    pub fn column_label(&self, index: usize, alias: Option<&String>) -> Label {
        let table = alias.cloned().unwrap_or_else(|| self.name.clone());
        match self.columns.get(index) {
            Some(column) => Label::Qualified(table, column.get_name()),
            None => Label::None,
        }
    }

    // if a field exists return its offset in the schema
    // otherwise return None
    pub fn field_name_to_index(&self, field_name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.name == field_name)
    }
}

impl Deref for Table {
    type Target = Vec<Column>;

    fn deref(&self) -> &Self::Target {
        &self.columns
    }
}

#[derive(Default)]
pub struct TableBuilder {
    name: Option<String>,
    columns: Vec<Column>,
}

impl TableBuilder {
    pub fn name(&mut self, name: &str) -> &mut Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn column(&mut self, column_name: &str, dt: DataType, nullable: bool) -> &mut Self {
        self.columns.push(Column::new(column_name, dt, nullable));
        self
    }

    pub fn columns(&mut self, columns: Vec<Column>) -> &mut Self {
        self.columns.extend(columns);
        self
    }

    pub fn build(&mut self) -> Table {
        let name = self
            .name
            .clone()
            .expect("Cannot build a Table without a `name`.");
        let mut table = Table::new(&name);
        self.columns.iter().for_each(|column| table.add_column(column));
        table
    }
}
