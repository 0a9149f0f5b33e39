use crate::common::{Error, Result};
use crate::types::field::Field;
use dyn_clone::DynClone;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::slice::Iter;

/// A row iterator.
pub type Rows = Box<dyn RowIterator>;

/// A Row iterator trait, which requires the iterator to be both clonable and
/// object-safe. Cloning is needed to be able to reset an iterator back to an
/// initial state, e.g. during nested loop joins. It has a blanket
/// implementation for all matching iterators.
pub trait RowIterator: Iterator<Item = Result<Row>> + DynClone {}
impl<I: Iterator<Item = Result<Row>> + DynClone> RowIterator for I {}
dyn_clone::clone_trait_object!(RowIterator);

/// The column bindings of one source row. Expressions read columns by index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Row {
    values: Vec<Field>,
}

impl From<Vec<Field>> for Row {
    fn from(values: Vec<Field>) -> Self {
        Row { values }
    }
}

impl From<Vec<&Field>> for Row {
    fn from(values: Vec<&Field>) -> Self {
        Row {
            values: values.into_iter().cloned().collect(),
        }
    }
}

impl IntoIterator for Row {
    type Item = Field;
    type IntoIter = std::vec::IntoIter<Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl Row {
    /// A row of `width` NULLs, used to pad the missing side of outer joins.
    pub fn nulls(width: usize) -> Row {
        Row {
            values: vec![Field::Null; width],
        }
    }

    pub fn iter(&self) -> Iter<Field> {
        self.values.iter()
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    pub fn values(&self) -> &[Field] {
        &self.values
    }

    pub fn get_field(&self, index: usize) -> Result<Field> {
        Ok(self
            .values
            .get(index)
            .ok_or_else(|| Error::OutOfBounds)?
            .clone())
    }

    /// Borrows a field without cloning it.
    pub fn field(&self, index: usize) -> Result<&Field> {
        self.values.get(index).ok_or(Error::OutOfBounds)
    }

    /// Concatenates two rows, left columns first.
    pub fn join(left: &Row, right: &Row) -> Row {
        Row {
            values: left.iter().chain(right.iter()).cloned().collect(),
        }
    }

    /// Projects the given column indexes into a key tuple.
    pub fn project(&self, indexes: &[usize]) -> Result<Vec<Field>> {
        indexes.iter().map(|i| self.get_field(*i)).collect()
    }

    pub fn to_string(&self, str_len: Option<usize>) -> String {
        self.values
            .iter()
            .map(|field| match field {
                Field::String(_) => {
                    let mut text = field.to_string();
                    if let Some(len) = str_len {
                        text.truncate(len);
                    }
                    text
                }
                _ => field.to_string(),
            })
            .join(", ")
    }
}
