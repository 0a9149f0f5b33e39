use crate::common::{Error, Result};
use crate::errinput;
use crate::types::DataType;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ops::{Add, Div, Mul, Rem, Sub};

/// A scalar value flowing through the pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Field {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl PartialEq for Field {
    fn eq(&self, other: &Field) -> bool {
        match (self, other) {
            (Field::Null, Field::Null) => true,
            (Field::Boolean(b), Field::Boolean(b2)) => b == b2,
            (Field::Integer(i), Field::Integer(i2)) => i == i2,
            // match on NaN as well as equality
            (Field::Float(f), Field::Float(f2)) => (f == f2) || (f.is_nan() && f2.is_nan()),
            (Field::String(s), Field::String(s2)) => s == s2,
            _ => false,
        }
    }
}

impl Eq for Field {} // implement Eq trait for Field, uses PartialEq

impl std::hash::Hash for Field {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Field::Null => {}
            Field::Boolean(b) => b.hash(state),
            Field::Integer(i) => i.hash(state),
            Field::Float(f) => {
                if f.is_nan() {
                    0.hash(state);
                } else if *f == 0.0 {
                    // -0.0 == 0.0, so they must hash alike
                    0.0f64.to_bits().hash(state);
                } else {
                    f.to_bits().hash(state);
                }
            }
            Field::String(s) => s.hash(state),
        }
    }
}

// for use in sorting and grouping; SQL comparisons go through sql_cmp()
impl Ord for Field {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Field::Null, Field::Null) => Ordering::Equal,
            (Field::Null, _) => Ordering::Less,
            (_, Field::Null) => Ordering::Greater,
            (Field::Boolean(b), Field::Boolean(b2)) => b.cmp(b2),
            (Field::Integer(i), Field::Integer(i2)) => i.cmp(i2),
            (Field::Float(f), Field::Float(f2)) => match (f.is_nan(), f2.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => f.partial_cmp(f2).unwrap_or(Ordering::Equal),
            },
            (Field::String(s), Field::String(s2)) => s.cmp(s2),
            (Field::Boolean(_), _) => Ordering::Less,
            (Field::Integer(_), Field::Boolean(_)) => Ordering::Greater,
            (Field::Integer(_), _) => Ordering::Less,
            (Field::Float(_), Field::Boolean(_)) => Ordering::Greater,
            (Field::Float(_), Field::Integer(_)) => Ordering::Greater,
            (Field::Float(_), _) => Ordering::Less,
            (Field::String(_), _) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Field {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Add for Field {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        self.checked_add(&other).unwrap_or(Field::Null)
    }
}

impl Sub for Field {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        self.checked_sub(&other).unwrap_or(Field::Null)
    }
}

impl Mul for Field {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        self.checked_mul(&other).unwrap_or(Field::Null)
    }
}

impl Div for Field {
    type Output = Self;

    fn div(self, other: Self) -> Self {
        self.checked_div(&other).unwrap_or(Field::Null)
    }
}

impl Rem for Field {
    type Output = Self;

    fn rem(self, other: Self) -> Self {
        self.checked_mod(&other).unwrap_or(Field::Null)
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Boolean(true) => f.write_str("TRUE"),
            Self::Boolean(false) => f.write_str("FALSE"),
            Self::Integer(integer) => integer.fmt(f),
            Self::Float(float) => write!(f, "{float:?}"),
            Self::String(string) => write!(f, "'{}'", string.escape_debug()),
        }
    }
}

impl From<f64> for Field {
    fn from(v: f64) -> Self {
        Field::Float(v)
    }
}

impl From<i64> for Field {
    fn from(v: i64) -> Self {
        Field::Integer(v)
    }
}

impl From<i32> for Field {
    fn from(v: i32) -> Self {
        Field::Integer(v as i64)
    }
}

impl From<String> for Field {
    fn from(v: String) -> Self {
        Field::String(v)
    }
}

impl From<&str> for Field {
    fn from(v: &str) -> Self {
        Field::String(v.to_owned())
    }
}

impl From<bool> for Field {
    fn from(v: bool) -> Self {
        Field::Boolean(v)
    }
}

impl<T: Into<Field>> From<Option<T>> for Field {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Field::Null)
    }
}

impl Field {
    pub fn get_type(&self) -> DataType {
        match self {
            Field::Null => DataType::Null,
            Field::Boolean(_) => DataType::Bool,
            Field::Integer(_) => DataType::Int,
            Field::Float(_) => DataType::Float,
            Field::String(_) => DataType::Text,
        }
    }

    /// Renders the value for result tables, without quoting strings.
    pub fn to_string(&self) -> String {
        match self {
            Field::Null => "NULL".to_string(),
            Field::Boolean(b) => b.to_string(),
            Field::Integer(i) => i.to_string(),
            Field::Float(f) => f.to_string(),
            Field::String(s) => s.clone(),
        }
    }

    pub fn checked_add(&self, other: &Field) -> Result<Field> {
        use Field::*;
        match (self, other) {
            (Integer(lhs), Integer(rhs)) => match lhs.checked_add(*rhs) {
                Some(v) => Ok(Integer(v)),
                None => Result::from(Error::OverflowError),
            },
            (Integer(lhs), Float(rhs)) => Ok(Float(*lhs as f64 + rhs)),
            (Float(lhs), Integer(rhs)) => Ok(Float(lhs + *rhs as f64)),
            (Float(lhs), Float(rhs)) => Ok(Float(lhs + rhs)),
            (Null, Integer(_) | Float(_) | Null) | (Integer(_) | Float(_), Null) => Ok(Null),
            _ => errinput!("can't add {self} and {other}"),
        }
    }

    pub fn checked_sub(&self, other: &Field) -> Result<Field> {
        use Field::*;
        match (self, other) {
            (Integer(lhs), Integer(rhs)) => match lhs.checked_sub(*rhs) {
                Some(v) => Ok(Integer(v)),
                None => Result::from(Error::OverflowError),
            },
            (Integer(lhs), Float(rhs)) => Ok(Float(*lhs as f64 - rhs)),
            (Float(lhs), Integer(rhs)) => Ok(Float(lhs - *rhs as f64)),
            (Float(lhs), Float(rhs)) => Ok(Float(lhs - rhs)),
            (Null, Integer(_) | Float(_) | Null) | (Integer(_) | Float(_), Null) => Ok(Null),
            _ => errinput!("can't subtract {self} and {other}"),
        }
    }

    pub fn checked_mul(&self, other: &Field) -> Result<Field> {
        use Field::*;
        match (self, other) {
            (Integer(lhs), Integer(rhs)) => match lhs.checked_mul(*rhs) {
                Some(v) => Ok(Integer(v)),
                None => Result::from(Error::OverflowError),
            },
            (Integer(lhs), Float(rhs)) => Ok(Float(*lhs as f64 * rhs)),
            (Float(lhs), Integer(rhs)) => Ok(Float(lhs * *rhs as f64)),
            (Float(lhs), Float(rhs)) => Ok(Float(lhs * rhs)),
            (Null, Integer(_) | Float(_) | Null) | (Integer(_) | Float(_), Null) => Ok(Null),
            _ => errinput!("can't multiply {self} and {other}"),
        }
    }

    pub fn checked_div(&self, other: &Field) -> Result<Field> {
        use Field::*;
        match (self, other) {
            (Integer(_), Integer(0)) => errinput!("can't divide by zero"),
            (Integer(lhs), Integer(rhs)) => match lhs.checked_div(*rhs) {
                Some(v) => Ok(Integer(v)),
                None => Result::from(Error::OverflowError),
            },
            (Integer(lhs), Float(rhs)) => Ok(Float(*lhs as f64 / rhs)),
            (Float(lhs), Integer(rhs)) => Ok(Float(lhs / *rhs as f64)),
            (Float(lhs), Float(rhs)) => Ok(Float(lhs / rhs)),
            (Null, Integer(_) | Float(_) | Null) | (Integer(_) | Float(_), Null) => Ok(Null),
            _ => errinput!("can't divide {self} and {other}"),
        }
    }

    /// Exponentiates two values. Errors when invalid.
    pub fn checked_pow(&self, other: &Self) -> Result<Self> {
        use Field::*;
        Ok(match (self, other) {
            (Integer(lhs), Integer(rhs)) if *rhs >= 0 => {
                let rhs: u32 = match (*rhs).try_into() {
                    Ok(rhs) => rhs,
                    Err(_) => return Result::from(Error::OverflowError),
                };
                match lhs.checked_pow(rhs) {
                    Some(i) => Integer(i),
                    None => return Result::from(Error::OverflowError),
                }
            }
            (Integer(lhs), Integer(rhs)) => Float((*lhs as f64).powf(*rhs as f64)),
            (Integer(lhs), Float(rhs)) => Float((*lhs as f64).powf(*rhs)),
            (Float(lhs), Integer(rhs)) => Float(lhs.powf(*rhs as f64)),
            (Float(lhs), Float(rhs)) => Float(lhs.powf(*rhs)),
            (Integer(_) | Float(_), Null) => Null,
            (Null, Integer(_) | Float(_) | Null) => Null,
            (lhs, rhs) => return errinput!("can't exponentiate {lhs} and {rhs}"),
        })
    }

    pub fn checked_mod(&self, other: &Field) -> Result<Field> {
        use Field::*;
        match (self, other) {
            (Integer(_), Integer(0)) => errinput!("can't divide by zero"),
            (Integer(lhs), Integer(rhs)) => match lhs.checked_rem(*rhs) {
                Some(v) => Ok(Integer(v)),
                None => Result::from(Error::OverflowError),
            },
            (Integer(lhs), Float(rhs)) => Ok(Float(*lhs as f64 % rhs)),
            (Float(lhs), Integer(rhs)) => Ok(Float(lhs % *rhs as f64)),
            (Float(lhs), Float(rhs)) => Ok(Float(lhs % rhs)),
            (Null, Integer(_) | Float(_) | Null) | (Integer(_) | Float(_), Null) => Ok(Null),
            _ => errinput!("can't take modulo of {self} and {other}"),
        }
    }

    /// Compares two values with SQL semantics. Integers and floats compare
    /// numerically. Returns None when either side is undefined (NULL or NaN),
    /// and an error for incomparable types.
    pub fn sql_cmp(&self, other: &Field) -> Result<Option<Ordering>> {
        use Field::*;
        if self.is_undefined() || other.is_undefined() {
            return Ok(None);
        }
        Ok(match (self, other) {
            (Boolean(lhs), Boolean(rhs)) => Some(lhs.cmp(rhs)),
            (Integer(lhs), Integer(rhs)) => Some(lhs.cmp(rhs)),
            (Integer(lhs), Float(rhs)) => (*lhs as f64).partial_cmp(rhs),
            (Float(lhs), Integer(rhs)) => lhs.partial_cmp(&(*rhs as f64)),
            (Float(lhs), Float(rhs)) => lhs.partial_cmp(rhs),
            (String(lhs), String(rhs)) => Some(lhs.cmp(rhs)),
            (lhs, rhs) => return errinput!("can't compare {lhs} and {rhs}"),
        })
    }

    /// Converts numeric values to a float representation, so that integer
    /// and float keys hash and sort alike. Other values pass through.
    pub fn to_numeric_key(&self) -> Field {
        match self {
            Field::Integer(i) => Field::Float(*i as f64),
            Field::Float(f) if *f == 0.0 => Field::Float(0.0),
            value => value.clone(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }

    /// Returns true if the value is undefined (NULL or NaN).
    pub fn is_undefined(&self) -> bool {
        *self == Self::Null || matches!(self, Self::Float(f) if f.is_nan())
    }
}

/// A column label, used in query results and plans.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Label {
    /// No label.
    None,
    /// An unqualified column name.
    Unqualified(String),
    /// A fully qualified table/column name.
    Qualified(String, String),
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, ""),
            Self::Unqualified(name) => write!(f, "{name}"),
            Self::Qualified(table, column) => write!(f, "{table}.{column}"),
        }
    }
}

impl Label {
    /// Formats the label as a short column header.
    pub fn as_header(&self) -> &str {
        match self {
            Self::Qualified(_, column) | Self::Unqualified(column) => column.as_str(),
            Self::None => "?",
        }
    }
}

impl From<Option<String>> for Label {
    fn from(name: Option<String>) -> Self {
        name.map(Label::Unqualified).unwrap_or(Label::None)
    }
}
