//! The scalar function library.
//!
//! Functions are looked up by lowercase name. Which of them count as
//! non-deterministic is a settings concern, see
//! `Settings::non_deterministic_functions`.
use crate::common::Result;
use crate::errinput;
use crate::types::field::Field;
use crate::types::DataType;
use once_cell::sync::Lazy;
use rand::Rng;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// A library function: evaluated arguments in, value out.
pub type Function = fn(&[Field]) -> Result<Field>;

static FUNCTIONS: Lazy<HashMap<&'static str, Function>> = Lazy::new(|| {
    let mut functions: HashMap<&'static str, Function> = HashMap::new();
    functions.insert("abs", abs);
    functions.insert("upper", upper);
    functions.insert("lower", lower);
    functions.insert("length", length);
    functions.insert("coalesce", coalesce);
    functions.insert("concat", concat);
    functions.insert("round", round);
    functions.insert("random", random);
    functions.insert("rand", random);
    functions.insert("newid", newid);
    functions.insert("now", now);
    functions
});

/// Calls the named function with the given arguments.
pub fn call(name: &str, args: &[Field]) -> Result<Field> {
    match FUNCTIONS.get(name.to_lowercase().as_str()) {
        Some(function) => function(args),
        None => errinput!("unknown function {name}"),
    }
}

/// Returns true if the library has a function with the given name.
pub fn exists(name: &str) -> bool {
    FUNCTIONS.contains_key(name.to_lowercase().as_str())
}

/// Returns the static result type of a call, given its argument types.
pub fn return_type(name: &str, args: &[DataType]) -> DataType {
    match name.to_lowercase().as_str() {
        "abs" | "coalesce" => args
            .iter()
            .copied()
            .find(|t| *t != DataType::Null)
            .unwrap_or(DataType::Null),
        "upper" | "lower" | "concat" | "newid" => DataType::Text,
        "length" | "now" => DataType::Int,
        "round" | "random" | "rand" => DataType::Float,
        _ => DataType::Null,
    }
}

fn arity(name: &str, args: &[Field], expected: usize) -> Result<()> {
    match args.len() == expected {
        true => Ok(()),
        false => errinput!("{name} takes {expected} arguments, got {}", args.len()),
    }
}

fn abs(args: &[Field]) -> Result<Field> {
    arity("abs", args, 1)?;
    Ok(match &args[0] {
        Field::Integer(i) => Field::Integer(i.checked_abs().ok_or(crate::common::Error::OverflowError)?),
        Field::Float(f) => Field::Float(f.abs()),
        Field::Null => Field::Null,
        value => return errinput!("can't take abs of {value}"),
    })
}

fn upper(args: &[Field]) -> Result<Field> {
    arity("upper", args, 1)?;
    Ok(match &args[0] {
        Field::String(s) => Field::String(s.to_uppercase()),
        Field::Null => Field::Null,
        value => return errinput!("can't uppercase {value}"),
    })
}

fn lower(args: &[Field]) -> Result<Field> {
    arity("lower", args, 1)?;
    Ok(match &args[0] {
        Field::String(s) => Field::String(s.to_lowercase()),
        Field::Null => Field::Null,
        value => return errinput!("can't lowercase {value}"),
    })
}

fn length(args: &[Field]) -> Result<Field> {
    arity("length", args, 1)?;
    Ok(match &args[0] {
        Field::String(s) => Field::Integer(s.chars().count() as i64),
        Field::Null => Field::Null,
        value => return errinput!("can't take length of {value}"),
    })
}

fn coalesce(args: &[Field]) -> Result<Field> {
    Ok(args
        .iter()
        .find(|value| !value.is_null())
        .cloned()
        .unwrap_or(Field::Null))
}

fn concat(args: &[Field]) -> Result<Field> {
    if args.iter().any(Field::is_null) {
        return Ok(Field::Null);
    }
    Ok(Field::String(args.iter().map(|value| value.to_string()).collect()))
}

fn round(args: &[Field]) -> Result<Field> {
    let digits = match args {
        [_] => 0,
        [_, Field::Integer(digits)] => *digits as i32,
        [_, Field::Null] => return Ok(Field::Null),
        _ => return errinput!("round takes a value and optional digit count"),
    };
    let scale = 10f64.powi(digits);
    Ok(match &args[0] {
        Field::Integer(i) => Field::Float(*i as f64),
        Field::Float(f) => Field::Float((f * scale).round() / scale),
        Field::Null => Field::Null,
        value => return errinput!("can't round {value}"),
    })
}

fn random(args: &[Field]) -> Result<Field> {
    arity("random", args, 0)?;
    Ok(Field::Float(rand::thread_rng().gen()))
}

fn newid(args: &[Field]) -> Result<Field> {
    arity("newid", args, 0)?;
    let id: u128 = rand::thread_rng().gen();
    Ok(Field::String(format!("{id:032x}")))
}

fn now(args: &[Field]) -> Result<Field> {
    arity("now", args, 0)?;
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default();
    Ok(Field::Integer(millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call() {
        assert_eq!(call("UPPER", &["ab".into()]), Ok(Field::from("AB")));
        assert_eq!(call("abs", &[Field::Integer(-3)]), Ok(Field::Integer(3)));
        assert_eq!(
            call("coalesce", &[Field::Null, Field::Integer(2)]),
            Ok(Field::Integer(2))
        );
        assert_eq!(call("round", &[Field::Float(2.456), Field::Integer(1)]), Ok(Field::Float(2.5)));
        assert_eq!(call("concat", &["a".into(), Field::Integer(1)]), Ok(Field::from("a1")));
        assert!(call("length", &[]).is_err());
        assert!(call("nope", &[]).is_err());
        assert!(exists("Random"));
    }

    #[test]
    fn test_random_varies() {
        let values: Vec<Field> = (0..8).map(|_| call("random", &[]).unwrap()).collect();
        assert!(values.iter().any(|v| *v != values[0]));
    }
}
