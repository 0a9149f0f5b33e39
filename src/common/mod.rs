//! Errors, cancellation, and small shared helpers.
pub mod cancel;
pub mod constants;
pub mod utility;

pub use cancel::CancellationToken;

use serde::{Deserialize, Serialize};

/// Errors raised while compiling or running a query pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Error {
    /// The query was cancelled through its cancellation token.
    Cancelled,
    /// Invalid data, typically a value of the wrong type reaching an operator.
    InvalidData(String),
    /// Invalid user input, e.g. an unknown function or a type mismatch.
    InvalidInput(String),
    /// The logical tree handed to the engine is malformed. Signals an upstream bug.
    Precondition(String),
    OutOfBounds,
    OverflowError,
    IO(String),
    Config(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Cancelled => write!(f, "query cancelled"),
            Error::InvalidData(msg) => write!(f, "invalid data: {msg}"),
            Error::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Error::Precondition(msg) => write!(f, "precondition failed: {msg}"),
            Error::OutOfBounds => write!(f, "index out of bounds"),
            Error::OverflowError => write!(f, "integer overflow"),
            Error::IO(msg) => write!(f, "io error: {msg}"),
            Error::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

/// Constructs an Error::InvalidInput via format!() and into().
#[macro_export]
macro_rules! errinput {
    ($($args:tt)*) => { $crate::common::Error::InvalidInput(format!($($args)*)).into() };
}

/// Constructs an Error::InvalidData via format!() and into().
#[macro_export]
macro_rules! errdata {
    ($($args:tt)*) => { $crate::common::Error::InvalidData(format!($($args)*)).into() };
}

/// Constructs an Error::Precondition via format!() and into().
#[macro_export]
macro_rules! errprecondition {
    ($($args:tt)*) => { $crate::common::Error::Precondition(format!($($args)*)).into() };
}

/// A query engine result.
pub type Result<T> = std::result::Result<T, Error>;

impl<T> From<Error> for Result<T> {
    fn from(error: Error) -> Self {
        Err(error)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IO(err.to_string())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(err: regex::Error) -> Self {
        Error::InvalidInput(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Error::IO(err.to_string())
    }
}
