//! Error types for the aggregation and export core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvalError {
    /// Aggregation was requested over zero records.
    #[error("cannot aggregate `{field}`: no records")]
    EmptyInput { field: String },

    /// Sample standard deviation needs at least two records.
    #[error("cannot aggregate `{field}`: sample stdev needs at least 2 records, got 1")]
    SingleSample { field: String },

    /// An L* trial reported zero queries, so the average trace length is undefined.
    #[error("L* trial reported no queries; average trace length is undefined")]
    NoQueries,

    /// An export entry lacks an attribute the serializer expects.
    #[error("export entry is missing attribute `{label}`")]
    MissingAttribute { label: &'static str },

    /// An attribute is present but has no value, e.g. after incomplete trials.
    #[error("attribute `{label}` is unavailable")]
    Unavailable { label: &'static str },

    /// A count reported by the learner overflowed while deriving a quantity.
    #[error("`{field}` overflows a 64-bit count")]
    CountOverflow { field: &'static str },

    /// A two-axis table has no entry for a (model, strategy) pair.
    #[error("no `{strategy}` entry for model `{model}`")]
    MissingEntry { model: String, strategy: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EvalError>;
