use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("missing value for argument: {flag}")]
    MissingValue { flag: String },
    #[error("missing required argument: {field}")]
    MissingRequired { field: String },
    #[error("invalid value for {flag}={value}: {reason}")]
    InvalidValue {
        flag: String,
        value: String,
        reason: String,
    },
    #[error("unsupported argument: {arg}")]
    UnsupportedArgument { arg: String },
    #[error("failed to open {path}: {source}")]
    OpenFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("chromosome {name} is not present in the reference")]
    UnknownChromosome { name: String },
    #[error("alignment input is not sorted: {chromosome} position {new_pos} follows {last_pos}")]
    InputNotSorted {
        chromosome: String,
        last_pos: i64,
        new_pos: i64,
    },
    #[error("{thread} thread panicked")]
    ThreadPanicked { thread: String },
    #[error("parse error: {message}")]
    ParseError { message: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
