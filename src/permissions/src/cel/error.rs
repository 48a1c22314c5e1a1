//! Errors raised while compiling or running permission expressions

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CelError {
    /// Expression rejected by the parser
    #[error("Cannot compile expression `{expression}`: {message}")]
    Compile { expression: String, message: String },

    /// Runtime failure (unknown variable, missing key, type mismatch)
    #[error("Expression failed at runtime: {0}")]
    Execution(String),
}

pub type Result<T> = std::result::Result<T, CelError>;
