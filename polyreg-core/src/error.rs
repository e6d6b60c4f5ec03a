use polyreg_math::MathError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Cannot read coefficient resource {path:?}: {source}")]
    MissingResource {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Corrupt coefficient resource: {0}")]
    CorruptResource(String),
    #[error("Input ended inside the {0} section")]
    Truncated(&'static str),
    #[error("Corrupt stream: {0}")]
    CorruptStream(String),
    #[error("Predictor id mismatch: expected {expected:#010b}, found {found:#010b}")]
    UnknownPredictor { expected: u8, found: u8 },
    #[error("Declared {declared} codes but only {remaining} bytes remain")]
    BudgetExceeded { declared: u64, remaining: usize },
    #[error("Coefficient stream exhausted: block needs {needed} codes, {remaining} left")]
    StreamExhausted { needed: usize, remaining: usize },
    #[error("Block size {block_size} outside 1..={max}")]
    BlockSize { block_size: usize, max: usize },
    #[error("Shape mismatch: {expected} elements expected, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
    #[error("Math error: {0}")]
    Math(#[from] MathError),
    #[error("Config encoding error: {0}")]
    Config(#[from] bincode::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Tags a short read with the section of the layout being decoded.
pub trait ReadSection<T> {
    fn section(self, name: &'static str) -> Result<T, CodecError>;
}

impl<T> ReadSection<T> for io::Result<T> {
    fn section(self, name: &'static str) -> Result<T, CodecError> {
        self.map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => CodecError::Truncated(name),
            _ => CodecError::Io(e),
        })
    }
}
