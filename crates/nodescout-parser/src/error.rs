use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Grammar error: {0}")]
    Grammar(String),

    #[error("Failed to parse {path}")]
    Syntax { path: PathBuf },

    #[error("File collection failed: {0}")]
    Walk(String),
}

pub type Result<T> = std::result::Result<T, ParseError>;
