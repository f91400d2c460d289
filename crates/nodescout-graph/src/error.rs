use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphFormatError {
    #[error("No workflow metadata found")]
    NoMetadata,

    #[error("Failed to parse workflow JSON: {0}")]
    ParseFailure(String),

    #[error("Unsupported workflow document: {0}")]
    UnsupportedShape(String),

    #[error("Invalid image container: {0}")]
    InvalidContainer(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GraphFormatError>;
