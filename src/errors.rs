use thiserror::Error;

pub type Result<T> = std::result::Result<T, PoolgenError>;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PoolgenError {
    #[error("invalid pooling geometry: {0}")]
    InvalidGeometry(String),

    #[error("product of an empty sequence")]
    EmptyProduct,

    #[error("no coordinate type for rank {0}")]
    UnsupportedRank(usize),

    #[error("shader template error: {0}")]
    Template(String),

    #[error("evaluation failed: {0}")]
    Evaluation(String),

    #[error("gpu error: {0}")]
    Gpu(String),
}
