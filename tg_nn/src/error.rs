//! Error types for layers, data loading and training.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Tensor(#[from] tg_core::Error),

    #[error("invalid layer sizes {sizes:?}: {reason}")]
    InvalidLayerSizes { sizes: Vec<usize>, reason: String },

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
