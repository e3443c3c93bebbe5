//! Error types for loading and querying metadata.
//!
//! [`LoaderError`] covers everything that can go wrong while reading,
//! parsing and merging sources. [`QueryError`] is what consumers see when
//! they navigate a loaded tree.

use metamodel_core::{MetaDataError, MetaDataNotFoundError};
use thiserror::Error;

/// Errors raised while configuring, initializing or tearing down a loader.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// XML parsing failure.
    #[error("XML error: {0}")]
    XmlError(#[from] roxmltree::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Well-formed input that is not a valid metadata or types document.
    #[error("invalid document {document}: {message}")]
    InvalidDocument { document: String, message: String },

    /// A model error, with the document and node path it occurred at.
    #[error("{document} at {path}: {source}")]
    MetaData {
        document: String,
        path: String,
        #[source]
        source: MetaDataError,
    },

    /// A model error outside any document, e.g. while applying providers.
    #[error(transparent)]
    Model(#[from] MetaDataError),

    /// The operation is not valid in the loader's current state.
    #[error("loader '{name}' is {state}, cannot {operation}")]
    InvalidState {
        name: String,
        state: String,
        operation: String,
    },

    /// Another live loader is already registered under this name.
    #[error("a loader named '{0}' is already registered")]
    NameTaken(String),
}

impl LoaderError {
    pub(crate) fn document(document: &str, message: impl Into<String>) -> Self {
        LoaderError::InvalidDocument {
            document: document.to_string(),
            message: message.into(),
        }
    }
}

/// Errors returned by node queries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    #[error(transparent)]
    NotFound(#[from] MetaDataNotFoundError),

    /// The loader that owns the node was destroyed.
    #[error("loader '{0}' has been destroyed")]
    LoaderDestroyed(String),

    /// The loader has not finished initializing.
    #[error("loader '{0}' is not ready")]
    NotReady(String),

    #[error(transparent)]
    MetaData(#[from] MetaDataError),
}

/// Convenience alias for results with [`LoaderError`].
pub type Result<T> = std::result::Result<T, LoaderError>;
