//! Error types for DPS assembly.
//!
//! Only input and infrastructure problems are errors. Missing optional data,
//! degenerate normalizer input and advisory validator outages are handled
//! in-band by the components themselves, and writer misuse panics.

use thiserror::Error;

/// Main error type for the library.
#[derive(Debug, Error)]
pub enum DpsError {
    /// Caller supplied data that cannot be turned into a document.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown `servicoTipo` value.
    #[error("Unknown servicoTipo '{0}'. Expected NORMAL, EXPORTACAO or CONSTRUCAO")]
    UnknownServicoTipo(String),

    /// Unknown `tomadorTipo` value.
    #[error("Unknown tomadorTipo '{0}'. Expected NACIONAL, ESTRANGEIRO or ANONIMO")]
    UnknownTomadorTipo(String),

    /// Unknown tomador document tag.
    #[error("Unknown tomador document tag '{0}'. Expected CNPJ, CPF or NIF")]
    UnknownDocumentoTag(String),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP client could not be built or a request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The validation engine answered with something we cannot read.
    #[error("Validation engine response unreadable (status {status}): {message}")]
    EngineResponse { status: u16, message: String },

    /// The external signer failed.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl DpsError {
    /// Whether the error is the caller's fault (400-class) rather than
    /// an infrastructure problem.
    #[must_use]
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_)
                | Self::UnknownServicoTipo(_)
                | Self::UnknownTomadorTipo(_)
                | Self::UnknownDocumentoTag(_)
        )
    }
}

/// Result type alias for DPS operations.
pub type Result<T> = std::result::Result<T, DpsError>;
