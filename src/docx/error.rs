//! Error types for the DOCX templating layer.

use crate::opc::OpcError;
use thiserror::Error;

/// Result type for DOCX operations.
pub type Result<T> = std::result::Result<T, DocxError>;

/// Errors arising while templating a Word document.
#[derive(Error, Debug)]
pub enum DocxError {
    /// The underlying OPC package could not be loaded or saved
    #[error("Package error: {0}")]
    Load(#[from] OpcError),

    /// The opened package is not a Word document
    #[error("Content type mismatch: expected '{expected}', got '{got}'")]
    InvalidContentType { expected: String, got: String },

    /// No well-formed placeholder matched any requested image name
    #[error("No matching image placeholders found in document")]
    NoPlaceholdersFound,

    /// One or more image sources could not be resolved.
    ///
    /// Carries every failure from the batch, paired with the placeholder
    /// name it was resolved for, so a caller can report them all at once.
    #[error("Failed to resolve {} image source(s)", .0.len())]
    SourceResolution(Vec<(String, SourceError)>),

    /// A part the operation requires is absent from the package
    #[error("Package part missing: {0}")]
    PackagePartMissing(String),

    /// Document XML could not be parsed or rewritten
    #[error("XML error: {0}")]
    Xml(String),
}

/// Errors resolving a single image source.
#[derive(Error, Debug, Clone)]
pub enum SourceError {
    /// A data: URI that is not base64-encoded image data
    #[error("Malformed data URI: {0}")]
    MalformedDataUri(String),

    /// A local file path that does not exist or cannot be read
    #[error("File not found: {0}")]
    NotFound(String),

    /// An HTTP request that failed or returned a non-success status
    #[error("Fetch failed: {0}")]
    Fetch(String),
}
