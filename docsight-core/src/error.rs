//! Error taxonomy for the enrichment pipeline.
//!
//! Per-image errors ([`OutOfRangeError`], [`CodecError`], [`ExtractionError`])
//! are collected as skips. Run-level errors ([`RunError`]) stop the run.

use crate::orchestrator::EnrichmentReport;
use crate::schema::Modality;
use llm::LlmError;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to load or encode an image.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to read image {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported image format for {}: {detail}", .path.display())]
    UnsupportedFormat { path: PathBuf, detail: String },
}

/// A schema definition that cannot be offered to the backend.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("registry has no schemas")]
    EmptyRegistry,

    #[error("schema '{schema}' declares no fields")]
    NoFields { schema: String },

    #[error("schema '{schema}' declares field '{field}' twice")]
    DuplicateField { schema: String, field: String },

    #[error("schema '{schema}' requires field '{field}' which it does not declare")]
    RequiredNotDeclared { schema: String, field: String },

    #[error("schema '{schema}' registered twice")]
    DuplicateSchema { schema: String },

    #[error("modality '{modality}' mapped by both '{first}' and '{second}'")]
    DuplicateModality {
        modality: Modality,
        first: String,
        second: String,
    },
}

/// Context lookup for a page the document does not have.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("page {page} out of range ({available} pages available)")]
pub struct OutOfRangeError {
    pub page: u32,
    pub available: usize,
}

/// Classified backend failure.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Timeouts, rate limits, overload; worth retrying
    #[error("transient backend error: {0}")]
    Transient(#[source] LlmError),

    /// The backend refused this particular request (bad image, bad payload)
    #[error("backend rejected request: {0}")]
    Rejected(#[source] LlmError),

    /// No further request can succeed (credentials, unknown model)
    #[error("fatal backend error: {0}")]
    Fatal(#[source] LlmError),
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Transient(_))
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, BackendError::Fatal(_))
    }
}

impl From<LlmError> for BackendError {
    fn from(error: LlmError) -> Self {
        if error.is_fatal() {
            BackendError::Fatal(error)
        } else if error.is_retryable() {
            BackendError::Transient(error)
        } else {
            BackendError::Rejected(error)
        }
    }
}

/// Failure to turn one image into an extraction record.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("backend selected no schema (stop reason: {})", .stop_reason.as_deref().unwrap_or("none"))]
    NoSchemaSelected { stop_reason: Option<String> },

    #[error("backend selected {} schemas ({}), expected one", .names.len(), .names.join(", "))]
    AmbiguousSelection { names: Vec<String> },

    #[error("backend selected unknown schema '{name}'")]
    UnknownSchema { name: String },

    #[error("field '{field}' of schema '{schema}' is invalid: {reason}")]
    InvalidField {
        schema: String,
        field: String,
        reason: String,
    },

    #[error("schema '{schema}' ({modality}) missing required fields: {}", .missing.join(", "))]
    ValidationFailed {
        schema: String,
        modality: Modality,
        missing: Vec<String>,
    },

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ExtractionError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ExtractionError::Backend(e) if e.is_fatal())
    }
}

/// Why an image produced no record.
#[derive(Debug, Error)]
pub enum SkipReason {
    #[error(transparent)]
    OutOfRange(#[from] OutOfRangeError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// Errors that abort an enrichment run.
#[derive(Debug, Error)]
pub enum RunError {
    /// `report` holds what finished before the abort.
    #[error("run aborted at {}: {source}", .image_path.display())]
    Fatal {
        image_path: PathBuf,
        #[source]
        source: BackendError,
        report: Box<EnrichmentReport>,
    },
}

impl RunError {
    /// Records and skips gathered before the run stopped
    pub fn partial_report(&self) -> &EnrichmentReport {
        match self {
            RunError::Fatal { report, .. } => report,
        }
    }

    pub fn into_partial_report(self) -> EnrichmentReport {
        match self {
            RunError::Fatal { report, .. } => *report,
        }
    }
}

/// Failure to obtain or cache the parsed form of a document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("io error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed parsed document {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("page numbers must run 1..=n: expected page {expected}, found {found}")]
    NonContiguousPages { expected: u32, found: u32 },
}

/// Failure in the index/query facade.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("no documents indexed")]
    Empty,

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("query backend failed: {0}")]
    Backend(#[from] LlmError),
}
