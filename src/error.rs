// Error taxonomy + non-fatal diagnostics
//
// Failures local to one row are recovered in place (zero amount, empty text).
// Failures local to one source are returned as PipelineError and turned into a
// Diagnostic by the pipeline, so sibling sources keep loading.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Source table lacks the columns its schema requires
    #[error("schema mismatch in source '{source_id}': {detail}")]
    SchemaMismatch { source_id: String, detail: String },

    /// Source could not be read (missing file, unknown sheet, bad encoding)
    #[error("failed to read source '{source_id}': {detail}")]
    SourceRead { source_id: String, detail: String },

    /// Paginated remote query returned a non-success status or a broken page
    #[error("remote fetch failed for '{source_id}' (status {status}): {detail}")]
    RemoteFetch {
        source_id: String,
        status: u16,
        detail: String,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn schema_mismatch(source_id: impl Into<String>, detail: impl Into<String>) -> Self {
        PipelineError::SchemaMismatch {
            source_id: source_id.into(),
            detail: detail.into(),
        }
    }

    pub fn source_read(source_id: impl Into<String>, detail: impl Into<String>) -> Self {
        PipelineError::SourceRead {
            source_id: source_id.into(),
            detail: detail.into(),
        }
    }

    pub fn remote_fetch(
        source_id: impl Into<String>,
        status: u16,
        detail: impl Into<String>,
    ) -> Self {
        PipelineError::RemoteFetch {
            source_id: source_id.into(),
            status,
            detail: detail.into(),
        }
    }

    /// Source the error is attributed to, if any
    pub fn source_id(&self) -> Option<&str> {
        match self {
            PipelineError::SchemaMismatch { source_id, .. }
            | PipelineError::SourceRead { source_id, .. }
            | PipelineError::RemoteFetch { source_id, .. } => Some(source_id),
            PipelineError::Config(_) | PipelineError::Io { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

// ============================================================================
// DIAGNOSTICS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Critical, // Source contribution was skipped entirely
    Warning,  // Source loaded, but some data was dropped or is questionable
    Info,     // Nothing lost, worth knowing
}

/// Non-fatal message surfaced next to whatever partial result was computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub source: String,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    pub fn critical(source: &str, message: impl Into<String>) -> Self {
        Diagnostic {
            source: source.to_string(),
            severity: Severity::Critical,
            message: message.into(),
        }
    }

    pub fn warning(source: &str, message: impl Into<String>) -> Self {
        Diagnostic {
            source: source.to_string(),
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    pub fn info(source: &str, message: impl Into<String>) -> Self {
        Diagnostic {
            source: source.to_string(),
            severity: Severity::Info,
            message: message.into(),
        }
    }
}

impl From<&PipelineError> for Diagnostic {
    fn from(err: &PipelineError) -> Self {
        Diagnostic::critical(err.source_id().unwrap_or("pipeline"), err.to_string())
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}: {}", self.severity, self.source, self.message)
    }
}
