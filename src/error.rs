//! Error types for the tamper-scan library.
//!
//! Every fatal failure of a pipeline invocation is a [`TamperError`]. The
//! orchestrator turns each one into an error [`crate::report::Report`] before
//! handing it back to the caller, so the variants double as the vocabulary of
//! the `error` field a status-polling client eventually reads.
//!
//! Malformed model output is deliberately *not* an error here: the result
//! extractor normalises it to a conservative default and the pipeline
//! carries on (see [`crate::pipeline::extract`]).

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the tamper-scan library.
#[derive(Debug, Error)]
pub enum TamperError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Chunking parameters or the page image are unusable.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The document name does not carry one of the accepted extensions.
    #[error("Unsupported file format for '{name}'. Allowed formats: {allowed}")]
    UnsupportedFormat { name: String, allowed: String },

    /// Local source file was not found.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Rasterisation ─────────────────────────────────────────────────────
    /// The document could not be turned into page images.
    #[error("Rasterisation failed: {0}")]
    Rasterization(String),

    /// A chunk or overlay could not be encoded as an image file.
    #[error("Image encoding failed: {0}")]
    ImageEncoding(String),

    // ── Model errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Network, authentication or provider failure calling the model.
    #[error("Model call failed: {0}")]
    ModelCall(String),

    // ── Storage ───────────────────────────────────────────────────────────
    /// The object store rejected a read or a write.
    #[error("Store error on '{container}/{key}': {reason}")]
    Store {
        container: String,
        key: String,
        reason: String,
    },

    /// The requested object does not exist.
    #[error("Object not found: '{container}/{key}'")]
    NotFound { container: String, key: String },

    /// The failure report for an invocation could not be written.
    #[error("Processing failed ({original}) and the error report could not be written: {write_error}")]
    ReportNotPersisted {
        original: String,
        write_error: String,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TamperError {
    /// Whether this error means "the object is absent" rather than "the store
    /// is broken".
    pub fn is_not_found(&self) -> bool {
        matches!(self, TamperError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_display() {
        let e = TamperError::Store {
            container: "reports".into(),
            key: "form_report.json".into(),
            reason: "disk full".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("reports/form_report.json"), "got: {msg}");
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn unsupported_format_lists_allowed() {
        let e = TamperError::UnsupportedFormat {
            name: "cv.docx".into(),
            allowed: ".pdf, .png".into(),
        };
        assert!(e.to_string().contains(".pdf, .png"));
    }

    #[test]
    fn not_found_is_distinguishable() {
        let missing = TamperError::NotFound {
            container: "reports".into(),
            key: "x".into(),
        };
        assert!(missing.is_not_found());
        assert!(!TamperError::ModelCall("401".into()).is_not_found());
    }

    #[test]
    fn report_not_persisted_keeps_both_messages() {
        let e = TamperError::ReportNotPersisted {
            original: "Rasterisation failed: bad xref".into(),
            write_error: "permission denied".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("bad xref"));
        assert!(msg.contains("permission denied"));
    }
}
