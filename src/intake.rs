//! Upload and status polling on top of an [`ObjectStore`].
//!
//! These are the two operations a client performs around the pipeline:
//! put a document into the `documents` container, then poll until its report
//! shows up. A missing report reads as "not ready"; there is no way to tell
//! "still processing" from "never triggered".

use crate::error::TamperError;
use crate::pipeline::input;
use crate::pipeline::raster::DocumentFormat;
use crate::report::Report;
use crate::store::{self, Container, ObjectStore};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

/// Answer to a status poll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportStatus {
    pub ready: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<Report>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReportStatus {
    fn pending() -> Self {
        Self {
            ready: false,
            report: None,
            error: None,
        }
    }

    fn failed(message: String) -> Self {
        Self {
            ready: false,
            report: None,
            error: Some(message),
        }
    }
}

/// Store the document at `source` (local path or HTTP(S) URL).
///
/// Returns the document name it was stored under. Only the extension is
/// checked; the content is not inspected.
pub async fn upload(
    store: &dyn ObjectStore,
    source: &str,
    timeout_secs: u64,
) -> Result<String, TamperError> {
    let doc = input::read_source(source, timeout_secs).await?;
    upload_bytes(store, &doc.name, doc.bytes).await?;
    Ok(doc.name)
}

/// Store `bytes` as `documents/<name>` after the extension check.
pub async fn upload_bytes(
    store: &dyn ObjectStore,
    name: &str,
    bytes: Vec<u8>,
) -> Result<(), TamperError> {
    let format = DocumentFormat::from_name(name)?;
    let len = bytes.len();
    store.put(Container::Documents, name, bytes).await?;
    info!("Uploaded {} ({}, {} bytes)", name, format, len);
    Ok(())
}

/// Look up the report for the document called `name`.
pub async fn check_status(store: &dyn ObjectStore, name: &str) -> ReportStatus {
    let key = store::report_key(name);
    match store.get(Container::Reports, &key).await {
        Ok(bytes) => match Report::from_json(&bytes) {
            Ok(report) => {
                info!("Found report for {}", name);
                ReportStatus {
                    ready: true,
                    report: Some(report),
                    error: None,
                }
            }
            Err(e) => {
                error!("Unreadable report for {}: {}", name, e);
                ReportStatus::failed(e.to_string())
            }
        },
        Err(e) if e.is_not_found() => ReportStatus::pending(),
        Err(e) => {
            error!("Error checking status for {}: {}", name, e);
            ReportStatus::failed(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::assemble_failure;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn upload_rejects_unsupported_extension() {
        let store = MemoryStore::new();
        let err = upload_bytes(&store, "cv.docx", b"x".to_vec()).await.unwrap_err();
        assert!(matches!(err, TamperError::UnsupportedFormat { .. }));
        assert!(store.keys(Container::Documents).is_empty());
    }

    #[tokio::test]
    async fn upload_from_local_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Form.PDF");
        std::fs::write(&path, b"%PDF-1.7").unwrap();

        let store = MemoryStore::new();
        let name = upload(&store, path.to_str().unwrap(), 5).await.unwrap();
        assert_eq!(name, "Form.PDF");
        assert_eq!(store.get(Container::Documents, "Form.PDF").await.unwrap(), b"%PDF-1.7");
    }

    #[tokio::test]
    async fn status_pending_then_ready() {
        let store = MemoryStore::new();
        let status = check_status(&store, "form.pdf").await;
        assert_eq!(status, ReportStatus::pending());

        let report = assemble_failure("form.pdf", "boom");
        store
            .put(Container::Reports, "form_report.json", report.to_json().unwrap().into_bytes())
            .await
            .unwrap();

        let status = check_status(&store, "form.pdf").await;
        assert!(status.ready);
        assert_eq!(status.report, Some(report));
    }

    #[tokio::test]
    async fn corrupt_report_is_not_ready_with_error() {
        let store = MemoryStore::new();
        store
            .put(Container::Reports, "form_report.json", b"{not json".to_vec())
            .await
            .unwrap();
        let status = check_status(&store, "form.pdf").await;
        assert!(!status.ready);
        assert!(status.error.is_some());
    }

    #[test]
    fn pending_status_serialises_without_optional_keys() {
        let json = serde_json::to_value(ReportStatus::pending()).unwrap();
        assert_eq!(json, serde_json::json!({"ready": false}));
    }
}
