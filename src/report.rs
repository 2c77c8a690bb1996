//! The persisted outcome of one processing attempt.
//!
//! A [`Report`] is created fresh per invocation and written once, replacing
//! whatever an earlier attempt left under the same key. `request_id` and
//! `timestamp` are the only fields that tell two attempts on the same
//! document apart.

use crate::analysis::AnalysisResult;
use crate::error::TamperError;
use crate::metadata::Metadata;
use crate::store::Container;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

/// Report JSON as read by status-polling clients.
///
/// Success reports carry `overlay_image_url`, `tampered_chunks`, `response`,
/// `metadata` and `model_output`; error reports carry only `error`. Absent
/// fields are omitted from the JSON rather than written as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub form_id: String,
    pub status: Status,
    pub blob_name: String,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tampered_chunks: Option<Vec<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    /// Raw model text, kept so degraded extractions can be audited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Report {
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Pretty JSON with 2-space indentation.
    pub fn to_json(&self) -> Result<String, TamperError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| TamperError::Internal(format!("report serialisation: {e}")))
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, TamperError> {
        serde_json::from_slice(bytes)
            .map_err(|e| TamperError::Internal(format!("report is not valid JSON: {e}")))
    }
}

/// Source blob path used for both `form_id` and `blob_name`.
pub fn blob_name(document_name: &str) -> String {
    format!("{}/{}", Container::Documents, document_name)
}

fn base(document_name: &str, status: Status) -> Report {
    let blob = blob_name(document_name);
    Report {
        form_id: blob.clone(),
        status,
        blob_name: blob,
        timestamp: Utc::now(),
        request_id: Uuid::new_v4().to_string(),
        overlay_image_url: None,
        tampered_chunks: None,
        response: None,
        metadata: None,
        model_output: None,
        error: None,
    }
}

pub fn assemble_success(
    document_name: &str,
    metadata: Metadata,
    analysis: AnalysisResult,
    overlay_url: String,
    model_output: String,
) -> Report {
    Report {
        overlay_image_url: Some(overlay_url),
        tampered_chunks: Some(analysis.tampered_chunks()),
        response: Some(analysis),
        metadata: Some(metadata),
        model_output: Some(model_output),
        ..base(document_name, Status::Success)
    }
}

pub fn assemble_failure(document_name: &str, message: impl Into<String>) -> Report {
    Report {
        error: Some(message.into()),
        ..base(document_name, Status::Error)
    }
}
