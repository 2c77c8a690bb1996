//! Descriptive facts about a source document.
//!
//! Metadata is captured once per invocation right after rasterisation and
//! persisted to the `metadata` container whatever the analysis later
//! concludes.

use crate::pipeline::raster::{DocumentFormat, DocumentInfo, RasterPage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Document name inside the `documents` container.
    pub file_name: String,
    pub file_size: u64,
    pub format: DocumentFormat,
    pub page_count: usize,
    /// Rendered size of the analysed page in pixels.
    pub page_width: u32,
    pub page_height: u32,
    /// Rendering resolution; `None` for raster uploads used as-is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dpi: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modification_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_version: Option<String>,
}

impl Metadata {
    pub fn capture(
        file_name: &str,
        file_size: u64,
        format: DocumentFormat,
        info: DocumentInfo,
        page: &RasterPage,
        dpi: u32,
    ) -> Self {
        Self {
            file_name: file_name.to_string(),
            file_size,
            format,
            page_count: info.page_count,
            page_width: page.width(),
            page_height: page.height(),
            dpi: (format == DocumentFormat::Pdf).then_some(dpi),
            title: info.title,
            author: info.author,
            subject: info.subject,
            creator: info.creator,
            producer: info.producer,
            creation_date: info.creation_date,
            modification_date: info.modification_date,
            pdf_version: info.pdf_version,
        }
    }
}
