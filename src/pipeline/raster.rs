//! Rasterisation: document bytes → ordered page images.
//!
//! PDFs are rendered through pdfium; PNG and JPEG uploads are decoded
//! directly and count as a single page. Only the first page is analysed, so
//! [`PdfiumRasterizer`] renders just as many pages as its `page_limit` asks
//! for while still reporting the real page count.
//!
//! The orchestrator only depends on [`Rasterizer`]; tests inject a scripted
//! implementation instead of loading pdfium.
//!
//! pdfium calls are blocking and CPU-heavy; the orchestrator runs
//! [`Rasterizer::rasterize`] inside `spawn_blocking`.

use crate::config::AnalysisConfig;
use crate::error::TamperError;
use image::{DynamicImage, ImageFormat, RgbaImage};
use pdfium_render::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

/// Accepted upload formats, decided by file extension only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DocumentFormat {
    Pdf,
    Png,
    Jpeg,
}

impl DocumentFormat {
    pub const ALLOWED_EXTENSIONS: [&'static str; 4] = [".pdf", ".png", ".jpg", ".jpeg"];

    /// Detect the format from a document name's extension (case-insensitive).
    pub fn from_name(name: &str) -> Result<Self, TamperError> {
        let ext = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("pdf") => Ok(DocumentFormat::Pdf),
            Some("png") => Ok(DocumentFormat::Png),
            Some("jpg") | Some("jpeg") => Ok(DocumentFormat::Jpeg),
            _ => Err(TamperError::UnsupportedFormat {
                name: name.to_string(),
                allowed: Self::ALLOWED_EXTENSIONS.join(", "),
            }),
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DocumentFormat::Pdf => "PDF",
            DocumentFormat::Png => "PNG",
            DocumentFormat::Jpeg => "JPEG",
        })
    }
}

/// Document-level facts the rasteriser learns while opening the file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentInfo {
    pub page_count: usize,
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub pdf_version: Option<String>,
}

/// Output of a [`Rasterizer`].
#[derive(Debug, Clone)]
pub struct RasterizedDocument {
    /// Rendered pages in document order. May be shorter than `info.page_count`.
    pub pages: Vec<DynamicImage>,
    pub info: DocumentInfo,
}

impl RasterizedDocument {
    /// Take the first page as the page to analyse.
    pub fn into_first_page(self) -> Result<(RasterPage, DocumentInfo), TamperError> {
        let first = self
            .pages
            .into_iter()
            .next()
            .ok_or_else(|| TamperError::Rasterization("document has no pages".into()))?;
        Ok((
            RasterPage {
                number: 1,
                image: first.to_rgba8(),
            },
            self.info,
        ))
    }
}

/// A page bitmap handed to the chunker.
#[derive(Debug, Clone)]
pub struct RasterPage {
    /// 1-based page number.
    pub number: usize,
    pub image: RgbaImage,
}

impl RasterPage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Turns document bytes into page images.
pub trait Rasterizer: Send + Sync {
    fn rasterize(
        &self,
        bytes: &[u8],
        format: DocumentFormat,
    ) -> Result<RasterizedDocument, TamperError>;
}

/// pdfium-backed rasteriser.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    pub dpi: u32,
    pub max_rendered_pixels: u32,
    pub password: Option<String>,
    /// Pages to render, from the start of the document. Default: 1.
    pub page_limit: usize,
}

impl PdfiumRasterizer {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            dpi: config.dpi,
            max_rendered_pixels: config.max_rendered_pixels,
            password: config.password.clone(),
            page_limit: 1,
        }
    }

    fn rasterize_pdf(&self, bytes: &[u8]) -> Result<RasterizedDocument, TamperError> {
        let pdfium = pdfium_auto::bind_pdfium_silent()
            .map_err(|e| TamperError::Rasterization(format!("pdfium unavailable: {e}")))?;

        let password = self.password.as_deref();
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, password)
            .map_err(|e| {
                let err_str = format!("{:?}", e);
                if err_str.to_lowercase().contains("password") {
                    if password.is_some() {
                        TamperError::Rasterization("wrong password for encrypted PDF".into())
                    } else {
                        TamperError::Rasterization("PDF is encrypted and requires a password".into())
                    }
                } else {
                    TamperError::Rasterization(format!("PDF is corrupt: {err_str}"))
                }
            })?;

        let metadata = document.metadata();
        let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
            metadata.get(tag).and_then(|t| {
                let v = t.value().to_string();
                if v.is_empty() {
                    None
                } else {
                    Some(v)
                }
            })
        };

        let pages = document.pages();
        let page_count = pages.len() as usize;
        info!("PDF loaded: {} pages", page_count);

        let scale = self.dpi as f32 / 72.0;
        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(scale)
            .set_maximum_width(self.max_rendered_pixels as i32)
            .set_maximum_height(self.max_rendered_pixels as i32);

        let mut rendered = Vec::with_capacity(self.page_limit.min(page_count));
        for idx in 0..self.page_limit.min(page_count) {
            let page = pages.get(idx as u16).map_err(|e| {
                TamperError::Rasterization(format!("page {}: {:?}", idx + 1, e))
            })?;
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                TamperError::Rasterization(format!("page {}: {:?}", idx + 1, e))
            })?;
            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px at {} DPI",
                idx + 1,
                image.width(),
                image.height(),
                self.dpi
            );
            rendered.push(image);
        }

        Ok(RasterizedDocument {
            pages: rendered,
            info: DocumentInfo {
                page_count,
                title: get_meta(PdfDocumentMetadataTagType::Title),
                author: get_meta(PdfDocumentMetadataTagType::Author),
                subject: get_meta(PdfDocumentMetadataTagType::Subject),
                creator: get_meta(PdfDocumentMetadataTagType::Creator),
                producer: get_meta(PdfDocumentMetadataTagType::Producer),
                creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
                modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
                pdf_version: Some(format!("{:?}", document.version())),
            },
        })
    }
}

impl Rasterizer for PdfiumRasterizer {
    fn rasterize(
        &self,
        bytes: &[u8],
        format: DocumentFormat,
    ) -> Result<RasterizedDocument, TamperError> {
        match format {
            DocumentFormat::Pdf => self.rasterize_pdf(bytes),
            DocumentFormat::Png => decode_raster(bytes, ImageFormat::Png),
            DocumentFormat::Jpeg => decode_raster(bytes, ImageFormat::Jpeg),
        }
    }
}

/// Decode an already-raster upload as a one-page document.
pub fn decode_raster(bytes: &[u8], format: ImageFormat) -> Result<RasterizedDocument, TamperError> {
    let image = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| TamperError::Rasterization(format!("cannot decode {format:?} image: {e}")))?;
    debug!("Decoded {:?} upload → {}x{} px", format, image.width(), image.height());
    Ok(RasterizedDocument {
        pages: vec![image],
        info: DocumentInfo {
            page_count: 1,
            ..DocumentInfo::default()
        },
    })
}
