//! # tamper-scan
//!
//! Detect tampering in scanned documents with a Vision Language Model.
//!
//! The first page of a submitted document is rasterised, cut into numbered
//! full-width strips and sent to a VLM together with an instruction asking
//! which strips look doctored. The reply is recovered into a structured
//! verdict even when the model wraps or mangles its JSON, and the verdict is
//! persisted as a report next to an overlay image with the flagged strips
//! tinted red.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document
//!  │
//!  ├─ 1. Rasterize  first page via pdfium, or decode PNG/JPEG (spawn_blocking)
//!  ├─ 2. Metadata   size, format, page count, PDF tags → metadata container
//!  ├─ 3. Chunk      strip_height-pixel strips, black-padded at the bottom
//!  ├─ 4. VLM        one call: instruction + one image per strip, in order
//!  ├─ 5. Extract    fenced JSON → bare JSON → conservative default
//!  ├─ 6. Overlay    red (flagged) / green (clear) strips → overlay-images
//!  └─ 7. Report     success or error JSON → reports container, written last
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tamper_scan::{AnalysisConfig, FsStore, LlmVisionModel, PdfiumRasterizer, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from OPENAI_API_KEY / EDGEQUAKE_LLM_PROVIDER / …
//!     let config = AnalysisConfig::default();
//!     let pipeline = Pipeline::new(
//!         Arc::new(FsStore::new("./data")),
//!         Arc::new(PdfiumRasterizer::from_config(&config)),
//!         Arc::new(LlmVisionModel::from_config(&config)?),
//!         config,
//!     );
//!     let report = pipeline.process_stored("form.pdf").await?;
//!     println!("flagged: {:?}", report.tampered_chunks);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `tamper-scan` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! tamper-scan = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analysis;
pub mod config;
pub mod error;
pub mod intake;
pub mod metadata;
pub mod pipeline;
pub mod process;
pub mod prompts;
pub mod report;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analysis::{AnalysisResult, Explanation, RiskLevel};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, OverlayFormat};
pub use error::TamperError;
pub use intake::{check_status, upload, upload_bytes, ReportStatus};
pub use metadata::Metadata;
pub use pipeline::chunk::{chunk, BoundingBox, Chunk};
pub use pipeline::extract::{extract, extract_detailed, Extraction, ExtractionSource};
pub use pipeline::model::{LlmVisionModel, ModelReply, VisionModel};
pub use pipeline::prompt::{build_request, build_request_with_prompt, AnalysisRequest, RequestMessage};
pub use pipeline::raster::{DocumentFormat, DocumentInfo, PdfiumRasterizer, RasterizedDocument, Rasterizer};
pub use process::{Pipeline, Stage};
pub use report::{assemble_failure, assemble_success, Report, Status};
pub use store::{Container, FsStore, MemoryStore, ObjectStore};
