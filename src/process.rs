//! Pipeline orchestrator: one document in, one persisted report out.
//!
//! ## Stages
//!
//! ```text
//! Received ─▶ Rasterized ─▶ Chunked ─▶ Analyzing ─▶ Parsed ─▶ Overlaid ─▶ Reported(success)
//!     └──────────────┴────────────┴───────────┴──────────┴─────────┴──▶ Reported(error)
//! ```
//!
//! Any fatal error short-circuits to an error report, which is written before
//! the error is handed back. A report therefore exists for every invocation
//! that reached [`Pipeline::process`], unless writing the report itself
//! failed, which surfaces as [`TamperError::ReportNotPersisted`].
//!
//! Writes happen in a fixed order (metadata, overlay, report) and all of them
//! overwrite, so re-running a document replaces the previous artifact set.

use crate::config::AnalysisConfig;
use crate::error::TamperError;
use crate::metadata::Metadata;
use crate::pipeline::{chunk, encode, extract, overlay, prompt};
use crate::pipeline::model::VisionModel;
use crate::pipeline::raster::{DocumentFormat, Rasterizer};
use crate::report::{self, Report};
use crate::store::{self, Container, ObjectStore};
use futures::stream::{self, Stream, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Position of an invocation in the stage machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Rasterized,
    Chunked,
    Analyzing,
    Parsed,
    Overlaid,
    Reported,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Received => "received",
            Stage::Rasterized => "rasterized",
            Stage::Chunked => "chunked",
            Stage::Analyzing => "analyzing",
            Stage::Parsed => "parsed",
            Stage::Overlaid => "overlaid",
            Stage::Reported => "reported",
        };
        f.write_str(s)
    }
}

/// The tamper-analysis pipeline with its collaborators injected.
///
/// Cheap to clone; concurrent invocations share only the `Arc` handles.
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn ObjectStore>,
    rasterizer: Arc<dyn Rasterizer>,
    model: Arc<dyn VisionModel>,
    config: AnalysisConfig,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        rasterizer: Arc<dyn Rasterizer>,
        model: Arc<dyn VisionModel>,
        config: AnalysisConfig,
    ) -> Self {
        Self {
            store,
            rasterizer,
            model,
            config,
        }
    }

    /// Analyse `bytes` as the document called `name` and persist the outcome.
    pub async fn process(&self, name: &str, bytes: Vec<u8>) -> Result<Report, TamperError> {
        let start = Instant::now();
        info!("Processing {} ({} bytes)", name, bytes.len());

        let mut stage = Stage::Received;
        let outcome = match self.analyse(name, bytes, &mut stage).await {
            Ok(report) => self.persist(name, report).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(report) => {
                info!(
                    "Processed {}: {} flagged chunks in {:?}",
                    name,
                    report.tampered_chunks.as_ref().map_or(0, Vec::len),
                    start.elapsed()
                );
                Ok(report)
            }
            Err(e) => {
                error!("Processing {} failed after stage '{}': {}", name, stage, e);
                self.fail(name, e).await
            }
        }
    }

    /// Read `documents/<name>` and process it.
    ///
    /// A failed read is part of the invocation and gets an error report.
    pub async fn process_stored(&self, name: &str) -> Result<Report, TamperError> {
        match self.store.get(Container::Documents, name).await {
            Ok(bytes) => self.process(name, bytes).await,
            Err(e) => {
                error!("Cannot read {}/{}: {}", Container::Documents, name, e);
                self.fail(name, e).await
            }
        }
    }

    /// Process stored documents independently, up to `concurrency` at a time.
    ///
    /// Results arrive in completion order, each paired with its name.
    pub async fn process_many(
        &self,
        names: Vec<String>,
        concurrency: usize,
    ) -> Vec<(String, Result<Report, TamperError>)> {
        self.process_stream(names, concurrency).collect().await
    }

    /// Like [`Pipeline::process_many`], yielding each result as soon as its
    /// document finishes.
    pub fn process_stream(
        &self,
        names: Vec<String>,
        concurrency: usize,
    ) -> impl Stream<Item = (String, Result<Report, TamperError>)> + '_ {
        stream::iter(names)
            .map(move |name| async move {
                let result = self.process_stored(&name).await;
                (name, result)
            })
            .buffer_unordered(concurrency.max(1))
    }

    /// Everything up to (not including) the report write.
    async fn analyse(
        &self,
        name: &str,
        bytes: Vec<u8>,
        stage: &mut Stage,
    ) -> Result<Report, TamperError> {
        let format = DocumentFormat::from_name(name)?;
        chunk::check_strip_height(self.config.strip_height)?;
        let file_size = bytes.len() as u64;

        // ── Rasterize ────────────────────────────────────────────────────
        let rasterizer = Arc::clone(&self.rasterizer);
        let document = tokio::task::spawn_blocking(move || rasterizer.rasterize(&bytes, format))
            .await
            .map_err(|e| TamperError::Internal(format!("rasterizer task panicked: {e}")))??;
        let (page, info) = document.into_first_page()?;
        *stage = Stage::Rasterized;
        debug!("{}: page {} is {}x{} px", name, page.number, page.width(), page.height());

        let metadata = Metadata::capture(name, file_size, format, info, &page, self.config.dpi);
        self.put_json(Container::Metadata, &store::metadata_key(name), &metadata)
            .await?;

        // ── Chunk ────────────────────────────────────────────────────────
        let chunks = chunk::chunk(&page.image, self.config.strip_height)?;
        *stage = Stage::Chunked;
        debug!("{}: {} chunks of {} px", name, chunks.len(), self.config.strip_height);

        // ── Model call ───────────────────────────────────────────────────
        let request = match self.config.system_prompt.as_deref() {
            Some(instruction) => prompt::build_request_with_prompt(&chunks, instruction)?,
            None => prompt::build_request(&chunks)?,
        };
        *stage = Stage::Analyzing;
        let reply = self.model.complete(&request).await?;
        debug!(
            "{}: model reply {} chars, {} in / {} out tokens",
            name,
            reply.content.len(),
            reply.prompt_tokens,
            reply.completion_tokens
        );

        // ── Parse ────────────────────────────────────────────────────────
        let extraction = extract::extract_detailed(&reply.content);
        if extraction.is_degraded() {
            warn!("{}: model output unusable, reporting no tampering", name);
        }
        let mut analysis = extraction.result;
        analysis.retain_chunks(chunks.len());
        *stage = Stage::Parsed;

        // ── Overlay ──────────────────────────────────────────────────────
        let rendered = overlay::render(&page.image, &chunks, &analysis.suspicious_chunks);
        let encoded = encode::encode_overlay(&rendered, self.config.overlay_format)?;
        let overlay_key = store::overlay_key(name, self.config.overlay_format);
        self.store
            .put(Container::OverlayImages, &overlay_key, encoded)
            .await?;
        *stage = Stage::Overlaid;

        let overlay_url = self.store.url(Container::OverlayImages, &overlay_key);
        Ok(report::assemble_success(
            name,
            metadata,
            analysis,
            overlay_url,
            reply.content,
        ))
    }

    /// Write `report` under the document's report key.
    async fn persist(&self, name: &str, report: Report) -> Result<Report, TamperError> {
        let key = store::report_key(name);
        self.store
            .put(Container::Reports, &key, report.to_json()?.into_bytes())
            .await?;
        debug!("{}: stage '{}' ({})", name, Stage::Reported, report.request_id);
        Ok(report)
    }

    /// Persist an error report for `cause`, then hand `cause` back.
    async fn fail(&self, name: &str, cause: TamperError) -> Result<Report, TamperError> {
        let report = report::assemble_failure(name, cause.to_string());
        match self.persist(name, report).await {
            Ok(_) => Err(cause),
            Err(write_error) => {
                error!("{}: error report not written: {}", name, write_error);
                Err(TamperError::ReportNotPersisted {
                    original: cause.to_string(),
                    write_error: write_error.to_string(),
                })
            }
        }
    }

    async fn put_json<T: serde::Serialize + Sync>(
        &self,
        container: Container,
        key: &str,
        value: &T,
    ) -> Result<(), TamperError> {
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| TamperError::Internal(format!("{container}/{key}: {e}")))?;
        self.store.put(container, key, bytes).await
    }
}
