//! Pipeline stages for tamper analysis.
//!
//! Each submodule implements one transformation step; the orchestrator in
//! [`crate::process`] strings them together.
//!
//! ## Data Flow
//!
//! ```text
//! raster ──▶ chunk ──▶ prompt ──▶ model ──▶ extract ──▶ overlay
//! (pdfium)   (strips)  (base64)   (VLM)     (JSON)      (imageproc)
//! ```
//!
//! 1. [`raster`] : document bytes to page bitmaps; blocking, run in
//!    `spawn_blocking`
//! 2. [`chunk`]  : cut the first page into numbered full-width strips
//! 3. [`prompt`] : instruction plus one PNG per strip, in strip order
//! 4. [`model`]  : the single VLM call, with retry/backoff inside the client
//! 5. [`extract`]: lenient recovery of the verdict from free text
//! 6. [`overlay`]: red/green tinting of the strips on a copy of the page
//!
//! [`encode`] holds the PNG/JPEG encoders shared by `prompt` and the
//! orchestrator; [`input`] reads uploads from disk or HTTP.

pub mod chunk;
pub mod encode;
pub mod extract;
pub mod input;
pub mod model;
pub mod overlay;
pub mod prompt;
pub mod raster;
