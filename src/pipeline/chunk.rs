//! Chunking: split one page into full-width horizontal strips.
//!
//! The 1-based `index` of each [`Chunk`] is the only identifier the model ever
//! sees (it infers it from message order), so chunks are numbered once here
//! and never renumbered downstream.
//!
//! The last strip usually runs past the bottom of the page. Crops are always
//! exactly `strip_height` rows tall; the rows beyond the source are
//! [`PADDING`] (opaque black), which the system prompt tells the model to
//! ignore.

use crate::error::TamperError;
use image::{imageops, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fill colour for rows of the final strip that lie below the page.
pub const PADDING: Rgba<u8> = Rgba([0, 0, 0, 255]);

/// Pixel rectangle of a chunk on its page. `right` and `bottom` are exclusive.
///
/// Serialises as `[left, top, right, bottom]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct BoundingBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl BoundingBox {
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

impl From<[u32; 4]> for BoundingBox {
    fn from([left, top, right, bottom]: [u32; 4]) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }
}

impl From<BoundingBox> for [u32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.left, b.top, b.right, b.bottom]
    }
}

/// One strip of the page.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// 1-based position, top to bottom.
    pub index: u32,
    pub bbox: BoundingBox,
    /// Exactly `bbox.width() × bbox.height()` pixels, padded with [`PADDING`].
    pub pixels: RgbaImage,
}

/// Reject chunk parameters before any page is rendered.
pub fn check_strip_height(strip_height: u32) -> Result<(), TamperError> {
    if strip_height == 0 {
        return Err(TamperError::InvalidInput(
            "strip height must be at least 1 pixel".into(),
        ));
    }
    Ok(())
}

/// Split `image` into `ceil(height / strip_height)` strips.
///
/// # Errors
/// [`TamperError::InvalidInput`] when `strip_height` is zero or the image has
/// no pixels.
pub fn chunk(image: &RgbaImage, strip_height: u32) -> Result<Vec<Chunk>, TamperError> {
    check_strip_height(strip_height)?;
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(TamperError::InvalidInput(format!(
            "page image is empty ({width}x{height})"
        )));
    }

    let strip_count = height.div_ceil(strip_height);
    let mut chunks = Vec::with_capacity(strip_count as usize);

    for y in 0..strip_count {
        let top = y * strip_height;
        let bbox = BoundingBox {
            left: 0,
            top,
            right: width,
            bottom: top + strip_height,
        };

        let mut pixels = RgbaImage::from_pixel(width, strip_height, PADDING);
        let visible = strip_height.min(height - top);
        let source = imageops::crop_imm(image, 0, top, width, visible).to_image();
        imageops::replace(&mut pixels, &source, 0, 0);

        chunks.push(Chunk {
            index: y + 1,
            bbox,
            pixels,
        });
    }

    debug!(
        "Chunked {}x{} page into {} strips of {} px",
        width,
        height,
        chunks.len(),
        strip_height
    );
    Ok(chunks)
}
