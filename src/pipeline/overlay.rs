//! Overlay rendering: translucent per-chunk rectangles over a copy of the page.
//!
//! Flagged strips are tinted red, clear strips green, and every strip gets a
//! thin dark border. All drawing is alpha-blended through
//! [`imageproc::drawing::Blend`] onto a clone of the page, so the pixels the
//! chunks were cut from are never touched.

use crate::pipeline::chunk::{BoundingBox, Chunk};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, Blend};
use imageproc::rect::Rect;
use std::collections::BTreeSet;
use tracing::debug;

/// Fill for chunks the model flagged.
pub const FLAGGED_FILL: Rgba<u8> = Rgba([255, 0, 0, 128]);
/// Fill for chunks the model did not flag.
pub const CLEAR_FILL: Rgba<u8> = Rgba([0, 255, 0, 127]);
/// Border drawn over both fills.
pub const BORDER: Rgba<u8> = Rgba([0, 0, 0, 127]);
/// Border stroke width in pixels, drawn inside the bbox.
pub const BORDER_WIDTH: u32 = 3;

/// Render the overlay for `chunks` on top of `base`.
///
/// Boxes are clipped to the page, so the padded tail of the last strip
/// contributes nothing.
pub fn render(base: &RgbaImage, chunks: &[Chunk], suspicious: &BTreeSet<u32>) -> RgbaImage {
    let mut canvas = Blend(base.clone());
    let (width, height) = base.dimensions();

    for chunk in chunks {
        let Some(bbox) = clip(&chunk.bbox, width, height) else {
            continue;
        };
        let fill = if suspicious.contains(&chunk.index) {
            FLAGGED_FILL
        } else {
            CLEAR_FILL
        };

        let rect = Rect::at(bbox.left as i32, bbox.top as i32).of_size(bbox.width(), bbox.height());
        draw_filled_rect_mut(&mut canvas, rect, fill);

        for inset in 0..BORDER_WIDTH {
            let w = bbox.width().saturating_sub(2 * inset);
            let h = bbox.height().saturating_sub(2 * inset);
            if w == 0 || h == 0 {
                break;
            }
            let ring = Rect::at((bbox.left + inset) as i32, (bbox.top + inset) as i32).of_size(w, h);
            draw_hollow_rect_mut(&mut canvas, ring, BORDER);
        }
    }

    debug!(
        "Rendered overlay: {} chunks, {} flagged",
        chunks.len(),
        chunks.iter().filter(|c| suspicious.contains(&c.index)).count()
    );
    canvas.0
}

/// Intersect `bbox` with the page; `None` if nothing is left.
fn clip(bbox: &BoundingBox, width: u32, height: u32) -> Option<BoundingBox> {
    let clipped = BoundingBox {
        left: bbox.left.min(width),
        top: bbox.top.min(height),
        right: bbox.right.min(width),
        bottom: bbox.bottom.min(height),
    };
    (clipped.width() > 0 && clipped.height() > 0).then_some(clipped)
}
