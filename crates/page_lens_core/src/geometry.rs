//! crates/page_lens_core/src/geometry.rs
//!
//! The coordinate mapper. Turns pointer drags and text selections on a rendered page
//! into `Selection`s, extracting a PNG sub-image for pixel captures.
//!
//! Three coordinate spaces are involved:
//! - viewport space: logical pixels of the page container, where pointer events land;
//! - raster space: the pixels of the rendered surface, usually denser than the viewport
//!   (device pixel ratio, or a zoom that differs from the raster resolution);
//! - render space at another zoom, derived later through [`Annotation::render_rect`].
//!
//! [`Annotation::render_rect`]: crate::domain::Annotation::render_rect

use crate::classify::classify;
use crate::domain::{Rect, Selection, SelectionKind};
use image::{imageops, DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use tracing::debug;

/// Drags whose width or height does not exceed this many viewport pixels are treated as clicks.
pub const MIN_SELECTION_EXTENT: f64 = 10.0;

/// Page number reported for text selections when the caller cannot tell which page they came from.
pub const DEFAULT_TEXT_PAGE: u32 = 1;

/// A pointer position in the page container's viewport space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportPoint {
    pub x: f64,
    pub y: f64,
}

impl ViewportPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// How a pixel capture was started. This, not the pixels, decides the selection kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Snipping an image to attach to a prompt.
    Snip,
    /// Marking a region to turn into an annotation.
    Annotate,
}

impl CaptureMode {
    pub fn selection_kind(&self) -> SelectionKind {
        match self {
            CaptureMode::Snip => SelectionKind::Image,
            CaptureMode::Annotate => SelectionKind::Region,
        }
    }
}

/// A rendered page: a raster plus the logical size it is displayed at.
#[derive(Debug, Clone)]
pub struct PageSurface {
    pub pixels: RgbaImage,
    pub display_width: f64,
    pub display_height: f64,
    pub page_number: u32,
    /// Zoom the page was rendered at.
    pub scale: f64,
}

impl PageSurface {
    pub fn new(
        pixels: RgbaImage,
        display_width: f64,
        display_height: f64,
        page_number: u32,
        scale: f64,
    ) -> Self {
        Self {
            pixels,
            display_width,
            display_height,
            page_number,
            scale,
        }
    }

    /// Raster pixels per viewport pixel, horizontally and vertically.
    ///
    /// `None` when the surface cannot be addressed (nothing rendered or not laid out).
    pub fn pixel_ratio(&self) -> Option<(f64, f64)> {
        if self.pixels.width() == 0 || self.pixels.height() == 0 {
            return None;
        }
        if !(self.display_width > 0.0 && self.display_height > 0.0) {
            return None;
        }
        Some((
            f64::from(self.pixels.width()) / self.display_width,
            f64::from(self.pixels.height()) / self.display_height,
        ))
    }

    /// Maps a viewport rectangle to raster pixel bounds `(x, y, width, height)`.
    pub fn to_raster(&self, rect: &Rect) -> Option<(i64, i64, u32, u32)> {
        let (scale_x, scale_y) = self.pixel_ratio()?;
        let width = (rect.width * scale_x).round();
        let height = (rect.height * scale_y).round();
        if !(width >= 1.0 && height >= 1.0) || !rect.is_finite() {
            return None;
        }
        // A block larger than the whole raster cannot be a selection of this page.
        if width > f64::from(self.pixels.width()) || height > f64::from(self.pixels.height()) {
            debug!(
                "Ignoring a {}x{} block on a {}x{} raster",
                width,
                height,
                self.pixels.width(),
                self.pixels.height()
            );
            return None;
        }
        Some((
            (rect.x * scale_x).round() as i64,
            (rect.y * scale_y).round() as i64,
            width as u32,
            height as u32,
        ))
    }

    /// Copies the raster block under `rect` into a new image and encodes it as PNG.
    ///
    /// The new image is exactly `round(width * scale_x) × round(height * scale_y)`
    /// pixels; parts of the rectangle hanging off the raster stay transparent.
    /// Blocks larger than the raster, or not touching it at all, yield `None`.
    /// The surface itself is left untouched.
    pub fn extract(&self, rect: &Rect) -> Option<Vec<u8>> {
        let (x, y, width, height) = self.to_raster(rect)?;
        let mut block = RgbaImage::new(width, height);

        let left = x.max(0);
        let top = y.max(0);
        let right = x.saturating_add(i64::from(width)).min(i64::from(self.pixels.width()));
        let bottom = y.saturating_add(i64::from(height)).min(i64::from(self.pixels.height()));
        if right <= left || bottom <= top {
            debug!("Ignoring a block that lies entirely off the raster");
            return None;
        }
        let source = imageops::crop_imm(
            &self.pixels,
            left as u32,
            top as u32,
            (right - left) as u32,
            (bottom - top) as u32,
        )
        .to_image();
        imageops::replace(&mut block, &source, left - x, top - y);

        encode_png(block)
    }
}

/// Normalizes a drag into a rectangle, rejecting drags too small to be deliberate.
pub fn normalize_drag(start: ViewportPoint, end: ViewportPoint) -> Option<Rect> {
    let rect = Rect::new(
        start.x.min(end.x),
        start.y.min(end.y),
        (end.x - start.x).abs(),
        (end.y - start.y).abs(),
    );
    if rect.width <= MIN_SELECTION_EXTENT || rect.height <= MIN_SELECTION_EXTENT {
        debug!(
            "Ignoring drag of {:.1}x{:.1}, below the selection threshold",
            rect.width, rect.height
        );
        return None;
    }
    Some(rect)
}

/// Captures the region between two drag points as an image selection.
pub fn capture_region(
    surface: &PageSurface,
    start: ViewportPoint,
    end: ViewportPoint,
    mode: CaptureMode,
) -> Option<Selection> {
    let rect = normalize_drag(start, end)?;
    let image_bytes = surface.extract(&rect)?;
    let kind = mode.selection_kind();
    Some(Selection {
        kind,
        text: region_label(kind, surface.page_number),
        page_number: surface.page_number,
        image_bytes: Some(image_bytes),
        rect: Some(rect),
        capture_scale: surface.scale,
    })
}

/// Captures the platform's active text selection.
///
/// `page_hint` is the page the selection's anchor sits on, when the caller can tell.
pub fn capture_text(raw: &str, page_hint: Option<u32>) -> Option<Selection> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }
    Some(Selection {
        kind: classify(text),
        text: text.to_string(),
        page_number: page_hint.unwrap_or(DEFAULT_TEXT_PAGE),
        image_bytes: None,
        rect: None,
        capture_scale: 1.0,
    })
}

fn region_label(kind: SelectionKind, page_number: u32) -> String {
    match kind {
        SelectionKind::Region => format!("Region on page {}", page_number),
        _ => format!("Image from page {}", page_number),
    }
}

fn encode_png(block: RgbaImage) -> Option<Vec<u8>> {
    let mut bytes = Vec::new();
    match DynamicImage::ImageRgba8(block).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
    {
        Ok(()) => Some(bytes),
        Err(e) => {
            debug!("Failed to encode captured region: {}", e);
            None
        }
    }
}
