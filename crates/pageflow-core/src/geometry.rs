//! Geometry kernel: axis-aligned bounding boxes and the pure functions
//! pipeline stages use to compare and remap them.
//!
//! Coordinates are continuous `f64` values; no "+1" pixel-inclusive
//! convention is applied anywhere, so conversions never accumulate
//! off-by-one drift. Boxes are immutable value types: every operation
//! returns a new box.

use crate::error::{PageflowError, Result};
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in upper-left / lower-right corner form.
///
/// `relative` marks normalized coordinates in `0..=1`; absolute boxes are
/// in the pixel frame of their owning image. Invariant: `lrx > ulx` and
/// `lry > uly` (enforced by [`BoundingBox::new`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    ulx: f64,
    uly: f64,
    lrx: f64,
    lry: f64,
    /// True when coordinates are normalized to `0..=1`
    #[serde(default)]
    relative: bool,
}

impl BoundingBox {
    /// Create an absolute box from corner coordinates.
    ///
    /// Fails with [`PageflowError::Geometry`] when the box has no positive
    /// width or height.
    pub fn new(ulx: f64, uly: f64, lrx: f64, lry: f64) -> Result<Self> {
        Self::with_mode(ulx, uly, lrx, lry, false)
    }

    /// Create a relative (normalized) box from corner coordinates in `0..=1`.
    pub fn new_relative(ulx: f64, uly: f64, lrx: f64, lry: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&ulx)
            || !(0.0..=1.0).contains(&uly)
            || !(0.0..=1.0).contains(&lrx)
            || !(0.0..=1.0).contains(&lry)
        {
            return Err(PageflowError::geometry(format!(
                "relative coordinates must lie in [0,1], got ({ulx},{uly},{lrx},{lry})"
            )));
        }
        Self::with_mode(ulx, uly, lrx, lry, true)
    }

    fn with_mode(ulx: f64, uly: f64, lrx: f64, lry: f64, relative: bool) -> Result<Self> {
        if !(lrx > ulx) || !(lry > uly) {
            return Err(PageflowError::geometry(format!(
                "box must have positive extent, got ({ulx},{uly})->({lrx},{lry})"
            )));
        }
        Ok(Self {
            ulx,
            uly,
            lrx,
            lry,
            relative,
        })
    }

    /// Create an absolute box from origin + width/height form.
    pub fn from_xywh(x: f64, y: f64, w: f64, h: f64) -> Result<Self> {
        Self::new(x, y, x + w, y + h)
    }

    /// Rebuild a box from its 4-point corner form (any point order).
    pub fn from_corners(points: &[[f64; 2]; 4]) -> Result<Self> {
        let ulx = points.iter().map(|p| p[0]).fold(f64::INFINITY, f64::min);
        let uly = points.iter().map(|p| p[1]).fold(f64::INFINITY, f64::min);
        let lrx = points
            .iter()
            .map(|p| p[0])
            .fold(f64::NEG_INFINITY, f64::max);
        let lry = points
            .iter()
            .map(|p| p[1])
            .fold(f64::NEG_INFINITY, f64::max);
        Self::new(ulx, uly, lrx, lry)
    }

    /// Upper-left x coordinate.
    #[inline]
    #[must_use = "returns the coordinate without modifying the box"]
    pub const fn ulx(&self) -> f64 {
        self.ulx
    }

    /// Upper-left y coordinate.
    #[inline]
    #[must_use = "returns the coordinate without modifying the box"]
    pub const fn uly(&self) -> f64 {
        self.uly
    }

    /// Lower-right x coordinate.
    #[inline]
    #[must_use = "returns the coordinate without modifying the box"]
    pub const fn lrx(&self) -> f64 {
        self.lrx
    }

    /// Lower-right y coordinate.
    #[inline]
    #[must_use = "returns the coordinate without modifying the box"]
    pub const fn lry(&self) -> f64 {
        self.lry
    }

    /// True when coordinates are normalized to `0..=1`.
    #[inline]
    #[must_use = "returns the coordinate mode without modifying the box"]
    pub const fn is_relative(&self) -> bool {
        self.relative
    }

    /// Box width.
    #[inline]
    #[must_use = "returns the width without modifying the box"]
    pub fn width(&self) -> f64 {
        self.lrx - self.ulx
    }

    /// Box height.
    #[inline]
    #[must_use = "returns the height without modifying the box"]
    pub fn height(&self) -> f64 {
        self.lry - self.uly
    }

    /// Continuous area (width × height, no pixel convention).
    #[inline]
    #[must_use = "returns the area without modifying the box"]
    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    /// Center point `(cx, cy)`.
    #[inline]
    #[must_use = "returns the center without modifying the box"]
    pub fn center(&self) -> (f64, f64) {
        (
            (self.ulx + self.lrx) / 2.0,
            (self.uly + self.lry) / 2.0,
        )
    }

    /// Origin + width/height form `(x, y, w, h)`.
    #[inline]
    #[must_use = "returns the converted form without modifying the box"]
    pub fn to_xywh(&self) -> (f64, f64, f64, f64) {
        (self.ulx, self.uly, self.width(), self.height())
    }

    /// 4-point corner form: upper-left, upper-right, lower-right, lower-left.
    #[inline]
    #[must_use = "returns the corner points without modifying the box"]
    pub fn corners(&self) -> [[f64; 2]; 4] {
        [
            [self.ulx, self.uly],
            [self.lrx, self.uly],
            [self.lrx, self.lry],
            [self.ulx, self.lry],
        ]
    }

    /// Convert a relative box to absolute coordinates for an image of the
    /// given size. Absolute boxes are returned unchanged.
    #[must_use = "returns the converted box without modifying the original"]
    pub fn to_absolute(&self, width: f64, height: f64) -> Self {
        if !self.relative {
            return *self;
        }
        Self {
            ulx: self.ulx * width,
            uly: self.uly * height,
            lrx: self.lrx * width,
            lry: self.lry * height,
            relative: false,
        }
    }

    /// Convert an absolute box to relative coordinates for an image of the
    /// given size. Relative boxes are returned unchanged.
    pub fn to_relative(&self, width: f64, height: f64) -> Result<Self> {
        if self.relative {
            return Ok(*self);
        }
        if width <= 0.0 || height <= 0.0 {
            return Err(PageflowError::geometry(format!(
                "cannot normalize against non-positive size {width}x{height}"
            )));
        }
        Self::new_relative(
            self.ulx / width,
            self.uly / height,
            self.lrx / width,
            self.lry / height,
        )
    }
}

/// Area of a box; kept as a free function to mirror the rest of the kernel.
#[inline]
#[must_use = "returns the area of the box"]
pub fn area(bbox: &BoundingBox) -> f64 {
    bbox.area()
}

/// Intersection of two boxes, or `None` when they do not overlap.
///
/// Degenerate results (zero width or height) count as no overlap. Both
/// boxes must be in the same coordinate mode (relative or absolute);
/// mixing modes is a caller bug.
#[must_use = "returns the intersection box if any"]
pub fn intersection_box(a: &BoundingBox, b: &BoundingBox) -> Option<BoundingBox> {
    debug_assert_eq!(
        a.relative, b.relative,
        "intersection_box requires matching coordinate modes"
    );
    let ulx = a.ulx.max(b.ulx);
    let uly = a.uly.max(b.uly);
    let lrx = a.lrx.min(b.lrx);
    let lry = a.lry.min(b.lry);
    BoundingBox::with_mode(ulx, uly, lrx, lry, a.relative).ok()
}

/// Intersection area of two boxes (0.0 when disjoint).
#[inline]
#[must_use = "returns the intersection area"]
pub fn intersection_area(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let w = (a.lrx.min(b.lrx) - a.ulx.max(b.ulx)).max(0.0);
    let h = (a.lry.min(b.lry) - a.uly.max(b.uly)).max(0.0);
    w * h
}

/// Intersection over union of two boxes.
///
/// Symmetric, `iou(a, a) == 1.0`, and 0.0 for disjoint or degenerate
/// inputs rather than failing.
#[must_use = "returns the IoU value"]
pub fn iou(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let inter = intersection_area(a, b);
    let union = a.area() + b.area() - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// Intersection area divided by the area of the first box.
///
/// The assignment metric used when a small element should count as matched
/// once most of *it* is covered, regardless of the container's size.
#[must_use = "returns the intersection-over-first ratio"]
pub fn intersection_over_first(a: &BoundingBox, b: &BoundingBox) -> f64 {
    let area_a = a.area();
    if area_a > 0.0 {
        intersection_area(a, b) / area_a
    } else {
        0.0
    }
}

/// Bounding box of a set of boxes, or `None` for an empty set.
///
/// All boxes must be in the same coordinate mode (relative or absolute);
/// mixing modes is a caller bug.
#[must_use = "returns the merged bounding box"]
pub fn merge_boxes(boxes: &[BoundingBox]) -> Option<BoundingBox> {
    let first = boxes.first()?;
    debug_assert!(
        boxes.iter().all(|b| b.relative == first.relative),
        "merge_boxes requires matching coordinate modes"
    );
    let mut ulx = first.ulx;
    let mut uly = first.uly;
    let mut lrx = first.lrx;
    let mut lry = first.lry;
    for b in &boxes[1..] {
        ulx = ulx.min(b.ulx);
        uly = uly.min(b.uly);
        lrx = lrx.max(b.lrx);
        lry = lry.max(b.lry);
    }
    BoundingBox::with_mode(ulx, uly, lrx, lry, first.relative).ok()
}

/// Clip a box to the given bounds, or `None` when nothing remains.
#[must_use = "returns the clipped box if any"]
pub fn clip(bbox: &BoundingBox, bounds: &BoundingBox) -> Option<BoundingBox> {
    intersection_box(bbox, bounds)
}

/// Remap a box from a crop's local frame to the parent/global frame.
///
/// `offset` is the crop's upper-left corner in parent coordinates. Exact
/// inverse of [`global_to_local`].
#[inline]
#[must_use = "returns the remapped box without modifying the original"]
pub fn local_to_global(bbox: &BoundingBox, offset_x: f64, offset_y: f64) -> BoundingBox {
    BoundingBox {
        ulx: bbox.ulx + offset_x,
        uly: bbox.uly + offset_y,
        lrx: bbox.lrx + offset_x,
        lry: bbox.lry + offset_y,
        relative: bbox.relative,
    }
}

/// Remap a box from the parent/global frame into a crop's local frame.
#[inline]
#[must_use = "returns the remapped box without modifying the original"]
pub fn global_to_local(bbox: &BoundingBox, offset_x: f64, offset_y: f64) -> BoundingBox {
    local_to_global(bbox, -offset_x, -offset_y)
}

/// Scale a box by independent horizontal and vertical factors.
pub fn rescale(bbox: &BoundingBox, sx: f64, sy: f64) -> Result<BoundingBox> {
    BoundingBox::with_mode(
        bbox.ulx * sx,
        bbox.uly * sy,
        bbox.lrx * sx,
        bbox.lry * sy,
        bbox.relative,
    )
}

/// One-dimensional IoU of two intervals; used for duplicate row/column
/// boundary detection where only one axis matters.
#[must_use = "returns the 1D IoU value"]
pub fn interval_iou(a: (f64, f64), b: (f64, f64)) -> f64 {
    let inter = (a.1.min(b.1) - a.0.max(b.0)).max(0.0);
    let union = (a.1 - a.0) + (b.1 - b.0) - inter;
    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
