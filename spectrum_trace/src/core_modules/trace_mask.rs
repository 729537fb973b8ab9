// THEORY:
// The `trace_mask` builder reduces a frame to one clean blob: the trace.
//
// 1.  Segment the wave color.
// 2.  Keep only the largest contour; stray reflections and text in the same hue
//     are smaller and are dropped here.
// 3.  Fill that contour into a blank mask, then dilate and erode so ragged
//     flanks and pinholes left by the threshold close up.
//
// The geometry (leftmost point, horizontal extent) is read from the raw
// contour before any morphology, because dilation would shift the leftmost
// point and with it the settledness check.

use crate::core_modules::color_segmenter::{ColorRange, segment};
use crate::core_modules::contour::{
    Contour, ContourMode, Point, fill_contour, find_contours, foreground_points, largest_contour,
};
use crate::core_modules::morphology::morphology;
use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

/// Closing applied to the filled trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MorphologyConfig {
    pub kernel_size: u32,
    pub dilate_iterations: u32,
    pub erode_iterations: u32,
}

impl Default for MorphologyConfig {
    fn default() -> Self {
        Self {
            kernel_size: 5,
            dilate_iterations: 1,
            erode_iterations: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceGeometry {
    pub leftmost_point: Point,
    pub rightmost_x: i32,
    /// Midpoint of `[leftmost_point.x, rightmost_x]`.
    pub center_x: f64,
    pub width: i32,
}

impl TraceGeometry {
    pub fn from_contour(contour: &Contour) -> Option<Self> {
        let leftmost_point = contour.leftmost()?;
        let rightmost_x = contour.rightmost_x()?;
        Some(Self {
            leftmost_point,
            rightmost_x,
            center_x: f64::from(leftmost_point.x + rightmost_x) / 2.0,
            width: rightmost_x - leftmost_point.x,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TraceMask {
    pub mask: GrayImage,
    /// Set pixels of `mask` in raster order.
    pub pixels: Vec<Point>,
    pub geometry: TraceGeometry,
}

impl TraceMask {
    /// Smallest row of the cleaned trace.
    pub fn top_row(&self) -> Option<i32> {
        self.pixels.first().map(|p| p.y)
    }
}

/// Returns `None` when the frame shows no trace.
pub fn build_trace_mask(
    frame: &RgbImage,
    range: &ColorRange,
    closing: &MorphologyConfig,
) -> Option<TraceMask> {
    let contours = find_contours(&segment(frame, range), ContourMode::External);
    let trace = largest_contour(&contours)?;
    let geometry = TraceGeometry::from_contour(trace)?;

    let filled = fill_contour(frame.width(), frame.height(), trace);
    let closed = morphology::erode(
        &morphology::dilate(&filled, closing.kernel_size, closing.dilate_iterations),
        closing.kernel_size,
        closing.erode_iterations,
    );
    let pixels = foreground_points(&closed);
    if pixels.is_empty() {
        return None;
    }

    Some(TraceMask {
        mask: closed,
        pixels,
        geometry,
    })
}
