// The per-frame building blocks. Each module is a stateless utility except
// `grid_calibrator`, whose `GridCalibration` accumulates across frames.

/// Value of a set pixel in every binary mask.
pub const FOREGROUND: u8 = 255;

pub mod color_segmenter;
pub mod contour;
pub mod curve_fit;
pub mod edges;
pub mod grid_calibrator;
pub mod morphology;
pub mod screen_locator;
pub mod trace_mask;
pub mod unit_converter;
