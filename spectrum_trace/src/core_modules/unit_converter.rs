// THEORY:
// The `unit_converter` turns pixel measurements into physical units using the
// display settings (span, center, dB per line) and the grid scale.
//
// Conventions fixed here:
// - **Frequency**: `deviation = center_x - peak_x` pixels, and
//   `center_frequency = center - deviation * (span / grid_width) * frequency_scale`.
//   `center_x` is the horizontal centre of the analysed region, which is where
//   the display puts `center`. A peak right of it reads as a higher frequency.
// - **Amplitude**: the trace height is counted in pixels from the video's
//   baseline row up to the top of the current trace, inclusive of both rows,
//   then divided by `grid_height / (db_per_horizontal_line * 10)` pixels per dB.
//
// The grid scale itself comes from a `ScaleModel`, which picks where the
// effective grid height and width are taken from on each frame.

use crate::core_modules::grid_calibrator::GridCalibration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Display settings of the analyzer for one recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Frequency range covered by the full grid width.
    pub span: f64,
    /// Frequency at the horizontal midpoint of the display.
    pub center: f64,
    pub db_per_horizontal_line: f64,
    /// Multiplier applied to the frequency deviation (0.001 turns MHz into GHz).
    pub frequency_scale: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            span: 1.0,
            center: 1.0,
            db_per_horizontal_line: 10.0,
            frequency_scale: 0.001,
        }
    }
}

/// Everything measured on one accepted frame, still in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelMeasurement {
    pub frame_index: u64,
    pub peak_x: f64,
    /// Horizontal centre of the analysed region.
    pub center_x: f64,
    pub trace_top_y: i32,
    pub baseline_y: i32,
    /// Width of the analysed region (the cropped screen, or the whole frame).
    pub region_width: u32,
    /// Last grid row minus first grid row on this frame, if any grid was seen.
    pub grid_extent: Option<i32>,
}

impl PixelMeasurement {
    pub fn trace_pixel_height(&self) -> i32 {
        self.baseline_y - self.trace_top_y + 1
    }
}

/// Effective grid cell size used for one conversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridScale {
    pub pixel_height: f64,
    pub pixel_width: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum HeightSource {
    /// Grid extent on the current frame minus a fixed border offset. Falls back
    /// to the accumulated height when the result is not positive.
    GridExtent { offset_px: i32 },
    Accumulated,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidthSource {
    /// The analysed region's width. The display layout makes the grid span the
    /// whole region; nothing is measured.
    RegionWidth,
    Accumulated,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleModel {
    pub height: HeightSource,
    pub width: WidthSource,
}

impl Default for ScaleModel {
    fn default() -> Self {
        Self {
            height: HeightSource::GridExtent { offset_px: 252 },
            width: WidthSource::RegionWidth,
        }
    }
}

impl ScaleModel {
    pub fn resolve(
        &self,
        measurement: &PixelMeasurement,
        calibration: &GridCalibration,
    ) -> GridScale {
        let pixel_height = match self.height {
            HeightSource::GridExtent { offset_px } => measurement
                .grid_extent
                .map(|extent| extent - offset_px)
                .filter(|&height| height > 0)
                .map_or(calibration.pixel_height, f64::from),
            HeightSource::Accumulated => calibration.pixel_height,
        };
        let pixel_width = match self.width {
            WidthSource::RegionWidth => f64::from(measurement.region_width),
            WidthSource::Accumulated => calibration.pixel_width,
        };
        GridScale { pixel_height, pixel_width }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ConversionError {
    #[error("grid width must be positive, got {0}")]
    NonPositiveWidth(f64),
    #[error("grid height must be positive, got {0}")]
    NonPositiveHeight(f64),
    #[error("dB per horizontal line must be positive, got {0}")]
    NonPositiveDbPerLine(f64),
    #[error("conversion produced a non-finite value")]
    NonFinite,
}

/// A sample in physical units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Converted {
    pub center_frequency: f64,
    pub amplitude: f64,
}

pub fn center_frequency(
    peak_x: f64,
    center_x: f64,
    grid_pixel_width: f64,
    analysis: &AnalysisConfig,
) -> Result<f64, ConversionError> {
    if grid_pixel_width.is_nan() || grid_pixel_width <= 0.0 {
        return Err(ConversionError::NonPositiveWidth(grid_pixel_width));
    }
    let hz_per_pixel = analysis.span / grid_pixel_width;
    let deviation_px = center_x - peak_x;
    finite(analysis.center - deviation_px * hz_per_pixel * analysis.frequency_scale)
}

pub fn amplitude(
    trace_pixel_height: i32,
    grid_pixel_height: f64,
    analysis: &AnalysisConfig,
) -> Result<f64, ConversionError> {
    if grid_pixel_height.is_nan() || grid_pixel_height <= 0.0 {
        return Err(ConversionError::NonPositiveHeight(grid_pixel_height));
    }
    if analysis.db_per_horizontal_line.is_nan() || analysis.db_per_horizontal_line <= 0.0 {
        return Err(ConversionError::NonPositiveDbPerLine(analysis.db_per_horizontal_line));
    }
    let db_per_pixel = grid_pixel_height / (analysis.db_per_horizontal_line * 10.0);
    finite(f64::from(trace_pixel_height) / db_per_pixel)
}

pub fn convert(
    measurement: &PixelMeasurement,
    scale: GridScale,
    analysis: &AnalysisConfig,
) -> Result<Converted, ConversionError> {
    Ok(Converted {
        center_frequency: center_frequency(
            measurement.peak_x,
            measurement.center_x,
            scale.pixel_width,
            analysis,
        )?,
        amplitude: amplitude(measurement.trace_pixel_height(), scale.pixel_height, analysis)?,
    })
}

fn finite(value: f64) -> Result<f64, ConversionError> {
    if value.is_finite() { Ok(value) } else { Err(ConversionError::NonFinite) }
}
