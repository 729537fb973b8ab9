// THEORY:
// The `pipeline` module is the per-frame API of the library. `TracePipeline`
// owns the little state one video needs (the grid calibration and the baseline
// row of the trace) and turns each frame into a tagged `FrameReport`: either a
// pixel measurement or the reason the frame was skipped.
//
// Frames must be fed in order. Grid calibration on frame N depends on frames
// 0..N, and the settledness gate compares against the baseline captured from
// the first frame that showed a trace.

use crate::config::PipelineConfig;
use crate::core_modules::curve_fit::{FitError, fit_parabola};
use crate::core_modules::grid_calibrator::{GridCalibration, GridObservation, detect_grid};
use crate::core_modules::screen_locator::{crop_to, locate_screen};
use crate::core_modules::trace_mask::build_trace_mask;
use crate::core_modules::unit_converter::{ConversionError, HeightSource};
use image::RgbImage;
use std::borrow::Cow;
use thiserror::Error;
use tracing::debug;

// Re-export key data structures for the public API.
pub use crate::core_modules::trace_mask::{TraceGeometry, TraceMask};
pub use crate::core_modules::unit_converter::PixelMeasurement;

/// Why a frame produced no sample.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("screen not found")]
    NoScreen,
    #[error("no trace")]
    NoTrace,
    #[error("trace not settled (leftmost row {leftmost_y}, baseline {baseline_y})")]
    Unsettled { leftmost_y: i32, baseline_y: i32 },
    #[error(transparent)]
    Fit(#[from] FitError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameReport {
    Accepted(PixelMeasurement),
    Rejected(Rejection),
}

/// Everything the pipeline learned from one frame.
#[derive(Debug, Clone)]
pub struct FrameAnalysis {
    pub frame_index: u64,
    pub report: FrameReport,
    /// The cleaned trace, when one was found (also for rejected frames).
    pub trace: Option<TraceMask>,
    pub grid: GridObservation,
    /// Grid cells folded into the calibration on this frame.
    pub cells_absorbed: usize,
}

/// True when the leftmost row has drifted from the baseline by at most
/// `tolerance * baseline_y` pixels.
pub fn is_settled(leftmost_y: i32, baseline_y: i32, tolerance: f64) -> bool {
    f64::from((leftmost_y - baseline_y).abs()) <= tolerance * f64::from(baseline_y)
}

/// Per-video frame processor.
pub struct TracePipeline {
    config: PipelineConfig,
    calibration: GridCalibration,
    baseline_y: Option<i32>,
}

impl TracePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let calibration = GridCalibration::new(config.grid.sample_cap);
        Self::with_calibration(config, calibration)
    }

    /// Starts from an existing calibration, e.g. a seeded one.
    pub fn with_calibration(config: PipelineConfig, calibration: GridCalibration) -> Self {
        Self {
            config,
            calibration,
            baseline_y: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn calibration(&self) -> &GridCalibration {
        &self.calibration
    }

    pub fn baseline_y(&self) -> Option<i32> {
        self.baseline_y
    }

    pub fn process_frame(&mut self, frame_index: u64, frame: &RgbImage) -> FrameAnalysis {
        let mut analysis = FrameAnalysis {
            frame_index,
            report: FrameReport::Rejected(Rejection::NoTrace),
            trace: None,
            grid: GridObservation::default(),
            cells_absorbed: 0,
        };

        // Stage 1: Screen isolation
        let region = match &self.config.screen_range {
            Some(range) => match locate_screen(frame, range) {
                Some(screen) => Cow::Owned(crop_to(frame, screen)),
                None => {
                    analysis.report = FrameReport::Rejected(Rejection::NoScreen);
                    return analysis;
                }
            },
            None => Cow::Borrowed(frame),
        };

        // Stage 2: Grid observation and calibration warm-up
        let wants_extent = matches!(self.config.scale.height, HeightSource::GridExtent { .. });
        if wants_extent || !self.calibration.is_frozen() {
            analysis.grid = detect_grid(&region, &self.config.grid_range, &self.config.grid);
            analysis.cells_absorbed = self.calibration.absorb(&analysis.grid.cells);
            if analysis.cells_absorbed > 0 && self.calibration.is_frozen() {
                debug!(
                    frame_index,
                    pixel_height = self.calibration.pixel_height,
                    pixel_width = self.calibration.pixel_width,
                    "grid calibration frozen"
                );
            }
        }

        // Stage 3: Trace isolation
        let trace = build_trace_mask(&region, &self.config.wave_range, &self.config.morphology);
        let Some(trace) = trace else {
            return analysis;
        };
        let geometry = trace.geometry;
        let report = self.measure(frame_index, &trace, region.width(), &analysis.grid);
        analysis.trace = Some(trace);

        // Stage 4: Settledness gate and peak fit
        analysis.report = match report {
            Ok(measurement) => FrameReport::Accepted(measurement),
            Err(rejection) => FrameReport::Rejected(rejection),
        };
        if let FrameReport::Rejected(rejection) = &analysis.report {
            let leftmost_y = geometry.leftmost_point.y;
            debug!(frame_index, leftmost_y, %rejection, "frame skipped");
        }
        analysis
    }

    fn measure(
        &mut self,
        frame_index: u64,
        trace: &TraceMask,
        region_width: u32,
        grid: &GridObservation,
    ) -> Result<PixelMeasurement, Rejection> {
        let leftmost_y = trace.geometry.leftmost_point.y;
        let baseline_y = *self.baseline_y.get_or_insert_with(|| {
            debug!(frame_index, baseline_y = leftmost_y, "trace baseline established");
            leftmost_y
        });

        if !is_settled(leftmost_y, baseline_y, self.config.settle_tolerance) {
            return Err(Rejection::Unsettled { leftmost_y, baseline_y });
        }

        let parabola = fit_parabola(&trace.pixels, self.config.min_curvature)?;
        let trace_top_y = trace.top_row().ok_or(Rejection::NoTrace)?;

        Ok(PixelMeasurement {
            frame_index,
            peak_x: parabola.vertex_x(),
            center_x: f64::from(region_width) / 2.0,
            trace_top_y,
            baseline_y,
            region_width,
            grid_extent: grid.extent.map(|extent| extent.height()),
        })
    }
}
