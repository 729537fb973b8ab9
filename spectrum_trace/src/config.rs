// THEORY:
// `PipelineConfig` is the single read-only snapshot of every tunable. It is
// built once (defaults, or deserialized from JSON by the runner), validated,
// and then passed by reference into each stage. Nothing in the library reads
// configuration from anywhere else.

use crate::core_modules::color_segmenter::{ColorRange, Hsv};
use crate::core_modules::grid_calibrator::GridDetection;
use crate::core_modules::trace_mask::MorphologyConfig;
use crate::core_modules::unit_converter::ScaleModel;
use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};

pub use crate::core_modules::unit_converter::AnalysisConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// When set, every frame is cropped to the largest region of this color.
    pub screen_range: Option<ColorRange>,
    pub wave_range: ColorRange,
    pub grid_range: ColorRange,
    pub morphology: MorphologyConfig,
    pub grid: GridDetection,
    pub scale: ScaleModel,
    /// Largest accepted drift of the trace's leftmost row, as a fraction of the
    /// baseline row.
    pub settle_tolerance: f64,
    /// Smallest `|a|` of a usable parabola fit.
    pub min_curvature: f64,
    /// Key that stops the current video in the live display.
    pub quit_key: char,
    /// File extensions (without the dot) treated as videos.
    pub video_extensions: Vec<String>,
    pub analysis: AnalysisConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            screen_range: Some(ColorRange::new(Hsv::new(33, 45, 45), Hsv::new(92, 260, 260))),
            wave_range: ColorRange::new(Hsv::new(78, 145, 115), Hsv::new(102, 260, 260)),
            grid_range: ColorRange::new(Hsv::new(0, 0, 150), Hsv::new(180, 60, 255)),
            morphology: MorphologyConfig::default(),
            grid: GridDetection::default(),
            scale: ScaleModel::default(),
            settle_tolerance: 0.10,
            min_curvature: 1e-9,
            quit_key: 'q',
            video_extensions: vec!["mp4".to_string()],
            analysis: AnalysisConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Rejects values no frame could be analysed with. Empty color ranges are
    /// allowed; they simply never match.
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(AnalysisError::InvalidConfig(message));

        if self.morphology.kernel_size == 0 {
            return invalid("morphology.kernel_size must be at least 1".into());
        }
        if self.grid.opening_kernel == 0 {
            return invalid("grid.opening_kernel must be at least 1".into());
        }
        if self.grid.sample_cap == 0 {
            return invalid("grid.sample_cap must be at least 1".into());
        }
        if self.grid.height_band.min >= self.grid.height_band.max {
            return invalid(format!(
                "grid.height_band ({}, {}) is empty",
                self.grid.height_band.min, self.grid.height_band.max
            ));
        }
        if !(self.grid.approx_fraction.is_finite() && self.grid.approx_fraction > 0.0) {
            let fraction = self.grid.approx_fraction;
            return invalid(format!("grid.approx_fraction must be positive, got {fraction}"));
        }
        if !(self.settle_tolerance.is_finite() && self.settle_tolerance >= 0.0) {
            let tolerance = self.settle_tolerance;
            return invalid(format!("settle_tolerance must be non-negative, got {tolerance}"));
        }
        if !(self.min_curvature.is_finite() && self.min_curvature >= 0.0) {
            let curvature = self.min_curvature;
            return invalid(format!("min_curvature must be non-negative, got {curvature}"));
        }
        let analysis = &self.analysis;
        if !(analysis.db_per_horizontal_line.is_finite() && analysis.db_per_horizontal_line > 0.0) {
            return invalid(format!(
                "analysis.db_per_horizontal_line must be positive, got {}",
                analysis.db_per_horizontal_line
            ));
        }
        let values = [analysis.span, analysis.center, analysis.frequency_scale];
        if !values.iter().all(|v| v.is_finite()) {
            return invalid("analysis values must be finite".into());
        }
        if self.video_extensions.iter().all(|ext| ext.trim_start_matches('.').is_empty()) {
            return invalid("video_extensions must name at least one extension".into());
        }
        Ok(())
    }
}
