// THEORY:
// The aggregator collects the accepted measurements of one video and turns them
// into samples only once the video is over. Conversion has to wait: until the
// stream ends it is unknown whether the grid calibration will ever complete,
// and that decides whether the video's samples are reported in physical units
// or flagged as raw pixels.

use crate::core_modules::grid_calibrator::GridCalibration;
use crate::core_modules::unit_converter::{AnalysisConfig, PixelMeasurement, ScaleModel, convert};
use crate::pipeline::Rejection;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Units {
    /// Frequency and dB, converted with a complete grid calibration.
    Calibrated,
    /// Peak column and trace height in pixels; the grid never calibrated.
    RawPixels,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CalibrationStatus {
    Complete { pixel_height: f64, pixel_width: f64, samples: usize },
    Incomplete { samples: usize, cap: usize },
}

impl CalibrationStatus {
    pub fn of(calibration: &GridCalibration) -> Self {
        if calibration.is_frozen() {
            Self::Complete {
                pixel_height: calibration.pixel_height,
                pixel_width: calibration.pixel_width,
                samples: calibration.sample_count,
            }
        } else {
            Self::Incomplete {
                samples: calibration.sample_count,
                cap: calibration.cap(),
            }
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveSample {
    pub frame_index: u64,
    pub timestamp_seconds: f64,
    pub center_frequency: f64,
    pub amplitude: f64,
    pub units: Units,
}

/// One output row: a sample plus the amplitude envelope seen so far.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleRow {
    pub timestamp_seconds: f64,
    pub center_frequency: f64,
    pub minimum_amplitude: f64,
    pub maximum_amplitude: f64,
    pub center_amplitude: f64,
}

/// Running minimum and maximum amplitude over `samples`, in order.
pub fn summarize(samples: &[WaveSample]) -> Vec<SampleRow> {
    let mut envelope: Option<(f64, f64)> = None;
    samples
        .iter()
        .map(|sample| {
            let (min, max) = match envelope {
                Some((min, max)) => (min.min(sample.amplitude), max.max(sample.amplitude)),
                None => (sample.amplitude, sample.amplitude),
            };
            envelope = Some((min, max));
            SampleRow {
                timestamp_seconds: sample.timestamp_seconds,
                center_frequency: sample.center_frequency,
                minimum_amplitude: min,
                maximum_amplitude: max,
                center_amplitude: (min + max) / 2.0,
            }
        })
        .collect()
}

/// Frame rate used for timestamps; unusable rates fall back to 1 fps.
pub fn effective_fps(fps: f64) -> f64 {
    if fps.is_finite() && fps > 0.0 {
        fps
    } else {
        warn!(fps, "unusable frame rate, timestamps will count frames");
        1.0
    }
}

/// The finished output of one video.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedSamples {
    pub samples: Vec<WaveSample>,
    pub rows: Vec<SampleRow>,
    pub status: CalibrationStatus,
    /// Measurements that failed unit conversion.
    pub dropped: usize,
}

impl AggregatedSamples {
    pub fn units(&self) -> Units {
        if self.status.is_complete() { Units::Calibrated } else { Units::RawPixels }
    }
}

#[derive(Debug, Clone)]
pub struct SampleAggregator {
    fps: f64,
    measurements: Vec<PixelMeasurement>,
}

impl SampleAggregator {
    pub fn new(fps: f64) -> Self {
        Self {
            fps: effective_fps(fps),
            measurements: Vec::new(),
        }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn push(&mut self, measurement: PixelMeasurement) {
        self.measurements.push(measurement);
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn finish(
        self,
        calibration: &GridCalibration,
        scale: &ScaleModel,
        analysis: &AnalysisConfig,
    ) -> AggregatedSamples {
        let status = CalibrationStatus::of(calibration);
        let mut dropped = 0;
        let mut samples = Vec::with_capacity(self.measurements.len());

        for measurement in &self.measurements {
            let timestamp_seconds = measurement.frame_index as f64 / self.fps;
            let sample = if status.is_complete() {
                match convert(measurement, scale.resolve(measurement, calibration), analysis) {
                    Ok(converted) => WaveSample {
                        frame_index: measurement.frame_index,
                        timestamp_seconds,
                        center_frequency: converted.center_frequency,
                        amplitude: converted.amplitude,
                        units: Units::Calibrated,
                    },
                    Err(error) => {
                        let rejection = Rejection::from(error);
                        debug!(frame_index = measurement.frame_index, %rejection, "sample dropped");
                        dropped += 1;
                        continue;
                    }
                }
            } else {
                WaveSample {
                    frame_index: measurement.frame_index,
                    timestamp_seconds,
                    center_frequency: measurement.peak_x,
                    amplitude: f64::from(measurement.trace_pixel_height()),
                    units: Units::RawPixels,
                }
            };
            samples.push(sample);
        }

        let rows = summarize(&samples);
        AggregatedSamples {
            samples,
            rows,
            status,
            dropped,
        }
    }
}
