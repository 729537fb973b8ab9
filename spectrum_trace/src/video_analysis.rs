// THEORY:
// `video_analysis` drives one video from open to CSV. It is a three-state loop:
//
// - `Init`: read the first frame. A video whose first frame cannot be read is
//   finished immediately with the cause recorded.
// - `Streaming`: feed every frame through the `TracePipeline` in order, buffer
//   accepted measurements, show the frame, and stop early if the display asks
//   to quit.
// - `Done`: the frame source is dropped (releasing the decoder), measurements
//   are converted with the final calibration, and the CSV is written.
//
// Every path through the loop ends in `Done`, so a CSV is always written: a
// video that cannot be opened gets a header-only file and a reported failure.
// Decoding and windowing are collaborators behind the `FrameSource`,
// `VideoOpener` and `FrameDisplay` traits.

use crate::aggregator::{AggregatedSamples, CalibrationStatus, SampleAggregator, SampleRow, Units};
use crate::csv_output::write_csv_file;
use crate::error::{AnalysisError, Result};
use crate::pipeline::{FrameReport, TracePipeline};
use image::{GrayImage, RgbImage};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A sequential source of decoded frames.
pub trait FrameSource {
    /// Nominal frame rate of the stream.
    fn fps(&self) -> f64;

    /// The next frame, `Ok(None)` at end of stream.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

/// Opens videos by path. Shared by all workers of a batch.
pub trait VideoOpener: Send + Sync {
    type Source: FrameSource;

    fn open(&self, path: &Path) -> Result<Self::Source>;
}

/// What the live display is asked to draw.
#[derive(Debug, Clone, Copy)]
pub enum DisplayImage<'a> {
    /// The cleaned trace mask.
    Trace(&'a GrayImage),
    /// The raw frame, when no trace was found.
    Frame(&'a RgbImage),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayAction {
    Continue,
    Quit,
}

pub trait FrameDisplay {
    /// Shows one image for about `delay_ms` and reports whether to go on.
    fn show(&mut self, image: DisplayImage<'_>, delay_ms: u32) -> DisplayAction;
}

/// Draws nothing and never quits.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessDisplay;

impl FrameDisplay for HeadlessDisplay {
    fn show(&mut self, _image: DisplayImage<'_>, _delay_ms: u32) -> DisplayAction {
        DisplayAction::Continue
    }
}

/// Why the frame loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    EndOfStream,
    /// The display asked to quit after showing this frame.
    Cancelled { at_frame: u64 },
    /// Decoding failed mid-stream; frames before it are kept.
    DecodeFailed { at_frame: u64, reason: String },
    FirstFrameUnreadable,
    OpenFailed,
}

#[derive(Debug)]
pub struct VideoReport {
    pub video: PathBuf,
    /// The CSV written for this video, if writing succeeded.
    pub output: Option<PathBuf>,
    pub completion: Completion,
    pub frames_read: u64,
    pub accepted: usize,
    pub rejected: usize,
    /// Accepted frames whose unit conversion failed.
    pub dropped: usize,
    pub calibration: CalibrationStatus,
    pub units: Units,
    pub rows: Vec<SampleRow>,
    /// The error that made this video fail, if any.
    pub failure: Option<AnalysisError>,
}

impl VideoReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

enum LoopState {
    Init,
    Streaming { next_index: u64 },
    Done(Completion),
}

struct LoopOutcome {
    completion: Completion,
    frames_read: u64,
    accepted: usize,
    rejected: usize,
    aggregator: SampleAggregator,
}

/// Output path for a video: `<stem>.csv`, or `<stem>.uncalibrated.csv` when
/// the file holds raw pixel samples.
pub fn output_path(output_dir: &Path, video: &Path, units: Units, has_samples: bool) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    match (units, has_samples) {
        (Units::RawPixels, true) => output_dir.join(format!("{stem}.uncalibrated.csv")),
        _ => output_dir.join(format!("{stem}.csv")),
    }
}

/// Runs one video end to end and writes its CSV into `output_dir`.
pub fn process_video<O: VideoOpener + ?Sized>(
    opener: &O,
    video: &Path,
    mut pipeline: TracePipeline,
    display: &mut dyn FrameDisplay,
    output_dir: &Path,
) -> VideoReport {
    info!(video = %video.display(), "analysing video");

    let (outcome, mut failure) = match opener.open(video) {
        Ok(source) => {
            let outcome = run_frames(source, &mut pipeline, display);
            let failure = (outcome.completion == Completion::FirstFrameUnreadable)
                .then(|| AnalysisError::FirstFrameUnreadable { path: video.to_path_buf() });
            (outcome, failure)
        }
        Err(error) => {
            warn!(video = %video.display(), %error, "video could not be opened");
            let outcome = LoopOutcome {
                completion: Completion::OpenFailed,
                frames_read: 0,
                accepted: 0,
                rejected: 0,
                aggregator: SampleAggregator::new(1.0),
            };
            (outcome, Some(error))
        }
    };
    let LoopOutcome {
        completion,
        frames_read,
        accepted,
        rejected,
        aggregator,
    } = outcome;

    let config = pipeline.config();
    let aggregated = aggregator.finish(pipeline.calibration(), &config.scale, &config.analysis);
    let units = aggregated.units();
    let has_samples = !aggregated.samples.is_empty();
    let AggregatedSamples {
        rows, status, dropped, ..
    } = aggregated;

    if units == Units::RawPixels && has_samples {
        warn!(
            video = %video.display(),
            ?status,
            "grid calibration incomplete, writing raw pixel values"
        );
    }

    let path = output_path(output_dir, video, units, has_samples);
    let output = match write_csv_file(&path, &rows) {
        Ok(()) => Some(path),
        Err(error) => {
            warn!(%error, "could not write results");
            failure.get_or_insert(error);
            None
        }
    };

    info!(
        video = %video.display(),
        frames_read,
        accepted,
        rejected,
        dropped,
        ?completion,
        "video finished"
    );

    VideoReport {
        video: video.to_path_buf(),
        output,
        completion,
        frames_read,
        accepted,
        rejected,
        dropped,
        calibration: status,
        units,
        rows,
        failure,
    }
}

/// The `Init -> Streaming -> Done` loop. Consumes `source`, so the decoder is
/// released when this returns, whatever the reason for stopping.
fn run_frames<S: FrameSource>(
    mut source: S,
    pipeline: &mut TracePipeline,
    display: &mut dyn FrameDisplay,
) -> LoopOutcome {
    let mut aggregator = SampleAggregator::new(source.fps());
    let delay_ms = (1000.0 / aggregator.fps()).round().max(1.0) as u32;
    let mut frames_read = 0;
    let mut accepted = 0;
    let mut rejected = 0;

    let mut step = |frame_index: u64, frame: RgbImage| -> LoopState {
        frames_read += 1;
        let analysis = pipeline.process_frame(frame_index, &frame);
        match analysis.report {
            FrameReport::Accepted(measurement) => {
                accepted += 1;
                aggregator.push(measurement);
            }
            FrameReport::Rejected(_) => rejected += 1,
        }

        let image = match &analysis.trace {
            Some(trace) => DisplayImage::Trace(&trace.mask),
            None => DisplayImage::Frame(&frame),
        };
        match display.show(image, delay_ms) {
            DisplayAction::Continue => LoopState::Streaming { next_index: frame_index + 1 },
            DisplayAction::Quit => {
                info!(frame_index, "quit requested");
                LoopState::Done(Completion::Cancelled { at_frame: frame_index })
            }
        }
    };

    let mut state = LoopState::Init;
    let completion = loop {
        state = match state {
            LoopState::Init => match source.next_frame() {
                Ok(Some(frame)) => step(0, frame),
                Ok(None) => LoopState::Done(Completion::FirstFrameUnreadable),
                Err(error) => {
                    warn!(%error, "first frame unreadable");
                    LoopState::Done(Completion::FirstFrameUnreadable)
                }
            },
            LoopState::Streaming { next_index } => match source.next_frame() {
                Ok(Some(frame)) => step(next_index, frame),
                Ok(None) => LoopState::Done(Completion::EndOfStream),
                Err(error) => {
                    warn!(frame_index = next_index, %error, "decoding stopped early");
                    LoopState::Done(Completion::DecodeFailed {
                        at_frame: next_index,
                        reason: error.to_string(),
                    })
                }
            },
            LoopState::Done(completion) => break completion,
        };
    };
    drop(source);
    debug!(frames_read, "frame source released");

    LoopOutcome {
        completion,
        frames_read,
        accepted,
        rejected,
        aggregator,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct Frames(VecDeque<Result<Option<RgbImage>>>);

    impl FrameSource for Frames {
        fn fps(&self) -> f64 {
            10.0
        }

        fn next_frame(&mut self) -> Result<Option<RgbImage>> {
            self.0.pop_front().unwrap_or(Ok(None))
        }
    }

    struct QuitAfter(usize);

    impl FrameDisplay for QuitAfter {
        fn show(&mut self, _image: DisplayImage<'_>, delay_ms: u32) -> DisplayAction {
            assert_eq!(delay_ms, 100);
            self.0 = self.0.saturating_sub(1);
            if self.0 == 0 { DisplayAction::Quit } else { DisplayAction::Continue }
        }
    }

    fn blank_frames(count: usize) -> Frames {
        Frames((0..count).map(|_| Ok(Some(RgbImage::new(32, 24)))).collect())
    }

    fn headless_pipeline() -> TracePipeline {
        TracePipeline::new(crate::config::PipelineConfig {
            screen_range: None,
            ..Default::default()
        })
    }

    #[test]
    fn test_stream_runs_to_end() {
        let outcome = run_frames(blank_frames(4), &mut headless_pipeline(), &mut HeadlessDisplay);
        assert_eq!(outcome.completion, Completion::EndOfStream);
        assert_eq!(outcome.frames_read, 4);
        assert_eq!(outcome.rejected, 4);
        assert!(outcome.aggregator.is_empty());
    }

    #[test]
    fn test_quit_stops_loop() {
        let outcome = run_frames(blank_frames(10), &mut headless_pipeline(), &mut QuitAfter(3));
        assert_eq!(outcome.completion, Completion::Cancelled { at_frame: 2 });
        assert_eq!(outcome.frames_read, 3);
    }

    #[test]
    fn test_empty_stream_has_no_first_frame() {
        let outcome = run_frames(blank_frames(0), &mut headless_pipeline(), &mut HeadlessDisplay);
        assert_eq!(outcome.completion, Completion::FirstFrameUnreadable);
        assert_eq!(outcome.frames_read, 0);
    }

    #[test]
    fn test_decode_error_mid_stream_keeps_earlier_frames() {
        let mut frames = blank_frames(2);
        frames.0.push_back(Err(AnalysisError::Decode("corrupt packet".into())));
        frames.0.push_back(Ok(Some(RgbImage::new(32, 24))));

        let outcome = run_frames(frames, &mut headless_pipeline(), &mut HeadlessDisplay);
        assert_eq!(
            outcome.completion,
            Completion::DecodeFailed {
                at_frame: 2,
                reason: "frame decode failed: corrupt packet".into()
            }
        );
        assert_eq!(outcome.frames_read, 2);
    }

    #[test]
    fn test_output_path_marks_raw_pixels() {
        let dir = Path::new("/out");
        let video = Path::new("/videos/run_07.mp4");
        assert_eq!(output_path(dir, video, Units::Calibrated, true), dir.join("run_07.csv"));
        assert_eq!(
            output_path(dir, video, Units::RawPixels, true),
            dir.join("run_07.uncalibrated.csv")
        );
        assert_eq!(output_path(dir, video, Units::RawPixels, false), dir.join("run_07.csv"));
    }
}
