// THEORY:
// This file is the main entry point for the `spectrum_trace` library crate.
// It turns screen recordings of a spectrum analyzer into per-frame
// measurements of the displayed carrier: center frequency and amplitude.
//
// The public surface is layered:
// - `pipeline::TracePipeline` analyses one frame at a time for one video.
// - `video_analysis::process_video` drives a whole video from a `FrameSource`
//   to a CSV file.
// - `parallel_pipeline::run_batch` fans a folder of videos out over a bounded
//   pool of blocking tasks.
//
// The image-processing stages live in `core_modules`, one stateless module per
// stage. Video decoding and on-screen display are left to the embedding
// application through the `VideoOpener`, `FrameSource` and `FrameDisplay`
// traits.

pub mod aggregator;
pub mod config;
pub mod core_modules;
pub mod csv_output;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;
pub mod video_analysis;

pub use config::{AnalysisConfig, PipelineConfig};
pub use error::{AnalysisError, Result};
pub use parallel_pipeline::{BatchOptions, BatchReport, list_videos, run_batch};
pub use pipeline::{FrameReport, Rejection, TracePipeline};
pub use video_analysis::{
    DisplayAction, DisplayImage, FrameDisplay, FrameSource, HeadlessDisplay, VideoOpener,
    VideoReport, process_video,
};
