use anyhow::{Context, bail};
use clap::Parser;
use image::{GrayImage, RgbImage};
use opencv::{
    core::{self, Mat, Scalar},
    highgui, imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use spectrum_trace::{
    AnalysisError, BatchOptions, DisplayAction, DisplayImage, FrameDisplay, FrameSource,
    HeadlessDisplay, PipelineConfig, VideoOpener, run_batch,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Extracts carrier frequency and amplitude from spectrum analyzer screen recordings.
#[derive(Parser, Debug)]
#[command(name = "trace_runner", version)]
struct Args {
    /// Folder holding the recordings.
    folder: PathBuf,

    /// Where CSV files are written; defaults to the input folder.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// JSON file with pipeline settings. Missing keys keep their defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Show each processed frame in a window. Forces a single worker.
    #[arg(long)]
    display: bool,

    /// Maximum number of videos analysed at once.
    #[arg(short, long)]
    workers: Option<usize>,
}

/// Opens recordings through OpenCV's videoio backends.
struct OpencvOpener;

impl VideoOpener for OpencvOpener {
    type Source = OpencvSource;

    fn open(&self, path: &Path) -> spectrum_trace::Result<OpencvSource> {
        let unavailable = |reason: String| AnalysisError::VideoUnavailable {
            path: path.to_path_buf(),
            reason,
        };
        let name = path.to_str().ok_or_else(|| unavailable("path is not valid UTF-8".into()))?;
        let capture = VideoCapture::from_file(name, videoio::CAP_ANY)
            .map_err(|e| unavailable(e.to_string()))?;
        if !capture.is_opened().map_err(|e| unavailable(e.to_string()))? {
            return Err(unavailable("no backend could open the file".into()));
        }
        let fps = capture.get(videoio::CAP_PROP_FPS).unwrap_or(0.0);
        Ok(OpencvSource {
            capture,
            fps,
            bgr: Mat::default(),
        })
    }
}

struct OpencvSource {
    capture: VideoCapture,
    fps: f64,
    bgr: Mat,
}

impl FrameSource for OpencvSource {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn next_frame(&mut self) -> spectrum_trace::Result<Option<RgbImage>> {
        let decode = |e: opencv::Error| AnalysisError::Decode(e.to_string());
        if !self.capture.read(&mut self.bgr).map_err(decode)? || self.bgr.empty() {
            return Ok(None);
        }

        // OpenCV hands out BGR; the library works on RGB.
        let mut rgb = Mat::default();
        imgproc::cvt_color(&self.bgr, &mut rgb, imgproc::COLOR_BGR2RGB, 0).map_err(decode)?;
        let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
        let bytes = rgb.data_bytes().map_err(decode)?.to_vec();
        let mismatch = || format!("frame buffer does not match {width}x{height}");
        RgbImage::from_raw(width, height, bytes)
            .map(Some)
            .ok_or_else(|| AnalysisError::Decode(mismatch()))
    }
}

impl Drop for OpencvSource {
    fn drop(&mut self) {
        if let Err(e) = self.capture.release() {
            warn!(error = %e, "failed to release video capture");
        }
    }
}

/// One highgui window per video, titled with the file name.
struct HighguiDisplay {
    window: String,
    quit_key: char,
}

impl HighguiDisplay {
    fn new(video: &Path, quit_key: char) -> Self {
        let window = video
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "spectrum trace".to_string());
        Self { window, quit_key }
    }

    fn to_mat(image: DisplayImage<'_>) -> opencv::Result<Mat> {
        match image {
            DisplayImage::Trace(mask) => Self::gray_mat(mask),
            DisplayImage::Frame(frame) => {
                let mut rgb = Mat::new_rows_cols_with_default(
                    frame.height() as i32,
                    frame.width() as i32,
                    core::CV_8UC3,
                    Scalar::all(0.0),
                )?;
                rgb.data_bytes_mut()?.copy_from_slice(frame.as_raw());
                let mut bgr = Mat::default();
                imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;
                Ok(bgr)
            }
        }
    }

    fn gray_mat(mask: &GrayImage) -> opencv::Result<Mat> {
        let mut mat = Mat::new_rows_cols_with_default(
            mask.height() as i32,
            mask.width() as i32,
            core::CV_8UC1,
            Scalar::all(0.0),
        )?;
        mat.data_bytes_mut()?.copy_from_slice(mask.as_raw());
        Ok(mat)
    }

    fn try_show(
        &mut self,
        image: DisplayImage<'_>,
        delay_ms: u32,
    ) -> opencv::Result<DisplayAction> {
        let mat = Self::to_mat(image)?;
        highgui::imshow(&self.window, &mat)?;
        let key = highgui::wait_key(delay_ms.max(1) as i32)?;
        let pressed = (key >= 0).then(|| char::from((key & 0xFF) as u8));
        Ok(if pressed == Some(self.quit_key) {
            DisplayAction::Quit
        } else {
            DisplayAction::Continue
        })
    }
}

impl FrameDisplay for HighguiDisplay {
    fn show(&mut self, image: DisplayImage<'_>, delay_ms: u32) -> DisplayAction {
        match self.try_show(image, delay_ms) {
            Ok(action) => action,
            Err(e) => {
                warn!(window = %self.window, error = %e, "display failed; continuing without it");
                DisplayAction::Continue
            }
        }
    }
}

impl Drop for HighguiDisplay {
    fn drop(&mut self) {
        if let Err(e) = highgui::destroy_window(&self.window) {
            warn!(window = %self.window, error = %e, "failed to close display window");
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config: PipelineConfig =
        serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Logging & Argument Parsing ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
    let args = Args::parse();

    // --- 2. Configuration ---
    let config = load_config(args.config.as_deref())?;
    let options = BatchOptions {
        output_dir: args.output_dir.clone().unwrap_or_else(|| args.folder.clone()),
        workers: if args.display { Some(1) } else { args.workers },
    };

    // --- 3. Batch ---
    let show = args.display;
    let quit_key = config.quit_key;
    let make_display = move |video: &Path| -> Box<dyn FrameDisplay> {
        if show {
            Box::new(HighguiDisplay::new(video, quit_key))
        } else {
            Box::new(HeadlessDisplay)
        }
    };
    let opener = Arc::new(OpencvOpener);
    let report = run_batch(&args.folder, &config, opener, make_display, &options).await?;

    // --- 4. Summary ---
    for video in &report.videos {
        match (&video.failure, &video.output) {
            (Some(failure), _) => warn!(video = %video.video.display(), %failure, "video failed"),
            (None, Some(output)) => info!(
                video = %video.video.display(),
                rows = video.rows.len(),
                units = ?video.units,
                output = %output.display(),
                "video done"
            ),
            (None, None) => warn!(video = %video.video.display(), "no output written"),
        }
    }
    if !report.all_succeeded() {
        bail!(
            "{} of {} videos failed",
            report.failed().count() + report.crashed.len(),
            report.videos.len() + report.crashed.len()
        );
    }
    Ok(())
}
