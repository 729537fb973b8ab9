// THEORY:
// Videos are independent, so a batch is a plain fan-out: one blocking task per
// video, bounded by a semaphore sized to `min(cpu cores, video count)`. Each
// task owns its own frame source, pipeline, display and output file; nothing is
// shared between tasks except the read-only configuration and the opener.
//
// A failing video never takes its siblings down. Its failure is recorded in
// its `VideoReport`, and a task that panics is recorded as crashed.

use crate::config::PipelineConfig;
use crate::error::{AnalysisError, Result};
use crate::pipeline::TracePipeline;
use crate::video_analysis::{FrameDisplay, VideoOpener, VideoReport, process_video};
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub output_dir: PathBuf,
    /// Upper bound on concurrent videos; defaults to the number of CPU cores.
    pub workers: Option<usize>,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// One report per video that ran to completion, in folder order.
    pub videos: Vec<VideoReport>,
    /// Videos whose task panicked or was cancelled.
    pub crashed: Vec<(PathBuf, AnalysisError)>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &VideoReport> {
        self.videos.iter().filter(|report| report.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &VideoReport> {
        self.videos.iter().filter(|report| !report.is_success())
    }

    pub fn all_succeeded(&self) -> bool {
        self.crashed.is_empty() && self.videos.iter().all(VideoReport::is_success)
    }
}

/// Files directly inside `folder` whose extension matches one of
/// `extensions` (case-insensitive, leading dot optional), sorted by path.
pub fn list_videos(folder: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let unreadable = |source| AnalysisError::FolderUnreadable {
        path: folder.to_path_buf(),
        source,
    };
    let wanted: Vec<String> = extensions
        .iter()
        .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect();

    let mut videos = Vec::new();
    for entry in std::fs::read_dir(folder).map_err(unreadable)? {
        let path = entry.map_err(unreadable)?.path();
        let matches = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|ext| wanted.contains(&ext));
        if matches && path.is_file() {
            videos.push(path);
        }
    }
    videos.sort();

    if videos.is_empty() {
        return Err(AnalysisError::NoVideos {
            path: folder.to_path_buf(),
            extensions: extensions.to_vec(),
        });
    }
    Ok(videos)
}

/// Analyses every video in `folder` concurrently and writes one CSV per video
/// into `options.output_dir`.
pub async fn run_batch<O, D>(
    folder: &Path,
    config: &PipelineConfig,
    opener: Arc<O>,
    make_display: D,
    options: &BatchOptions,
) -> Result<BatchReport>
where
    O: VideoOpener + 'static,
    D: Fn(&Path) -> Box<dyn FrameDisplay> + Send + Sync + 'static,
{
    config.validate()?;
    let videos = list_videos(folder, &config.video_extensions)?;
    std::fs::create_dir_all(&options.output_dir).map_err(|source| AnalysisError::OutputUnavailable {
        path: options.output_dir.clone(),
        source,
    })?;

    let workers = options.workers.unwrap_or_else(num_cpus::get).clamp(1, videos.len());
    info!(videos = videos.len(), workers, "starting batch");

    let semaphore = Arc::new(Semaphore::new(workers));
    let make_display = Arc::new(make_display);

    let tasks = videos.iter().cloned().map(|video| {
        let semaphore = Arc::clone(&semaphore);
        let opener = Arc::clone(&opener);
        let make_display = Arc::clone(&make_display);
        let config = config.clone();
        let output_dir = options.output_dir.clone();

        async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| AnalysisError::Worker(e.to_string()))?;
            tokio::task::spawn_blocking(move || {
                let mut display = (*make_display)(&video);
                process_video(
                    opener.as_ref(),
                    &video,
                    TracePipeline::new(config),
                    display.as_mut(),
                    &output_dir,
                )
            })
            .await
            .map_err(|e| AnalysisError::Worker(e.to_string()))
        }
    });

    let outcomes = join_all(tasks).await;
    let mut report = BatchReport::default();
    for (video, outcome) in videos.into_iter().zip(outcomes) {
        match outcome {
            Ok(video_report) => report.videos.push(video_report),
            Err(failure) => {
                error!(video = %video.display(), %failure, "video task crashed");
                report.crashed.push((video, failure));
            }
        }
    }

    info!(
        succeeded = report.succeeded().count(),
        failed = report.failed().count(),
        crashed = report.crashed.len(),
        "batch finished"
    );
    Ok(report)
}
