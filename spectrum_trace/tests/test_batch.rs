// tests/test_batch.rs: Folder-level batches over in-memory videos.

mod common;

use common::*;
use spectrum_trace::aggregator::Units;
use spectrum_trace::csv_output::CSV_HEADER;
use spectrum_trace::{
    AnalysisError, BatchOptions, FrameDisplay, HeadlessDisplay, PipelineConfig, run_batch,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn headless(_: &Path) -> Box<dyn FrameDisplay> {
    Box::new(HeadlessDisplay)
}

fn config() -> PipelineConfig {
    PipelineConfig {
        screen_range: None,
        ..Default::default()
    }
}

#[tokio::test]
async fn empty_folder_writes_nothing() {
    let folder = scratch_dir("batch_empty_in");
    let out = scratch_dir("batch_empty_out");
    let options = BatchOptions {
        output_dir: out.clone(),
        workers: None,
    };

    let opener = Arc::new(MemoryOpener::new(10.0));
    let result = run_batch(&folder, &config(), opener, headless, &options).await;

    assert!(matches!(result, Err(AnalysisError::NoVideos { .. })));
    assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
}

#[tokio::test]
async fn one_bad_video_does_not_stop_the_batch() {
    let folder = scratch_dir("batch_mixed_in");
    let out = scratch_dir("batch_mixed_out");
    fs::write(folder.join("a.mp4"), b"").unwrap();
    fs::write(folder.join("b.mp4"), b"").unwrap();
    fs::write(folder.join("notes.txt"), b"").unwrap();

    let opener = MemoryOpener::new(25.0).with_video("b", two_level_sequence(hump_frame_with_grid));
    let options = BatchOptions {
        output_dir: out.clone(),
        workers: Some(2),
    };

    let report = run_batch(&folder, &config(), Arc::new(opener), headless, &options)
        .await
        .unwrap();

    assert_eq!(report.videos.len(), 2);
    assert!(report.crashed.is_empty());
    assert!(!report.all_succeeded());

    let a = &report.videos[0];
    assert!(a.video.ends_with("a.mp4"));
    assert!(matches!(a.failure, Some(AnalysisError::VideoUnavailable { .. })));
    assert_eq!(read_lines(&out.join("a.csv")), vec![CSV_HEADER.to_string()]);

    let b = &report.videos[1];
    assert!(b.is_success(), "{:?}", b.failure);
    assert_eq!(b.units, Units::Calibrated);
    assert_eq!(read_lines(&out.join("b.csv")).len(), 11);

    assert_eq!(report.succeeded().count(), 1);
    assert_eq!(report.failed().count(), 1);
}
