// tests/common/mod.rs: Synthetic analyzer frames and in-memory video sources.
#![allow(dead_code)]

use image::{Rgb, RgbImage};
use spectrum_trace::{AnalysisError, FrameSource, Result, VideoOpener};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

pub const WIDTH: u32 = 400;
pub const HEIGHT: u32 = 320;
/// Top row of the trace's floor line. Border tracing meets the floor's left end
/// at this row first, so it is also the leftmost point's row.
pub const FLOOR_ROW: u32 = 302;
pub const TRACE: Rgb<u8> = Rgb([0, 200, 255]);
pub const GRID: Rgb<u8> = Rgb([200, 200, 200]);

/// A symmetric hump centred at x = 200 whose top is `peak_row`, standing on a
/// three-row floor line from x = 40 to x = 360 that starts at `floor_row`.
pub fn trace_frame(floor_row: u32, peak_row: u32) -> RgbImage {
    let mut frame = RgbImage::new(WIDTH, HEIGHT);
    for x in 40..=360u32 {
        for y in floor_row..floor_row + 3 {
            frame.put_pixel(x, y, TRACE);
        }
        let offset = (f64::from(x) - 200.0) / 80.0;
        if offset.abs() <= 1.0 {
            let rise = f64::from(floor_row - peak_row) * (1.0 - offset * offset);
            for y in floor_row - rise.round() as u32..floor_row {
                frame.put_pixel(x, y, TRACE);
            }
        }
    }
    frame
}

pub fn hump_frame(peak_row: u32) -> RgbImage {
    trace_frame(FLOOR_ROW, peak_row)
}

/// `hump_frame` plus one row of six 30x70 graticule cells along the top.
pub fn hump_frame_with_grid(peak_row: u32) -> RgbImage {
    let mut frame = hump_frame(peak_row);
    for i in 0..6u32 {
        let left = 10 + 45 * i;
        for y in 10..80 {
            for x in left..left + 30 {
                frame.put_pixel(x, y, GRID);
            }
        }
    }
    frame
}

/// A hump centred at `center_x` with no floor line: its flanks end on
/// `FLOOR_ROW`, 80 px either side of the centre.
pub fn hump_only_frame(center_x: u32, peak_row: u32) -> RgbImage {
    let mut frame = RgbImage::new(WIDTH, HEIGHT);
    for x in center_x - 80..=center_x + 80 {
        let offset = (f64::from(x) - f64::from(center_x)) / 80.0;
        let rise = f64::from(FLOOR_ROW - peak_row) * (1.0 - offset * offset);
        for y in FLOOR_ROW - rise.round() as u32..=FLOOR_ROW {
            frame.put_pixel(x, y, TRACE);
        }
    }
    frame
}

/// `hump_frame` over a graticule of 3 px rule lines: five horizontal lines
/// 70 px apart from row 10, eight vertical lines 50 px apart from column 10.
/// The grid rows run from 10 to 292.
pub fn graticule_frame(peak_row: u32) -> RgbImage {
    let mut frame = RgbImage::new(WIDTH, HEIGHT);
    for top in (0..5u32).map(|j| 10 + 70 * j) {
        for y in top..top + 3 {
            for x in 10..363 {
                frame.put_pixel(x, y, GRID);
            }
        }
    }
    for left in (0..8u32).map(|i| 10 + 50 * i) {
        for y in 10..293 {
            for x in left..left + 3 {
                frame.put_pixel(x, y, GRID);
            }
        }
    }
    let trace = hump_frame(peak_row);
    for (x, y, pixel) in trace.enumerate_pixels() {
        if *pixel == TRACE {
            frame.put_pixel(x, y, *pixel);
        }
    }
    frame
}

/// Ten frames: the peak sits at row 200 for frames 0-4 and row 150 for 5-9.
pub fn two_level_sequence(make: fn(u32) -> RgbImage) -> Vec<RgbImage> {
    (0..10).map(|i| make(if i < 5 { 200 } else { 150 })).collect()
}

pub struct VecSource {
    frames: VecDeque<RgbImage>,
    fps: f64,
}

impl VecSource {
    pub fn new(frames: Vec<RgbImage>, fps: f64) -> Self {
        Self {
            frames: frames.into(),
            fps,
        }
    }
}

impl FrameSource for VecSource {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        Ok(self.frames.pop_front())
    }
}

/// Serves preset frames by file stem; unknown stems fail to open.
#[derive(Default)]
pub struct MemoryOpener {
    videos: HashMap<String, Vec<RgbImage>>,
    pub fps: f64,
}

impl MemoryOpener {
    pub fn new(fps: f64) -> Self {
        Self {
            videos: HashMap::new(),
            fps,
        }
    }

    pub fn with_video(mut self, stem: &str, frames: Vec<RgbImage>) -> Self {
        self.videos.insert(stem.to_string(), frames);
        self
    }
}

impl VideoOpener for MemoryOpener {
    type Source = VecSource;

    fn open(&self, path: &Path) -> Result<VecSource> {
        let stem = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default();
        match self.videos.get(&stem) {
            Some(frames) => Ok(VecSource::new(frames.clone(), self.fps)),
            None => Err(AnalysisError::VideoUnavailable {
                path: path.to_path_buf(),
                reason: "no such video".to_string(),
            }),
        }
    }
}

/// A fresh, empty directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("spectrum_trace_it_{name}_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path).unwrap().lines().map(str::to_string).collect()
}

/// Parses the numeric columns of a CSV body line.
pub fn parse_row(line: &str) -> Vec<f64> {
    line.split(',').map(|v| v.parse().unwrap()).collect()
}
