// THEORY:
// The `grid_calibrator` learns how large one graticule cell is on screen.
//
// Detection runs per frame and is stateless:
// 1.  Segment the grid color and open the mask to drop speckle.
// 2.  Take every border of the mask, outer and hole alike. A graticule drawn
//     as solid blocks shows its cells as outer borders; one drawn as rule
//     lines is a single mesh whose cells are the hole borders.
// 3.  Optionally trace edges instead: keep only the grid pixels of the frame,
//     convert to grayscale, run Canny and thicken the ridge slightly so it
//     does not break at cell corners.
// 4.  A border is a cell if its Douglas-Peucker polygon has exactly four
//     vertices and its bounding height lies inside the configured band.
//
// Accumulation is the only stateful part of the pipeline. A `GridCalibration`
// keeps a running mean of cell sizes over the first `cap` qualifying cells of a
// video and then freezes; a frozen calibration ignores every later detection.

use crate::core_modules::color_segmenter::{ColorRange, segment};
use crate::core_modules::contour::{ContourMode, Rect, find_contours};
use crate::core_modules::edges::{EdgeThresholds, detect_edges};
use crate::core_modules::morphology::morphology;
use image::{GrayImage, Rgb, RgbImage, imageops};
use serde::{Deserialize, Serialize};

pub const DEFAULT_SAMPLE_CAP: usize = 10;

/// Open interval of bounding-box heights, in pixels, that a grid cell may have.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeightBand {
    pub min: i32,
    pub max: i32,
}

impl HeightBand {
    pub fn contains(&self, height: i32) -> bool {
        self.min < height && height < self.max
    }
}

/// Tunables of grid cell detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridDetection {
    pub height_band: HeightBand,
    /// Douglas-Peucker tolerance as a fraction of the contour perimeter.
    pub approx_fraction: f64,
    pub sample_cap: usize,
    pub opening_kernel: u32,
    pub opening_iterations: u32,
    /// Trace Canny edges of the masked frame instead of the mask borders.
    pub edges: Option<EdgeThresholds>,
    /// 3x3 dilations applied to the Canny output.
    pub edge_dilate_iterations: u32,
}

impl Default for GridDetection {
    fn default() -> Self {
        Self {
            height_band: HeightBand { min: 50, max: 100 },
            approx_fraction: 0.02,
            sample_cap: DEFAULT_SAMPLE_CAP,
            opening_kernel: 3,
            opening_iterations: 1,
            edges: None,
            edge_dilate_iterations: 1,
        }
    }
}

/// Running estimate of the grid cell size for one video.
#[derive(Debug, Clone, PartialEq)]
pub struct GridCalibration {
    pub pixel_height: f64,
    pub pixel_width: f64,
    pub sample_count: usize,
    cap: usize,
}

impl GridCalibration {
    pub fn new(cap: usize) -> Self {
        Self {
            pixel_height: 0.0,
            pixel_width: 0.0,
            sample_count: 0,
            cap,
        }
    }

    /// An already frozen calibration with a known cell size.
    pub fn seeded(pixel_height: f64, pixel_width: f64) -> Self {
        Self {
            pixel_height,
            pixel_width,
            sample_count: 1,
            cap: 1,
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn is_frozen(&self) -> bool {
        self.sample_count >= self.cap
    }

    /// Folds one detected cell into the running mean. Returns `false` (and
    /// changes nothing) once the calibration is frozen.
    pub fn add_sample(&mut self, cell: Rect) -> bool {
        if self.is_frozen() {
            return false;
        }
        let n = (self.sample_count + 1) as f64;
        self.pixel_height += (f64::from(cell.height) - self.pixel_height) / n;
        self.pixel_width += (f64::from(cell.width) - self.pixel_width) / n;
        self.sample_count += 1;
        true
    }

    /// Adds cells in order until frozen; returns how many were taken.
    pub fn absorb(&mut self, cells: &[Rect]) -> usize {
        cells.iter().take_while(|cell| self.add_sample(**cell)).count()
    }
}

/// First and last rows holding any grid pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridExtent {
    pub first_row: i32,
    pub last_row: i32,
}

impl GridExtent {
    pub fn height(&self) -> i32 {
        self.last_row - self.first_row
    }
}

/// What one frame shows of the grid.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GridObservation {
    pub cells: Vec<Rect>,
    pub extent: Option<GridExtent>,
}

pub fn detect_grid(
    frame: &RgbImage,
    range: &ColorRange,
    detection: &GridDetection,
) -> GridObservation {
    let grid_mask = morphology::open(
        &segment(frame, range),
        detection.opening_kernel,
        detection.opening_iterations,
    );
    let extent = row_extent(&grid_mask);

    let outlines = match detection.edges {
        Some(thresholds) => edge_outlines(frame, &grid_mask, thresholds, detection),
        None => grid_mask,
    };

    let cells = find_contours(&outlines, ContourMode::All)
        .iter()
        .filter_map(|contour| {
            let epsilon = detection.approx_fraction * contour.arc_length(true);
            if contour.approx_polygon(epsilon).len() != 4 {
                return None;
            }
            let rect = contour.bounding_rect();
            detection.height_band.contains(rect.height).then_some(rect)
        })
        .collect();

    GridObservation { cells, extent }
}

fn edge_outlines(
    frame: &RgbImage,
    grid_mask: &GrayImage,
    thresholds: EdgeThresholds,
    detection: &GridDetection,
) -> GrayImage {
    let mut masked = RgbImage::new(frame.width(), frame.height());
    for (x, y, pixel) in frame.enumerate_pixels() {
        if grid_mask.get_pixel(x, y).0[0] != 0 {
            masked.put_pixel(x, y, *pixel);
        } else {
            masked.put_pixel(x, y, Rgb([0, 0, 0]));
        }
    }
    let gray = imageops::grayscale(&masked);
    morphology::dilate(
        &detect_edges(&gray, thresholds),
        3,
        detection.edge_dilate_iterations,
    )
}

fn row_extent(mask: &GrayImage) -> Option<GridExtent> {
    let mut rows = mask
        .rows()
        .enumerate()
        .filter_map(|(y, mut row)| row.any(|p| p.0[0] != 0).then_some(y as i32));
    let first_row = rows.next()?;
    let last_row = rows.last().unwrap_or(first_row);
    Some(GridExtent { first_row, last_row })
}
