// THEORY:
// The `edges` module turns the grayscale, grid-masked frame into thin edge lines
// so that each graticule cell shows up as its own closed outline. It is only
// used when grid detection is configured to trace Canny edges instead of the
// grid mask itself.
//
// The detector is `imageproc`'s Canny: Gaussian smoothing, Sobel gradients,
// non-maximum suppression and hysteresis between a low and a high threshold.
//
// Stateless utility.

use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Hysteresis thresholds on the gradient magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeThresholds {
    pub low: f64,
    pub high: f64,
}

impl Default for EdgeThresholds {
    fn default() -> Self {
        Self { low: 50.0, high: 150.0 }
    }
}

impl EdgeThresholds {
    /// `(low, high)` with swapped values reordered.
    fn ordered(self) -> (f32, f32) {
        let (low, high) = if self.low <= self.high {
            (self.low, self.high)
        } else {
            (self.high, self.low)
        };
        (low as f32, high as f32)
    }
}

/// Runs the detector and returns a mask with non-zero edge pixels.
pub fn detect_edges(gray: &GrayImage, thresholds: EdgeThresholds) -> GrayImage {
    if gray.width() == 0 || gray.height() == 0 {
        return gray.clone();
    }
    let (low, high) = thresholds.ordered();
    imageproc::edges::canny(gray, low, high)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn square(size: u32, from: u32, to: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            if (from..to).contains(&x) && (from..to).contains(&y) { Luma([255]) } else { Luma([0]) }
        })
    }

    fn edge_pixels(edges: &GrayImage) -> Vec<(u32, u32)> {
        edges
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] != 0)
            .map(|(x, y, _)| (x, y))
            .collect()
    }

    #[test]
    fn test_uniform_image_has_no_edges() {
        let flat = GrayImage::from_pixel(16, 16, Luma([180]));
        assert!(edge_pixels(&detect_edges(&flat, EdgeThresholds::default())).is_empty());
    }

    #[test]
    fn test_square_edges_hug_its_border() {
        let edges = detect_edges(&square(40, 12, 28), EdgeThresholds::default());
        let pixels = edge_pixels(&edges);
        assert!(!pixels.is_empty());

        for (x, y) in pixels {
            let near_x = (8..=31).contains(&x);
            let near_y = (8..=31).contains(&y);
            let inside = (16..24).contains(&x) && (16..24).contains(&y);
            assert!(near_x && near_y && !inside, "stray edge pixel at ({x}, {y})");
        }
    }

    #[test]
    fn test_thresholds_above_every_gradient_suppress_everything() {
        let thresholds = EdgeThresholds { low: 5000.0, high: 6000.0 };
        assert!(edge_pixels(&detect_edges(&square(40, 12, 28), thresholds)).is_empty());
    }

    #[test]
    fn test_swapped_thresholds_are_reordered() {
        let image = square(40, 12, 28);
        let ordered = detect_edges(&image, EdgeThresholds { low: 50.0, high: 150.0 });
        let swapped = detect_edges(&image, EdgeThresholds { low: 150.0, high: 50.0 });
        assert_eq!(ordered, swapped);
    }

    #[test]
    fn test_empty_image_passes_through() {
        let empty = GrayImage::new(0, 0);
        assert_eq!(detect_edges(&empty, EdgeThresholds::default()).dimensions(), (0, 0));
    }
}
