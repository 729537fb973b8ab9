// THEORY:
// The `contour` module turns binary masks into geometry. Both the trace and the
// grid are recognised by the shape of the regions a color mask produces, so
// this is the bridge between "which pixels are lit" and "what object is there".
//
// Border following itself is `imageproc`'s Suzuki-Abe tracer. This module adds
// the small vocabulary the pipeline speaks on top of it:
// 1.  **Modes**: the trace and the screen only care about top-level outer
//     borders; the grid needs every border, because on a graticule drawn as
//     rule lines the cells are the hole borders of one big mesh.
// 2.  **Deterministic order**: borders come out in raster order of their first
//     pixel. Ties (equal areas, equal leftmost columns) go to the first found.
// 3.  **Shape summaries**: area, perimeter, bounding rectangle and a closed
//     Douglas-Peucker polygon. These are the only facts the higher layers ask
//     for.

use crate::core_modules::FOREGROUND;
use image::{GrayImage, Luma};
use imageproc::contours::{self, BorderType};
use imageproc::geometry::{approximate_polygon_dp, arc_length, contour_area};
use imageproc::region_labelling::{Connectivity, connected_components};

/// An integer pixel position.
pub type Point = imageproc::point::Point<i32>;

/// An axis-aligned rectangle. `width` and `height` count pixels, so a single
/// pixel has a 1x1 bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// Which borders `find_contours` reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContourMode {
    /// Every outer and hole border at every nesting level.
    All,
    /// Only outer borders of components that are not nested inside a hole.
    External,
}

/// One closed border of a mask, as an ordered list of border pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Contour {
    points: Vec<Point>,
    hole: bool,
}

impl Contour {
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Whether this border separates a component from a hole inside it.
    pub fn is_hole(&self) -> bool {
        self.hole
    }

    /// Enclosed polygon area through the pixel centres. Lines and single
    /// pixels have zero area.
    pub fn area(&self) -> f64 {
        if self.points.len() < 3 {
            return 0.0;
        }
        contour_area(&self.points).abs()
    }

    /// Perimeter of the polyline, including the closing segment when `closed`.
    pub fn arc_length(&self, closed: bool) -> f64 {
        if self.points.len() < 2 {
            return 0.0;
        }
        arc_length(&self.points, closed)
    }

    pub fn bounding_rect(&self) -> Rect {
        let Some(first) = self.points.first() else {
            return Rect::default();
        };
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &self.points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Rect {
            x: min_x,
            y: min_y,
            width: max_x - min_x + 1,
            height: max_y - min_y + 1,
        }
    }

    /// The point with the smallest x; the first one along the contour wins ties.
    pub fn leftmost(&self) -> Option<Point> {
        self.points
            .iter()
            .copied()
            .reduce(|best, p| if p.x < best.x { p } else { best })
    }

    pub fn rightmost_x(&self) -> Option<i32> {
        self.points.iter().map(|p| p.x).max()
    }

    /// Closed-curve Douglas-Peucker simplification with tolerance `epsilon`
    /// pixels. The polygon's vertices are listed once each.
    pub fn approx_polygon(&self, epsilon: f64) -> Vec<Point> {
        if self.points.len() < 3 || epsilon.is_nan() || epsilon <= 0.0 {
            return self.points.clone();
        }

        // Split the closed curve at the first point and the point farthest
        // from it, then simplify both open halves.
        let start = self.points[0];
        let squared = |p: &Point| {
            let (dx, dy) = (i64::from(p.x - start.x), i64::from(p.y - start.y));
            dx * dx + dy * dy
        };
        let far = self
            .points
            .iter()
            .enumerate()
            .fold((0, 0), |best, (i, p)| if squared(p) > best.1 { (i, squared(p)) } else { best })
            .0;
        if far == 0 {
            return vec![start];
        }

        let mut closing = self.points[far..].to_vec();
        closing.push(start);
        let mut polygon = approximate_polygon_dp(&self.points[..=far], epsilon, false);
        let mut back = approximate_polygon_dp(&closing, epsilon, false);
        polygon.pop();
        back.pop();
        polygon.extend(back);
        polygon
    }
}

impl From<contours::Contour<i32>> for Contour {
    fn from(contour: contours::Contour<i32>) -> Self {
        Self {
            hole: contour.border_type == BorderType::Hole,
            points: contour.points,
        }
    }
}

/// Borders of the foreground (non-zero) regions of `mask`, in raster order of
/// each border's first pixel.
pub fn find_contours(mask: &GrayImage, mode: ContourMode) -> Vec<Contour> {
    contours::find_contours::<i32>(mask)
        .into_iter()
        .filter(|contour| match mode {
            ContourMode::All => true,
            ContourMode::External => {
                contour.border_type == BorderType::Outer && contour.parent.is_none()
            }
        })
        .map(Contour::from)
        .collect()
}

/// The contour with the largest enclosed area; the first one found wins ties.
pub fn largest_contour(contours: &[Contour]) -> Option<&Contour> {
    contours
        .iter()
        .reduce(|best, c| if c.area() > best.area() { c } else { best })
}

/// Draws `contour` filled (boundary plus enclosed interior) into a blank mask
/// of the given size.
pub fn fill_contour(width: u32, height: u32, contour: &Contour) -> GrayImage {
    // One pixel of padding guarantees the outside region touches (0, 0).
    let mut walls = GrayImage::new(width + 2, height + 2);
    for p in contour.points() {
        let (x, y) = (p.x + 1, p.y + 1);
        if x >= 1 && y >= 1 && x <= width as i32 && y <= height as i32 {
            walls.put_pixel(x as u32, y as u32, Luma([FOREGROUND]));
        }
    }

    // An 8-connected border cannot be crossed by a 4-connected flood.
    let regions = connected_components(&walls, Connectivity::Four, Luma([FOREGROUND]));
    let outside = regions.get_pixel(0, 0).0[0];
    GrayImage::from_fn(width, height, |x, y| {
        if regions.get_pixel(x + 1, y + 1).0[0] == outside {
            Luma([0])
        } else {
            Luma([FOREGROUND])
        }
    })
}

/// Every foreground pixel of `mask`, row by row.
pub fn foreground_points(mask: &GrayImage) -> Vec<Point> {
    mask.enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] != 0)
        .map(|(x, y, _)| Point::new(x as i32, y as i32))
        .collect()
}
