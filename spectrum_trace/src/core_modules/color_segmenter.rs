// THEORY:
// The `color_segmenter` is the first stage of every analysis path. The analyzer
// display is color keyed: the trace glows in one hue band, the graticule in
// another, and the screen itself in a third. Everything downstream works on
// binary masks, so this module's only job is to turn an RGB frame into "inside
// the band" / "outside the band".
//
// Key architectural principles:
// 1.  **OpenCV-compatible HSV**: Bounds are tuned by eye against OpenCV's 8-bit
//     HSV convention (hue 0..180, saturation and value 0..255). The conversion
//     here reproduces OpenCV's fixed-point arithmetic so that tuned bounds keep
//     selecting exactly the same pixels.
// 2.  **Soft failure**: A range whose lower bound exceeds its upper bound in any
//     channel selects nothing. It is never an error.
// 3.  **Stateless**: A mask is produced fresh on every call and shares nothing.

use crate::core_modules::FOREGROUND;
use image::{GrayImage, Luma, RgbImage};
use serde::{Deserialize, Serialize};

const HSV_SHIFT: u32 = 12;
const HSV_ROUND: i32 = 1 << (HSV_SHIFT - 1);
const HUE_RANGE: i32 = 180;

/// A color in OpenCV's 8-bit HSV convention.
///
/// Channels are `u16` so that the historical bounds of 260 (meaning "no upper
/// limit") can be loaded unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[u16; 3]", into = "[u16; 3]")]
pub struct Hsv {
    /// Hue, 0..180.
    pub h: u16,
    /// Saturation, 0..255.
    pub s: u16,
    /// Value, 0..255.
    pub v: u16,
}

impl Hsv {
    pub const fn new(h: u16, s: u16, v: u16) -> Self {
        Self { h, s, v }
    }

    /// Converts one RGB pixel using the same integer arithmetic as OpenCV's
    /// `COLOR_RGB2HSV` for 8-bit images.
    pub fn from_rgb(red: u8, green: u8, blue: u8) -> Self {
        let (r, g, b) = (red as i32, green as i32, blue as i32);
        let v = r.max(g).max(b);
        let diff = v - r.min(g).min(b);

        let s = if v == 0 {
            0
        } else {
            let sdiv = ((255 << HSV_SHIFT) as f64 / v as f64).round() as i32;
            (diff * sdiv + HSV_ROUND) >> HSV_SHIFT
        };

        let h = if diff == 0 {
            0
        } else {
            let hdiv = ((HUE_RANGE << HSV_SHIFT) as f64 / (6 * diff) as f64).round() as i32;
            let sector = if v == r {
                g - b
            } else if v == g {
                b - r + 2 * diff
            } else {
                r - g + 4 * diff
            };
            let h = (sector * hdiv + HSV_ROUND) >> HSV_SHIFT;
            if h < 0 { h + HUE_RANGE } else { h }
        };

        Self::new(h as u16, s as u16, v as u16)
    }
}

impl From<[u16; 3]> for Hsv {
    fn from(channels: [u16; 3]) -> Self {
        Self::new(channels[0], channels[1], channels[2])
    }
}

impl From<Hsv> for [u16; 3] {
    fn from(hsv: Hsv) -> Self {
        [hsv.h, hsv.s, hsv.v]
    }
}

/// An inclusive `{lower, upper}` HSV band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorRange {
    pub lower: Hsv,
    pub upper: Hsv,
}

impl ColorRange {
    pub const fn new(lower: Hsv, upper: Hsv) -> Self {
        Self { lower, upper }
    }

    /// True when some channel has `lower > upper`, so no pixel can match.
    pub fn is_empty(&self) -> bool {
        self.lower.h > self.upper.h || self.lower.s > self.upper.s || self.lower.v > self.upper.v
    }

    pub fn contains(&self, hsv: Hsv) -> bool {
        (self.lower.h..=self.upper.h).contains(&hsv.h)
            && (self.lower.s..=self.upper.s).contains(&hsv.s)
            && (self.lower.v..=self.upper.v).contains(&hsv.v)
    }
}

/// Thresholds `image` against `range`, producing a mask of the same size where
/// matching pixels are `FOREGROUND` and all others are zero.
pub fn segment(image: &RgbImage, range: &ColorRange) -> GrayImage {
    let mut mask = GrayImage::new(image.width(), image.height());
    if range.is_empty() {
        return mask;
    }

    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        if range.contains(Hsv::from_rgb(r, g, b)) {
            mask.put_pixel(x, y, Luma([FOREGROUND]));
        }
    }
    mask
}
