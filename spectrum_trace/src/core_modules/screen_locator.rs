// THEORY:
// Recordings are often framed loosely: the analyzer screen sits somewhere in
// the middle of the picture surrounded by bezel, buttons and desk. When a
// screen color is configured, the pipeline first finds the screen as the
// bounding rectangle of the largest region of that color and crops every frame
// to it, so the trace and grid stages never see the surroundings.

use crate::core_modules::color_segmenter::{ColorRange, segment};
use crate::core_modules::contour::{ContourMode, Rect, find_contours, largest_contour};
use image::{RgbImage, imageops};

/// Bounding rectangle of the largest `range`-colored region, or `None` when
/// the frame contains no such pixel.
pub fn locate_screen(frame: &RgbImage, range: &ColorRange) -> Option<Rect> {
    let mask = segment(frame, range);
    let contours = find_contours(&mask, ContourMode::External);
    largest_contour(&contours).map(|contour| contour.bounding_rect())
}

/// Copies the part of `frame` covered by `region`, clamped to the frame.
pub fn crop_to(frame: &RgbImage, region: Rect) -> RgbImage {
    let x = region.x.clamp(0, frame.width() as i32) as u32;
    let y = region.y.clamp(0, frame.height() as i32) as u32;
    let width = (region.width.max(0) as u32).min(frame.width() - x);
    let height = (region.height.max(0) as u32).min(frame.height() - y);
    imageops::crop_imm(frame, x, y, width, height).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::color_segmenter::Hsv;
    use image::Rgb;

    fn green_range() -> ColorRange {
        ColorRange::new(Hsv::new(33, 45, 45), Hsv::new(92, 260, 260))
    }

    #[test]
    fn test_locates_largest_green_region() {
        let mut frame = RgbImage::new(120, 90);
        for y in 20..70 {
            for x in 30..100 {
                frame.put_pixel(x, y, Rgb([0, 60, 0]));
            }
        }
        // A smaller green sticker elsewhere must not win.
        for y in 2..6 {
            for x in 2..6 {
                frame.put_pixel(x, y, Rgb([0, 200, 0]));
            }
        }

        let rect = locate_screen(&frame, &green_range()).unwrap();
        assert_eq!(rect, Rect { x: 30, y: 20, width: 70, height: 50 });

        let cropped = crop_to(&frame, rect);
        assert_eq!(cropped.dimensions(), (70, 50));
        assert_eq!(cropped.get_pixel(0, 0), &Rgb([0, 60, 0]));
    }

    #[test]
    fn test_no_screen_color_yields_none() {
        let frame = RgbImage::from_pixel(40, 40, Rgb([200, 10, 10]));
        assert!(locate_screen(&frame, &green_range()).is_none());
    }

    #[test]
    fn test_crop_is_clamped_to_frame() {
        let frame = RgbImage::new(50, 40);
        let cropped = crop_to(&frame, Rect { x: 30, y: -5, width: 100, height: 20 });
        assert_eq!(cropped.dimensions(), (20, 20));
    }
}
