// THEORY:
// The `morphology` module holds the shape filters the pipeline needs: dilation
// and erosion with a square structuring element, plus opening.
//
// - Dilate-then-erode merges fragments of the trace that the color threshold
//   split apart (gaps between sweep segments, dim pixels on the flanks).
// - Erode-then-dilate (opening) removes speckle from the grid mask.
//
// The filters are `imageproc`'s binary morphology under the chessboard (L-inf)
// norm, which is exactly a square window of side `2k + 1`. Pixels outside the
// image never light a pixel during dilation and never darken one during
// erosion, so a closing always contains its input.
//
// Stateless utility: every call allocates a fresh mask.

pub mod morphology {
    use image::GrayImage;
    use imageproc::distance_transform::Norm;
    use imageproc::morphology as binary;

    /// Radius of the square window for a `kernel_size` side. Even sizes round
    /// up to the next odd window.
    fn radius(kernel_size: u32) -> u8 {
        (kernel_size / 2).min(u32::from(u8::MAX)) as u8
    }

    type BinaryFilter = fn(&GrayImage, Norm, u8) -> GrayImage;

    fn repeat(
        mask: &GrayImage,
        kernel_size: u32,
        iterations: u32,
        filter: BinaryFilter,
    ) -> GrayImage {
        let mut current = mask.clone();
        if kernel_size <= 1 {
            return current;
        }
        for _ in 0..iterations {
            current = filter(&current, Norm::LInf, radius(kernel_size));
        }
        current
    }

    /// Lights every pixel within a `kernel_size` square window of a set pixel,
    /// repeated `iterations` times.
    pub fn dilate(mask: &GrayImage, kernel_size: u32, iterations: u32) -> GrayImage {
        repeat(mask, kernel_size, iterations, binary::dilate)
    }

    /// Clears every pixel within a `kernel_size` square window of a cleared
    /// pixel, repeated `iterations` times.
    pub fn erode(mask: &GrayImage, kernel_size: u32, iterations: u32) -> GrayImage {
        repeat(mask, kernel_size, iterations, binary::erode)
    }

    /// Erosion followed by dilation, each applied `iterations` times.
    pub fn open(mask: &GrayImage, kernel_size: u32, iterations: u32) -> GrayImage {
        let eroded = erode(mask, kernel_size, iterations);
        dilate(&eroded, kernel_size, iterations)
    }

}
