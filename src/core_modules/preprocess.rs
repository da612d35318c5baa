// THEORY:
// The `preprocess` module turns arbitrary decoded images into the canonical
// form the rest of the pipeline assumes: 8-bit grayscale at the canonical
// inspection resolution, with background noise clipped to pure white.
//
// Key architectural principles:
// 1.  **Two Inputs, Two Treatments**: Source photos and defect masks look very
//     different. A photo has sensor noise in its near-white paper regions, so
//     it gets a *clip*: anything above the threshold is forced to pure
//     background white, everything else is left untouched. A mask is a
//     synthetic high-contrast image, so it gets a full *binarization*: above
//     the threshold is background (255), everything else is highlighted (0).
//     The mask threshold (210) sits below the image threshold (240) for the
//     same reason — synthetic masks need far less headroom than photographs.
// 2.  **Idempotence**: Re-running preprocessing on an already-canonical image
//     is a no-op. The resize is skipped when the input is already at the
//     canonical resolution, clipped values are already 255, and binarized
//     values are already 0 or 255.
// 3.  **Pure Derivation**: Inputs are never mutated; preprocessing always
//     returns a new canonical image.

use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, imageops};

/// The canonical inspection width. 1280 / 64 = 20 grid columns.
pub const CANONICAL_WIDTH: u32 = 1280;
/// The canonical inspection height. 720 / 36 = 20 grid rows.
pub const CANONICAL_HEIGHT: u32 = 720;

/// The luma value treated as "background" after preprocessing.
pub const BACKGROUND: u8 = 255;
/// The luma value a binarized mask uses for highlighted (defect) regions.
pub const HIGHLIGHTED: u8 = 0;

/// Normalizes a source photo into canonical form.
///
/// Grayscale, canonical resolution, and near-white noise suppression: pixels
/// strictly above `threshold` are clamped to pure background white so that
/// paper-white regions compare equal regardless of sensor noise.
pub fn preprocess_image(image: &DynamicImage, threshold: u8) -> GrayImage {
    let mut canonical = to_canonical_gray(image);
    for value in canonical.iter_mut() {
        if *value > threshold {
            *value = BACKGROUND;
        }
    }
    canonical
}

/// Normalizes a defect mask into canonical form.
///
/// Grayscale, canonical resolution, and full binarization at `threshold`:
/// above it is background/off (255), everything else is highlighted/on (0).
pub fn preprocess_mask(mask: &DynamicImage, threshold: u8) -> GrayImage {
    let mut canonical = to_canonical_gray(mask);
    for value in canonical.iter_mut() {
        *value = if *value > threshold {
            BACKGROUND
        } else {
            HIGHLIGHTED
        };
    }
    canonical
}

/// Grayscale conversion plus resize to the canonical resolution.
/// The resize is skipped when the input already matches, which keeps the
/// whole preprocessing step idempotent.
fn to_canonical_gray(image: &DynamicImage) -> GrayImage {
    let gray = image.to_luma8();
    if gray.dimensions() == (CANONICAL_WIDTH, CANONICAL_HEIGHT) {
        return gray;
    }
    imageops::resize(
        &gray,
        CANONICAL_WIDTH,
        CANONICAL_HEIGHT,
        FilterType::Triangle,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    fn uniform_canonical(value: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(
            CANONICAL_WIDTH,
            CANONICAL_HEIGHT,
            image::Luma([value]),
        ))
    }

    #[test]
    fn image_preprocessing_clips_near_white_only() {
        let processed = preprocess_image(&uniform_canonical(245), 240);
        assert!(processed.iter().all(|&v| v == BACKGROUND));

        let untouched = preprocess_image(&uniform_canonical(120), 240);
        assert!(untouched.iter().all(|&v| v == 120));
    }

    #[test]
    fn mask_preprocessing_binarizes() {
        let off = preprocess_mask(&uniform_canonical(230), 210);
        assert!(off.iter().all(|&v| v == BACKGROUND));

        let on = preprocess_mask(&uniform_canonical(40), 210);
        assert!(on.iter().all(|&v| v == HIGHLIGHTED));
    }

    #[test]
    fn non_canonical_input_is_resized() {
        let small = DynamicImage::ImageLuma8(GrayImage::from_pixel(640, 360, image::Luma([90])));
        let processed = preprocess_image(&small, 240);
        assert_eq!(processed.dimensions(), (CANONICAL_WIDTH, CANONICAL_HEIGHT));
    }

    #[test]
    fn image_preprocessing_is_idempotent() {
        let mut source = GrayImage::new(CANONICAL_WIDTH, CANONICAL_HEIGHT);
        for (x, y, pixel) in source.enumerate_pixels_mut() {
            pixel.0[0] = ((x + y) % 256) as u8;
        }
        let source = DynamicImage::ImageLuma8(source);

        let once = preprocess_image(&source, 240);
        let twice = preprocess_image(&DynamicImage::ImageLuma8(once.clone()), 240);
        assert_eq!(once, twice);
    }

    #[test]
    fn mask_preprocessing_is_idempotent() {
        let mut mask = GrayImage::new(CANONICAL_WIDTH, CANONICAL_HEIGHT);
        for (x, _, pixel) in mask.enumerate_pixels_mut() {
            pixel.0[0] = (x % 256) as u8;
        }
        let mask = DynamicImage::ImageLuma8(mask);

        let once = preprocess_mask(&mask, 210);
        let twice = preprocess_mask(&DynamicImage::ImageLuma8(once.clone()), 210);
        assert_eq!(once, twice);
    }
}
