//! Image preprocessing for OCR.
//!
//! Phone photos of printed questions tend to be small, noisy and unevenly
//! lit. We upscale, denoise, and then binarize two different ways, giving
//! the OCR engine several renderings to try.

use image::DynamicImage;
use image::imageops::{self, FilterType};
use imageproc::contrast::{ThresholdType, adaptive_threshold, otsu_level, threshold};
use imageproc::filter::median_filter;

use crate::prelude::*;

/// Upscale factor applied before OCR. Larger glyphs improve accuracy.
const SCALE_FACTOR: u32 = 2;

/// Block radius for local adaptive thresholding (an 11x11 window).
const ADAPTIVE_BLOCK_RADIUS: u32 = 5;

/// Which preprocessed rendering of the source image a candidate came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VariantId {
    /// Upscaled, denoised grayscale.
    Grayscale,
    /// Global Otsu binarization of the grayscale variant.
    Otsu,
    /// Local adaptive binarization of the grayscale variant.
    Adaptive,
    /// The original decoded image, used only by the safety-net pass.
    Original,
}

/// The preprocessed variants for one extraction attempt, plus the original
/// decoded image for the safety-net pass.
pub struct Variants {
    /// The image as decoded, untouched.
    pub original: DynamicImage,

    /// Preprocessed renderings, in the order they should be tried.
    pub variants: Vec<(VariantId, DynamicImage)>,
}

/// Decode an image and build the preprocessing variants.
///
/// This is synchronous CPU work; callers should run it on a blocking
/// thread.
pub fn prepare_variants(image_bytes: &[u8]) -> Result<Variants> {
    let original = image::load_from_memory(image_bytes).context("cannot decode image")?;

    let gray = original.to_luma8();
    let (width, height) = gray.dimensions();
    let upscaled = imageops::resize(
        &gray,
        width * SCALE_FACTOR,
        height * SCALE_FACTOR,
        FilterType::CatmullRom,
    );
    let denoised = median_filter(&upscaled, 1, 1);

    let otsu = threshold(&denoised, otsu_level(&denoised), ThresholdType::Binary);
    let adaptive = adaptive_threshold(&denoised, ADAPTIVE_BLOCK_RADIUS);

    let variants = vec![
        (VariantId::Grayscale, DynamicImage::ImageLuma8(denoised)),
        (VariantId::Otsu, DynamicImage::ImageLuma8(otsu)),
        (VariantId::Adaptive, DynamicImage::ImageLuma8(adaptive)),
    ];
    Ok(Variants { original, variants })
}
