//! Visualization of saliency maps over X-ray images.
//!
//! The central operation is [`overlay_mask`]: a saliency map is rendered
//! through the jet colormap and alpha-blended onto the grayscale source
//! image. [`annotate_overlay`] optionally burns the result header and
//! probability into the artifact so saved overlays are self-describing.

use crate::core::errors::{CxrError, CxrResult};
use crate::core::tensor::Tensor2D;
use crate::utils::tensor::normalize_unit;
use ab_glyph::FontVec;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;
use tracing::{debug, info};

const ANNOTATION_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const ANNOTATION_BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);

const ANNOTATION_PADDING: i32 = 4;

/// Maps a `[0, 1]` value through the jet colormap.
///
/// Returns RGB components in `[0, 1]`: low values render blue, mid values
/// green, high values red. Out-of-range inputs are clamped.
pub fn jet_color(value: f32) -> [f32; 3] {
    let v = if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let r = (1.5 - (4.0 * v - 3.0).abs()).clamp(0.0, 1.0);
    let g = (1.5 - (4.0 * v - 2.0).abs()).clamp(0.0, 1.0);
    let b = (1.5 - (4.0 * v - 1.0).abs()).clamp(0.0, 1.0);
    [r, g, b]
}

/// Composites a saliency map onto a grayscale background image.
///
/// The saliency map is normalized to `[0, 1]`, colored with [`jet_color`]
/// and blended as `alpha * color + (1 - alpha) * background`. With
/// `alpha = 0` the output equals the background alone; with `alpha = 1` it
/// is the colormapped saliency alone.
///
/// # Errors
///
/// - `InvalidBlendWeight` if `alpha` is outside `[0, 1]` or not finite.
/// - `InvalidInput` if the two planes differ in shape. The pipeline derives
///   both from the same input tensor, so this only fires on misuse.
pub fn overlay_mask(
    background: &Tensor2D,
    saliency: &Tensor2D,
    alpha: f32,
) -> CxrResult<RgbImage> {
    if !alpha.is_finite() || !(0.0..=1.0).contains(&alpha) {
        return Err(CxrError::InvalidBlendWeight { alpha });
    }
    if background.dim() != saliency.dim() {
        return Err(CxrError::invalid_input(format!(
            "background {:?} and saliency {:?} dimensions differ",
            background.dim(),
            saliency.dim()
        )));
    }

    let normalized = normalize_unit(saliency);
    let (h, w) = background.dim();
    let mut out = RgbImage::new(w as u32, h as u32);
    for (y, row) in normalized.outer_iter().enumerate() {
        for (x, &value) in row.iter().enumerate() {
            let gray = background[[y, x]].clamp(0.0, 1.0);
            let color = jet_color(value);
            let mut pixel = [0u8; 3];
            for (channel, component) in color.iter().enumerate() {
                let blended = alpha * component + (1.0 - alpha) * gray;
                pixel[channel] = (blended.clamp(0.0, 1.0) * 255.0).round() as u8;
            }
            out.put_pixel(x as u32, y as u32, Rgb(pixel));
        }
    }
    Ok(out)
}

/// Configuration for burning text annotations into rendered overlays.
///
/// When no font is available the annotation step is skipped and the overlay
/// is returned unlabeled.
pub struct AnnotationConfig {
    /// The font to use for text rendering. If None, annotation is skipped.
    pub font: Option<FontVec>,

    /// The scale factor for the font. Defaults to 16.0.
    pub font_scale: f32,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            font: None,
            font_scale: 16.0,
        }
    }
}

impl AnnotationConfig {
    /// Creates a configuration with a font loaded from the specified path.
    pub fn with_font_path(font_path: &Path) -> CxrResult<Self> {
        let font_data = std::fs::read(font_path)?;
        let font = FontVec::try_from_vec(font_data).map_err(|_| {
            CxrError::invalid_input(format!(
                "failed to parse font file: {}",
                font_path.display()
            ))
        })?;

        Ok(Self {
            font: Some(font),
            font_scale: 16.0,
        })
    }

    /// Creates a configuration with a system font.
    ///
    /// Attempts common font locations; falls back to skipping annotation when
    /// none is found.
    pub fn with_system_font() -> Self {
        let font_paths = [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/System/Library/Fonts/Arial.ttf",
            "C:\\Windows\\Fonts\\arial.ttf",
        ];

        for path in &font_paths {
            if let Ok(font_data) = std::fs::read(path) {
                if let Ok(font) = FontVec::try_from_vec(font_data) {
                    info!("Loaded system font: {}", path);
                    return Self {
                        font: Some(font),
                        font_scale: 16.0,
                    };
                }
            }
        }

        debug!("No system font found, overlay annotation will be skipped");
        Self::default()
    }
}

/// Burns text lines into the top-left corner of an overlay image.
///
/// Each line is drawn in white on a black strip so it stays readable over
/// the heatmap. Lines that would not fit the image width are still drawn
/// clipped; callers keep annotations short.
pub fn annotate_overlay(img: &mut RgbImage, lines: &[String], config: &AnnotationConfig) {
    let Some(ref font) = config.font else {
        return;
    };

    let scale = config.font_scale;
    let line_height = scale as i32 + ANNOTATION_PADDING;
    let (img_w, img_h) = (img.width() as i32, img.height() as i32);

    for (index, line) in lines.iter().enumerate() {
        if line.is_empty() {
            continue;
        }
        let y = ANNOTATION_PADDING + index as i32 * line_height;
        if y + line_height > img_h {
            break;
        }
        let text_width = measure_text_width(line, font, scale).ceil() as i32;
        let strip_w = (text_width + 2 * ANNOTATION_PADDING).min(img_w).max(1) as u32;
        let strip = Rect::at(0, y - ANNOTATION_PADDING / 2).of_size(strip_w, line_height as u32);
        draw_filled_rect_mut(img, strip, ANNOTATION_BACKGROUND);
        draw_text_mut(
            img,
            ANNOTATION_TEXT_COLOR,
            ANNOTATION_PADDING,
            y,
            scale,
            font,
            line,
        );
    }
}

/// Measures the width of text when rendered with a specific font and scale.
fn measure_text_width(text: &str, font: &FontVec, scale: f32) -> f32 {
    use ab_glyph::{Font, ScaleFont};

    let scaled_font = font.as_scaled(scale);
    text.chars()
        .map(|ch| {
            let glyph = scaled_font.scaled_glyph(ch);
            scaled_font.h_advance(glyph.id)
        })
        .sum()
}
