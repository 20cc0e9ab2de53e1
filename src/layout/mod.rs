//! Places reconciled annotations on the image without visual collision:
//! readings go in the whitespace above each box, glosses underneath, sized
//! by how tightly the detected lines are packed. The overlay is composed as
//! SVG over the base image and rasterized to a fresh buffer; the input
//! buffer is never touched.

mod font;

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};
use resvg::render;
use std::io::Cursor;
use std::sync::Arc;
use tiny_skia::Pixmap;
use tracing::warn;
use usvg::{fontdb, Options, Tree};

use crate::reconcile::Annotation;
use crate::settings::Settings;

pub use font::{load_font_metrics, resolve_annotation_font, FontMetrics, ResolvedFont};

pub(crate) const FONT_SIZE_SMALL: f32 = 10.0;
pub(crate) const FONT_SIZE_MEDIUM: f32 = 12.0;
pub(crate) const FONT_SIZE_LARGE: f32 = 14.0;

const DEFAULT_LINE_SPACING: f32 = 40.0;
const TOP_MARGIN: f32 = 5.0;
const READING_GAP: f32 = 5.0;
const BG_PAD: f32 = 2.0;
const BANNER_FONT_SIZE: f32 = 13.0;
const BANNER_TOP: f32 = 4.0;
const GLOSS_MAX_CHARS: usize = 30;

pub struct LayoutEngine {
    text_color: String,
    gloss_color: String,
    fill_color: String,
    banner_title: String,
    font_size_override: Option<f32>,
    font: ResolvedFont,
}

impl LayoutEngine {
    pub fn new(settings: &Settings) -> Self {
        let font = resolve_annotation_font(&settings.overlay_font_paths);
        Self {
            text_color: settings.overlay_text_color.clone(),
            gloss_color: settings.overlay_gloss_color.clone(),
            fill_color: settings.overlay_fill_color.clone(),
            banner_title: settings.banner_title.clone(),
            font_size_override: settings.overlay_font_size,
            font,
        }
    }

    /// Render all annotations onto a copy of the image. The input must be a
    /// 3-channel buffer; anything else is rejected before any drawing. A
    /// failure while rendering the overlay falls back to the original
    /// pixels so the pipeline always has a displayable result.
    pub fn annotate(
        &self,
        image: &DynamicImage,
        annotations: &[Annotation],
    ) -> Result<RgbImage> {
        let channels = image.color().channel_count();
        if channels != 3 {
            return Err(anyhow!(
                "invalid image buffer: expected 3 channels, got {}",
                channels
            ));
        }

        let (width, height) = image.dimensions();
        let font_size = self
            .font_size_override
            .unwrap_or_else(|| font_size_for_spacing(estimate_line_spacing(annotations)));

        match self.render_overlay(image, width, height, annotations, font_size) {
            Ok(buffer) => Ok(buffer),
            Err(err) => {
                warn!("annotation rendering failed, returning original image: {err:#}");
                Ok(image.to_rgb8())
            }
        }
    }

    fn render_overlay(
        &self,
        image: &DynamicImage,
        width: u32,
        height: u32,
        annotations: &[Annotation],
        font_size: f32,
    ) -> Result<RgbImage> {
        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .with_context(|| "failed to encode base image")?;
        let data_uri = format!("data:image/png;base64,{}", BASE64.encode(&png));

        let mut svg = String::new();
        svg.push_str(&format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" xmlns:xlink="http://www.w3.org/1999/xlink" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = width,
            h = height
        ));
        svg.push_str(&format!(
            r#"<image href="{uri}" xlink:href="{uri}" x="0" y="0" width="{w}" height="{h}" preserveAspectRatio="none"/>"#,
            uri = data_uri,
            w = width,
            h = height
        ));

        for annotation in annotations {
            match self.annotation_svg(annotation, font_size, height) {
                Ok(block) => svg.push_str(&block),
                Err(err) => {
                    warn!("skipping annotation '{}': {err:#}", annotation.source_text);
                }
            }
        }

        svg.push_str(&self.banner_svg(width));
        svg.push_str("</svg>");

        self.rasterize(&svg, width, height)
    }

    fn annotation_svg(
        &self,
        annotation: &Annotation,
        font_size: f32,
        image_height: u32,
    ) -> Result<String> {
        if annotation.w == 0 || annotation.h == 0 {
            return Err(anyhow!("degenerate bounding box"));
        }
        if annotation.reading.trim().is_empty() {
            return Err(anyhow!("empty reading"));
        }

        let metrics = self.font.metrics.as_ref();
        let reading_w = font::measure_text_width_px(&annotation.reading, font_size, metrics).max(1.0);
        let reading_h = font_size;
        let reading_x = annotation.x as f32 + (annotation.w as f32 - reading_w) / 2.0;
        let reading_top = (annotation.y as f32 - reading_h - READING_GAP).max(TOP_MARGIN);

        let mut out = String::new();
        out.push_str(&self.backdrop_svg(reading_x, reading_top, reading_w, reading_h, 0.86));
        out.push_str(&self.text_svg(
            reading_x,
            reading_top + reading_h,
            font_size,
            &self.text_color,
            &annotation.reading,
        ));

        let gloss = annotation.gloss.trim();
        if !gloss.is_empty() {
            let gloss = truncate_gloss(gloss);
            let gloss_size = (font_size - 2.0).max(8.0);
            let gloss_w = font::measure_text_width_px(&gloss, gloss_size, metrics).max(1.0);
            let gloss_x = annotation.x as f32 + (annotation.w as f32 - gloss_w) / 2.0;
            let mut gloss_top = (annotation.y + annotation.h) as f32 + 3.0;
            if gloss_top + gloss_size + 5.0 > image_height as f32 {
                gloss_top = annotation.y as f32 - gloss_size - reading_h - 8.0;
            }
            out.push_str(&self.backdrop_svg(gloss_x, gloss_top, gloss_w, gloss_size, 0.78));
            out.push_str(&self.text_svg(
                gloss_x,
                gloss_top + gloss_size,
                gloss_size,
                &self.gloss_color,
                &gloss,
            ));
        }

        Ok(out)
    }

    fn banner_svg(&self, width: u32) -> String {
        let metrics = self.font.metrics.as_ref();
        let title_w =
            font::measure_text_width_px(&self.banner_title, BANNER_FONT_SIZE, metrics).max(1.0);
        let title_x = (width as f32 - title_w) / 2.0;
        let mut out = self.backdrop_svg(title_x - 4.0, BANNER_TOP, title_w + 8.0, BANNER_FONT_SIZE + 6.0, 0.8);
        out.push_str(&self.text_svg(
            title_x,
            BANNER_TOP + 3.0 + BANNER_FONT_SIZE,
            BANNER_FONT_SIZE,
            &self.text_color,
            &self.banner_title,
        ));
        out
    }

    fn backdrop_svg(&self, x: f32, y: f32, w: f32, h: f32, opacity: f32) -> String {
        format!(
            r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="{fill}" fill-opacity="{opacity}"/>"#,
            x = x - BG_PAD,
            y = y - BG_PAD,
            w = w + BG_PAD * 2.0,
            h = h + BG_PAD * 2.0,
            fill = &self.fill_color,
            opacity = opacity
        )
    }

    fn text_svg(&self, x: f32, baseline: f32, size: f32, color: &str, content: &str) -> String {
        match self.font.family() {
            Some(family) => format!(
                r#"<text x="{x}" y="{y}" font-size="{size}" fill="{color}" font-family="{family}">{text}</text>"#,
                x = x,
                y = baseline,
                size = size,
                color = color,
                family = escape_xml(family),
                text = escape_xml(content)
            ),
            None => format!(
                r#"<text x="{x}" y="{y}" font-size="{size}" fill="{color}">{text}</text>"#,
                x = x,
                y = baseline,
                size = size,
                color = color,
                text = escape_xml(content)
            ),
        }
    }

    fn rasterize(&self, svg: &str, width: u32, height: u32) -> Result<RgbImage> {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        if let Some(metrics) = self.font.metrics.as_ref() {
            db.load_font_data(metrics.data().to_vec());
        }
        let options = Options {
            fontdb: Arc::new(db),
            ..Options::default()
        };
        let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse overlay SVG")?;
        let mut pixmap =
            Pixmap::new(width, height).ok_or_else(|| anyhow!("empty image dimensions"))?;
        let mut pixmap_mut = pixmap.as_mut();
        render(&tree, tiny_skia::Transform::identity(), &mut pixmap_mut);
        let rgba = image::RgbaImage::from_raw(width, height, pixmap.data().to_vec())
            .ok_or_else(|| anyhow!("failed to build output buffer"))?;
        Ok(DynamicImage::ImageRgba8(rgba).to_rgb8())
    }
}

/// Mean gap between the distinct detected line positions. With tight lines
/// there is less whitespace above each box, so the reading text must shrink
/// to stay clear of the line above.
pub(crate) fn estimate_line_spacing(annotations: &[Annotation]) -> f32 {
    let mut ys: Vec<u32> = annotations.iter().map(|annotation| annotation.y).collect();
    ys.sort_unstable();
    ys.dedup();
    if ys.len() < 2 {
        return DEFAULT_LINE_SPACING;
    }
    let total: u32 = ys.windows(2).map(|pair| pair[1] - pair[0]).sum();
    total as f32 / (ys.len() - 1) as f32
}

pub(crate) fn font_size_for_spacing(spacing: f32) -> f32 {
    if spacing < 30.0 {
        FONT_SIZE_SMALL
    } else if spacing < 50.0 {
        FONT_SIZE_MEDIUM
    } else {
        FONT_SIZE_LARGE
    }
}

fn truncate_gloss(gloss: &str) -> String {
    if gloss.chars().count() <= GLOSS_MAX_CHARS {
        return gloss.to_string();
    }
    let mut truncated: String = gloss.chars().take(GLOSS_MAX_CHARS).collect();
    truncated.push_str("...");
    truncated
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> LayoutEngine {
        LayoutEngine::new(&Settings::default())
    }

    fn annotation(y: u32) -> Annotation {
        Annotation {
            source_text: "日本語".to_string(),
            reading: "にほんご".to_string(),
            gloss: "Japanese language".to_string(),
            x: 10,
            y,
            w: 60,
            h: 20,
        }
    }

    fn rgb_input(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255])))
    }

    #[test]
    fn tight_lines_pick_the_smallest_font() {
        let annotations = vec![annotation(10), annotation(30), annotation(52)];
        let spacing = estimate_line_spacing(&annotations);
        assert!((spacing - 21.0).abs() < 0.001);
        assert_eq!(font_size_for_spacing(spacing), FONT_SIZE_SMALL);
    }

    #[test]
    fn wide_lines_pick_the_largest_font() {
        let annotations = vec![annotation(10), annotation(65), annotation(120)];
        let spacing = estimate_line_spacing(&annotations);
        assert!(spacing >= 50.0);
        assert_eq!(font_size_for_spacing(spacing), FONT_SIZE_LARGE);
    }

    #[test]
    fn single_line_uses_default_spacing() {
        let annotations = vec![annotation(40), annotation(40)];
        let spacing = estimate_line_spacing(&annotations);
        assert!((spacing - DEFAULT_LINE_SPACING).abs() < 0.001);
        assert_eq!(font_size_for_spacing(spacing), FONT_SIZE_MEDIUM);
    }

    #[test]
    fn output_keeps_input_dimensions() {
        let input = rgb_input(120, 80);
        let output = engine()
            .annotate(&input, &[annotation(50)])
            .expect("annotate");
        assert_eq!((output.width(), output.height()), (120, 80));
    }

    #[test]
    fn empty_annotation_list_keeps_dimensions() {
        let input = rgb_input(64, 48);
        let output = engine().annotate(&input, &[]).expect("annotate");
        assert_eq!((output.width(), output.height()), (64, 48));
    }

    #[test]
    fn non_three_channel_input_is_rejected() {
        let input = DynamicImage::ImageRgba8(image::RgbaImage::new(32, 32));
        assert!(engine().annotate(&input, &[]).is_err());
    }

    #[test]
    fn degenerate_boxes_are_skipped_not_fatal() {
        let mut bad = annotation(50);
        bad.w = 0;
        let input = rgb_input(100, 100);
        let output = engine().annotate(&input, &[bad]).expect("annotate");
        assert_eq!((output.width(), output.height()), (100, 100));
    }
}
