use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use ttf_parser::name_id;
use ttf_parser::Face;
use usvg::fontdb;

/// Platform locations where a CJK-capable face is usually found. Settings
/// candidates are tried first.
const DEFAULT_FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttc",
    "/usr/share/fonts/opentype/noto/NotoSansCJKjp-Regular.otf",
    "/usr/share/fonts/truetype/takao-gothic/TakaoGothic.ttf",
    "/System/Library/Fonts/ヒラギノ角ゴシック W3.ttc",
    "C:/Windows/Fonts/msgothic.ttc",
    "C:/Windows/Fonts/meiryo.ttc",
];

#[derive(Clone)]
pub struct FontMetrics {
    data: Arc<Vec<u8>>,
    units_per_em: u16,
    space_advance: u16,
    family: Option<String>,
    face_index: u32,
}

impl FontMetrics {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }
}

/// Annotation font after resolution. `metrics` is `None` in the degraded
/// mode where no candidate loaded; widths are then estimated and the
/// renderer falls back to whatever face it has.
pub struct ResolvedFont {
    pub metrics: Option<FontMetrics>,
}

impl ResolvedFont {
    pub fn family(&self) -> Option<&str> {
        self.metrics.as_ref().and_then(FontMetrics::family)
    }
}

pub fn resolve_annotation_font(configured: &[String]) -> ResolvedFont {
    let candidates = configured
        .iter()
        .map(String::as_str)
        .chain(DEFAULT_FONT_CANDIDATES.iter().copied());

    for candidate in candidates {
        let path = Path::new(candidate);
        if !path.exists() {
            continue;
        }
        match load_font_metrics(path) {
            Ok(metrics) => {
                debug!("annotation font: {}", path.display());
                return ResolvedFont {
                    metrics: Some(metrics),
                };
            }
            Err(err) => debug!("skipping font candidate {}: {err:#}", path.display()),
        }
    }

    if let Ok(metrics) = load_system_sans() {
        return ResolvedFont {
            metrics: Some(metrics),
        };
    }

    warn!("no usable annotation font found; readings may render with fallback glyphs");
    ResolvedFont { metrics: None }
}

pub fn load_font_metrics(path: &Path) -> Result<FontMetrics> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    load_font_metrics_from_data(&data)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
}

/// Collections are probed face by face; the first parseable face wins.
fn load_font_metrics_from_data(data: &[u8]) -> Result<FontMetrics> {
    let count = ttf_parser::fonts_in_collection(data).unwrap_or(1);
    for index in 0..count {
        if let Ok(face) = Face::parse(data, index) {
            let family = extract_family_name(&face);
            let units_per_em = face.units_per_em().max(1);
            let space_advance = face
                .glyph_index(' ')
                .and_then(|id| face.glyph_hor_advance(id))
                .unwrap_or(units_per_em / 2);
            return Ok(FontMetrics {
                data: Arc::new(data.to_vec()),
                units_per_em,
                space_advance,
                family,
                face_index: index,
            });
        }
    }
    Err(anyhow!("no parseable face in font data"))
}

fn load_system_sans() -> Result<FontMetrics> {
    let mut db = fontdb::Database::new();
    db.load_system_fonts();
    let query = fontdb::Query {
        families: &[fontdb::Family::SansSerif],
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("no system sans-serif font"))?;
    let data = db
        .with_face_data(id, |data, _index| data.to_vec())
        .ok_or_else(|| anyhow!("failed to load system font data"))?;
    load_font_metrics_from_data(&data)
}

pub(super) fn measure_text_width_px(text: &str, font_size: f32, font: Option<&FontMetrics>) -> f32 {
    if let Some(font) = font {
        if let Ok(face) = Face::parse(&font.data, font.face_index) {
            let mut advance = 0u32;
            for ch in text.chars() {
                if ch == '\n' {
                    continue;
                }
                if ch == ' ' {
                    advance = advance.saturating_add(font.space_advance as u32);
                    continue;
                }
                if let Some(glyph) = face.glyph_index(ch) {
                    let glyph_advance = face.glyph_hor_advance(glyph).unwrap_or(font.space_advance);
                    advance = advance.saturating_add(glyph_advance as u32);
                } else {
                    advance = advance.saturating_add(font.space_advance as u32);
                }
            }
            let units = font.units_per_em.max(1) as f32;
            return advance as f32 * (font_size / units);
        }
    }
    estimate_text_width_units(text) * font_size
}

fn estimate_char_units_for_width(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_alphanumeric() {
        0.55
    } else if ch.is_ascii() {
        0.35
    } else if matches!(
        ch as u32,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0x31F0..=0x31FF
    ) {
        1.0
    } else {
        0.9
    }
}

fn estimate_text_width_units(text: &str) -> f32 {
    text.chars().map(estimate_char_units_for_width).sum()
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimated_widths_scale_with_font_size() {
        let narrow = measure_text_width_px("にほんご", 10.0, None);
        let wide = measure_text_width_px("にほんご", 20.0, None);
        assert!(wide > narrow);
        assert!((wide - narrow * 2.0).abs() < 0.001);
    }

    #[test]
    fn kana_estimates_wider_than_ascii() {
        let kana = measure_text_width_px("にほ", 12.0, None);
        let ascii = measure_text_width_px("ab", 12.0, None);
        assert!(kana > ascii);
    }

    #[test]
    fn missing_candidates_degrade_without_panicking() {
        let configured = vec!["/definitely/not/a/font.ttf".to_string()];
        // either a system face resolves or we get the degraded mode; both ok
        let _ = resolve_annotation_font(&configured);
    }
}
