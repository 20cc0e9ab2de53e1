mod parse;
mod tesseract;

use anyhow::{Context, Result};
use image::DynamicImage;
use std::path::Path;
use tracing::{info, warn};

pub use tesseract::list_tesseract_languages;

/// One OCR-detected text region in pixel space, top-left origin.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Fragment {
    pub text: String,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub confidence: f32,
}

#[derive(Debug)]
pub struct Extraction {
    pub image: DynamicImage,
    pub fragments: Vec<Fragment>,
    pub lines: Vec<Vec<Fragment>>,
    pub full_text: String,
}

/// Vertical band within which two detections count as the same line.
const SAME_LINE_BAND_PX: u32 = 15;

/// Decode the image and run OCR over it. An undecodable image is an error
/// (the rest of the pipeline needs the buffer); a failing OCR run degrades
/// to an empty fragment list.
pub fn extract(image_path: &Path, ocr_languages: &str) -> Result<Extraction> {
    let image = image::open(image_path)
        .with_context(|| format!("failed to decode image: {}", image_path.display()))?;

    let fragments = match run_ocr(image_path, ocr_languages) {
        Ok(fragments) => fragments,
        Err(err) => {
            warn!("text extraction failed, continuing without fragments: {err:#}");
            Vec::new()
        }
    };

    let fragments = collapse_duplicates(fragments);
    let lines = group_into_lines(&fragments);
    let full_text = fragments
        .iter()
        .map(|fragment| fragment.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    info!(
        "extracted {} fragments in {} lines ({} chars)",
        fragments.len(),
        lines.len(),
        full_text.chars().count()
    );

    Ok(Extraction {
        image,
        fragments,
        lines,
        full_text,
    })
}

fn run_ocr(image_path: &Path, ocr_languages: &str) -> Result<Vec<Fragment>> {
    let languages = tesseract::normalize_ocr_languages(ocr_languages)?;
    let tsv = tesseract::run_tesseract_tsv(image_path, &languages)?;
    parse::parse_tsv_fragments(&tsv)
}

/// Consecutive detections carrying the same text within the same vertical
/// band are near-certain duplicates from the recognizer and are collapsed.
/// Duplicates at other positions are kept; the reconciler dedups those by
/// position key.
fn collapse_duplicates(fragments: Vec<Fragment>) -> Vec<Fragment> {
    let mut kept: Vec<Fragment> = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        if let Some(prev) = kept.last() {
            let dy = prev.y.abs_diff(fragment.y);
            if prev.text == fragment.text && dy < SAME_LINE_BAND_PX {
                continue;
            }
        }
        kept.push(fragment);
    }
    kept
}

fn group_into_lines(fragments: &[Fragment]) -> Vec<Vec<Fragment>> {
    if fragments.is_empty() {
        return Vec::new();
    }

    let mut sorted: Vec<Fragment> = fragments.to_vec();
    sorted.sort_by_key(|fragment| (fragment.y, fragment.x));

    let mut lines: Vec<Vec<Fragment>> = Vec::new();
    let mut current: Vec<Fragment> = Vec::new();
    let mut current_y = 0u32;

    for fragment in sorted {
        if current.is_empty() {
            current_y = fragment.y;
            current.push(fragment);
            continue;
        }
        if fragment.y.abs_diff(current_y) < SAME_LINE_BAND_PX {
            current.push(fragment);
        } else {
            current.sort_by_key(|fragment| fragment.x);
            lines.push(std::mem::take(&mut current));
            current_y = fragment.y;
            current.push(fragment);
        }
    }
    if !current.is_empty() {
        current.sort_by_key(|fragment| fragment.x);
        lines.push(current);
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(text: &str, x: u32, y: u32) -> Fragment {
        Fragment {
            text: text.to_string(),
            x,
            y,
            w: 20,
            h: 12,
            confidence: 90.0,
        }
    }

    #[test]
    fn consecutive_same_line_duplicates_collapse() {
        let fragments = vec![
            fragment("日本", 10, 40),
            fragment("日本", 80, 44),
            fragment("日本", 10, 120),
        ];
        let kept = collapse_duplicates(fragments);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].y, 120);
    }

    #[test]
    fn different_text_on_same_line_is_kept() {
        let fragments = vec![fragment("日本", 10, 40), fragment("語", 40, 42)];
        assert_eq!(collapse_duplicates(fragments).len(), 2);
    }

    #[test]
    fn lines_group_by_vertical_band_and_sort_by_x() {
        let fragments = vec![
            fragment("b", 60, 42),
            fragment("a", 10, 40),
            fragment("c", 10, 90),
        ];
        let lines = group_into_lines(&fragments);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0][0].text, "a");
        assert_eq!(lines[0][1].text, "b");
        assert_eq!(lines[1][0].text, "c");
    }
}
