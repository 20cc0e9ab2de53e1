use serde::Serialize;
use std::collections::HashSet;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::record::ProcessingRecord;
use crate::reconcile::Annotation;

const MAX_VOCABULARY_ENTRIES: usize = 100;

#[derive(Debug, Serialize)]
pub struct Report {
    pub success: bool,
    pub timestamp: String,
    pub processing_time: String,
    pub extracted_text: ExtractedText,
    pub vocabulary: Vec<VocabularyEntry>,
    pub analysis: AnalysisSection,
    pub annotated_image: String,
    pub stats: Stats,
}

#[derive(Debug, Serialize)]
pub struct ExtractedText {
    pub full_text: String,
    pub character_count: usize,
    pub elements_count: usize,
    pub lines_count: usize,
}

#[derive(Debug, Serialize)]
pub struct VocabularyEntry {
    pub text: String,
    pub reading: String,
    pub gloss: String,
}

#[derive(Debug, Serialize)]
pub struct AnalysisSection {
    pub translation: String,
    pub grammar_patterns: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct Stats {
    pub total_annotations: usize,
    pub vocabulary_words: usize,
    pub grammar_patterns: usize,
}

#[derive(Debug, Serialize)]
pub struct FailureReport {
    pub success: bool,
    pub error: String,
    pub timestamp: String,
}

pub fn build_report(record: &ProcessingRecord) -> Report {
    let vocabulary = collect_vocabulary(&record.annotations);
    let vocabulary_words = vocabulary.len();
    let capped = vocabulary
        .into_iter()
        .take(MAX_VOCABULARY_ENTRIES)
        .collect::<Vec<_>>();

    Report {
        success: true,
        timestamp: record.started_at.clone(),
        processing_time: format!("{:.3}s", record.elapsed.as_secs_f64()),
        extracted_text: ExtractedText {
            full_text: record.extraction.full_text.clone(),
            character_count: record.extraction.full_text.chars().count(),
            elements_count: record.extraction.fragments.len(),
            lines_count: record.extraction.lines.len(),
        },
        vocabulary: capped,
        analysis: AnalysisSection {
            translation: record.analysis.translation.clone(),
            grammar_patterns: record.analysis.grammar_patterns.clone(),
        },
        annotated_image: record.annotated_path.clone(),
        stats: Stats {
            total_annotations: record.annotations.len(),
            vocabulary_words,
            grammar_patterns: record.analysis.grammar_patterns.len(),
        },
    }
}

pub fn failure_report(error: &str) -> FailureReport {
    FailureReport {
        success: false,
        error: error.to_string(),
        timestamp: now_rfc3339(),
    }
}

pub(crate) fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Distinct glossed annotations, in annotation order.
fn collect_vocabulary(annotations: &[Annotation]) -> Vec<VocabularyEntry> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut entries = Vec::new();
    for annotation in annotations {
        if annotation.gloss.trim().is_empty() {
            continue;
        }
        if !seen.insert(annotation.source_text.as_str()) {
            continue;
        }
        entries.push(VocabularyEntry {
            text: annotation.source_text.clone(),
            reading: annotation.reading.clone(),
            gloss: annotation.gloss.clone(),
        });
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation(text: &str, gloss: &str, y: u32) -> Annotation {
        Annotation {
            source_text: text.to_string(),
            reading: "よみ".to_string(),
            gloss: gloss.to_string(),
            x: 0,
            y,
            w: 10,
            h: 10,
        }
    }

    #[test]
    fn vocabulary_dedups_and_skips_empty_glosses() {
        let annotations = vec![
            annotation("日本語", "Japanese language", 0),
            annotation("日本語", "Japanese language", 40),
            annotation("勉強", "", 80),
        ];
        let entries = collect_vocabulary(&annotations);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].text, "日本語");
    }

    #[test]
    fn report_caps_vocabulary_but_counts_everything() {
        let annotations: Vec<Annotation> = (0..120)
            .map(|idx| annotation(&format!("語{idx}"), "gloss", idx))
            .collect();
        let record = ProcessingRecord {
            source_path: std::path::PathBuf::from("input.png"),
            started_at: now_rfc3339(),
            extraction: crate::ocr::Extraction {
                image: image::DynamicImage::ImageRgb8(image::RgbImage::new(1, 1)),
                fragments: Vec::new(),
                lines: Vec::new(),
                full_text: "語".to_string(),
            },
            tokenization: super::super::record::Tokenization::new(Vec::new()),
            annotations,
            annotated_path: "annotated_test.png".to_string(),
            analysis: crate::analyze::Analysis::unavailable(),
            elapsed: std::time::Duration::from_millis(1234),
        };
        let report = build_report(&record);
        assert!(report.success);
        assert_eq!(report.vocabulary.len(), 100);
        assert_eq!(report.stats.vocabulary_words, 120);
        assert_eq!(report.stats.total_annotations, 120);
        assert_eq!(report.processing_time, "1.234s");
    }

    #[test]
    fn failure_report_is_flagged_and_timestamped() {
        let failure = failure_report("boom");
        assert!(!failure.success);
        assert_eq!(failure.error, "boom");
        assert!(failure.timestamp.contains('T'));
    }
}
