use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::analyze::Analysis;
use crate::nlp::Token;
use crate::ocr::Extraction;
use crate::reconcile::Annotation;

/// Tokenization stage output: the token stream plus the vocabulary map
/// built once from every kanji-bearing token that carries a gloss.
pub struct Tokenization {
    pub tokens: Vec<Token>,
    pub vocabulary: HashMap<String, String>,
}

impl Tokenization {
    pub fn new(tokens: Vec<Token>) -> Self {
        let vocabulary = tokens
            .iter()
            .filter(|token| token.contains_kanji && !token.gloss.trim().is_empty())
            .map(|token| (token.text.clone(), token.gloss.clone()))
            .collect();
        Self { tokens, vocabulary }
    }
}

/// The completed processing state for one request. Each block is produced
/// exactly once by its owning stage; the controller binds every stage
/// output to an immutable local and assembles the record only after the
/// last stage, so no stage can rewrite a predecessor's output.
pub struct ProcessingRecord {
    pub source_path: PathBuf,
    pub started_at: String,
    pub extraction: Extraction,
    pub tokenization: Tokenization,
    pub annotations: Vec<Annotation>,
    pub annotated_path: String,
    pub analysis: Analysis,
    pub elapsed: Duration,
}
