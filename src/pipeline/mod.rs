//! Sequences the stages against one processing record: extraction →
//! tokenization → reconciliation → layout, with the analysis branch running
//! independently off the full text and joined before the report is built.

mod record;
mod report;

use anyhow::{anyhow, Result};
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

use crate::analyze::{Analysis, Analyzer};
use crate::layout::LayoutEngine;
use crate::nlp::{Glossary, Tokenizer};
use crate::ocr;
use crate::reconcile::reconcile;
use crate::settings::Settings;
use crate::storage::Storage;

pub use record::{ProcessingRecord, Tokenization};
pub use report::{build_report, failure_report, FailureReport, Report};

pub(crate) use report::now_rfc3339;

pub struct Pipeline {
    ocr_languages: String,
    tokenizer: Tokenizer,
    analyzer: Analyzer,
    layout: LayoutEngine,
    storage: Storage,
}

impl Pipeline {
    /// Service construction happens here, once, at startup; stages receive
    /// their collaborators explicitly instead of reaching for globals.
    pub fn new(settings: &Settings) -> Self {
        let glossary = Glossary::open_or_empty(settings.glossary_path.as_deref());
        Self {
            ocr_languages: settings.ocr_languages.clone(),
            tokenizer: Tokenizer::new(glossary),
            analyzer: Analyzer::new(settings),
            layout: LayoutEngine::new(settings),
            storage: Storage::new(settings),
        }
    }

    /// Run one image through all stages. Degradable collaborator failures
    /// (OCR, tokenizer, dictionary, analysis) are absorbed along the way;
    /// an error here means a violated invariant (undecodable image, bad
    /// buffer shape, unwritable output) and the caller should surface a
    /// structured failure instead of a partial result.
    pub async fn process(&self, image_path: &Path) -> Result<Report> {
        let started = Instant::now();
        let started_at = report::now_rfc3339();
        info!("processing {}", image_path.display());

        let extraction = {
            let path = image_path.to_path_buf();
            let languages = self.ocr_languages.clone();
            tokio::task::spawn_blocking(move || ocr::extract(&path, &languages))
                .await
                .map_err(|err| anyhow!("extraction task failed: {err}"))??
        };

        // independent failure domain: only needs the full text, so it runs
        // while the main branch reconciles and renders
        let analyzer_task = tokio::spawn({
            let analyzer = self.analyzer.clone();
            let text = extraction.full_text.clone();
            async move { analyzer.analyze(&text).await }
        });

        let tokenization = {
            let tokenizer = self.tokenizer.clone();
            let text = extraction.full_text.clone();
            match tokio::task::spawn_blocking(move || tokenizer.tokenize(&text)).await {
                Ok(Ok(tokens)) => Tokenization::new(tokens),
                Ok(Err(err)) => {
                    warn!("tokenization failed, continuing without tokens: {err:#}");
                    Tokenization::new(Vec::new())
                }
                Err(err) => {
                    warn!("tokenization task failed: {err}");
                    Tokenization::new(Vec::new())
                }
            }
        };

        let annotations = reconcile(
            &extraction.fragments,
            &tokenization.tokens,
            &tokenization.vocabulary,
        );
        info!("reconciled {} annotations", annotations.len());

        let rendered = self.layout.annotate(&extraction.image, &annotations)?;
        let annotated_path = self.storage.save(&rendered)?;
        info!("saved annotated image: {annotated_path}");

        let analysis = match analyzer_task.await {
            Ok(analysis) => analysis,
            Err(err) => {
                warn!("analysis task failed: {err}");
                Analysis::unavailable()
            }
        };

        let record = ProcessingRecord {
            source_path: image_path.to_path_buf(),
            started_at,
            extraction,
            tokenization,
            annotations,
            annotated_path,
            analysis,
            elapsed: started.elapsed(),
        };

        Ok(report::build_report(&record))
    }
}
