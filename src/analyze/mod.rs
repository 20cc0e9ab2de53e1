//! Natural-language analysis of the full extracted text: translation plus
//! grammar notes from an OpenAI-compatible chat-completions endpoint. Every
//! failure mode here degrades to the unavailable sentinel; this stage can
//! never fail a request.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tera::{Context as TeraContext, Tera};
use tracing::{info, warn};

use crate::settings::Settings;

pub const UNAVAILABLE_TRANSLATION: &str = "Analysis unavailable";

const SYSTEM_PROMPT: &str = "You are an expert Japanese teacher. Provide translation and \
grammar explanations for language learners.";

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Analysis {
    pub translation: String,
    pub grammar_patterns: Vec<String>,
}

impl Analysis {
    pub fn unavailable() -> Self {
        Self {
            translation: UNAVAILABLE_TRANSLATION.to_string(),
            grammar_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Analyzer {
    key: Option<String>,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl Analyzer {
    pub fn new(settings: &Settings) -> Self {
        let key = std::env::var(&settings.analyzer_api_key_env)
            .ok()
            .filter(|value| !value.trim().is_empty());
        if key.is_none() {
            warn!(
                "{} is not set; analysis will be unavailable",
                settings.analyzer_api_key_env
            );
        }
        Self {
            key,
            model: settings.analyzer_model.clone(),
            base_url: settings.analyzer_base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(settings.analyzer_timeout_secs),
        }
    }

    pub async fn analyze(&self, text: &str) -> Analysis {
        match self.request_analysis(text).await {
            Ok(analysis) => {
                info!(
                    "analysis complete: {} grammar patterns",
                    analysis.grammar_patterns.len()
                );
                analysis
            }
            Err(err) => {
                warn!("analysis unavailable: {err:#}");
                Analysis::unavailable()
            }
        }
    }

    async fn request_analysis(&self, text: &str) -> Result<Analysis> {
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| anyhow!("no analyzer API key configured"))?;
        if text.trim().is_empty() {
            return Err(anyhow!("no text to analyze"));
        }

        let prompt = render_analysis_prompt(text)?;
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .with_context(|| "failed to build analyzer HTTP client")?;
        let url = format!("{}/chat/completions", self.base_url);
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": prompt}
            ],
            "temperature": 0.3,
            "max_tokens": 5000
        });

        let response = client
            .post(&url)
            .bearer_auth(key)
            .json(&payload)
            .send()
            .await
            .with_context(|| "analyzer request failed")?;
        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| "failed to read analyzer response")?;
        if !status.is_success() {
            return Err(anyhow!("analyzer returned {}: {}", status, body.trim()));
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).with_context(|| "unexpected analyzer response shape")?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(anyhow!("analyzer returned empty content"));
        }

        Ok(parse_analysis_text(&content))
    }
}

pub fn render_analysis_prompt(text: &str) -> Result<String> {
    let template = include_str!("prompts/analysis_prompt.tera");
    let mut context = TeraContext::new();
    context.insert("text", text);
    Tera::one_off(template, &context, false).with_context(|| "failed to render analysis prompt")
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

enum Section {
    None,
    Translation,
    Grammar,
}

/// Walk the TRANSLATION / GRAMMAR_PATTERNS sections of the model output.
/// Translation lines skip headers, bullets and bracketed placeholders;
/// grammar bullets are stripped of markdown emphasis. If no translation
/// line survives, the first paragraph of the whole response is used.
pub(crate) fn parse_analysis_text(response: &str) -> Analysis {
    let mut section = Section::None;
    let mut translation_lines: Vec<&str> = Vec::new();
    let mut patterns: Vec<String> = Vec::new();

    for line in response.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let upper = line.to_uppercase();
        if upper.contains("TRANSLATION") {
            section = Section::Translation;
            continue;
        }
        if upper.contains("GRAMMAR") {
            section = Section::Grammar;
            continue;
        }

        match section {
            Section::Translation => {
                if !line.starts_with('-')
                    && !line.contains(':')
                    && !line.contains('[')
                    && !line.contains(']')
                {
                    translation_lines.push(line);
                }
            }
            Section::Grammar => {
                if let Some(rest) = line.strip_prefix('-') {
                    let cleaned = rest.trim().replace("**", "").replace('*', "");
                    let cleaned = cleaned.trim();
                    if !cleaned.is_empty() && !cleaned.starts_with('[') {
                        patterns.push(cleaned.to_string());
                    }
                }
            }
            Section::None => {}
        }
    }

    let mut translation = translation_lines.join(" ");
    if translation.is_empty() {
        translation = response
            .split("\n\n")
            .map(str::trim)
            .find(|paragraph| !paragraph.is_empty())
            .unwrap_or("")
            .to_string();
    }

    Analysis {
        translation,
        grammar_patterns: patterns,
    }
}
