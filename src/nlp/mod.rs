mod dictionary;
mod mecab;

use anyhow::{anyhow, Result};
use tracing::info;

use crate::jp;

pub use dictionary::Glossary;

/// One linguistically segmented unit of the full extracted text. Carries no
/// pixel position; that asymmetry is what the reconciler resolves.
#[derive(Debug, Clone)]
pub struct Token {
    pub text: String,
    pub part_of_speech: String,
    pub hiragana: String,
    pub katakana: String,
    pub romaji: String,
    pub contains_kanji: bool,
    pub gloss: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub hiragana: String,
    pub katakana: String,
    pub romaji: String,
}

/// Phonetic reading of a text fragment, independent of any tokenization.
/// Pure function of its input. Fails when conversion leaves ideographs
/// unresolved (characters outside the conversion dictionary).
pub fn reading(text: &str) -> Result<Reading> {
    let converted = kakasi::convert(text);
    if converted.hiragana.trim().is_empty() || jp::contains_kanji(&converted.hiragana) {
        return Err(anyhow!("no reading available for '{}'", text));
    }
    Ok(Reading {
        katakana: jp::hiragana_to_katakana(&converted.hiragana),
        hiragana: converted.hiragana,
        romaji: converted.romaji,
    })
}

#[derive(Clone)]
pub struct Tokenizer {
    glossary: Glossary,
}

impl Tokenizer {
    pub fn new(glossary: Glossary) -> Self {
        Self { glossary }
    }

    /// Segment the full extracted text into tokens with readings and
    /// glosses. The morphological analysis itself is delegated to mecab;
    /// a missing or failing binary surfaces as an error that the pipeline
    /// degrades to an empty token list.
    pub fn tokenize(&self, text: &str) -> Result<Vec<Token>> {
        let raw = mecab::run_mecab(text)?;
        let tokens = mecab::parse_output(&raw)
            .into_iter()
            .map(|parsed| self.build_token(parsed))
            .collect::<Vec<_>>();

        let kanji_count = tokens.iter().filter(|token| token.contains_kanji).count();
        info!("tokenized {} tokens ({} with kanji)", tokens.len(), kanji_count);

        Ok(tokens)
    }

    fn build_token(&self, parsed: mecab::MecabToken) -> Token {
        let contains_kanji = jp::contains_kanji(&parsed.surface);
        // mecab readings come in katakana; unknown words carry none and
        // fall back to the standalone reading lookup.
        let hiragana = match parsed.reading {
            Some(katakana) => jp::katakana_to_hiragana(&katakana),
            None => reading(&parsed.surface)
                .map(|reading| reading.hiragana)
                .unwrap_or_default(),
        };
        let katakana = jp::hiragana_to_katakana(&hiragana);
        let romaji = kakasi::convert(&parsed.surface).romaji;
        let gloss = if contains_kanji {
            self.glossary
                .lookup(&parsed.surface)
                .unwrap_or_default()
                .to_string()
        } else {
            String::new()
        };

        Token {
            text: parsed.surface,
            part_of_speech: parsed.part_of_speech,
            hiragana,
            katakana,
            romaji,
            contains_kanji,
            gloss,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_converts_common_kanji() {
        let reading = reading("水").expect("reading");
        assert_eq!(reading.hiragana, "みず");
        assert_eq!(reading.katakana, "ミズ");
        assert!(!reading.romaji.is_empty());
    }

    #[test]
    fn reading_passes_kana_through() {
        let reading = reading("てすと").expect("reading");
        assert_eq!(reading.hiragana, "てすと");
    }

    #[test]
    fn reading_fails_on_unresolved_ideographs() {
        assert!(reading("龘").is_err());
    }

    #[test]
    fn tokens_built_from_parsed_mecab_output() {
        let tokenizer = Tokenizer::new(Glossary::empty());
        let parsed = mecab::MecabToken {
            surface: "日本語".to_string(),
            part_of_speech: "名詞".to_string(),
            reading: Some("ニホンゴ".to_string()),
        };
        let token = tokenizer.build_token(parsed);
        assert!(token.contains_kanji);
        assert_eq!(token.hiragana, "にほんご");
        assert_eq!(token.katakana, "ニホンゴ");
        assert_eq!(token.gloss, "");
    }
}
