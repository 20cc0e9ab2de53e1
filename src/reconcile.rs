//! Matches OCR fragments (which have pixel positions but noisy text
//! boundaries) against tokenizer output (clean segmentation, no positions)
//! and produces one positioned annotation per distinct on-screen region.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::jp;
use crate::nlp::{self, Token};
use crate::ocr::Fragment;

/// A reconciled, positioned reading/gloss ready for rendering.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Annotation {
    pub source_text: String,
    pub reading: String,
    pub gloss: String,
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Outcome of the token search for one fragment. Indices point into the
/// token slice handed to the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TokenMatch {
    Exact(usize),
    Partial(usize),
    None,
}

/// Search all kanji-bearing tokens for the best match. Exact equality wins
/// outright and stops the scan. Otherwise the two containment cases compete
/// on a shared score with deliberately different units: a token containing
/// the fragment scores its own length (longest container wins, first found
/// on ties), while a token contained in the fragment scores the fragment's
/// length. The asymmetry is load-bearing; do not unify the two rules.
pub(crate) fn best_token_match(fragment_text: &str, tokens: &[Token]) -> TokenMatch {
    let fragment_len = fragment_text.chars().count();
    let mut best: Option<usize> = None;
    let mut best_score = 0usize;

    for (idx, token) in tokens.iter().enumerate() {
        if !token.contains_kanji {
            continue;
        }
        if token.text == fragment_text {
            return TokenMatch::Exact(idx);
        }
        if token.text.contains(fragment_text) {
            let score = token.text.chars().count();
            if score > best_score {
                best = Some(idx);
                best_score = score;
            }
        } else if fragment_text.contains(token.text.as_str()) {
            if fragment_len > best_score {
                best = Some(idx);
                best_score = fragment_len;
            }
        }
    }

    match best {
        Some(idx) => TokenMatch::Partial(idx),
        None => TokenMatch::None,
    }
}

/// Build annotations for every kanji-bearing fragment. At most one
/// annotation per `(x, y, text)` key; fragments whose reading cannot be
/// resolved at all are dropped. Referentially transparent over its inputs.
pub fn reconcile(
    fragments: &[Fragment],
    tokens: &[Token],
    vocabulary: &HashMap<String, String>,
) -> Vec<Annotation> {
    let mut seen: HashSet<(u32, u32, String)> = HashSet::new();
    let mut annotations = Vec::new();

    for fragment in fragments {
        let key = (fragment.x, fragment.y, fragment.text.clone());
        if seen.contains(&key) {
            continue;
        }
        if !jp::contains_kanji(&fragment.text) {
            continue;
        }

        match best_token_match(&fragment.text, tokens) {
            TokenMatch::Exact(idx) | TokenMatch::Partial(idx) => {
                let token = &tokens[idx];
                let gloss = vocabulary
                    .get(&token.text)
                    .cloned()
                    .unwrap_or_else(|| token.gloss.clone());
                debug!("matched '{}' -> token '{}'", fragment.text, token.text);
                annotations.push(Annotation {
                    source_text: fragment.text.clone(),
                    reading: token.hiragana.clone(),
                    gloss,
                    x: fragment.x,
                    y: fragment.y,
                    w: fragment.w,
                    h: fragment.h,
                });
                seen.insert(key);
            }
            TokenMatch::None => match nlp::reading(&fragment.text) {
                Ok(reading) => {
                    debug!("no token match for '{}', using direct reading", fragment.text);
                    annotations.push(Annotation {
                        source_text: fragment.text.clone(),
                        reading: reading.hiragana,
                        gloss: String::new(),
                        x: fragment.x,
                        y: fragment.y,
                        w: fragment.w,
                        h: fragment.h,
                    });
                    seen.insert(key);
                }
                Err(err) => {
                    debug!("dropping fragment '{}': {err:#}", fragment.text);
                }
            },
        }
    }

    annotations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(text: &str, x: u32, y: u32) -> Fragment {
        Fragment {
            text: text.to_string(),
            x,
            y,
            w: 60,
            h: 20,
            confidence: 90.0,
        }
    }

    fn token(text: &str, hiragana: &str, gloss: &str) -> Token {
        Token {
            text: text.to_string(),
            part_of_speech: "名詞".to_string(),
            hiragana: hiragana.to_string(),
            katakana: crate::jp::hiragana_to_katakana(hiragana),
            romaji: String::new(),
            contains_kanji: crate::jp::contains_kanji(text),
            gloss: gloss.to_string(),
        }
    }

    #[test]
    fn kana_only_fragments_produce_no_annotation() {
        let fragments = vec![fragment("たべる", 10, 10), fragment("。", 80, 10)];
        let tokens = vec![token("食べる", "たべる", "to eat")];
        assert!(reconcile(&fragments, &tokens, &HashMap::new()).is_empty());
    }

    #[test]
    fn exact_match_beats_substring_matches() {
        let fragments = vec![fragment("日本", 10, 10)];
        // the containing token comes first; the exact one must still win
        let tokens = vec![
            token("日本語", "にほんご", ""),
            token("日本", "にほん", "Japan"),
        ];
        let annotations = reconcile(&fragments, &tokens, &HashMap::new());
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].reading, "にほん");
        assert_eq!(annotations[0].gloss, "Japan");
    }

    #[test]
    fn containing_token_prefers_the_longest() {
        let tokens = vec![
            token("日本語の", "にほんごの", ""),
            token("日本語能力試験", "にほんごのうりょくしけん", ""),
        ];
        match best_token_match("日本語", &tokens) {
            TokenMatch::Partial(idx) => assert_eq!(idx, 1),
            other => panic!("expected partial match, got {other:?}"),
        }
    }

    #[test]
    fn contained_token_scores_on_fragment_length() {
        // the fragment (4 chars) contains the 2-char token; the candidate
        // score is the fragment length, so a later 3-char containing token
        // cannot displace it
        let tokens = vec![
            token("勉強", "べんきょう", "study"),
            token("勉強中だ", "べんきょうちゅうだ", ""),
        ];
        match best_token_match("毎日勉強中", &tokens) {
            TokenMatch::Partial(idx) => assert_eq!(idx, 0),
            other => panic!("expected partial match, got {other:?}"),
        }
    }

    #[test]
    fn kana_only_tokens_are_never_match_candidates() {
        let tokens = vec![token("にほん", "にほん", "")];
        assert_eq!(best_token_match("日本", &tokens), TokenMatch::None);
    }

    #[test]
    fn duplicate_positions_are_annotated_once() {
        let fragments = vec![
            fragment("日本語", 10, 50),
            fragment("日本語", 10, 50),
            fragment("日本語", 10, 120),
        ];
        let tokens = vec![token("日本語", "にほんご", "")];
        let annotations = reconcile(&fragments, &tokens, &HashMap::new());
        assert_eq!(annotations.len(), 2);
        let keys: HashSet<_> = annotations
            .iter()
            .map(|a| (a.x, a.y, a.source_text.clone()))
            .collect();
        assert_eq!(keys.len(), annotations.len());
    }

    #[test]
    fn vocabulary_gloss_wins_over_token_gloss() {
        let fragments = vec![fragment("日本語", 10, 50)];
        let tokens = vec![token("日本語", "にほんご", "stale gloss")];
        let mut vocabulary = HashMap::new();
        vocabulary.insert("日本語".to_string(), "Japanese language".to_string());
        let annotations = reconcile(&fragments, &tokens, &vocabulary);
        assert_eq!(annotations[0].gloss, "Japanese language");
    }

    #[test]
    fn unmatched_fragment_falls_back_to_direct_reading() {
        let fragments = vec![fragment("水", 10, 10)];
        let annotations = reconcile(&fragments, &[], &HashMap::new());
        assert_eq!(annotations.len(), 1);
        let expected = nlp::reading("水").expect("reading");
        assert_eq!(annotations[0].reading, expected.hiragana);
        assert_eq!(annotations[0].gloss, "");
    }

    #[test]
    fn unresolvable_fallback_is_swallowed() {
        let fragments = vec![fragment("龘", 10, 10)];
        assert!(reconcile(&fragments, &[], &HashMap::new()).is_empty());
    }

    #[test]
    fn end_to_end_exact_match_scenario() {
        let fragments = vec![fragment("日本語", 10, 50)];
        let tokens = vec![token("日本語", "にほんご", "")];
        let mut vocabulary = HashMap::new();
        vocabulary.insert("日本語".to_string(), "Japanese language".to_string());

        let annotations = reconcile(&fragments, &tokens, &vocabulary);
        assert_eq!(
            annotations,
            vec![Annotation {
                source_text: "日本語".to_string(),
                reading: "にほんご".to_string(),
                gloss: "Japanese language".to_string(),
                x: 10,
                y: 50,
                w: 60,
                h: 20,
            }]
        );
    }
}
