use anyhow::{anyhow, Context, Result};
use std::io::Write;
use std::process::{Command, Stdio};

#[derive(Debug)]
pub(super) struct MecabToken {
    pub(super) surface: String,
    pub(super) part_of_speech: String,
    pub(super) reading: Option<String>,
}

pub(super) fn run_mecab(text: &str) -> Result<String> {
    let mut child = Command::new("mecab")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| "failed to run mecab (is it installed?)")?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("mecab stdin unavailable"))?;
    stdin
        .write_all(text.as_bytes())
        .with_context(|| "failed to write text to mecab")?;
    drop(stdin);

    let output = child
        .wait_with_output()
        .with_context(|| "failed to read mecab output")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("mecab failed: {}", stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// ipadic feature CSV: part of speech in field 0, katakana reading in
/// field 7. Unknown words carry "*" or a short feature list.
pub(super) fn parse_output(raw: &str) -> Vec<MecabToken> {
    let mut tokens = Vec::new();
    for line in raw.lines() {
        let line = line.trim_end();
        if line.is_empty() || line == "EOS" {
            continue;
        }
        let Some((surface, features)) = line.split_once('\t') else {
            continue;
        };
        let surface = surface.trim();
        if surface.is_empty() {
            continue;
        }
        let fields = features.split(',').collect::<Vec<_>>();
        let part_of_speech = fields.first().map(|v| v.trim()).unwrap_or("").to_string();
        let reading = fields
            .get(7)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty() && *v != "*")
            .map(str::to_string);
        tokens.push(MecabToken {
            surface: surface.to_string(),
            part_of_speech,
            reading,
        });
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ipadic_lines_until_eos() {
        let raw = "日本語\t名詞,一般,*,*,*,*,日本語,ニホンゴ,ニホンゴ\n\
                   を\t助詞,格助詞,一般,*,*,*,を,ヲ,ヲ\n\
                   EOS\n";
        let tokens = parse_output(raw);
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].surface, "日本語");
        assert_eq!(tokens[0].part_of_speech, "名詞");
        assert_eq!(tokens[0].reading.as_deref(), Some("ニホンゴ"));
        assert_eq!(tokens[1].surface, "を");
    }

    #[test]
    fn unknown_words_have_no_reading() {
        let raw = "ボカロ\t名詞,固有名詞,一般,*,*,*,*\nEOS\n";
        let tokens = parse_output(raw);
        assert_eq!(tokens.len(), 1);
        assert!(tokens[0].reading.is_none());
    }

    #[test]
    fn star_reading_is_treated_as_missing() {
        let raw = "謎語\t名詞,一般,*,*,*,*,謎語,*,*\nEOS\n";
        let tokens = parse_output(raw);
        assert!(tokens[0].reading.is_none());
    }
}
