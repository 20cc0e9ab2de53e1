use anyhow::Result;

use super::Fragment;

/// Detections at or below this confidence are recognizer noise; the
/// threshold is deliberately low so single kanji still get through.
const MIN_CONFIDENCE: f32 = 20.0;

/// Word-level rows (level 5) from `tesseract ... tsv` output.
pub(super) fn parse_tsv_fragments(tsv: &str) -> Result<Vec<Fragment>> {
    let mut fragments = Vec::new();

    for (idx, row) in tsv.lines().enumerate() {
        if idx == 0 {
            continue;
        }
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        let level: i32 = cols[0].parse().unwrap_or(0);
        if level != 5 {
            continue;
        }
        let left: u32 = cols[6].parse().unwrap_or(0);
        let top: u32 = cols[7].parse().unwrap_or(0);
        let width: u32 = cols[8].parse().unwrap_or(0);
        let height: u32 = cols[9].parse().unwrap_or(0);
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf <= MIN_CONFIDENCE {
            continue;
        }

        fragments.push(Fragment {
            text: text.to_string(),
            x: left,
            y: top,
            w: width,
            h: height,
            confidence: conf,
        });
    }

    Ok(fragments)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext";

    fn row(level: u32, left: u32, top: u32, conf: f32, text: &str) -> String {
        format!("{level}\t1\t1\t1\t1\t1\t{left}\t{top}\t60\t20\t{conf}\t{text}")
    }

    #[test]
    fn keeps_confident_word_rows_only() {
        let tsv = [
            HEADER.to_string(),
            row(4, 0, 0, -1.0, ""),
            row(5, 10, 50, 91.5, "日本語"),
            row(5, 90, 50, 12.0, "ノイズ"),
            row(5, 150, 50, 88.0, "勉強"),
        ]
        .join("\n");

        let fragments = parse_tsv_fragments(&tsv).expect("parse tsv");
        assert_eq!(fragments.len(), 2);
        assert_eq!(fragments[0].text, "日本語");
        assert_eq!(fragments[0].x, 10);
        assert_eq!(fragments[0].y, 50);
        assert_eq!(fragments[1].text, "勉強");
    }

    #[test]
    fn short_rows_are_ignored() {
        let tsv = format!("{HEADER}\n1\t1\t1\n");
        assert!(parse_tsv_fragments(&tsv).expect("parse tsv").is_empty());
    }
}
