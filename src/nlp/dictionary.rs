use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Word-to-gloss map loaded from a tab-separated JMdict-style export
/// (`word<TAB>gloss` per line, `#` comments). Entirely optional: a missing
/// or unreadable file degrades gloss quality, never the pipeline. Cloning
/// shares the loaded entries.
#[derive(Clone)]
pub struct Glossary {
    entries: Arc<HashMap<String, String>>,
}

impl Glossary {
    pub fn empty() -> Self {
        Self {
            entries: Arc::new(HashMap::new()),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read glossary: {}", path.display()))?;
        let mut entries = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((word, gloss)) = line.split_once('\t') else {
                continue;
            };
            let word = word.trim();
            let gloss = gloss.trim();
            if word.is_empty() || gloss.is_empty() {
                continue;
            }
            entries.insert(word.to_string(), gloss.to_string());
        }
        Ok(Self {
            entries: Arc::new(entries),
        })
    }

    pub fn open_or_empty(path: Option<&str>) -> Self {
        let Some(path) = path else {
            return Self::empty();
        };
        match Self::load(Path::new(path)) {
            Ok(glossary) => {
                info!("loaded {} glossary entries from {}", glossary.len(), path);
                glossary
            }
            Err(err) => {
                warn!("glossary unavailable, continuing without glosses: {err:#}");
                Self::empty()
            }
        }
    }

    pub fn lookup(&self, word: &str) -> Option<&str> {
        self.entries.get(word).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_tab_separated_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("glossary.tsv");
        fs::write(
            &path,
            "# JMdict excerpt\n日本語\tJapanese language\n水\twater\n\nbroken-line\n",
        )
        .expect("write glossary");

        let glossary = Glossary::load(&path).expect("load glossary");
        assert_eq!(glossary.len(), 2);
        assert_eq!(glossary.lookup("日本語"), Some("Japanese language"));
        assert_eq!(glossary.lookup("火"), None);
    }

    #[test]
    fn missing_file_degrades_to_empty() {
        let glossary = Glossary::open_or_empty(Some("/does/not/exist.tsv"));
        assert!(glossary.is_empty());
    }

    #[test]
    fn no_path_means_empty() {
        assert!(Glossary::open_or_empty(None).is_empty());
    }
}
