use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

#[derive(Debug, Clone)]
pub struct Settings {
    pub ocr_languages: String,
    pub overlay_text_color: String,
    pub overlay_gloss_color: String,
    pub overlay_fill_color: String,
    pub overlay_font_size: Option<f32>,
    pub overlay_font_paths: Vec<String>,
    pub banner_title: String,
    pub analyzer_model: String,
    pub analyzer_api_key_env: String,
    pub analyzer_base_url: String,
    pub analyzer_timeout_secs: u64,
    pub output_dir: String,
    pub retention_secs: u64,
    pub glossary_path: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ocr_languages: "jpn".to_string(),
            overlay_text_color: "#dc0000".to_string(),
            overlay_gloss_color: "#0064c8".to_string(),
            overlay_fill_color: "#ffffff".to_string(),
            overlay_font_size: None,
            overlay_font_paths: Vec::new(),
            banner_title: "Reading annotations".to_string(),
            analyzer_model: "llama-3.3-70b-versatile".to_string(),
            analyzer_api_key_env: "GROQ_API_KEY".to_string(),
            analyzer_base_url: "https://api.groq.com/openai/v1".to_string(),
            analyzer_timeout_secs: 60,
            output_dir: ".".to_string(),
            retention_secs: 3600,
            glossary_path: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    ocr: Option<OcrSettings>,
    overlay: Option<OverlaySettings>,
    analyzer: Option<AnalyzerSettings>,
    storage: Option<StorageSettings>,
    dictionary: Option<DictionarySettings>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSettings {
    languages: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OverlaySettings {
    text_color: Option<String>,
    gloss_color: Option<String>,
    fill_color: Option<String>,
    font_size: Option<f32>,
    font_paths: Option<Vec<String>>,
    banner_title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AnalyzerSettings {
    model: Option<String>,
    api_key_env: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StorageSettings {
    output_dir: Option<String>,
    retention_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DictionarySettings {
    glossary_path: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = home_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    Ok(settings)
}

impl Settings {
    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(ocr) = incoming.ocr {
            if let Some(languages) = ocr.languages {
                if !languages.trim().is_empty() {
                    self.ocr_languages = languages;
                }
            }
        }
        if let Some(overlay) = incoming.overlay {
            if let Some(color) = overlay.text_color {
                if !color.trim().is_empty() {
                    self.overlay_text_color = color;
                }
            }
            if let Some(color) = overlay.gloss_color {
                if !color.trim().is_empty() {
                    self.overlay_gloss_color = color;
                }
            }
            if let Some(color) = overlay.fill_color {
                if !color.trim().is_empty() {
                    self.overlay_fill_color = color;
                }
            }
            if let Some(size) = overlay.font_size {
                if size > 0.0 {
                    self.overlay_font_size = Some(size);
                }
            }
            if let Some(paths) = overlay.font_paths {
                self.overlay_font_paths = paths;
            }
            if let Some(title) = overlay.banner_title {
                if !title.trim().is_empty() {
                    self.banner_title = title;
                }
            }
        }
        if let Some(analyzer) = incoming.analyzer {
            if let Some(model) = analyzer.model {
                if !model.trim().is_empty() {
                    self.analyzer_model = model;
                }
            }
            if let Some(env) = analyzer.api_key_env {
                if !env.trim().is_empty() {
                    self.analyzer_api_key_env = env;
                }
            }
            if let Some(url) = analyzer.base_url {
                if !url.trim().is_empty() {
                    self.analyzer_base_url = url;
                }
            }
            if let Some(secs) = analyzer.timeout_secs {
                if secs > 0 {
                    self.analyzer_timeout_secs = secs;
                }
            }
        }
        if let Some(storage) = incoming.storage {
            if let Some(dir) = storage.output_dir {
                if !dir.trim().is_empty() {
                    self.output_dir = dir;
                }
            }
            if let Some(secs) = storage.retention_secs {
                if secs > 0 {
                    self.retention_secs = secs;
                }
            }
        }
        if let Some(dictionary) = incoming.dictionary {
            if let Some(path) = dictionary.glossary_path {
                if !path.trim().is_empty() {
                    self.glossary_path = Some(path);
                }
            }
        }
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = home_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().and_then(|home| {
        let home = home.trim();
        if home.is_empty() {
            None
        } else {
            Some(Path::new(home).join(".furigana-annotator-rust"))
        }
    })
}
