//! Persistence for rendered images: collision-resistant filenames and a
//! best-effort retention sweep over the output directory.

use anyhow::{Context, Result};
use image::{ImageFormat, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use time::{format_description, OffsetDateTime};
use tracing::{debug, warn};

use crate::settings::Settings;

const OUTPUT_PREFIX: &str = "annotated_";

#[derive(Clone)]
pub struct Storage {
    output_dir: PathBuf,
    retention: Duration,
}

impl Storage {
    pub fn new(settings: &Settings) -> Self {
        Self::with(
            PathBuf::from(&settings.output_dir),
            Duration::from_secs(settings.retention_secs),
        )
    }

    pub fn with(output_dir: PathBuf, retention: Duration) -> Self {
        Self {
            output_dir,
            retention,
        }
    }

    pub fn save(&self, image: &RgbImage) -> Result<String> {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!(
                "failed to create output directory: {}",
                self.output_dir.display()
            )
        })?;
        let path = self.output_dir.join(unique_filename());
        image
            .save_with_format(&path, ImageFormat::Png)
            .with_context(|| format!("failed to save annotated image: {}", path.display()))?;
        Ok(path.to_string_lossy().into_owned())
    }

    /// Remove prefix-matching outputs older than the retention window.
    /// Individual failures are logged and skipped; the sweep never aborts.
    pub fn sweep_stale(&self) {
        let entries = match fs::read_dir(&self.output_dir) {
            Ok(entries) => entries,
            Err(err) => {
                debug!("retention sweep skipped: {err}");
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with(OUTPUT_PREFIX) {
                continue;
            }
            if !is_stale(&entry.path(), self.retention) {
                continue;
            }
            if let Err(err) = fs::remove_file(entry.path()) {
                warn!("failed to remove stale output {name}: {err}");
            }
        }
    }
}

fn is_stale(path: &Path, retention: Duration) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    match modified.elapsed() {
        Ok(age) => age > retention,
        Err(_) => false,
    }
}

fn unique_filename() -> String {
    let format = format_description::parse("[year][month][day]_[hour][minute][second]");
    let timestamp = format
        .ok()
        .and_then(|format| OffsetDateTime::now_utc().format(&format).ok())
        .unwrap_or_else(|| "00000000_000000".to_string());
    let mut suffix = uuid::Uuid::new_v4().simple().to_string();
    suffix.truncate(8);
    format!("{OUTPUT_PREFIX}{timestamp}_{suffix}.png")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_carry_prefix_timestamp_and_suffix() {
        let name = unique_filename();
        assert!(name.starts_with(OUTPUT_PREFIX));
        assert!(name.ends_with(".png"));
        // annotated_ + yyyymmdd_HHMMSS + _ + 8 hex + .png
        assert_eq!(name.len(), OUTPUT_PREFIX.len() + 15 + 1 + 8 + 4);
        assert_ne!(name, unique_filename());
    }

    #[test]
    fn save_writes_a_png_into_the_output_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = Storage::with(dir.path().to_path_buf(), Duration::from_secs(3600));
        let image = RgbImage::new(8, 8);
        let path = storage.save(&image).expect("save image");
        assert!(Path::new(&path).exists());
        assert!(path.ends_with(".png"));
    }

    #[test]
    fn sweep_removes_only_expired_outputs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stale = Storage::with(dir.path().to_path_buf(), Duration::from_millis(10));
        let image = RgbImage::new(4, 4);
        let path = stale.save(&image).expect("save image");
        let unrelated = dir.path().join("keep.png");
        fs::write(&unrelated, b"not swept").expect("write unrelated");

        std::thread::sleep(Duration::from_millis(50));
        stale.sweep_stale();
        assert!(!Path::new(&path).exists());
        assert!(unrelated.exists());

        let fresh = Storage::with(dir.path().to_path_buf(), Duration::from_secs(3600));
        let kept = fresh.save(&image).expect("save image");
        fresh.sweep_stale();
        assert!(Path::new(&kept).exists());
    }

    #[test]
    fn sweep_tolerates_missing_directory() {
        let storage = Storage::with(PathBuf::from("/does/not/exist"), Duration::from_secs(1));
        storage.sweep_stale();
    }
}
