use super::types::ActionLog;
use image::DynamicImage;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const ACTIONS_FILE: &str = "actions.json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Directory of validation screenshots. The directory is created on the first
/// save, not when the store is constructed.
#[derive(Debug, Clone)]
pub struct ScreenshotStore {
    dir: PathBuf,
}

impl ScreenshotStore {
    /// Relative directories are resolved against the current directory now:
    /// saved paths end up in the action log and must not depend on where
    /// the log is replayed from.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let dir = std::path::absolute(&dir).unwrap_or(dir);
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist `image` as `pre_click_<unix millis>.png` and return its path.
    pub fn save(&self, image: &DynamicImage) -> Result<PathBuf, StorageError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.unique_path(chrono::Utc::now().timestamp_millis());
        image.save(&path)?;
        Ok(path)
    }

    fn unique_path(&self, timestamp_ms: i64) -> PathBuf {
        let mut path = self.dir.join(format!("pre_click_{timestamp_ms}.png"));
        let mut suffix = 1;
        while path.exists() {
            path = self
                .dir
                .join(format!("pre_click_{timestamp_ms}_{suffix}.png"));
            suffix += 1;
        }
        path
    }
}

/// Write the log as `actions.json` inside `dir`.
pub fn write_actions(dir: &Path, log: &ActionLog) -> Result<PathBuf, StorageError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(ACTIONS_FILE);
    write_actions_to(&path, log)?;
    Ok(path)
}

pub fn write_actions_to(path: &Path, log: &ActionLog) -> Result<(), StorageError> {
    let json = serde_json::to_string_pretty(log)?;
    std::fs::write(path, json)?;
    Ok(())
}

pub fn read_actions(path: &Path) -> Result<ActionLog, StorageError> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::types::{Action, ActionKind, Button, Region, Validation};
    use image::{GrayImage, Luma};
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    #[test]
    fn writes_actions_json() {
        let dir = tempdir().expect("tempdir");
        let log = ActionLog::from(vec![
            Action::new(Duration::from_millis(40), ActionKind::Move { position: (3, 4) }),
            Action::sample(),
        ]);

        let path = write_actions(dir.path(), &log).expect("write actions");

        let contents = fs::read_to_string(&path).expect("read actions.json");
        let parsed: ActionLog = serde_json::from_str(&contents).expect("parse actions");
        assert_eq!(log, parsed);
        assert_eq!(read_actions(&path).expect("read back"), log);
    }

    #[test]
    fn store_creates_directory_on_first_save() {
        let root = tempdir().expect("tempdir");
        let store = ScreenshotStore::new(root.path().join("screenshots"));
        assert!(!store.dir().exists());

        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([200])));
        let path = store.save(&image).expect("save");

        assert!(store.dir().is_dir());
        assert!(path.exists());
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("pre_click_"));
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn saves_in_the_same_millisecond_get_distinct_names() {
        let root = tempdir().expect("tempdir");
        let store = ScreenshotStore::new(root.path());
        fs::write(root.path().join("pre_click_42.png"), b"taken").unwrap();

        let path = store.unique_path(42);
        assert_eq!(path.file_name().unwrap(), "pre_click_42_1.png");
    }

    #[test]
    fn relative_directory_is_made_absolute() {
        let store = ScreenshotStore::new("screenshots");
        assert!(store.dir().is_absolute());
        assert!(store.dir().ends_with("screenshots"));
    }

    #[test]
    fn log_read_from_another_directory_still_finds_screenshots() {
        let recorded = tempdir().expect("tempdir");
        let elsewhere = tempdir().expect("tempdir");
        let store = ScreenshotStore::new(recorded.path().join("screenshots"));
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([90])));
        let screenshot = store.save(&image).expect("save");

        let log = ActionLog::from(vec![Action::new(
            Duration::ZERO,
            ActionKind::ButtonPress {
                position: (1, 1),
                button: Button::Left,
                validation: Some(Validation {
                    screenshot,
                    region: Region::new(1, 1, 8, 8),
                }),
            },
        )]);
        let written = write_actions(store.dir(), &log).expect("write actions");
        let moved = elsewhere.path().join(ACTIONS_FILE);
        fs::copy(&written, &moved).expect("copy log");

        let read = read_actions(&moved).expect("read moved log");
        let validation = read.actions()[0].validation().expect("validation");
        assert!(validation.screenshot.is_absolute());
        assert!(validation.screenshot.exists());
    }

    #[test]
    fn read_missing_file_is_io_error() {
        let dir = tempdir().expect("tempdir");
        let err = read_actions(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
    }
}
