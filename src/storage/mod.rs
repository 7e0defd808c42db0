use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::config::Config;
use crate::dataset::{self, Dataset, DatasetError, DatasetKind};

/// Random 128-bit certificate identifier.
pub fn generate_certificate_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn ensure_dirs(config: &Config) -> std::io::Result<()> {
    std::fs::create_dir_all(config.dataset_dir())?;
    std::fs::create_dir_all(config.qr_dir())?;
    std::fs::create_dir_all(config.work_dir())?;
    Ok(())
}

/// Filename-safe form of a holder name: whitespace becomes `_`, separators are dropped.
pub fn holder_file_stem(name: &str) -> String {
    let stem: String = name
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '"' | ':' | '*' | '?' | '<' | '>' | '|'))
        .collect();
    if stem.is_empty() {
        "holder".to_string()
    } else {
        stem
    }
}

/// Validates an uploaded dataset and replaces the stored one.
///
/// The file is only written once its columns check out, so a bad upload
/// leaves the previous dataset in place.
pub fn store_dataset(
    config: &Config,
    filename: &str,
    bytes: Vec<u8>,
) -> Result<usize, DatasetError> {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let target = config
        .dataset_dir()
        .join(format!("{}.{}", dataset::DATASET_STEM, ext));
    let kind = DatasetKind::from_path(&target)
        .ok_or_else(|| DatasetError::UnsupportedFormat(filename.to_string()))?;

    let rows = Dataset::from_bytes(bytes.clone(), kind)?.len();

    std::fs::create_dir_all(config.dataset_dir())?;
    while let Some(previous) = dataset::current_path(&config.dataset_dir()) {
        std::fs::remove_file(previous)?;
    }
    std::fs::write(&target, bytes)?;
    Ok(rows)
}

/// Deletes the wrapped file when dropped.
#[derive(Debug)]
pub struct ScopedFile(PathBuf);

impl ScopedFile {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }
}

impl Drop for ScopedFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.0) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove {}: {}", self.0.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn certificate_ids_do_not_repeat() {
        let ids: std::collections::HashSet<_> =
            (0..1000).map(|_| generate_certificate_id()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn holder_names_become_file_stems() {
        assert_eq!(holder_file_stem("Test User"), "Test_User");
        assert_eq!(holder_file_stem("  Ana  María  "), "Ana_María");
        assert_eq!(holder_file_stem("a/b\\c"), "abc");
        assert_eq!(holder_file_stem("   "), "holder");
    }

    #[test]
    fn bad_upload_keeps_previous_dataset() {
        let root = tempfile::tempdir().unwrap();
        let config = testing::config(root.path());

        let good = testing::csv_dataset(&[testing::holder()]);
        assert_eq!(store_dataset(&config, "list.csv", good.into_bytes()).unwrap(), 1);

        let bad = b"national_id,code\n1,2\n".to_vec();
        assert!(matches!(
            store_dataset(&config, "list.csv", bad),
            Err(DatasetError::MissingColumns(_))
        ));
        assert!(matches!(
            store_dataset(&config, "list.txt", Vec::new()),
            Err(DatasetError::UnsupportedFormat(_))
        ));

        let stored = dataset::current_path(&config.dataset_dir()).unwrap();
        assert_eq!(Dataset::load(&stored).unwrap().len(), 1);
    }

    #[test]
    fn scoped_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qr.png");
        std::fs::write(&path, b"x").unwrap();
        drop(ScopedFile::new(path.clone()));
        assert!(!path.exists());
        // Already gone: dropping again is quiet.
        drop(ScopedFile::new(path));
    }
}
