//! Photograph discovery

use std::path::Path;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::state::data::Photograph;

/// List the photographs directly inside each of `image_dirs` under `root`.
///
/// Only files whose extension matches one of `extensions` (any case) are
/// returned. The result is sorted by photograph key. A directory that does
/// not exist is an error rather than an empty listing.
pub fn scan_photo_dirs<P: AsRef<Path>>(
    root: &Path,
    image_dirs: &[P],
    extensions: &[String],
) -> Result<Vec<Photograph>> {
    let wanted: Vec<String> = extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_lowercase())
        .collect();
    let mut photos = Vec::new();

    for dir in image_dirs {
        let dir = root.join(dir.as_ref());
        if !dir.is_dir() {
            return Err(Error::NotFound(format!("photograph directory {}", dir.display())));
        }

        let before = photos.len();
        for entry in WalkDir::new(&dir).min_depth(1).max_depth(1).follow_links(true) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let Some(extension) = path.extension() else {
                continue;
            };
            let extension = extension.to_string_lossy().to_lowercase();
            if !wanted.contains(&extension) {
                continue;
            }

            photos.push(Photograph::new(path)?);
        }
        debug!(dir = %dir.display(), found = photos.len() - before, "Scanned photograph directory");
    }

    photos.sort_by(|a, b| a.key.cmp(&b.key));
    info!(
        photographs = photos.len(),
        directories = image_dirs.len(),
        "Photograph discovery complete"
    );
    Ok(photos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn exts() -> Vec<String> {
        vec!["jpg".to_string(), "jpeg".to_string()]
    }

    #[test]
    fn test_scan_filters_and_sorts() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("DOE-nitfix_specimen_photos");
        fs::create_dir_all(dir.join("nested")).unwrap();
        for name in ["R0002.JPG", "R0001.jpg", "notes.txt", "R0003.jpeg", "noext"] {
            fs::write(dir.join(name), b"x").unwrap();
        }
        fs::write(dir.join("nested").join("R0009.jpg"), b"x").unwrap();

        let photos =
            scan_photo_dirs(root.path(), &["DOE-nitfix_specimen_photos"], &exts()).unwrap();
        let keys: Vec<&str> = photos.iter().map(|p| p.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                "DOE-nitfix_specimen_photos/R0001.jpg",
                "DOE-nitfix_specimen_photos/R0002.JPG",
                "DOE-nitfix_specimen_photos/R0003.jpeg",
            ]
        );
    }

    #[test]
    fn test_scan_multiple_dirs() {
        let root = tempfile::tempdir().unwrap();
        for dir in ["b_photos", "a_photos"] {
            fs::create_dir(root.path().join(dir)).unwrap();
            fs::write(root.path().join(dir).join("R1.jpg"), b"x").unwrap();
        }

        let photos = scan_photo_dirs(root.path(), &["b_photos", "a_photos"], &exts()).unwrap();
        assert_eq!(photos.len(), 2);
        assert_eq!(photos[0].key.as_str(), "a_photos/R1.jpg");
    }

    #[test]
    fn test_missing_dir_is_error() {
        let root = tempfile::tempdir().unwrap();
        let result = scan_photo_dirs(root.path(), &["nowhere"], &exts());
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
