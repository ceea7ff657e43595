use std::path::{Path, PathBuf};

use crate::error::Result;

/// A batch file found on disk.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Path relative to the directory that was walked.
    pub relative_path: PathBuf,
    /// Fully resolved absolute path.
    pub absolute_path: PathBuf,
}

const BATCH_EXTENSION: &str = "json";

/// Find batch files under `root`.
///
/// A plain file is returned as-is whatever its extension. Directories are
/// walked recursively for `.json` files, skipping hidden entries (names
/// starting with `.`). Results are sorted by relative path so ingest order
/// is stable.
pub fn discover_batches(root: &Path) -> Result<Vec<DiscoveredFile>> {
    let canonical_root = root.canonicalize()?;
    if canonical_root.is_file() {
        let relative_path = canonical_root
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| canonical_root.clone());
        return Ok(vec![DiscoveredFile {
            relative_path,
            absolute_path: canonical_root,
        }]);
    }

    let mut results = Vec::new();
    walk_dir(&canonical_root, &canonical_root, &mut results)?;
    results.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(results)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    results: &mut Vec<DiscoveredFile>,
) -> Result<()> {
    let entries = std::fs::read_dir(current)?;

    for entry in entries {
        let entry = entry?;
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy();

        if name.starts_with('.') {
            continue;
        }

        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            walk_dir(root, &entry.path(), results)?;
        } else if file_type.is_symlink() {
            let resolved = match entry.path().canonicalize() {
                Ok(p) => p,
                Err(_) => continue, // Skip broken symlinks
            };
            if resolved.is_file() && is_batch(&resolved) {
                results.push(discovered(root, &entry.path(), resolved));
            }
        } else if file_type.is_file() && is_batch(&entry.path()) {
            let abs = entry.path().canonicalize()?;
            results.push(discovered(root, &entry.path(), abs));
        }
    }

    Ok(())
}

fn is_batch(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(BATCH_EXTENSION))
}

fn discovered(
    root: &Path,
    original_path: &Path,
    absolute_path: PathBuf,
) -> DiscoveredFile {
    let relative_path = original_path
        .strip_prefix(root)
        .unwrap_or(original_path)
        .to_path_buf();
    DiscoveredFile {
        relative_path,
        absolute_path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(files: &[DiscoveredFile]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.relative_path.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn discovers_only_json() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("batch.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "x").unwrap();
        std::fs::write(tmp.path().join("dc.xml"), "<a/>").unwrap();

        let files = discover_batches(tmp.path()).unwrap();
        assert_eq!(names(&files), vec!["batch.json"]);
    }

    #[test]
    fn skips_hidden_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let hidden = tmp.path().join(".staging");
        std::fs::create_dir(&hidden).unwrap();
        std::fs::write(hidden.join("a.json"), "{}").unwrap();
        std::fs::write(tmp.path().join(".b.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("c.json"), "{}").unwrap();

        let files = discover_batches(tmp.path()).unwrap();
        assert_eq!(names(&files), vec!["c.json"]);
    }

    #[test]
    fn recurses_and_sorts() {
        let tmp = tempfile::tempdir().unwrap();
        let sub = tmp.path().join("2024");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("02.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("z.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("a.json"), "{}").unwrap();

        let files = discover_batches(tmp.path()).unwrap();
        assert_eq!(names(&files), vec!["2024/02.json", "a.json", "z.json"]);
    }

    #[test]
    fn single_file_is_returned() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("one.batch");
        std::fs::write(&path, "{}").unwrap();

        let files = discover_batches(&path).unwrap();
        assert_eq!(names(&files), vec!["one.batch"]);
        assert!(files[0].absolute_path.is_absolute());
    }

    #[test]
    fn missing_path_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(discover_batches(&tmp.path().join("nope")).is_err());
    }

    #[test]
    fn empty_directory() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(discover_batches(tmp.path()).unwrap().is_empty());
    }
}
