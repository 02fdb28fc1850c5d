//! Directory discovery.
//!
//! Walks a root folder and lazily yields every directory (the root included)
//! that holds at least one imaging file, or, for the postprocess pass, at
//! least one imaging file with a given name prefix. Order is whatever the
//! filesystem walk produces.

use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::config::ScanConfig;

/// Which files make a directory interesting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirFilter {
    /// Any file ending in the imaging extension, ignoring case.
    Imaging,
    /// A file whose name starts with this prefix (case-sensitive) and ends in
    /// the imaging extension (ignoring case).
    Prefixed(String),
}

impl DirFilter {
    /// `extension` must already be lowercase.
    pub fn matches_file(&self, name: &str, extension: &str) -> bool {
        let has_extension = name.to_ascii_lowercase().ends_with(extension);
        match self {
            DirFilter::Imaging => has_extension,
            DirFilter::Prefixed(prefix) => has_extension && name.starts_with(prefix.as_str()),
        }
    }
}

/// Yield directories under `root` that contain a file accepted by `filter`.
///
/// The walk is lazy and cannot be restarted. Entries that can't be read are
/// logged and skipped.
pub fn find_dirs(
    root: &Path,
    filter: DirFilter,
    config: &ScanConfig,
) -> impl Iterator<Item = PathBuf> {
    let extension = config.extension.to_ascii_lowercase();

    WalkDir::new(root)
        .follow_links(config.follow_symlinks)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry during scan: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_dir())
        .filter(move |entry| dir_has_match(entry.path(), &filter, &extension))
        .map(walkdir::DirEntry::into_path)
}

fn dir_has_match(dir: &Path, filter: &DirFilter, extension: &str) -> bool {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Cannot list {}: {}", dir.display(), e);
            return false;
        }
    };

    entries.filter_map(Result::ok).any(|entry| {
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        !is_dir && filter.matches_file(&entry.file_name().to_string_lossy(), extension)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;
    use tempfile::TempDir;

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    fn collect(root: &Path, filter: DirFilter) -> HashSet<PathBuf> {
        find_dirs(root, filter, &ScanConfig::default()).collect()
    }

    #[test]
    fn finds_dirs_with_imaging_files_any_case() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(&root.join("a/one.dcm"));
        touch(&root.join("b/c/TWO.DCM"));
        touch(&root.join("d/notes.txt"));
        fs::create_dir_all(root.join("empty")).unwrap();

        let found = collect(root, DirFilter::Imaging);
        let expected: HashSet<PathBuf> = [root.join("a"), root.join("b/c")].into_iter().collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn root_itself_can_match() {
        let tmp = TempDir::new().unwrap();
        touch(&tmp.path().join("x.Dcm"));
        let found = collect(tmp.path(), DirFilter::Imaging);
        assert!(found.contains(tmp.path()));
    }

    #[test]
    fn directory_named_like_a_file_does_not_count() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("series.dcm")).unwrap();
        assert!(collect(tmp.path(), DirFilter::Imaging).is_empty());
    }

    #[test]
    fn prefix_is_case_sensitive_extension_is_not() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        touch(&root.join("study1/RS.1.2.3.DCM"));
        touch(&root.join("study1/CT.1.dcm"));
        touch(&root.join("study2/rs.1.2.3.dcm"));
        touch(&root.join("study3/CT.9.dcm"));

        let found = collect(root, DirFilter::Prefixed("RS".into()));
        let expected: HashSet<PathBuf> = [root.join("study1")].into_iter().collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn matches_file_rules() {
        let any = DirFilter::Imaging;
        assert!(any.matches_file("a.dcm", ".dcm"));
        assert!(any.matches_file("A.DcM", ".dcm"));
        assert!(!any.matches_file("a.dcm.bak", ".dcm"));

        let rs = DirFilter::Prefixed("RS".into());
        assert!(rs.matches_file("RS.x.dcm", ".dcm"));
        assert!(!rs.matches_file("Rs.x.dcm", ".dcm"));
        assert!(!rs.matches_file("RS.x.txt", ".dcm"));
    }
}
