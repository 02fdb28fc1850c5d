//! Postprocess pass: the RT structure set ("contour") file of a study gets
//! the whole cleaned metadata document stored on its own record as one JSON
//! text field.

use anyhow::{Context, Result};
use globset::{GlobBuilder, GlobMatcher};
use std::path::Path;
use tracing::{debug, info};

use crate::clean::CleanedMetadata;
use crate::index::{Query, RecordIndex};

/// Glob for contour files: `<prefix>*<extension>`, e.g. `RS*.dcm`.
pub fn contour_pattern(prefix: &str, extension: &str) -> String {
    format!("{}*{}", prefix, extension)
}

/// Finds the contour file in a directory by case-sensitive glob.
///
/// The directory scan accepts the extension in any case, the locator does
/// not; `locate_ignoring_case` tells the two situations apart.
pub struct ContourLocator {
    matcher: GlobMatcher,
    any_case: GlobMatcher,
}

impl ContourLocator {
    pub fn new(pattern: &str) -> Result<Self> {
        let build = |case_insensitive: bool| {
            GlobBuilder::new(pattern)
                .case_insensitive(case_insensitive)
                .literal_separator(true)
                .build()
                .with_context(|| format!("Invalid contour file pattern: {}", pattern))
                .map(|glob| glob.compile_matcher())
        };
        Ok(Self {
            matcher: build(false)?,
            any_case: build(true)?,
        })
    }

    /// Base name of the matching file directly inside `dir`; the first in
    /// name order if there are several.
    pub fn locate(&self, dir: &Path) -> std::io::Result<Option<String>> {
        let names = matching_files(dir, &self.matcher)?;
        if names.len() > 1 {
            debug!(
                "{} contour files in {}; using {}",
                names.len(),
                dir.display(),
                names[0]
            );
        }
        Ok(names.into_iter().next())
    }

    /// Like `locate`, but ignoring case. Used to explain a miss.
    pub fn locate_ignoring_case(&self, dir: &Path) -> std::io::Result<Option<String>> {
        Ok(matching_files(dir, &self.any_case)?.into_iter().next())
    }
}

fn matching_files(dir: &Path, matcher: &GlobMatcher) -> std::io::Result<Vec<String>> {
    let mut names: Vec<String> = std::fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter(|entry| !entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| matcher.is_match(name))
        .collect();
    names.sort();
    Ok(names)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobOutcome {
    Written,
    NoRecord,
}

/// Store `metadata` as JSON text in `field` on the record named `file_name`.
///
/// No `url` filter here: a repeated run overwrites the earlier blob.
pub async fn write_blob(
    index: &dyn RecordIndex,
    file_name: &str,
    field: &str,
    metadata: &CleanedMetadata,
) -> Result<BlobOutcome> {
    let text = metadata
        .to_json_text()
        .context("Failed to serialize metadata")?;

    let query = Query::field("name", file_name);
    debug!("Searching index with {}", query);
    let matches = index
        .search(&query, 1)
        .await
        .with_context(|| format!("Index search for {} failed", file_name))?;

    let Some(record) = matches.first() else {
        info!("No index record named {}; skipping", file_name);
        return Ok(BlobOutcome::NoRecord);
    };

    let mut update = serde_json::Map::new();
    update.insert(field.to_string(), serde_json::Value::String(text));
    index
        .set_fields(&record.id, &update)
        .await
        .with_context(|| format!("Failed to store {} on {}", field, record.id))?;

    Ok(BlobOutcome::Written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean::{clean, DisallowList};
    use crate::index::memory::MemoryIndex;
    use crate::index::IndexRecord;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn locator() -> ContourLocator {
        ContourLocator::new(&contour_pattern("RS", ".dcm")).unwrap()
    }

    #[test]
    fn locates_case_sensitively() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("rs.lower.dcm"), b"").unwrap();
        fs::write(tmp.path().join("CT.1.dcm"), b"").unwrap();
        assert_eq!(locator().locate(tmp.path()).unwrap(), None);

        fs::write(tmp.path().join("RS.1.2.dcm"), b"").unwrap();
        assert_eq!(
            locator().locate(tmp.path()).unwrap().as_deref(),
            Some("RS.1.2.dcm")
        );
    }

    #[test]
    fn picks_first_by_name() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("RS.b.dcm"), b"").unwrap();
        fs::write(tmp.path().join("RS.a.dcm"), b"").unwrap();
        assert_eq!(
            locator().locate(tmp.path()).unwrap().as_deref(),
            Some("RS.a.dcm")
        );
    }

    #[test]
    fn upper_case_extension_is_found_only_ignoring_case() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("RS.1.DCM"), b"").unwrap();
        assert_eq!(locator().locate(tmp.path()).unwrap(), None);
        assert_eq!(
            locator()
                .locate_ignoring_case(tmp.path())
                .unwrap()
                .as_deref(),
            Some("RS.1.DCM")
        );
    }

    #[test]
    fn missing_directory_is_an_error() {
        let tmp = TempDir::new().unwrap();
        assert!(locator().locate(&tmp.path().join("gone")).is_err());
    }

    #[tokio::test]
    async fn writes_blob_and_overwrites_on_rerun() {
        let index = MemoryIndex::with_records(vec![IndexRecord::new(
            "rs-1",
            json!({"name": "RS.1.dcm", "url": "http://x/RS.1.dcm"})
                .as_object()
                .cloned()
                .unwrap(),
        )]);
        let metadata = clean(
            json!({"Modality": "RTSTRUCT"}).as_object().cloned().unwrap(),
            &DisallowList::default(),
        );

        let outcome = write_blob(&index, "RS.1.dcm", "dicom_metadata", &metadata)
            .await
            .unwrap();
        assert_eq!(outcome, BlobOutcome::Written);
        assert_eq!(
            index.record("rs-1").unwrap().fields["dicom_metadata"],
            json!(r#"{"Modality":["RTSTRUCT"]}"#)
        );

        write_blob(&index, "RS.1.dcm", "dicom_metadata", &metadata)
            .await
            .unwrap();
        assert_eq!(index.update_count(), 2);
    }

    #[tokio::test]
    async fn no_record_is_not_an_error() {
        let index = MemoryIndex::new();
        let outcome = write_blob(&index, "RS.1.dcm", "dicom_metadata", &CleanedMetadata::default())
            .await
            .unwrap();
        assert_eq!(outcome, BlobOutcome::NoRecord);
    }
}
