//! Orchestration of the two passes over a folder tree.
//!
//! **Enrichment**: scan → generate → collapse → clean → reconcile, for every
//! directory holding imaging files.
//!
//! **Postprocess**: scan for directories with a contour file → generate →
//! collapse → clean → locate the contour file → store the metadata blob on
//! its record.
//!
//! Directories are handled one at a time, in scan order. A failure in one
//! directory is logged and the next directory is processed.

use anyhow::Result;
use std::path::Path;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::clean::{clean, DisallowList};
use crate::config::Config;
use crate::contour::{contour_pattern, write_blob, BlobOutcome, ContourLocator};
use crate::generator::generate_metadata;
use crate::index::RecordIndex;
use crate::reconcile::{apply_metadata_updates, ReconcileStats};
use crate::scan::{find_dirs, DirFilter};

/// Counters for one pass, printed at the end of a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub directories: usize,
    pub with_metadata: usize,
    pub updated: usize,
    pub unmatched: usize,
    pub failed: usize,
}

impl RunSummary {
    fn absorb(&mut self, stats: ReconcileStats) {
        self.updated += stats.updated;
        self.unmatched += stats.unmatched;
        self.failed += stats.failed;
    }

    pub fn print(&self, pass: &str, folder: &Path) {
        println!("{} {}", pass, folder.display());
        println!("  directories scanned: {}", self.directories);
        println!("  directories with metadata: {}", self.with_metadata);
        println!("  records updated: {}", self.updated);
        println!("  records unmatched: {}", self.unmatched);
        println!("  failures: {}", self.failed);
        println!("ok");
    }
}

/// Enrich per-file records under `folder` with generated metadata.
pub async fn run_enrichment(config: &Config, folder: &Path, index: &dyn RecordIndex) -> RunSummary {
    info!(
        "Beginning processing of {} with prefix {}",
        folder.display(),
        config.generator.strip_prefix
    );
    let disallow = DisallowList::from_config(&config.cleaning);
    let mut summary = RunSummary::default();

    for dir in find_dirs(folder, DirFilter::Imaging, &config.scan) {
        summary.directories += 1;
        let span = info_span!("dir", path = %dir.display());
        let (had_metadata, stats) = enrich_directory(config, &disallow, &dir, index)
            .instrument(span)
            .await;
        if had_metadata {
            summary.with_metadata += 1;
        }
        summary.absorb(stats);
    }

    info!(
        "Enrichment done: {} directories, {} records updated",
        summary.directories, summary.updated
    );
    summary
}

async fn enrich_directory(
    config: &Config,
    disallow: &DisallowList,
    dir: &Path,
    index: &dyn RecordIndex,
) -> (bool, ReconcileStats) {
    debug!("Found a folder with imaging files: {}", dir.display());
    let collapsed =
        generate_metadata(dir, &config.generator.strip_prefix, &config.generator).await;
    let had_metadata = !collapsed.is_empty();
    let cleaned = clean(collapsed.fields, disallow);
    let stats = apply_metadata_updates(index, &cleaned, &collapsed.urls).await;
    (had_metadata, stats)
}

/// Store the full metadata document on each study's contour file record.
///
/// Fails only if the configured contour pattern is not a valid glob.
pub async fn run_postprocess(
    config: &Config,
    folder: &Path,
    index: &dyn RecordIndex,
) -> Result<RunSummary> {
    let prefix = &config.postprocess.contour_prefix;
    let locator = ContourLocator::new(&contour_pattern(prefix, &config.scan.extension))?;
    let disallow = DisallowList::from_config(&config.cleaning);
    let mut summary = RunSummary::default();

    info!(
        "Beginning postprocess of {} for {}* files",
        folder.display(),
        prefix
    );

    for dir in find_dirs(folder, DirFilter::Prefixed(prefix.clone()), &config.scan) {
        summary.directories += 1;
        let span = info_span!("dir", path = %dir.display());
        async {
            let collapsed =
                generate_metadata(&dir, &config.generator.strip_prefix, &config.generator).await;
            if collapsed.fields.is_empty() {
                warn!("No metadata for {}; leaving its contour record alone", dir.display());
                return;
            }
            summary.with_metadata += 1;
            let cleaned = clean(collapsed.fields, &disallow);

            let file_name = match locator.locate(&dir) {
                Ok(Some(name)) => name,
                Ok(None) => {
                    match locator.locate_ignoring_case(&dir) {
                        Ok(Some(name)) => warn!(
                            "{} in {} does not end in {} with matching case; skipping",
                            name,
                            dir.display(),
                            config.scan.extension
                        ),
                        _ => warn!("No {}* file in {}; skipping", prefix, dir.display()),
                    }
                    return;
                }
                Err(e) => {
                    warn!("Cannot list {}: {}; skipping", dir.display(), e);
                    return;
                }
            };

            match write_blob(index, &file_name, &config.postprocess.blob_field, &cleaned).await {
                Ok(BlobOutcome::Written) => summary.updated += 1,
                Ok(BlobOutcome::NoRecord) => summary.unmatched += 1,
                Err(e) => {
                    error!("Could not store metadata on {}: {:#}", file_name, e);
                    summary.failed += 1;
                }
            }
        }
        .instrument(span)
        .await;
    }

    info!(
        "Postprocess done: {} directories, {} contour records updated",
        summary.directories, summary.updated
    );
    Ok(summary)
}
