//! Applying cleaned metadata to the per-file index records.
//!
//! For each generated URL the record is looked up by the URL's last path
//! segment, restricted to records that have no `url` yet. A record that was
//! enriched by an earlier run therefore never matches again, which makes
//! repeated runs over the same index no-ops. The `name` field can't be matched
//! against the DICOM `FileName` attribute: that one carries a virtual name
//! with the event id in it.

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::clean::CleanedMetadata;
use crate::index::{Query, RecordIndex};

/// Rows requested per lookup; anything past the first is only used to warn
/// about duplicate names.
const LOOKUP_ROWS: usize = 2;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileStats {
    pub updated: usize,
    pub unmatched: usize,
    pub failed: usize,
}

/// The file name a record is indexed under: the URL's last path segment.
pub fn file_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// Query for records named `name` that have not been enriched yet.
pub fn unenriched_query(name: &str) -> Query {
    Query::field("name", name).and(Query::present("url").negate())
}

/// Set `metadata` plus `url` on the first unenriched record for each URL.
///
/// Failures are logged per URL and counted; the loop always runs to the end.
pub async fn apply_metadata_updates(
    index: &dyn RecordIndex,
    metadata: &CleanedMetadata,
    urls: &[String],
) -> ReconcileStats {
    let mut stats = ReconcileStats::default();
    if urls.is_empty() {
        return stats;
    }
    info!("Applying metadata updates to {} files", urls.len());

    for url in urls {
        let name = file_name(url);
        let query = unenriched_query(name);
        debug!("Searching index with {}", query);

        let matches = match index.search(&query, LOOKUP_ROWS).await {
            Ok(matches) => matches,
            Err(e) => {
                error!("Index search failed for {}: {}", url, e);
                stats.failed += 1;
                continue;
            }
        };

        let Some(record) = matches.first() else {
            debug!("No unenriched record named {}", name);
            stats.unmatched += 1;
            continue;
        };
        if matches.len() > 1 {
            warn!(
                "More than one unenriched record is named {}; updating only {}",
                name, record.id
            );
        }

        let mut updates = metadata.fields().clone();
        updates.insert("url".to_string(), Value::String(url.clone()));

        match index.set_fields(&record.id, &updates).await {
            Ok(()) => stats.updated += 1,
            Err(e) => {
                error!("Index failure {} updating {} for {}", e, record.id, url);
                stats.failed += 1;
            }
        }
    }
    stats
}
