//! # dcmmeta
//!
//! Loads DICOM metadata into the LabCAS Solr `files` core.
//!
//! ## Usage
//!
//! ```bash
//! dcmmeta [--config dcmmeta.toml] [--solr URL] [--generator PATH] [--prefix PREFIX] <FOLDER>
//! ```
//!
//! ## Examples
//!
//! ```bash
//! # Enrich every file record under a collection
//! dcmmeta --solr https://localhost:8984/solr/ /labcas-data/Prostate_MRI
//!
//! # Enrich, then store full metadata on each study's RS file
//! dcmmeta --postprocess /labcas-data/Prostate_MRI
//!
//! # Only the RS pass, with debug logging
//! dcmmeta --rs-only --debug /labcas-data/Prostate_MRI
//! ```
//!
//! The exit status reflects only the startup checks; per-folder and per-file
//! failures are logged and the run continues.

use clap::Parser;
use labcas_dicom_meta::config::{self, Config, Overrides};
use labcas_dicom_meta::index::solr::SolrIndex;
use labcas_dicom_meta::{logging, pipeline, preflight};
use std::path::PathBuf;

/// DICOM metadata loader: extracts metadata from folders of .dcm files and
/// loads it into Solr.
#[derive(Parser)]
#[command(
    name = "dcmmeta",
    about = "DICOM metadata loader: extracts metadata from .dcm folders and loads it into Solr",
    version,
    long_about = "Finds folders containing .dcm files, runs the DICOM JSON generator on each, \
    flattens and cleans the generated metadata, and sets it on the matching per-file records \
    of the Solr `files` core. Records that already carry a `url` are left alone, so runs can \
    be repeated safely."
)]
struct Cli {
    /// Path to an optional configuration file (TOML).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Solr base URL (default https://localhost:8984/solr/).
    #[arg(short, long, value_name = "URL")]
    solr: Option<String>,

    /// Path to the dicom-json-generator.js file; defaults to the current directory.
    #[arg(short, long, value_name = "PATH")]
    generator: Option<PathBuf>,

    /// Path prefix to strip for URL generation (default /labcas-data/).
    #[arg(short, long)]
    prefix: Option<String>,

    /// After enrichment, store full metadata on each study's RS file record.
    #[arg(long, conflicts_with = "rs_only")]
    postprocess: bool,

    /// Skip enrichment and run only the RS pass.
    #[arg(long)]
    rs_only: bool,

    /// Log copious debugging messages suitable for developers.
    #[arg(short, long, conflicts_with = "quiet")]
    debug: bool,

    /// Don't log anything except warnings and critically-important messages.
    #[arg(short, long)]
    quiet: bool,

    /// Folder in which to search for .dcm files.
    folder: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(logging::level_for(cli.debug, cli.quiet));

    let mut cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };
    cfg.apply_overrides(Overrides {
        solr_url: cli.solr,
        generator: cli.generator,
        strip_prefix: cli.prefix,
    });
    cfg.finalize()?;

    let folder = config::normalize_folder(&cli.folder);
    let files = SolrIndex::new(&cfg.index, &cfg.index.files_core)?;

    preflight::check_environment(&cfg, &folder, &files).await?;

    if !cli.rs_only {
        let summary = pipeline::run_enrichment(&cfg, &folder, &files).await;
        summary.print("enrich", &folder);
    }

    if cli.postprocess || cli.rs_only {
        let blobs = SolrIndex::new(&cfg.index, &cfg.index.blob_core)?;
        let summary = pipeline::run_postprocess(&cfg, &folder, &blobs).await?;
        summary.print("postprocess", &folder);
    }

    Ok(())
}
