//! # labcas-dicom-meta
//!
//! Finds folders of DICOM files, extracts their metadata with an external
//! generator (`dicom-json-generator.js`), and merges it into the existing
//! per-file records of a Solr index so OHIF can browse them. A postprocess
//! pass stores each study's full metadata document on its RT structure set
//! (`RS*.dcm`) record.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐   ┌───────────┐   ┌──────────┐   ┌───────┐   ┌────────────┐
//! │  scan   │──▶│ generator │──▶│ collapse │──▶│ clean │──▶│ reconcile  │──▶ Solr
//! └─────────┘   └───────────┘   └──────────┘   └───────┘   └────────────┘
//!                                                    └─────▶ contour (blob) ──▶ Solr
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! dcmmeta --solr https://localhost:8984/solr/ \
//!         --generator ./dicom-json-generator.js \
//!         --prefix /labcas-data/ /labcas-data/Collection
//! dcmmeta --postprocess /labcas-data/Collection   # also write RS blobs
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and CLI overrides |
//! | [`logging`] | Tracing subscriber setup |
//! | [`scan`] | Directory discovery |
//! | [`generator`] | External metadata generator adapter |
//! | [`collapse`] | Study/series/instance flattening |
//! | [`clean`] | Field normalization and the disallow list |
//! | [`index`] | Index trait, query expressions, Solr and in-memory backends |
//! | [`reconcile`] | Per-file record enrichment |
//! | [`contour`] | Contour file lookup and metadata blob write |
//! | [`preflight`] | Startup environment checks |
//! | [`pipeline`] | Enrichment and postprocess passes |

pub mod clean;
pub mod collapse;
pub mod config;
pub mod contour;
pub mod generator;
pub mod index;
pub mod logging;
pub mod pipeline;
pub mod preflight;
pub mod reconcile;
pub mod scan;
