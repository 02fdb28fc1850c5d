//! TOML configuration for `dcmmeta`.
//!
//! Every section is optional; a missing file or section falls back to the
//! LabCAS defaults. Command-line options are layered on top with
//! [`Config::apply_overrides`].
//!
//! ```toml
//! [index]
//! url = "https://localhost:8984/solr/"
//! files_core = "files"
//! blob_core = "files"
//! accept_invalid_certs = true
//! timeout_secs = 30
//!
//! [generator]
//! interpreter = "node"
//! script = "./dicom-json-generator.js"
//! strip_prefix = "/labcas-data/"
//! # timeout_secs = 600
//!
//! [scan]
//! extension = ".dcm"
//! follow_symlinks = false
//!
//! [cleaning]
//! disallowed_fields = ["PatientName", "ROIContourSequence"]
//!
//! [postprocess]
//! contour_prefix = "RS"
//! blob_field = "dicom_metadata"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::contour::{contour_pattern, ContourLocator};

pub const DEFAULT_SOLR_URL: &str = "https://localhost:8984/solr/";
pub const GENERATOR_JS: &str = "dicom-json-generator.js";
pub const DEFAULT_STRIP_PREFIX: &str = "/labcas-data/";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub cleaning: CleaningConfig,
    #[serde(default)]
    pub postprocess: PostprocessConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_solr_url")]
    pub url: String,
    #[serde(default = "default_core")]
    pub files_core: String,
    #[serde(default = "default_core")]
    pub blob_core: String,
    /// LabCAS runs Solr behind a self-signed certificate.
    #[serde(default = "default_accept_invalid_certs")]
    pub accept_invalid_certs: bool,
    #[serde(default = "default_index_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: default_solr_url(),
            files_core: default_core(),
            blob_core: default_core(),
            accept_invalid_certs: default_accept_invalid_certs(),
            timeout_secs: default_index_timeout_secs(),
        }
    }
}

fn default_solr_url() -> String {
    DEFAULT_SOLR_URL.to_string()
}
fn default_core() -> String {
    "files".to_string()
}
fn default_accept_invalid_certs() -> bool {
    true
}
fn default_index_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneratorConfig {
    /// Program used to run the generator script.
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default = "default_script")]
    pub script: PathBuf,
    /// Path prefix the generator strips when building file URLs.
    #[serde(default = "default_strip_prefix")]
    pub strip_prefix: String,
    /// Kill the generator after this many seconds. Unset means wait forever.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Check at startup that the interpreter can load `module`.
    #[serde(default = "default_check_module")]
    pub check_module: bool,
    #[serde(default = "default_module")]
    pub module: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            script: default_script(),
            strip_prefix: default_strip_prefix(),
            timeout_secs: None,
            check_module: default_check_module(),
            module: default_module(),
        }
    }
}

fn default_interpreter() -> String {
    "node".to_string()
}
fn default_script() -> PathBuf {
    PathBuf::from(".").join(GENERATOR_JS)
}
fn default_strip_prefix() -> String {
    DEFAULT_STRIP_PREFIX.to_string()
}
fn default_check_module() -> bool {
    true
}
fn default_module() -> String {
    "dcmjs".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    /// Imaging file extension, matched case-insensitively.
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            follow_symlinks: false,
        }
    }
}

fn default_extension() -> String {
    ".dcm".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CleaningConfig {
    /// Fields dropped outright: oversized sequences and values Solr can't take.
    #[serde(default = "default_disallowed_fields")]
    pub disallowed_fields: Vec<String>,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            disallowed_fields: default_disallowed_fields(),
        }
    }
}

fn default_disallowed_fields() -> Vec<String> {
    [
        "PatientName",
        "ROIContourSequence",
        "StructureSetROISequence",
        "RTROIObservationsSequence",
        "ContourImageSequence",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PostprocessConfig {
    /// Case-sensitive file name prefix of the structure-set (contour) file.
    #[serde(default = "default_contour_prefix")]
    pub contour_prefix: String,
    /// Field on the contour file's record that receives the metadata JSON.
    #[serde(default = "default_blob_field")]
    pub blob_field: String,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            contour_prefix: default_contour_prefix(),
            blob_field: default_blob_field(),
        }
    }
}

fn default_contour_prefix() -> String {
    "RS".to_string()
}
fn default_blob_field() -> String {
    "dicom_metadata".to_string()
}

/// Values given on the command line; each one replaces its config counterpart.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub solr_url: Option<String>,
    pub generator: Option<PathBuf>,
    pub strip_prefix: Option<String>,
}

impl Config {
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(url) = overrides.solr_url {
            self.index.url = url;
        }
        if let Some(script) = overrides.generator {
            self.generator.script = script;
        }
        if let Some(prefix) = overrides.strip_prefix {
            self.generator.strip_prefix = prefix;
        }
    }

    /// Validate and bring paths and URLs into the shapes the pipeline expects.
    pub fn finalize(&mut self) -> Result<()> {
        self.validate()?;
        self.index.url = with_trailing_slash(&self.index.url);
        self.generator.strip_prefix = with_trailing_slash(&self.generator.strip_prefix);
        self.generator.script = absolutize(&self.generator.script)?;
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.index.url.trim().is_empty() {
            bail!("index.url must not be empty");
        }
        if self.index.files_core.is_empty() || self.index.blob_core.is_empty() {
            bail!("index.files_core and index.blob_core must not be empty");
        }
        if self.index.timeout_secs == 0 {
            bail!("index.timeout_secs must be > 0");
        }
        if self.generator.interpreter.is_empty() {
            bail!("generator.interpreter must not be empty");
        }
        if self.generator.timeout_secs == Some(0) {
            bail!("generator.timeout_secs must be > 0 when set");
        }
        if !self.scan.extension.starts_with('.') || self.scan.extension.len() < 2 {
            bail!(
                "scan.extension must look like '.dcm', got '{}'",
                self.scan.extension
            );
        }
        if self.postprocess.contour_prefix.is_empty() {
            bail!("postprocess.contour_prefix must not be empty");
        }
        ContourLocator::new(&contour_pattern(
            &self.postprocess.contour_prefix,
            &self.scan.extension,
        ))
        .context("postprocess.contour_prefix does not form a valid file pattern")?;
        if self.postprocess.blob_field.is_empty() {
            bail!("postprocess.blob_field must not be empty");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}

pub fn with_trailing_slash(s: &str) -> String {
    if s.ends_with('/') {
        s.to_string()
    } else {
        format!("{}/", s)
    }
}

/// Drop a single trailing `/` from the folder argument, keeping a bare `/`.
pub fn normalize_folder(folder: &Path) -> PathBuf {
    let s = folder.to_string_lossy();
    match s.strip_suffix('/') {
        Some(stripped) if !stripped.is_empty() => PathBuf::from(stripped),
        _ => folder.to_path_buf(),
    }
}

fn absolutize(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Failed to resolve current working directory")?;
    Ok(cwd.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg: Config = toml::from_str("").unwrap();
        assert_eq!(cfg.index.url, DEFAULT_SOLR_URL);
        assert_eq!(cfg.index.files_core, "files");
        assert_eq!(cfg.generator.interpreter, "node");
        assert_eq!(cfg.scan.extension, ".dcm");
        assert_eq!(cfg.postprocess.contour_prefix, "RS");
        assert!(cfg
            .cleaning
            .disallowed_fields
            .contains(&"PatientName".to_string()));
        assert!(cfg.generator.timeout_secs.is_none());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [index]
            url = "http://solr:8983/solr"

            [cleaning]
            disallowed_fields = ["Foo"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.index.url, "http://solr:8983/solr");
        assert_eq!(cfg.index.timeout_secs, 30);
        assert_eq!(cfg.cleaning.disallowed_fields, vec!["Foo".to_string()]);
    }

    #[test]
    fn overrides_then_finalize_normalizes() {
        let mut cfg = Config::default();
        cfg.apply_overrides(Overrides {
            solr_url: Some("http://localhost:8983/solr".into()),
            generator: Some(PathBuf::from("/opt/gen/dicom-json-generator.js")),
            strip_prefix: Some("/data".into()),
        });
        cfg.finalize().unwrap();
        assert_eq!(cfg.index.url, "http://localhost:8983/solr/");
        assert_eq!(cfg.generator.strip_prefix, "/data/");
        assert_eq!(
            cfg.generator.script,
            PathBuf::from("/opt/gen/dicom-json-generator.js")
        );
    }

    #[test]
    fn relative_script_becomes_absolute() {
        let mut cfg = Config::default();
        cfg.finalize().unwrap();
        assert!(cfg.generator.script.is_absolute());
        assert!(cfg.generator.script.ends_with(GENERATOR_JS));
    }

    #[test]
    fn rejects_bad_extension() {
        let mut cfg = Config::default();
        cfg.scan.extension = "dcm".into();
        assert!(cfg.finalize().is_err());
    }

    #[test]
    fn rejects_contour_prefix_that_is_not_a_glob() {
        let mut cfg = Config::default();
        cfg.postprocess.contour_prefix = "RS[".into();
        let err = cfg.finalize().unwrap_err();
        assert!(format!("{:#}", err).contains("postprocess.contour_prefix"));
    }

    #[test]
    fn rejects_zero_generator_timeout() {
        let mut cfg = Config::default();
        cfg.generator.timeout_secs = Some(0);
        assert!(cfg.finalize().is_err());
    }

    #[test]
    fn folder_trailing_slash_is_dropped() {
        assert_eq!(normalize_folder(Path::new("/data/")), PathBuf::from("/data"));
        assert_eq!(normalize_folder(Path::new("/data")), PathBuf::from("/data"));
        assert_eq!(normalize_folder(Path::new("/")), PathBuf::from("/"));
    }
}
