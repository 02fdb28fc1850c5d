//! Adapter around the external DICOM JSON generator.
//!
//! The generator is invoked as
//!
//! ```text
//! <interpreter> <script> <directory> <url-prefix> <output.json>
//! ```
//!
//! and is a poor citizen:
//!
//! - it exits non-zero only when its arguments are wrong;
//! - if any file in the directory is unreadable or not valid DICOM (a broken
//!   symlink, a bad header) it gives up on the whole directory and writes
//!   nothing, yet still exits zero.
//!
//! So success is "exit zero *and* a non-empty output file". [`run_generator`]
//! folds all of that into a [`GeneratorError`]; [`generate_metadata`] logs the
//! error and hands back empty metadata so the caller can move on to the next
//! directory. The temporary output file is removed on every path.

use serde_json::Value;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{error, info};

use crate::collapse::{collapse, Collapsed};
use crate::config::GeneratorConfig;

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("could not create a temporary output file: {0}")]
    TempFile(#[source] std::io::Error),

    #[error("could not run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("generator aborted with {status}; stderr={stderr}")]
    Failed { status: ExitStatus, stderr: String },

    #[error("generator still running after {0:?}; killed")]
    TimedOut(Duration),

    #[error("generator produced no output; stdout={stdout}, stderr={stderr}")]
    EmptyOutput { stdout: String, stderr: String },

    #[error("could not read generator output: {0}")]
    ReadOutput(#[source] std::io::Error),

    #[error("generator produced bad JSON: {0}")]
    MalformedOutput(#[source] serde_json::Error),
}

/// Run the generator on `dir` and parse its output document.
pub async fn run_generator(
    dir: &Path,
    prefix: &str,
    config: &GeneratorConfig,
) -> Result<Value, GeneratorError> {
    // Dropping this removes the file, whether or not the generator wrote it.
    let output_file = tempfile::Builder::new()
        .prefix("dcmmeta-")
        .suffix(".json")
        .tempfile()
        .map_err(GeneratorError::TempFile)?;
    let output_path = output_file.path();

    let child = Command::new(&config.interpreter)
        .arg(&config.script)
        .arg(dir)
        .arg(prefix)
        .arg(output_path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| GeneratorError::Spawn {
            program: config.interpreter.clone(),
            source,
        })?;

    let waited = match config.timeout_secs {
        Some(secs) => {
            let limit = Duration::from_secs(secs);
            tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| GeneratorError::TimedOut(limit))?
        }
        None => child.wait_with_output().await,
    };
    let output = waited.map_err(|source| GeneratorError::Spawn {
        program: config.interpreter.clone(),
        source,
    })?;

    if !output.status.success() {
        return Err(GeneratorError::Failed {
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let bytes = match tokio::fs::read(output_path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(GeneratorError::ReadOutput(e)),
    };
    if bytes.is_empty() {
        return Err(GeneratorError::EmptyOutput {
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    serde_json::from_slice(&bytes).map_err(GeneratorError::MalformedOutput)
}

/// Generate and collapse metadata for `dir`.
///
/// Every generator failure is logged here and turned into an empty result;
/// nothing propagates.
pub async fn generate_metadata(dir: &Path, prefix: &str, config: &GeneratorConfig) -> Collapsed {
    info!("Generating metadata for folder {}", dir.display());
    match run_generator(dir, prefix, config).await {
        Ok(document) => collapse(&document),
        Err(e) => {
            error!(
                "The DICOM generator failed on {}: {}; continuing on",
                dir.display(),
                e
            );
            Collapsed::default()
        }
    }
}
