//! Startup sanity checks.
//!
//! Run once before any directory is touched. Any failure here is fatal: the
//! binary reports it and exits non-zero without processing anything.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::{Config, GeneratorConfig};
use crate::index::RecordIndex;

/// Check the generator, the folder, the interpreter and the index, in that order.
pub async fn check_environment(
    config: &Config,
    folder: &Path,
    index: &dyn RecordIndex,
) -> Result<()> {
    check_generator_script(&config.generator.script)?;
    check_folder(folder)?;
    check_interpreter(&config.generator).await?;
    index
        .ping()
        .await
        .with_context(|| format!("Index at {} is not reachable", config.index.url))?;
    info!("Environment checks passed");
    Ok(())
}

pub fn check_generator_script(script: &Path) -> Result<()> {
    if !script.is_file() {
        bail!(
            "Expected a DICOM JSON generator at {} but it's not found",
            script.display()
        );
    }
    Ok(())
}

pub fn check_folder(folder: &Path) -> Result<()> {
    if !folder.is_dir() {
        bail!("Expected a folder at {} but it's not", folder.display());
    }
    Ok(())
}

/// The interpreter must run, and, unless disabled, load the generator's
/// DICOM library.
pub async fn check_interpreter(config: &GeneratorConfig) -> Result<()> {
    run_quietly(&config.interpreter, &["--version"])
        .await
        .with_context(|| format!("`{} --version` failed", config.interpreter))?;

    if config.check_module {
        let require = format!("require('{}');", config.module);
        run_quietly(&config.interpreter, &["--eval", require.as_str()])
            .await
            .with_context(|| {
                format!(
                    "`{}` cannot load the `{}` module",
                    config.interpreter, config.module
                )
            })?;
    }
    Ok(())
}

async fn run_quietly(program: &str, args: &[&str]) -> Result<()> {
    debug!("Running {} {:?}", program, args);
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .with_context(|| format!("Failed to execute '{}'. Is it installed?", program))?;

    if !status.success() {
        bail!("{} exited with {}", program, status);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn script_must_be_a_file() {
        let tmp = TempDir::new().unwrap();
        assert!(check_generator_script(tmp.path()).is_err());
        let script = tmp.path().join("gen.js");
        std::fs::write(&script, "").unwrap();
        assert!(check_generator_script(&script).is_ok());
    }

    #[test]
    fn folder_must_be_a_directory() {
        let tmp = TempDir::new().unwrap();
        assert!(check_folder(tmp.path()).is_ok());
        assert!(check_folder(&tmp.path().join("missing")).is_err());
    }

    #[tokio::test]
    async fn missing_interpreter_fails() {
        let config = GeneratorConfig {
            interpreter: "dcmmeta-no-such-interpreter".into(),
            ..GeneratorConfig::default()
        };
        assert!(check_interpreter(&config).await.is_err());
    }
}
