//! Process-wide log setup.
//!
//! Logs go to stderr so the run summary on stdout stays clean. `RUST_LOG`
//! wins over the `--debug`/`--quiet` flags when it is set.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Map the mutually exclusive verbosity flags to a level.
pub fn level_for(debug: bool, quiet: bool) -> LevelFilter {
    if debug {
        LevelFilter::DEBUG
    } else if quiet {
        LevelFilter::WARN
    } else {
        LevelFilter::INFO
    }
}

/// Install the global subscriber. Call once, before anything logs.
pub fn init(level: LevelFilter) {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(atty::is(atty::Stream::Stderr))
        .with_target(false)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("Tracing subscriber already set; skipping re-initialization.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_map_to_levels() {
        assert_eq!(level_for(false, false), LevelFilter::INFO);
        assert_eq!(level_for(true, false), LevelFilter::DEBUG);
        assert_eq!(level_for(false, true), LevelFilter::WARN);
    }
}
