//! Static site build command.

use std::path::{Path, PathBuf};

use anyhow::Result;
use pagepack_descriptor::Mode;
use pagepack_static::StaticBuilder;

use crate::config::load_config;

/// Run the build command.
pub async fn run(config: &Path, output: Option<PathBuf>, mode: Option<Mode>) -> Result<()> {
    let mode = mode.unwrap_or_else(Mode::from_env);
    tracing::info!("Building site ({} mode)...", mode);

    let mut descriptor = load_config(config)?.descriptor(mode);
    if let Some(output) = output {
        descriptor.output.dir = std::env::current_dir()?.join(output);
    }

    let result = StaticBuilder::new(descriptor).build().await?;

    tracing::info!(
        "Built {} pages, {} chunk files, {} assets and {} copied files in {}ms",
        result.pages,
        result.chunks,
        result.assets,
        result.copied,
        result.duration_ms
    );

    tracing::info!("Output: {}", result.output_dir.display());

    Ok(())
}
