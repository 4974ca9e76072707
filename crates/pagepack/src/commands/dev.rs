//! Development server command.

use std::path::Path;

use anyhow::Result;
use pagepack_descriptor::Mode;
use pagepack_server::{DevServer, DevServerConfig};
use pagepack_static::StaticBuilder;

use crate::config::load_config;

/// Run the dev server.
pub async fn run(config: &Path, port: Option<u16>, open: bool) -> Result<()> {
    let mode = Mode::from_env();
    let descriptor = load_config(config)?.descriptor(mode);

    if !descriptor.optimization().hot {
        tracing::warn!("Live reload is off in {} mode; set NODE_ENV=development to enable it", mode);
    }

    let config = DevServerConfig {
        host: descriptor.dev_server.host.clone(),
        port: port.unwrap_or(descriptor.dev_server.port),
        open,
    };

    DevServer::new(StaticBuilder::new(descriptor), config)
        .start()
        .await?;

    Ok(())
}
