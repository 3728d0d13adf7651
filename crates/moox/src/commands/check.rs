//! `moox check` -- validate credentials against the server.

use moox_core::{CoreError, TrackerConfig, coordinator::build_client};

use crate::error::CliError;

pub async fn run(config: &TrackerConfig) -> Result<(), CliError> {
    let client = build_client(config)?;

    let server = client
        .get_server()
        .await
        .map_err(CoreError::from)
        .map_err(CliError::from)?;

    println!(
        "credentials OK -- {} (server version {})",
        client.base_url(),
        server.version.as_deref().unwrap_or("unknown"),
    );
    Ok(())
}
