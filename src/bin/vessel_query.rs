//! vessel-query - list the logistics fleet
//!
//! Resolves database credentials through the secrets provider, connects with
//! TLS required, and prints one line per row of `ships`.
//!
//! ```bash
//! SECRETS_PROVIDER=conjur PORT=5432 vessel-query
//! ```

use anyhow::Context;
use clap::Parser;
use itemguard::database::{self, DatabaseCredentials, DEFAULT_DB_PORT};
use itemguard::observability::{self, ObservabilityConfig};
use itemguard::{secrets, vessels};
use tracing::info;

#[derive(Parser)]
#[command(name = "vessel-query")]
#[command(version, about = "Query vessel positions from the logistics database", long_about = None)]
struct Cli {
    /// Database port
    #[arg(long, env = "PORT", default_value_t = DEFAULT_DB_PORT)]
    port: u16,

    /// Provider to use: `env` or `conjur`
    #[arg(long, env = "SECRETS_PROVIDER", default_value = "env")]
    provider: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    observability::init(&ObservabilityConfig::from_env())
        .context("failed to initialize logging")?;

    let provider =
        secrets::provider_for(&cli.provider).context("failed to configure secrets provider")?;
    let credentials = DatabaseCredentials::from_secrets(provider.as_ref(), cli.port)
        .await
        .context("failed to resolve database credentials")?;
    info!(connection = %credentials, "Resolved database credentials");

    let pool = database::connect(&credentials)
        .await
        .context("failed to connect to database")?;
    let fleet = vessels::fetch_vessels(&pool)
        .await
        .context("vessel query failed")?;
    pool.close().await;

    print!("{}", vessels::format_report(&fleet));
    Ok(())
}
