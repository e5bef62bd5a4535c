//! secret-check - fetch secrets through the configured provider
//!
//! Confirms that each identifier resolves and prints a redacted form of the
//! value. Exits non-zero if any fetch fails.
//!
//! ```bash
//! SECRETS_PROVIDER=conjur secret-check postgresDBApp/username postgresDBApp/password
//! ```

use std::process::ExitCode;

use clap::Parser;
use itemguard::database::{PASSWORD_SECRET, USERNAME_SECRET};
use itemguard::observability::{self, ObservabilityConfig};
use itemguard::secrets::{self, redact_secret};

#[derive(Parser)]
#[command(name = "secret-check")]
#[command(version, about = "Fetch secrets and print redacted values", long_about = None)]
struct Cli {
    /// Secret identifiers, e.g. `postgresDBApp/username`
    #[arg(default_values_t = [USERNAME_SECRET.to_string(), PASSWORD_SECRET.to_string()])]
    identifiers: Vec<String>,

    /// Provider to use: `env` or `conjur`
    #[arg(long, env = "SECRETS_PROVIDER", default_value = "env")]
    provider: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = observability::init(&ObservabilityConfig::from_env()) {
        eprintln!("error: {}", e);
        return ExitCode::FAILURE;
    }

    let provider = match secrets::provider_for(&cli.provider) {
        Ok(provider) => provider,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut failed = 0usize;
    for identifier in &cli.identifiers {
        match secrets::fetch_string(provider.as_ref(), identifier).await {
            Ok(value) => println!("{}: {}", identifier, redact_secret(&value)),
            Err(e) => {
                eprintln!("{}: error: {}", identifier, e);
                failed += 1;
            }
        }
    }

    if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
