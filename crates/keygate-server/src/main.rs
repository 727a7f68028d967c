use clap::Parser;

use keygate_server::ServerBuilder;
use keygate_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};

#[derive(Parser)]
#[command(name = "keygate-server")]
#[command(about = "Opaque-token login and session service")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<String>,
}

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    CliArgument,
    EnvironmentVariable,
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (KEYGATE_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // .env is optional
    if let Err(e) = dotenvy::dotenv()
        && !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
    {
        eprintln!("Warning: Failed to load .env file: {e}");
    }

    keygate_server::observability::init_tracing();

    let cli = Cli::parse();
    let (config_path, source) = resolve_config_path(cli.config);

    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    keygate_server::observability::apply_logging_level(&cfg.logging.level);
    tracing::info!(path = %config_path, source = %source, "Configuration loaded");

    let server = match ServerBuilder::new().with_config(cfg).build().await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Server initialization failed: {e:#}");
            std::process::exit(2);
        }
    };

    if let Err(err) = server.run().await {
        eprintln!("Server error: {err:#}");
        std::process::exit(1);
    }
}

/// Priority: `--config`, then `KEYGATE_CONFIG`, then `keygate.toml`.
fn resolve_config_path(cli_path: Option<String>) -> (String, ConfigSource) {
    if let Some(path) = cli_path {
        return (path, ConfigSource::CliArgument);
    }
    if let Ok(path) = std::env::var("KEYGATE_CONFIG")
        && !path.is_empty()
    {
        return (path, ConfigSource::EnvironmentVariable);
    }
    (DEFAULT_CONFIG_PATH.to_string(), ConfigSource::Default)
}
