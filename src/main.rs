use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lb_cert_rotator::config::Settings;
use lb_cert_rotator::runner::{self, AppContext, RunStatus};
use lb_cert_rotator::server;

#[derive(Parser, Debug)]
#[command(author, version, about = "Rotates TLS certificates on load-balanced HTTPS endpoints")]
struct Args {
    /// Path to the rotator configuration file (default: rotator.yaml)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Listening port for the trigger endpoint
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Run all profiles once and exit instead of serving the trigger endpoint
    #[arg(long)]
    oneshot: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let mut settings =
        Settings::new(args.config).context("Failed to load rotator configuration")?;
    if let Some(port) = args.port {
        settings.listen_port = port;
    }
    settings.validate()?;
    info!("Loaded {} rotation profile(s).", settings.profiles.len());

    let ctx = Arc::new(AppContext::new(settings)?);

    if args.oneshot {
        let report = runner::run_all_profiles(&ctx).await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        if report.status() != RunStatus::Success {
            anyhow::bail!("rotation run finished with failures");
        }
        return Ok(());
    }

    server::serve(ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_oneshot() {
        let args = Args::parse_from(["lb-cert-rotator", "--oneshot", "--port", "9090"]);
        assert!(args.oneshot);
        assert_eq!(args.port, Some(9090));
        assert!(args.config.is_none());
    }
}
