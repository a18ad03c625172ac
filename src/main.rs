//! S3 Upload
//!
//! Uploads a local file or directory tree to an S3 bucket.

use clap::Parser;
use s3_upload::cli::Cli;
use s3_upload::s3::ClientResolver;
use s3_upload::settings::Settings;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .init();

    tracing::debug!("Starting S3 Upload v{}", env!("CARGO_PKG_VERSION"));

    match upload(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn upload(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::load(cli.settings.as_deref())?;
    let (request, spec) = cli.into_invocation(settings)?;

    let report = s3_upload::run(&request, &spec, &ClientResolver::new()).await?;
    tracing::info!("{}", report);

    Ok(())
}
