use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    muniharvest::logging::init().context("init logging")?;

    let cli = muniharvest::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        muniharvest::cli::Command::Download(args) => {
            muniharvest::crawl::run(args).await.context("download")?;
        }
        muniharvest::cli::Command::Lookup(args) => {
            muniharvest::municipalities::run(args).context("lookup")?;
        }
    }

    Ok(())
}
