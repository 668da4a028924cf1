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
    rewire::logging::init().context("init logging")?;

    let cli = rewire::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        rewire::cli::Command::Concepts(args) => {
            rewire::concepts::run(args).await.context("concepts")?;
        }
        rewire::cli::Command::Research(args) => {
            rewire::research::run(args).await.context("research")?;
        }
    }

    Ok(())
}
