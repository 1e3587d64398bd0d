use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

fn main() -> ExitCode {
    let cli = vidharvest::cli::Cli::parse();
    if let Err(err) = vidharvest::logging::init(cli.global.verbose) {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }
    tracing::debug!(?cli, "parsed cli");

    if let Err(err) = try_main(cli) {
        tracing::error!(?err, "vidharvest failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn try_main(cli: vidharvest::cli::Cli) -> anyhow::Result<()> {
    let global = &cli.global;
    match cli.command {
        vidharvest::cli::Command::Run(args) => {
            vidharvest::pipeline::run(global, args).context("run")?;
        }
        vidharvest::cli::Command::Crawl(args) => {
            vidharvest::listing::run(global, args).context("crawl")?;
        }
        vidharvest::cli::Command::Scrape(args) => {
            vidharvest::detail::run(global, args).context("scrape")?;
        }
        vidharvest::cli::Command::Dispatch => {
            vidharvest::dispatch::run(global).context("dispatch")?;
        }
        vidharvest::cli::Command::Progress => {
            vidharvest::progress::run(global).context("progress")?;
        }
    }

    Ok(())
}
