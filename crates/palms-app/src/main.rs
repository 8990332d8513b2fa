use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use std::process::ExitCode;

use palms::{init_logging, setup_from_cli, App, Cli};
use palms_logging::DATA_DIR_ENV;

fn main() -> Result<ExitCode> {
    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Some(shell) = cli.generate {
        clap_complete::generate(shell, &mut Cli::command(), "palms", &mut std::io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    init_logging(cli.verbose);

    // Request logs resolve their directory from the environment; point it at
    // --data-dir before any other thread exists
    if let Some(dir) = &cli.data_dir {
        std::env::set_var(DATA_DIR_ENV, dir);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    runtime.block_on(async {
        let config = setup_from_cli(&cli)?;
        log::debug!("configuration: {:?}", config);
        let app = App::new(config).await?;
        app.run(cli.subcommand()).await
    })
}
