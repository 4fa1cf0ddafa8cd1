use anyhow::Result;
use clap::Parser;

use btfs::config::{CliArgs, Config};

fn main() -> Result<()> {
    let cli = CliArgs::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(cli.log_level())
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::from_args(&cli)?;
    btfs::run(config)
}
