use anyhow::Result;
use clap::Parser;
use oomph_loader::cli::Cli;
use oomph_loader::launcher;

fn main() -> Result<()> {
    // Parse CLI arguments first (before logging init for cleaner output)
    let cli = Cli::parse();
    oomph_loader::debug::init_log_bridge(cli.log_level);

    let config = cli.to_config();
    config.validate()?;

    log::info!("Starting oomph-loader {}", oomph_loader::VERSION);

    // The child's exit status is only reported, never propagated
    launcher::run(&config)?;
    Ok(())
}
