use anyhow::Result;
use clap::Parser;

use snapvault::cli::{handle_backup_command, BackupCommands};
use snapvault::config::{paths::SnapvaultPaths, settings::Settings};
use snapvault::logging;

#[derive(Parser)]
#[command(
    name = "snapvault",
    author = "Kaylee Beyene",
    version,
    about = "Encrypted, compressed file backups",
    long_about = "snapvault packs files and directories into a single compressed \
                  archive, optionally encrypted with a passphrase, and restores \
                  them later. Archives are written atomically and old ones are \
                  pruned by a retention count."
)]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, env = "SNAPVAULT_LOG", default_value = logging::DEFAULT_LOG_LEVEL)]
    log_level: String,

    #[command(subcommand)]
    command: BackupCommands,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level)?;

    // Initialize paths and settings
    let paths = SnapvaultPaths::new()?;
    let settings = Settings::load_or_create(&paths)?;

    handle_backup_command(&paths, &settings, cli.command)?;

    Ok(())
}
