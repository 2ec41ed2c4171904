//! Backup CLI commands
//!
//! Implements the `create`, `restore`, `list`, `info`, `prune` and `config`
//! commands on top of the backup engine.

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};

use crate::backup::retention::ARCHIVE_EXTENSION;
use crate::backup::{
    create_archive, inspect_archive, restore_archive, BackupManager, RestoreMode, RestoreOptions,
};
use crate::cli::passphrase::{read_new_passphrase, read_passphrase};
use crate::config::paths::SnapvaultPaths;
use crate::config::settings::Settings;
use crate::crypto::{is_encrypted_archive, SecureString};
use crate::display::{
    format_backup_list, format_create_report, format_metadata, format_restore_report, format_size,
};
use crate::error::{BackupError, BackupResult, Phase};

/// Where a passphrase should come from
#[derive(Args, Debug, Clone, Default)]
pub struct PassphraseArgs {
    /// Read the passphrase from this environment variable instead of prompting
    #[arg(long, value_name = "VAR")]
    pub passphrase_env: Option<String>,
}

/// Backup commands
#[derive(Subcommand, Debug)]
pub enum BackupCommands {
    /// Create a new backup
    Create {
        /// Files and directories to back up (defaults to configured sources)
        sources: Vec<PathBuf>,

        /// Write the archive here instead of the backup directory
        #[arg(short, long)]
        dest: Option<PathBuf>,

        /// Encrypt the archive with a passphrase
        #[arg(short, long)]
        encrypt: bool,

        /// Number of archives to keep in the backup directory
        #[arg(short, long)]
        keep: Option<usize>,

        #[command(flatten)]
        passphrase: PassphraseArgs,
    },

    /// Restore from a backup
    Restore {
        /// Backup filename or path (use 'latest' for most recent)
        backup: String,

        /// Restore under this directory instead of the filesystem root
        #[arg(short, long)]
        target: Option<PathBuf>,

        /// Extract into a scratch directory and swap it into place when complete
        #[arg(long, requires = "target")]
        staged: bool,

        /// Skip confirmation and write files
        #[arg(short, long)]
        force: bool,

        /// List every restored file
        #[arg(short, long)]
        verbose: bool,

        #[command(flatten)]
        passphrase: PassphraseArgs,
    },

    /// List all available backups
    List {
        /// Show detailed information
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show information about a specific backup
    Info {
        /// Backup filename or path
        backup: String,

        #[command(flatten)]
        passphrase: PassphraseArgs,
    },

    /// Delete old backups according to retention policy
    Prune {
        /// Number of archives to keep (defaults to the configured count)
        #[arg(short, long)]
        keep: Option<usize>,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },

    /// Show current configuration and paths
    Config {
        /// Write the default settings file if none exists
        #[arg(long)]
        init: bool,
    },
}

/// Handle a backup command
pub fn handle_backup_command(
    paths: &SnapvaultPaths,
    settings: &Settings,
    cmd: BackupCommands,
) -> BackupResult<()> {
    let manager = BackupManager::new(paths, settings.clone());

    match cmd {
        BackupCommands::Create {
            sources,
            dest,
            encrypt,
            keep,
            passphrase,
        } => {
            let passphrase = if encrypt || passphrase.passphrase_env.is_some() {
                Some(read_new_passphrase(passphrase.passphrase_env.as_deref())?)
            } else {
                None
            };

            match dest {
                Some(dest) => {
                    let sources = if sources.is_empty() {
                        settings.sources.clone()
                    } else {
                        sources
                    };
                    if sources.is_empty() {
                        return Err(BackupError::Config(
                            "No sources given and none configured".into(),
                        ));
                    }
                    let report = create_archive(
                        &dest,
                        &sources,
                        passphrase.as_ref(),
                        &settings.create_options(),
                    )?;
                    println!("{}", format_create_report(&report));
                }
                None => {
                    let report = manager.create_backup(&sources, passphrase.as_ref())?;
                    println!("{}", format_create_report(&report));

                    let keep = keep.unwrap_or(settings.retention.keep_count);
                    let deleted = manager.enforce_retention_with(keep)?;
                    if !deleted.is_empty() {
                        println!("Pruned {} old backup(s).", deleted.len());
                    }
                }
            }
        }

        BackupCommands::Restore {
            backup,
            target,
            staged,
            force,
            verbose,
            passphrase,
        } => {
            let backup_path = resolve_backup_path(&manager, &backup)?;
            let passphrase = passphrase_for(&backup_path, &passphrase)?;
            let metadata = inspect_archive(&backup_path, passphrase.as_ref())?;

            println!("Backup Information");
            println!("==================");
            println!("File: {}", backup_path.display());
            println!("{}", format_metadata(&metadata));
            println!();

            let destination = target
                .as_deref()
                .map(|t| t.display().to_string())
                .unwrap_or_else(|| "/ (original locations)".to_string());

            if !force {
                println!("WARNING: This will overwrite existing files under {}", destination);
                println!("To proceed, run again with --force flag:");
                println!("  snapvault restore {} --force", backup);
                return Ok(());
            }

            let options = RestoreOptions {
                target_dir: target,
                mode: if staged {
                    RestoreMode::Staged
                } else {
                    RestoreMode::InPlace
                },
            };

            println!("Restoring to {}...", destination);
            let report = restore_archive(&backup_path, passphrase.as_ref(), &options)?;
            println!("{}", format_restore_report(&report, verbose));
        }

        BackupCommands::List { verbose } => {
            let backups = manager.list_backups()?;
            println!("Backups in {}", manager.backup_dir().display());
            println!();
            println!("{}", format_backup_list(&backups, verbose, chrono::Utc::now()));
        }

        BackupCommands::Info { backup, passphrase } => {
            let backup_path = resolve_backup_path(&manager, &backup)?;
            let passphrase = passphrase_for(&backup_path, &passphrase)?;
            let metadata = inspect_archive(&backup_path, passphrase.as_ref())?;

            let size = std::fs::metadata(&backup_path)
                .map_err(|e| BackupError::io(Phase::Read, &backup_path, e))?
                .len();

            println!("Backup Details");
            println!("==============");
            println!("File: {}", backup_path.display());
            println!("Size: {}", format_size(size));
            println!("{}", format_metadata(&metadata));
        }

        BackupCommands::Prune { keep, force } => {
            let keep = keep.unwrap_or(settings.retention.keep_count);
            let backups = manager.list_backups()?;
            let to_delete = backups.len().saturating_sub(keep);

            if to_delete == 0 {
                println!("No backups to prune.");
                println!(
                    "Retention policy keeps {}; you have {} backup(s).",
                    keep,
                    backups.len()
                );
                return Ok(());
            }

            println!("Prune Summary");
            println!("=============");
            println!("Retention policy: keep {}", keep);
            println!("Current backups: {}", backups.len());
            println!("To be deleted: {}", to_delete);
            for backup in backups.iter().skip(keep) {
                println!("  {}", backup.filename);
            }
            println!();

            if !force {
                println!("To delete old backups, run again with --force flag:");
                println!("  snapvault prune --force");
                return Ok(());
            }

            let deleted = manager.enforce_retention_with(keep)?;
            println!("Deleted {} backup(s).", deleted.len());
        }

        BackupCommands::Config { init } => {
            if init && !paths.settings_file().exists() {
                settings.save(paths)?;
                println!("Wrote default settings to {}", paths.settings_file().display());
                println!();
            }

            println!("snapvault Configuration");
            println!("=======================");
            println!("Base directory:   {}", paths.base_dir().display());
            println!("Settings file:    {}", paths.settings_file().display());
            println!("Backup directory: {}", manager.backup_dir().display());
            println!();
            println!("Settings:");
            println!("{}", serde_json::to_string_pretty(settings)?);
        }
    }

    Ok(())
}

/// Ask for a passphrase only when the archive is encrypted
fn passphrase_for(path: &Path, args: &PassphraseArgs) -> BackupResult<Option<SecureString>> {
    if is_encrypted_archive(path)? {
        read_passphrase(args.passphrase_env.as_deref()).map(Some)
    } else {
        Ok(None)
    }
}

/// Resolve a backup identifier to a full path
fn resolve_backup_path(manager: &BackupManager, backup: &str) -> BackupResult<PathBuf> {
    // Handle "latest" keyword
    if backup.eq_ignore_ascii_case("latest") {
        return manager
            .get_latest_backup()?
            .map(|b| b.path)
            .ok_or_else(|| BackupError::backup_not_found("latest"));
    }

    // Check if it's a full path
    let path = PathBuf::from(backup);
    if path.is_file() {
        return Ok(path);
    }

    // Check if it's a filename in the backup directory
    let backup_path = manager.backup_dir().join(backup);
    if backup_path.is_file() {
        return Ok(backup_path);
    }

    let with_ext = manager
        .backup_dir()
        .join(format!("{}{}", backup, ARCHIVE_EXTENSION));
    if with_ext.is_file() {
        return Ok(with_ext);
    }

    Err(BackupError::backup_not_found(backup))
}
