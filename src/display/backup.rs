//! Backup display formatting
//!
//! Formats archive listings, metadata and operation reports for terminal output.

use chrono::{DateTime, Utc};

use crate::backup::{BackupInfo, BackupMetadata, CreateReport, RestoreReport};

/// Format a list of backups, newest first, as a table
pub fn format_backup_list(backups: &[BackupInfo], verbose: bool, now: DateTime<Utc>) -> String {
    if backups.is_empty() {
        return "No backups found.\nCreate one with: snapvault create".to_string();
    }

    let name_width = backups
        .iter()
        .map(|b| b.filename.len())
        .max()
        .unwrap_or(4)
        .max(4);

    let mut output = String::new();

    if verbose {
        for (i, backup) in backups.iter().enumerate() {
            output.push_str(&format!(
                "{}. {}\n   Created:   {}\n   Modified:  {}\n   Size:      {}\n   Encrypted: {}\n   Age:       {}\n\n",
                i + 1,
                backup.filename,
                backup.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                backup.modified.format("%Y-%m-%d %H:%M:%S UTC"),
                format_size(backup.size_bytes),
                if backup.encrypted { "yes" } else { "no" },
                format_duration(now.signed_duration_since(backup.modified)),
            ));
        }
    } else {
        output.push_str(&format!(
            "{:<name_width$}  {:>6}  {:>10}  {}\n",
            "Name",
            "Age",
            "Size",
            "Enc",
            name_width = name_width,
        ));
        output.push_str(&format!(
            "{:-<name_width$}  {:->6}  {:->10}  {:-<3}\n",
            "",
            "",
            "",
            "",
            name_width = name_width,
        ));

        for backup in backups {
            output.push_str(&format!(
                "{:<name_width$}  {:>6}  {:>10}  {}\n",
                backup.filename,
                format_duration(now.signed_duration_since(backup.modified)),
                format_size(backup.size_bytes),
                if backup.encrypted { "yes" } else { "no" },
                name_width = name_width,
            ));
        }
        output.push('\n');
    }

    output.push_str(&format!("Total: {} backup(s)", backups.len()));
    output
}

/// Format the metadata stored inside an archive
pub fn format_metadata(metadata: &BackupMetadata) -> String {
    let mut output = String::new();
    output.push_str(&format!("Format version: {}\n", metadata.version));
    output.push_str(&format!(
        "Created:        {}\n",
        metadata.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    output.push_str(&format!(
        "Encrypted:      {}\n",
        if metadata.encrypted { "yes" } else { "no" }
    ));
    if let Some(host) = metadata.hostname() {
        output.push_str(&format!("Host:           {}\n", host));
    }

    output.push_str("Sources:\n");
    for source in &metadata.files {
        output.push_str(&format!("  {}\n", source));
    }

    let extra: Vec<_> = metadata
        .metadata
        .iter()
        .filter(|(k, _)| k.as_str() != "hostname")
        .collect();
    if !extra.is_empty() {
        output.push_str("Annotations:\n");
        for (key, value) in extra {
            output.push_str(&format!("  {}: {}\n", key, value));
        }
    }

    output.trim_end().to_string()
}

/// Summarize a finished create
pub fn format_create_report(report: &CreateReport) -> String {
    format!(
        "Backup created: {}\nFiles: {}\nSize: {} ({} before compression){}",
        report.path.display(),
        report.file_count,
        format_size(report.bytes_out),
        format_size(report.bytes_in),
        if report.metadata.encrypted {
            "\nEncrypted: yes"
        } else {
            ""
        }
    )
}

/// Summarize a finished restore
pub fn format_restore_report(report: &RestoreReport, verbose: bool) -> String {
    let mut output = format!("Restore complete. {}", report.summary());
    if verbose {
        for path in &report.files_restored {
            output.push_str(&format!("\n  {}", path.display()));
        }
    }
    output
}

/// Format a duration in human-readable form
pub fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    format!("{}mo", days / 30)
}

/// Format a file size in human-readable form
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
