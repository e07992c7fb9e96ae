// src/cli.rs
use anyhow::{anyhow, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use crate::archive::ArchiveFormat;
use crate::backup::BackupEngine;
use crate::restore::RestoreEngine;
use crate::space::bytes_to_human;

#[derive(Parser)]
#[command(
    name = "timevault",
    about = "timevault v0.1.0",
    long_about = "timevault v0.1.0\nTimestamped backup and restore with disk-space admission control",
    version = "v0.1.0"
)]
pub struct Cli {
    /// Source path to back up, or the backup path when --restore is given
    ///
    /// Examples:
    ///   timevault /home/user/docs /mnt/backups
    ///   timevault /home/user/docs /mnt/backups -f gztar
    ///   timevault --restore /mnt/backups/docs_20260830_120000 /home/user/docs
    #[arg(required = true)]
    pub source: PathBuf,

    /// Destination directory (backup), or restore target (--restore).
    /// For backups, falls back to the configured default destination.
    pub destination: Option<PathBuf>,

    /// Compress the backup into a single archive of this format
    #[arg(short = 'f', long = "compression-format", value_enum)]
    pub compression_format: Option<ArchiveFormat>,

    /// Restore a backup instead of creating one (archives are auto-detected
    /// by suffix and extracted)
    #[arg(short, long)]
    pub restore: bool,

    /// Report the space requirement without performing the backup
    #[arg(long)]
    pub info: bool,

    /// Path to configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Refuse below 10% free space and ask for confirmation below 20%
    #[arg(long)]
    pub strict_space: bool,

    /// Answer yes to all confirmation prompts
    #[arg(short, long)]
    pub yes: bool,

    /// Show a progress spinner during the operation
    #[arg(long)]
    pub progress: bool,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Main entry point: dispatch to the requested mode
    pub fn execute(&self) -> Result<()> {
        if self.restore {
            self.cmd_restore()
        } else if self.info {
            self.cmd_info()
        } else {
            self.cmd_backup()
        }
    }

    // ------------------------------------------------------------------------
    // Command implementations
    // ------------------------------------------------------------------------

    fn cmd_backup(&self) -> Result<()> {
        println!("timevault {} command 'backup' called", crate::VERSION);

        let config = crate::config::Config::load(self.config.as_deref()).unwrap_or_default();
        let destination = self.resolve_destination(&config)?;
        let engine = self.backup_engine(config);

        let spinner = self.spinner("Backing up...");
        let result = match self.compression_format {
            Some(format) => engine.compress_backup(&self.source, &destination, format),
            None => engine.create_backup(&self.source, &destination),
        };
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }
        let outcome = result?;

        println!("\n[SUCCESS] Backup created successfully!");
        println!("  Type: {}", outcome.operation);
        if let Some(format) = self.compression_format {
            println!("  Compression: {}", format);
        }
        println!("  Size: {}", bytes_to_human(outcome.size_bytes));
        println!("  Duration: {:.1}s", outcome.duration_secs);
        println!("  Location: {}", outcome.backup_path.display());
        println!("  Metadata: {}", outcome.meta_path.display());

        Ok(())
    }

    fn cmd_restore(&self) -> Result<()> {
        println!("timevault {} command 'restore' called", crate::VERSION);

        let target = self
            .destination
            .as_deref()
            .ok_or_else(|| anyhow!("No restore target specified."))?;

        println!(
            "Restoring backup '{}' to '{}'",
            self.source.display(),
            target.display()
        );

        let spinner = self.spinner("Restoring...");
        let result = RestoreEngine::new().restore(&self.source, target);
        if let Some(spinner) = spinner {
            spinner.finish_and_clear();
        }
        let outcome = result?;

        println!("\n[SUCCESS] Restore completed to {}", target.display());
        if let Some(format) = outcome.extracted {
            println!("  Extracted archive: {}", format);
        }
        println!("  Duration: {:.1}s", outcome.duration_secs);

        Ok(())
    }

    fn cmd_info(&self) -> Result<()> {
        println!("timevault {} command 'info' called", crate::VERSION);

        let config = crate::config::Config::load(self.config.as_deref()).unwrap_or_default();
        let destination = self.resolve_destination(&config)?;
        let engine = self.backup_engine(config);

        let report = engine.backup_info(&self.source, &destination, self.compression_format)?;

        println!("\n[INFO] Space requirement for {}", self.source.display());
        println!("  Source size: {}", bytes_to_human(report.raw_bytes));
        println!(
            "  Required (with x{} buffer): {}",
            report.buffer,
            bytes_to_human(report.required_bytes)
        );
        println!(
            "  Free at destination: {} of {}",
            bytes_to_human(report.free_bytes),
            bytes_to_human(report.total_bytes)
        );
        println!(
            "  Sufficient: {}",
            if report.sufficient { "yes" } else { "NO" }
        );

        Ok(())
    }

    // ------------------------------------------------------------------------
    // Helper methods
    // ------------------------------------------------------------------------

    fn backup_engine(&self, config: crate::config::Config) -> BackupEngine {
        let strict = self.strict_space || config.space.strict;
        let engine = BackupEngine::new(config).with_strict_space(strict);

        if self.yes {
            engine.with_confirm(Box::new(|_, _| true))
        } else {
            engine.with_confirm(Box::new(|estimate, free_percent| {
                println!(
                    "[WARNING] Low disk space: {:.1}% free ({} free, {} required)",
                    free_percent,
                    bytes_to_human(estimate.free_bytes),
                    bytes_to_human(estimate.required_bytes)
                );
                prompt_yes_no("Continue anyway? [y/N]: ")
            }))
        }
    }

    /// Destination resolution: CLI positional wins, config default second.
    fn resolve_destination(&self, config: &crate::config::Config) -> Result<PathBuf> {
        self.destination
            .clone()
            .or_else(|| config.core.destination.clone())
            .ok_or_else(|| {
                anyhow!("No destination specified. Pass one or set core.destination in config.")
            })
    }

    fn spinner(&self, message: &'static str) -> Option<ProgressBar> {
        if !self.progress {
            return None;
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg} ({elapsed})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(message);
        spinner.enable_steady_tick(Duration::from_millis(100));
        Some(spinner)
    }
}

fn prompt_yes_no(prompt: &str) -> bool {
    print!("{prompt}");
    if io::stdout().flush().is_err() {
        return false;
    }

    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }

    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
