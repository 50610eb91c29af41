pub mod admin;
pub mod config;
pub mod launch;
pub mod platform;
pub mod status;
pub mod sync;
pub mod watch;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use modsync::{ProgressSink, Reconciliation, SyncEvent, SyncStage};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Create an indicatif-backed progress sink: one line per package
pub fn progress_display() -> ProgressSink {
    let multi = MultiProgress::new();
    let bars: Mutex<HashMap<String, ProgressBar>> = Mutex::new(HashMap::new());

    Arc::new(move |event: &SyncEvent| {
        let mut bars = match bars.lock() {
            Ok(bars) => bars,
            Err(poisoned) => poisoned.into_inner(),
        };

        let bar = bars
            .entry(event.package.clone())
            .or_insert_with(|| {
                let bar = multi.add(ProgressBar::new_spinner());
                bar.set_style(spinner_style());
                bar.enable_steady_tick(Duration::from_millis(80));
                bar
            })
            .clone();

        match (event.stage, event.percent) {
            (SyncStage::Downloading, Some(percent)) => {
                if bar.length() != Some(100) {
                    bar.set_style(bar_style());
                    bar.set_length(100);
                }
                bar.set_position(u64::from(percent));
                bar.set_message(event.package.clone());
            }
            (SyncStage::UpToDate, _) | (SyncStage::Removed, _) => {
                bar.set_style(spinner_style());
                bar.finish_with_message(format!("✓ {}: {}", event.package, event.stage));
                bars.remove(&event.package);
            }
            (SyncStage::Failed, _) => {
                bar.set_style(spinner_style());
                bar.finish_with_message(format!("✗ {}: {}", event.package, event.stage));
                bars.remove(&event.package);
            }
            _ => {
                bar.set_style(spinner_style());
                bar.set_message(event.to_string());
            }
        }
    })
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  {msg:30} [{bar:30.cyan/blue}] {pos:>3}%")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

/// Print one row per reconciliation entry
pub fn print_entries(reconciliation: &Reconciliation) {
    if reconciliation.entries().is_empty() {
        println!("  No packages installed or listed by the server");
        return;
    }

    println!("  {:<32} {:<14} {:<14} Status", "Package", "Installed", "Server");
    println!("  {}", "─".repeat(76));
    for entry in reconciliation.entries() {
        let marker = if entry.status.needs_sync() || entry.status == modsync::EntryStatus::Orphaned {
            "⚠"
        } else {
            "✓"
        };
        println!(
            "{} {:<32} {:<14} {:<14} {}",
            marker, entry.name, entry.local_version, entry.remote_version, entry.status
        );
    }
}
