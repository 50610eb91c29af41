use anyhow::{bail, Result};
use modsync::{ApplyOptions, ApplyReport, Config, PrimaryAction, Session};

pub fn run(keep_orphans: bool) -> Result<()> {
    let config = Config::load()?;
    modsync::ensure_client_present(&config)?;
    let session = Session::new(config)?.with_progress(super::progress_display());

    println!("Syncing with {}...", session.config().base_url());
    println!();

    let mut snapshot = session.refresh()?;

    if let PrimaryAction::UpdatePlatform {
        installed,
        available,
    } = snapshot.primary_action()
    {
        println!("Updating platform {} → {}", installed, available);
        let report = session.update_platform()?;
        println!(
            "  ✓ {} file(s) written, {} skipped",
            report.written, report.skipped
        );
        println!();
        snapshot = session.refresh()?;
    }

    match snapshot.primary_action() {
        PrimaryAction::Offline => {
            bail!("Mod server {} is offline; nothing was changed", session.config().base_url());
        }
        PrimaryAction::Launch => {
            println!("✓ Everything is already up to date");
            return Ok(());
        }
        PrimaryAction::UpdatePlatform { installed, available } => {
            bail!(
                "Platform still reports {} after updating to {}; packages were not synced",
                installed,
                available
            );
        }
        PrimaryAction::Update => {}
    }

    let report = session.apply(&snapshot, ApplyOptions { keep_orphans })?;
    print_report(&report);

    if !report.is_success() {
        bail!("Some packages could not be synced");
    }
    Ok(())
}

fn print_report(report: &ApplyReport) {
    println!();

    if !report.config.downloaded.is_empty() {
        println!("Config files updated:");
        for name in &report.config.downloaded {
            println!("  ✓ {}", name);
        }
        println!();
    }

    for outcome in report.sync.outcomes() {
        match &outcome.result {
            Ok(version) => println!("  ✓ {} {}", outcome.package, version),
            Err(failure) => println!("  ✗ {}: {}", outcome.package, failure),
        }
    }
    for name in &report.removal.removed {
        println!("  ✓ {} removed", name);
    }
    for (name, error) in &report.removal.failures {
        println!("  ✗ {} could not be removed: {}", name, error);
    }

    println!();
    if report.after.reconciliation.is_fully_synced() {
        println!("✓ All packages match the server");
    } else {
        let left = report.after.reconciliation.pending().len()
            + report.after.reconciliation.orphaned().len();
        println!("⚠ {} package(s) still differ from the server", left);
    }
}
