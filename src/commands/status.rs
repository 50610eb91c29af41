use anyhow::Result;
use modsync::{Config, EntryStatus, PlatformGate, PrimaryAction, Session};

pub fn run() -> Result<()> {
    let config = Config::load()?;
    modsync::ensure_client_present(&config)?;
    let session = Session::new(config)?;

    println!("Checking {}...", session.config().base_url());
    println!();

    let snapshot = session.refresh()?;

    if snapshot.is_offline() {
        println!("✗ Mod server is offline or has no packages");
        println!();
    }

    super::print_entries(&snapshot.reconciliation);
    println!();

    let r = &snapshot.reconciliation;
    println!(
        "  {} up to date, {} to update, {} to install, {} to remove",
        r.count(EntryStatus::UpToDate),
        r.count(EntryStatus::NeedsUpdate),
        r.count(EntryStatus::NotInstalled),
        r.count(EntryStatus::Orphaned)
    );

    match &snapshot.platform {
        PlatformGate::Current => println!("  Platform: ✓ current"),
        PlatformGate::UpdateAvailable {
            installed,
            available,
        } => println!("  Platform: ⚠ {} installed, {} available", installed, available),
        PlatformGate::Unknown => println!("  Platform: version unknown"),
    }
    println!();

    match snapshot.primary_action() {
        PrimaryAction::UpdatePlatform { .. } => {
            println!("Next: update the platform with 'modsync platform --update' or 'modsync sync'");
        }
        PrimaryAction::Offline => println!("Next: wait for the server to come back ('modsync watch')"),
        PrimaryAction::Update => println!("Next: run 'modsync sync'"),
        PrimaryAction::Launch => println!("✓ Everything is up to date. Run 'modsync launch' to play."),
    }

    Ok(())
}
