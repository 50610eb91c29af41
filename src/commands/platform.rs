use anyhow::Result;
use modsync::{Config, PlatformGate, Session};

pub fn run(update: bool) -> Result<()> {
    let config = Config::load()?;
    modsync::ensure_client_present(&config)?;
    let session = Session::new(config)?.with_progress(super::progress_display());

    match session.check_platform()? {
        PlatformGate::Current => println!("✓ Platform '{}' is current", session.config().platform_name),
        PlatformGate::Unknown => {
            println!("⚠ Could not determine the installed or available platform version");
        }
        PlatformGate::UpdateAvailable {
            installed,
            available,
        } => {
            println!(
                "⚠ Platform '{}' {} is installed, {} is available",
                session.config().platform_name,
                installed,
                available
            );

            if update {
                println!();
                let report = session.update_platform()?;
                println!();
                println!(
                    "✓ Platform updated: {} file(s) written, {} replaced, {} skipped",
                    report.written, report.backed_up, report.skipped
                );
            } else {
                println!();
                println!("Run 'modsync platform --update' to install it.");
            }
        }
    }

    Ok(())
}
