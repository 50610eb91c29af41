use anyhow::{bail, Result};
use modsync::{Config, Session};

pub fn run(action: &crate::AdminAction) -> Result<()> {
    use crate::AdminAction;

    let config = Config::load()?;
    if config.secret.is_empty() {
        bail!("No secret configured. Set one with 'modsync config set secret <value>' or MODSYNC_SECRET");
    }
    let session = Session::new(config)?;
    let admin = session.admin();

    match action {
        AdminAction::Validate => {
            let status = admin.validate();
            if status.is_enabled {
                println!("✓ Admin access granted");
                if status.allow_privileged_action {
                    println!("✓ Privileged actions allowed");
                } else {
                    println!("⚠ Privileged actions not allowed");
                }
            } else {
                println!("✗ Secret was not accepted");
            }
        }
        AdminAction::Running { resource } => {
            if admin.is_running(resource)? {
                println!("✓ {} is running", resource);
            } else {
                println!("✗ {} is not running", resource);
            }
        }
        AdminAction::Close { resource } => {
            if admin.close(resource)? {
                println!("✓ {} closed", resource);
            } else {
                println!("⚠ {} was not closed", resource);
            }
        }
    }

    Ok(())
}
