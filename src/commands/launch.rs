use anyhow::Result;
use modsync::{Config, PrimaryAction, Session};

pub fn run() -> Result<()> {
    let config = Config::load()?;
    modsync::ensure_client_present(&config)?;
    let session = Session::new(config)?;

    let snapshot = session.refresh()?;
    match snapshot.primary_action() {
        PrimaryAction::Launch => {}
        PrimaryAction::Offline => println!("⚠ Mod server is offline; packages were not checked"),
        PrimaryAction::Update | PrimaryAction::UpdatePlatform { .. } => {
            println!("⚠ Installed packages differ from the server. Run 'modsync sync' first.");
        }
    }

    let child = session.launch_client()?;
    println!("✓ Client started (pid {})", child.id());
    Ok(())
}
