use anyhow::Result;
use modsync::Config;

pub fn run(action: &crate::ConfigAction) -> Result<()> {
    use crate::ConfigAction;

    match action {
        ConfigAction::Show => show_config(),
        ConfigAction::Set { key, value } => set_config(key, value),
        ConfigAction::Path => {
            println!("{}", Config::default_path()?.display());
            Ok(())
        }
    }
}

fn show_config() -> Result<()> {
    let config = Config::load()?;
    let config_path = Config::default_path()?;

    println!();
    println!("╔══════════════════════════════════════════════════════════════════════════════╗");
    println!("║                          modsync Configuration                               ║");
    println!("╚══════════════════════════════════════════════════════════════════════════════╝");
    println!();
    println!(
        "  📁 Config file: {}{}",
        config_path.display(),
        if config_path.exists() { "" } else { " (not written yet, using defaults)" }
    );
    println!();

    println!("┌─ Servers ────────────────────────────────────────────────────────────────────┐");
    println!("  Mod server:        {}", config.base_url());
    for mirror in &config.mirrors {
        println!("  Mirror:            {}", mirror);
    }
    println!("  Manifest:          {}", config.manifest_path);
    println!("  Platform server:   {}", config.platform_base_url());
    println!(
        "  Secret:            {}",
        if config.secret.is_empty() { "<not set>" } else { "<set>" }
    );
    println!(
        "  Timeouts:          fetch {}s, download {}s, poll {}s",
        config.fetch_timeout_secs, config.download_timeout_secs, config.status_poll_secs
    );
    println!("└──────────────────────────────────────────────────────────────────────────────┘");
    println!();

    println!("┌─ Paths ──────────────────────────────────────────────────────────────────────┐");
    match config.game_root() {
        Ok(root) => println!("  Game root:         {}", root.display()),
        Err(e) => println!("  Game root:         ✗ {}", e),
    }
    println!("  Packages:          {}", config.mods_dir.display());
    println!("  Config files:      {}", config.config_dir.display());
    println!("  Client:            {}", config.client_path.display());
    println!("└──────────────────────────────────────────────────────────────────────────────┘");
    println!();

    println!("┌─ Sync Rules ─────────────────────────────────────────────────────────────────┐");
    println!("  Artifact:          *.{}", config.artifact_extension);
    println!("  Sidecar:           {}", config.sidecar_file_name);
    println!("  Kept subfolder:    {}", config.config_subfolder);
    println!("  Excluded packages: {}", list(&config.excluded_packages));
    println!("  Excluded folders:  {}", list(&config.excluded_folders));
    println!("  Excluded configs:  {}", list(&config.excluded_config_files));
    println!("└──────────────────────────────────────────────────────────────────────────────┘");
    println!();

    println!("┌─ Platform ───────────────────────────────────────────────────────────────────┐");
    println!("  Name:              {}", config.platform_name);
    println!("  Core binary:       {}", config.platform_core_binary.display());
    println!("  Never overwrite:   {}", list(&config.platform_update_skip));
    println!("└──────────────────────────────────────────────────────────────────────────────┘");
    println!();

    println!("💡 Modify settings:");
    println!("   modsync config set <key> <value>");
    println!();

    Ok(())
}

fn list(values: &[String]) -> String {
    if values.is_empty() {
        "-".to_string()
    } else {
        values.join(", ")
    }
}

fn set_config(key: &str, value: &str) -> Result<()> {
    let mut config = Config::load()?;

    println!();
    println!("⚙️  Updating configuration...");
    println!();

    if let Err(e) = config.set(key, value) {
        println!("  ❌ {}", e);
        println!();
        println!("  Available keys:");
        for key in Config::keys() {
            println!("    • {}", key);
        }
        println!();
        anyhow::bail!("Invalid configuration key or value");
    }

    if key == "secret" {
        println!("  ✓ secret = <set>");
    } else {
        println!("  ✓ {} = \"{}\"", key, value);
    }

    config.save()?;
    println!();
    println!("✅ Configuration saved");
    println!();

    Ok(())
}
