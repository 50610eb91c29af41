use anyhow::Result;
use chrono::Local;
use modsync::{Config, ManifestFetcher, ServerClient, ServerStatus, StatusMonitor};
use std::sync::Mutex;

pub fn run() -> Result<()> {
    let config = Config::load()?;
    let client = ServerClient::from_config(&config)?;
    let interval = config.status_poll_interval();

    println!(
        "Watching {} every {}s (press Enter to stop)",
        config.base_url(),
        interval.as_secs()
    );
    println!();

    let last: Mutex<Option<ServerStatus>> = Mutex::new(None);
    let monitor = StatusMonitor::spawn(
        interval,
        move || ServerStatus::from_reachable(ManifestFetcher::from_config(&client, &config).is_reachable()),
        move |status| {
            let mut last = match last.lock() {
                Ok(last) => last,
                Err(poisoned) => poisoned.into_inner(),
            };
            if *last != Some(status) {
                let marker = match status {
                    ServerStatus::Online => "✓",
                    ServerStatus::Offline => "✗",
                };
                println!("{} [{}] Server is {}", marker, Local::now().format("%H:%M:%S"), status);
                *last = Some(status);
            }
        },
    );

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    monitor.stop();
    Ok(())
}
