use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use modsync::config::LOG_FILE_NAME;
use modsync::Config;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

mod commands;

/// modsync - keeps your game mods in step with the server
#[derive(Parser)]
#[command(name = "modsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log filter for stderr and modsync.log (overridden by MODSYNC_LOG)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show installed packages against the server manifest
    Status,

    /// Bring installed packages and config files in line with the server
    Sync {
        /// Keep packages the server no longer lists
        #[arg(long)]
        keep_orphans: bool,
    },

    /// Check the platform version, optionally updating it
    Platform {
        /// Download and apply the platform update if one is available
        #[arg(long)]
        update: bool,
    },

    /// Start the game client
    Launch,

    /// Poll the mod server and report when it goes online or offline
    Watch,

    /// Use the server's admin endpoints
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Check the configured secret
    Validate,

    /// Ask whether a server-side resource is running
    Running {
        /// Resource name (e.g., server)
        resource: String,
    },

    /// Ask the server to close a resource
    Close {
        /// Resource name (e.g., server)
        resource: String,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key as written in modsync.json (e.g., serverAddress)
        key: String,
        /// Configuration value; lists are comma-separated
        value: String,
    },

    /// Print the path of the configuration file
    Path,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_env("MODSYNC_LOG")
        .unwrap_or_else(|_| EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn")));

    let file_layer = Config::config_dir_path()
        .ok()
        .and_then(|dir| {
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(LOG_FILE_NAME))
                .ok()
        })
        .map(|file| fmt::layer().with_ansi(false).with_writer(Mutex::new(file)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let result = match cli.command {
        Commands::Status => commands::status::run(),
        Commands::Sync { keep_orphans } => commands::sync::run(keep_orphans),
        Commands::Platform { update } => commands::platform::run(update),
        Commands::Launch => commands::launch::run(),
        Commands::Watch => commands::watch::run(),
        Commands::Admin { action } => commands::admin::run(&action),
        Commands::Config { action } => commands::config::run(&action),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "modsync", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
