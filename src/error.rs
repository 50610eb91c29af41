use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Server returned HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Package not found on server: {0}")]
    PackageNotFound(String),

    #[error("Invalid version string: '{0}'")]
    InvalidVersion(String),

    #[error("Archive for '{0}' contains no installable payload")]
    NoPayload(String),

    #[error("Platform must be updated from {installed} to {available} before packages can be synced")]
    PlatformUpdateRequired { installed: String, available: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Required file not found: {}\n\n\
             Hint: modsync must be placed in the game's root directory, next to the\n\
             client launcher. Check `clientPath` in modsync.json or run:\n\
             modsync config set clientPath <relative/path/to/launcher>",
             .0.display())]
    MissingExecutable(std::path::PathBuf),

    #[error("{0}")]
    Other(String),
}
