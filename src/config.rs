//! Configuration handling for the application.

use clap::Parser;
use std::path::PathBuf;

/// Default upload body limit: 100 MiB.
pub const DEFAULT_MAX_UPLOAD_SIZE: usize = 100 * 1024 * 1024;

/// Default display quota: 15 GiB.
pub const DEFAULT_QUOTA_BYTES: u64 = 15 * 1024 * 1024 * 1024;

/// Personal file-storage server with folders, stars and a trash.
#[derive(Parser, Debug, Clone)]
#[command(name = "minidrive")]
#[command(about = "Personal file-storage server with a JSON metadata store")]
pub struct Config {
    /// Server listen address (host or IP)
    #[arg(long, env = "LISTEN_ADDR", default_value = "127.0.0.1")]
    pub listen_addr: String,

    /// Server listen port
    #[arg(long, env = "PORT", default_value_t = 3001)]
    pub listen_port: u16,

    /// Directory holding the `uploads` tree
    #[arg(long, env = "DATA_DIR", default_value = "public")]
    pub data_dir: PathBuf,

    /// Path to the JSON metadata document
    #[arg(long, env = "DB_PATH", default_value = "database.json")]
    pub db_path: PathBuf,

    /// Maximum upload request size in bytes
    #[arg(long, env = "MAX_UPLOAD_SIZE", default_value_t = DEFAULT_MAX_UPLOAD_SIZE)]
    pub max_upload_size: usize,

    /// Storage quota shown to clients, in bytes
    #[arg(long, env = "QUOTA_BYTES", default_value_t = DEFAULT_QUOTA_BYTES)]
    pub quota_bytes: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// `host:port` to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen_addr, self.listen_port)
    }
}
