use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the board's HTTP backend.
    Serve(ServeArgs),
    /// Follow a running board, printing posts as they arrive.
    Watch(WatchArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Volatile, lost on restart.
    Memory,
    /// Every read and write goes to Redis.
    Redis,
    /// Redis for durability, reads served from memory.
    Hybrid,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetTarget {
    /// Local directory, served by the board under /uploads.
    Disk,
    /// Google Cloud Storage bucket with public objects.
    Gcs,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Socket address to bind.
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Overrides the port of --listen.
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "BOARD_BACKEND", value_enum, default_value_t = Backend::Memory)]
    pub backend: Backend,

    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Key prefix for everything the board stores in Redis.
    #[arg(long, env = "REDIS_NAMESPACE", default_value = "board")]
    pub redis_namespace: String,

    #[arg(long, env = "ASSET_SINK", value_enum, default_value_t = AssetTarget::Disk)]
    pub assets: AssetTarget,

    #[arg(long, env = "ASSET_DIR", default_value = "./uploads")]
    pub asset_dir: PathBuf,

    /// Base URL clients use to reach this server; prefixes disk attachment links.
    #[arg(long, env = "PUBLIC_URL", default_value = "http://localhost:8080")]
    pub public_url: String,

    #[arg(long, env = "GCS_BUCKET", default_value = "messagesapi")]
    pub gcs_bucket: String,

    /// OAuth access token for bucket uploads.
    #[arg(long, env = "GCS_ACCESS_TOKEN", hide_env_values = true)]
    pub gcs_token: Option<String>,

    /// Largest accepted request body, in megabytes.
    #[arg(long, env = "BODY_LIMIT_MB", default_value_t = 32)]
    pub body_limit_mb: usize,
}

impl ServeArgs {
    pub fn bind_addr(&self) -> SocketAddr {
        let mut addr = self.listen;
        if let Some(port) = self.port {
            addr.set_port(port);
        }
        addr
    }
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Base URL of the board to follow.
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    pub server: String,

    /// Delay between polls, in milliseconds.
    #[arg(long, default_value_t = 2000)]
    pub interval_ms: u64,
}
