use std::{net::SocketAddr, path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::config::{BackoffConfig, StoreConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the store, persisting it to a snapshot file.
    Serve(ServeArgs),
    /// Store a value under a key.
    Store(StoreArgs),
    /// Print the value stored under a key.
    Load(KeyArgs),
    /// Remove a key.
    Erase(KeyArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// File the snapshot is loaded from and saved to.
    #[arg(long, env = "CONFIG_STORE_PATH")]
    pub storage_path: PathBuf,

    /// Socket address to bind. Use port 0 for an ephemeral port.
    #[arg(long, env = "CONFIG_STORE_LISTEN")]
    pub listen: SocketAddr,

    /// Delay before the first save after a mutation, and after a success.
    /// 0 together with a 0 max saves synchronously on every mutation.
    #[arg(long, env = "CONFIG_STORE_SAVE_INITIAL_BACKOFF_MS", default_value_t = 0)]
    pub save_initial_backoff_ms: u64,

    /// Upper bound for the retry delay after failed saves.
    #[arg(long, env = "CONFIG_STORE_SAVE_MAX_BACKOFF_MS", default_value_t = 0)]
    pub save_max_backoff_ms: u64,
}

impl ServeArgs {
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            storage_path: self.storage_path.clone(),
            save_backoff: BackoffConfig::debounced(
                Duration::from_millis(self.save_initial_backoff_ms),
                Duration::from_millis(self.save_max_backoff_ms),
            ),
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ServerArg {
    /// Address of the store to connect to.
    #[arg(long, env = "CONFIG_STORE_SERVER", default_value = "127.0.0.1:60070")]
    pub server: SocketAddr,
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    pub key: String,
    pub value: String,

    #[command(flatten)]
    pub connection: ServerArg,
}

#[derive(Args, Debug, Clone)]
pub struct KeyArgs {
    pub key: String,

    #[command(flatten)]
    pub connection: ServerArg,
}
