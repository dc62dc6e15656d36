//! Daemon configuration and runtime tunables.
//!
//! Configuration layers, lowest precedence first: built-in defaults, the
//! `.ncmd.toml` file, `NCMD_*` environment variables, then CLI flags.

use std::ffi::OsString;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Default configuration file consulted when `--config` is not given.
pub const CONFIG_FILE: &str = ".ncmd.toml";

/// Runtime configuration of the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Listen address for backend client connections.
    pub bind: String,
    /// Read passes per readable tick.
    pub read_burst: usize,
    /// Whole frames written per writable tick.
    pub write_burst: usize,
    /// Frames decoded and dispatched per processing tick.
    pub proc_burst: usize,
    /// Delay before a new connection's initial config sync, in milliseconds.
    pub conn_init_delay_ms: u64,
    /// Pause before writes resume after burst exhaustion, in milliseconds.
    pub write_resume_delay_ms: u64,
    /// Delay before queued frames are processed, in microseconds.
    pub proc_delay_us: u64,
    /// Kernel send-buffer size requested per socket, in bytes.
    pub send_bufsz: usize,
    /// Kernel receive-buffer size requested per socket, in bytes.
    pub recv_bufsz: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5560".to_owned(),
            read_burst: 8,
            write_burst: 64,
            proc_burst: 32,
            conn_init_delay_ms: 50,
            write_resume_delay_ms: 10,
            proc_delay_us: 100,
            send_bufsz: 65536,
            recv_bufsz: 65536,
        }
    }
}

/// Command-line interface of the daemon.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "ncmd", about = "network configuration management daemon")]
pub struct Cli {
    /// Listen address for backend client connections.
    #[arg(long)]
    pub bind: Option<String>,
    /// Configuration file to read instead of `.ncmd.toml`.
    #[arg(long)]
    pub config: Option<String>,
}

impl AppConfig {
    /// Merge the configuration layers under the parsed CLI.
    ///
    /// # Errors
    /// Returns any error raised while reading or deserialising a layer.
    pub fn load(cli: &Cli) -> Result<Self> {
        let file = cli.config.as_deref().unwrap_or(CONFIG_FILE);
        let mut cfg: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed("NCMD_"))
            .extract()?;
        if let Some(bind) = &cli.bind {
            cfg.bind.clone_from(bind);
        }
        Ok(cfg)
    }

    /// Parse `args` as the CLI would and load the layered configuration.
    ///
    /// # Errors
    /// Returns argument-parsing errors and any error from [`Self::load`].
    pub fn load_from_iter<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args)?;
        Self::load(&cli)
    }
}

/// Digest of the per-connection tunables handed to adapters and drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tunables {
    /// Read passes per readable tick.
    pub read_burst: usize,
    /// Whole frames written per writable tick.
    pub write_burst: usize,
    /// Frames decoded and dispatched per processing tick.
    pub proc_burst: usize,
    /// Delay before a new connection's initial config sync.
    pub conn_init_delay: Duration,
    /// Pause before writes resume after burst exhaustion.
    pub write_resume_delay: Duration,
    /// Delay before queued frames are processed.
    pub proc_delay: Duration,
    /// Kernel send-buffer size requested per socket.
    pub send_bufsz: usize,
    /// Kernel receive-buffer size requested per socket.
    pub recv_bufsz: usize,
}

impl From<&AppConfig> for Tunables {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            read_burst: cfg.read_burst,
            write_burst: cfg.write_burst,
            proc_burst: cfg.proc_burst,
            conn_init_delay: Duration::from_millis(cfg.conn_init_delay_ms),
            write_resume_delay: Duration::from_millis(cfg.write_resume_delay_ms),
            proc_delay: Duration::from_micros(cfg.proc_delay_us),
            send_bufsz: cfg.send_bufsz,
            recv_bufsz: cfg.recv_bufsz,
        }
    }
}

impl Default for Tunables {
    fn default() -> Self { Self::from(&AppConfig::default()) }
}
