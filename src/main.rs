//! `ncmd` daemon binary.

use std::rc::Rc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ncmd::config::{AppConfig, Cli};
use ncmd::server;
use ncmd::txn::NoopTxn;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = AppConfig::load(&cli)?;

    // One reactor thread; adapter handlers run to completion without locks.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, server::run_daemon(cfg, Rc::new(NoopTxn)))
}
