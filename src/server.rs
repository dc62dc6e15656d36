//! Daemon runtime: accept loop and shutdown handling.
//!
//! The daemon runs on a single `current_thread` runtime inside a
//! `tokio::task::LocalSet`; every adapter handler executes on that one
//! reactor thread, to completion, which is what lets the subsystem share
//! state through `Rc`/`RefCell` instead of locks.

use std::rc::Rc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::{AppConfig, Tunables};
use crate::registry::AdapterRegistry;
use crate::subscription::SubscriptionTable;
use crate::txn::TxnModule;

/// Run the daemon with the default subscription table.
///
/// Must be called from within a `tokio::task::LocalSet` context.
///
/// # Errors
/// Returns any failure binding the listen socket or accepting connections.
pub async fn run_daemon(cfg: AppConfig, txn: Rc<dyn TxnModule>) -> Result<()> {
    let registry = AdapterRegistry::new(SubscriptionTable::with_defaults(), txn, Tunables::from(&cfg));
    let listener = TcpListener::bind(&cfg.bind).await?;
    info!(bind = %cfg.bind, "ncmd listening for backend clients");
    serve(&registry, listener).await
}

/// Accept backend connections into `registry` until a shutdown signal.
///
/// # Errors
/// Currently infallible after bind; kept fallible for future teardown work.
pub async fn serve(registry: &Rc<AdapterRegistry>, listener: TcpListener) -> Result<()> {
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
            res = listener.accept() => match res {
                Ok((socket, peer)) => {
                    registry.create_adapter(socket, peer);
                }
                Err(err) => error!(%err, "accept error"),
            }
        }
    }

    registry.shutdown();
    Ok(())
}

/// Completes when termination is requested.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    res = tokio::signal::ctrl_c() => {
                        if let Err(err) = res {
                            error!(%err, "failed to listen for Ctrl-C");
                        }
                    }
                    _ = term.recv() => {}
                }
            }
            Err(err) => {
                error!(%err, "failed to install SIGTERM handler");
                wait_for_ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        wait_for_ctrl_c().await;
    }
}

async fn wait_for_ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(%err, "failed to listen for Ctrl-C");
    }
}
