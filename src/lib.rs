//! Backend-adapter subsystem of the network-configuration management daemon.
//!
//! Routing engines (a static-routes engine, a BGP engine, …) connect to the
//! daemon over stream sockets; this crate owns the daemon-side half of that
//! relationship. For each connected backend it frames a length-prefixed
//! binary protocol, dispatches replies into the configuration-transaction
//! contract, carries transaction requests back out, and maintains the
//! subscription map that resolves a configuration path to the set of
//! interested backend clients.
//!
//! Everything runs on one reactor thread: handlers execute to completion and
//! state is shared through `Rc`/`RefCell`, never locks.

#![cfg_attr(test, allow(clippy::unwrap_used, reason = "test code can panic"))]
#![cfg_attr(test, allow(clippy::indexing_slicing, reason = "test code with known bounds"))]

pub mod adapter;
pub mod client;
pub mod config;
pub mod dispatch;
pub(crate) mod driver;
pub mod frame;
pub mod message;
pub mod registry;
pub mod server;
pub mod snapshot;
pub mod subscription;
pub mod txn;
