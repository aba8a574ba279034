//! Admin JSON-RPC API
//!
//! Stats, maintenance, enrichment queue control and warming control for the
//! Shelfwise daemon. Localhost TCP only.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use handler::RpcHandler;
pub use server::{RpcServer, RpcServerConfig};
