//! JSON-RPC API Layer
//!
//! Implements the JSON-RPC 2.0 surface of the Padron query engine: lookups,
//! job polling, bulk submission and the operator controls.

pub mod error;
pub mod handler;
pub mod rate_limiter;
pub mod server;
pub mod types;

pub use server::RpcServer;
