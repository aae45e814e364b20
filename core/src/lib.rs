//! JSON-RPC provider middlewares, transports and server.
//!
//! Outbound calls go through the middleware chain down to a transport:
//! `caller -> middleware::apply chain -> RequestBatcher / HttpProvider -> node`.
//! Inbound calls go through [`api::JsonRpcServer`] into any [`provider::Provider`].

pub mod api;
pub mod error;
pub mod middleware;
pub mod network;
pub mod provider;
pub mod types;
pub mod utils;
