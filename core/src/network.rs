//! Outbound side: the HTTP transport and the request batcher.
pub mod batcher;
pub mod configuration;
pub mod http;

pub use batcher::{BatchSend, RequestBatcher};
pub use http::HttpProvider;
