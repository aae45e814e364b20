pub mod configuration;
pub mod handler;
pub mod server;
mod ws;

pub use handler::JsonRpcHandler;
pub use server::{JsonRpcServer, ServerHandle};
