use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct APIConfig {
	/// JSON-RPC server host name (default: 127.0.0.1).
	pub http_server_host: String,
	/// JSON-RPC server port, 0 picks a free port (default: 8545).
	pub http_server_port: u16,
}

impl Default for APIConfig {
	fn default() -> Self {
		Self {
			http_server_host: "127.0.0.1".to_owned(),
			http_server_port: 8545,
		}
	}
}
