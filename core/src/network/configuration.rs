use crate::types::duration_millis_format;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};

pub const LOCAL_ENDPOINT: &str = "http://127.0.0.1:8545";

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct HttpConfig {
	/// JSON-RPC endpoint of the node (default: http://127.0.0.1:8545).
	pub url: String,
	/// Network name used in connection error messages (default: "localhost").
	pub network_name: String,
	/// Per-request timeout in milliseconds (default: 20000).
	#[serde(with = "duration_millis_format")]
	pub timeout: Duration,
	/// Extra headers sent with every request.
	pub http_headers: HashMap<String, String>,
}

impl Default for HttpConfig {
	fn default() -> Self {
		Self {
			url: LOCAL_ENDPOINT.to_string(),
			network_name: "localhost".to_string(),
			timeout: Duration::from_millis(20000),
			http_headers: HashMap::new(),
		}
	}
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
	/// Coalesce concurrent calls into batch requests (default: false).
	pub batch_enable: bool,
	/// Time in milliseconds calls are collected before a batch is sent (default: 1).
	#[serde(with = "duration_millis_format")]
	pub batch_delay: Duration,
}

impl Default for BatchConfig {
	fn default() -> Self {
		Self {
			batch_enable: false,
			batch_delay: Duration::from_millis(1),
		}
	}
}
