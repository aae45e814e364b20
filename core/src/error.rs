use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const INTERNAL_ERROR: i64 = -32603;

/// JSON-RPC error object, as carried by a failed response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Error)]
#[error("{message} (code {code})")]
pub struct ProviderError {
	pub code: i64,
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
}

impl ProviderError {
	pub fn new(code: i64, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into(),
			data: None,
		}
	}

	pub fn with_data(mut self, data: Value) -> Self {
		self.data = Some(data);
		self
	}

	pub fn internal() -> Self {
		Self::new(INTERNAL_ERROR, "Internal error")
	}
}

#[derive(Clone, Debug, Error)]
pub enum Error {
	#[error("Parse error: {0}")]
	InvalidJsonInput(String),
	#[error("Invalid request: {0}")]
	InvalidRequest(String),
	#[error("Invalid JSON-RPC response received: {body}")]
	InvalidJsonResponse { body: String },
	#[error("Cannot connect to the network {network}. Please make sure your node is running, and check your internet connection and networks config")]
	NodeIsNotRunning { network: String },
	#[error("Network request timed out. Please check your internet connection and networks config")]
	NetworkTimeout,
	#[error(transparent)]
	Transport(Arc<reqwest::Error>),
	#[error("Configured to use chain id {configured}, but connected to a chain with id {connected}")]
	InvalidGlobalChainId { configured: u64, connected: u64 },
	#[error("Account {account} is not managed by the node you are connected to")]
	NotLocalAccount { account: String },
	#[error("No local account was set and there are no accounts in the remote node")]
	NoRemoteAccountAvailable,
	#[error("Missing param {param} from a tx being signed locally")]
	MissingTxParamToSignLocally { param: &'static str },
	#[error("Missing \"data\" param when calling eth_sign")]
	EthSignMissingDataParam,
	#[error("HD path {path} is invalid. Read about BIP32 to know about the valid forms")]
	InvalidHdPath { path: String },
	#[error("Cannot derive key {path} from mnemonic: {reason}")]
	CantDeriveKey { path: String, reason: String },
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error(transparent)]
	Provider(ProviderError),
	#[error("Internal error: {0}")]
	Internal(String),
}

impl Error {
	pub fn code(&self) -> i64 {
		match self {
			Error::InvalidJsonInput(_) => PARSE_ERROR,
			Error::InvalidRequest(_) => INVALID_REQUEST,
			Error::InvalidArgument(_) => INVALID_PARAMS,
			Error::Provider(error) => error.code,
			_ => INTERNAL_ERROR,
		}
	}

	/// Converts the error into the object sent back to JSON-RPC callers.
	///
	/// Errors received from a node keep their code, message and data.
	pub fn to_error_object(&self) -> ProviderError {
		match self {
			Error::Provider(error) => error.clone(),
			other => ProviderError::new(other.code(), other.to_string()),
		}
	}

	pub fn is_internal(&self) -> bool {
		self.code() == INTERNAL_ERROR && !matches!(self, Error::Provider(_))
	}
}

impl From<ProviderError> for Error {
	fn from(error: ProviderError) -> Self {
		Error::Provider(error)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use test_case::test_case;

	#[test_case(Error::InvalidJsonInput("eof".to_string()), PARSE_ERROR ; "Parse error")]
	#[test_case(Error::InvalidRequest("no method".to_string()), INVALID_REQUEST ; "Invalid request")]
	#[test_case(Error::InvalidArgument("bad address".to_string()), INVALID_PARAMS ; "Invalid params")]
	#[test_case(Error::NetworkTimeout, INTERNAL_ERROR ; "Timeout")]
	#[test_case(Error::InvalidGlobalChainId { configured: 5, connected: 1 }, INTERNAL_ERROR ; "Chain id mismatch")]
	#[test_case(Error::Provider(ProviderError::new(3, "execution reverted")), 3 ; "Node error")]
	fn error_codes(error: Error, expected: i64) {
		assert_eq!(error.code(), expected);
	}

	#[test]
	fn provider_errors_are_preserved() {
		let error = ProviderError::new(-32000, "nonce too low").with_data(json!({"nonce": 2}));
		let object = Error::Provider(error.clone()).to_error_object();
		assert_eq!(object, error);
	}

	#[test]
	fn taxonomy_errors_become_internal_errors() {
		let object = Error::NotLocalAccount {
			account: "0x0000000000000000000000000000000000000001".to_string(),
		}
		.to_error_object();
		assert_eq!(object.code, INTERNAL_ERROR);
		assert!(object.message.contains("is not managed by the node"));
		assert_eq!(object.data, None);
	}
}
