//! JSON-RPC 2.0 envelopes shared by the transport, the batcher and the server.
//!
//! Requests and responses are correlated only by [`Id`]. Responses are
//! validated structurally when they are read from the wire ([`Response::from_value`])
//! and again by the server before they are written back.
use crate::error::{Error, ProviderError};
use ethers_core::types::U256;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt::{self, Display, Formatter};

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
	/// Any JSON number, negative and fractional ids included.
	Number(Number),
	String(String),
	#[default]
	Null,
}

impl From<u64> for Id {
	fn from(value: u64) -> Self {
		Id::Number(value.into())
	}
}

impl Display for Id {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Id::Number(id) => write!(f, "{id}"),
			Id::String(id) => write!(f, "{id:?}"),
			Id::Null => write!(f, "null"),
		}
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Request {
	pub jsonrpc: String,
	pub method: String,
	#[serde(default)]
	pub params: Vec<Value>,
	#[serde(default)]
	pub id: Id,
}

impl Request {
	pub fn new(id: impl Into<Id>, method: &str, params: Vec<Value>) -> Self {
		Self {
			jsonrpc: JSONRPC_VERSION.to_string(),
			method: method.to_string(),
			params,
			id: id.into(),
		}
	}

	/// Validates an inbound request envelope.
	///
	/// `params` must be an array when present, `id` must be a number, a string or null.
	pub fn from_value(value: Value) -> Result<Self, Error> {
		let request: Request = serde_json::from_value(value)
			.map_err(|error| Error::InvalidRequest(error.to_string()))?;

		if request.jsonrpc != JSONRPC_VERSION {
			return Err(Error::InvalidRequest(format!(
				"Unsupported JSON-RPC version {:?}",
				request.jsonrpc
			)));
		}

		Ok(request)
	}
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Payload {
	Result(Value),
	Error(ProviderError),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Response {
	pub jsonrpc: String,
	pub id: Id,
	#[serde(flatten)]
	pub payload: Payload,
}

impl Response {
	pub fn success(id: Id, result: Value) -> Self {
		Self {
			jsonrpc: JSONRPC_VERSION.to_string(),
			id,
			payload: Payload::Result(result),
		}
	}

	pub fn failure(id: Id, error: ProviderError) -> Self {
		Self {
			jsonrpc: JSONRPC_VERSION.to_string(),
			id,
			payload: Payload::Error(error),
		}
	}

	/// Structural validation of a response envelope.
	///
	/// A response must carry exactly one of `result` or `error`, and the error object
	/// must have an integer `code` and a string `message`.
	pub fn from_value(value: Value) -> Result<Self, String> {
		let Value::Object(mut object) = value else {
			return Err("Response is not a JSON object".to_string());
		};

		match object.get("jsonrpc") {
			Some(Value::String(version)) if version == JSONRPC_VERSION => {},
			_ => return Err("Response has an invalid jsonrpc version".to_string()),
		}

		let id = object
			.remove("id")
			.ok_or_else(|| "Response has no id".to_string())
			.and_then(|id| {
				serde_json::from_value::<Id>(id).map_err(|_| "Response has an invalid id".to_string())
			})?;

		let payload = match (object.remove("result"), object.remove("error")) {
			(Some(result), None) => Payload::Result(result),
			(None, Some(error)) => serde_json::from_value::<ProviderError>(error)
				.map(Payload::Error)
				.map_err(|error| format!("Response has an invalid error object: {error}"))?,
			(Some(_), Some(_)) => return Err("Response has both result and error".to_string()),
			(None, None) => return Err("Response has neither result nor error".to_string()),
		};

		Ok(Self {
			jsonrpc: JSONRPC_VERSION.to_string(),
			id,
			payload,
		})
	}

	pub fn into_result(self) -> Result<Value, Error> {
		match self.payload {
			Payload::Result(result) => Ok(result),
			Payload::Error(error) => Err(Error::Provider(error)),
		}
	}
}

/// Notification frame pushed to WebSocket subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
	pub jsonrpc: String,
	pub method: String,
	pub params: Value,
}

impl Notification {
	pub fn subscription(params: Value) -> Self {
		Self {
			jsonrpc: JSONRPC_VERSION.to_string(),
			method: "eth_subscription".to_string(),
			params,
		}
	}
}

/// Encodes a number as a JSON-RPC quantity (`0x`-prefixed, no leading zeros).
pub fn quantity(value: U256) -> Value {
	Value::String(format!("{value:#x}"))
}

pub fn parse_quantity(value: &Value) -> Result<U256, Error> {
	match value {
		Value::String(text) => {
			let digits = text
				.strip_prefix("0x")
				.ok_or_else(|| Error::InvalidArgument(format!("Invalid quantity {text:?}")))?;
			U256::from_str_radix(digits, 16)
				.map_err(|_| Error::InvalidArgument(format!("Invalid quantity {text:?}")))
		},
		Value::Number(number) => number
			.as_u64()
			.map(U256::from)
			.ok_or_else(|| Error::InvalidArgument(format!("Invalid quantity {number}"))),
		other => Err(Error::InvalidArgument(format!("Invalid quantity {other}"))),
	}
}

/// Parses a chain id as returned by either `eth_chainId` (hex quantity) or
/// `net_version` (decimal string).
pub fn parse_chain_id(value: &Value) -> Result<u64, Error> {
	let chain_id = match value {
		Value::String(text) if !text.starts_with("0x") => text
			.parse::<u64>()
			.map_err(|_| Error::InvalidArgument(format!("Invalid chain id {text:?}")))?,
		other => {
			let chain_id = parse_quantity(other)?;
			if chain_id > U256::from(u64::MAX) {
				return Err(Error::InvalidArgument(format!("Invalid chain id {other}")));
			}
			chain_id.as_u64()
		},
	};
	Ok(chain_id)
}

/// Returns the transaction object expected as the first parameter of
/// `eth_sendTransaction`, `eth_call` and `eth_estimateGas`.
pub fn transaction_mut(params: &mut [Value]) -> Option<&mut Map<String, Value>> {
	params.first_mut().and_then(Value::as_object_mut)
}

pub mod duration_millis_format {
	use serde::{self, Deserialize, Deserializer, Serializer};
	use std::time::Duration;

	pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_u64(duration.as_millis() as u64)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = u64::deserialize(deserializer)?;
		Ok(Duration::from_millis(value))
	}
}

pub mod tracing_level_format {
	use serde::{self, Deserialize, Deserializer, Serializer};
	use std::str::FromStr;
	use tracing::Level;

	pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&level.to_string())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = String::deserialize(deserializer)?;
		Level::from_str(&value).map_err(serde::de::Error::custom)
	}
}
