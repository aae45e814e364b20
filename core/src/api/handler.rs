//! Turns raw JSON-RPC bodies into responses using a provider.
//!
//! Every failure becomes a JSON-RPC error response. Once a request could be
//! read, its `id` is the one sent back, whatever happened afterwards.
use crate::{
	error::{Error, ProviderError},
	provider::Provider,
	types::{Id, Request, Response},
};
use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error};

/// Subscriptions created or removed through a handler.
#[derive(Clone, Debug, PartialEq)]
pub enum SubscriptionChange {
	Added(String),
	Removed(String),
}

#[derive(Clone)]
pub struct JsonRpcHandler {
	provider: Arc<dyn Provider>,
	subscriptions: Option<UnboundedSender<SubscriptionChange>>,
}

impl JsonRpcHandler {
	pub fn new(provider: Arc<dyn Provider>) -> Self {
		Self {
			provider,
			subscriptions: None,
		}
	}

	/// Returns a handler reporting successful `eth_subscribe` and `eth_unsubscribe` calls.
	pub fn with_subscription_tracking(&self, sender: UnboundedSender<SubscriptionChange>) -> Self {
		Self {
			provider: self.provider.clone(),
			subscriptions: Some(sender),
		}
	}

	pub fn provider(&self) -> &Arc<dyn Provider> {
		&self.provider
	}

	/// Handles a body holding a single request or a batch of requests.
	pub async fn handle(&self, body: &[u8]) -> Value {
		let value = match serde_json::from_slice::<Value>(body) {
			Ok(value) => value,
			Err(error) => {
				debug!("Cannot parse request body: {error}");
				let error = Error::InvalidJsonInput(error.to_string());
				return to_value(Response::failure(Id::Null, error.to_error_object()));
			},
		};

		match value {
			Value::Array(requests) if requests.is_empty() => {
				let error = Error::InvalidRequest("Empty batch".to_string());
				to_value(Response::failure(Id::Null, error.to_error_object()))
			},
			Value::Array(requests) => {
				let responses = join_all(requests.into_iter().map(|request| self.handle_request(request))).await;
				Value::Array(responses.into_iter().map(to_value).collect())
			},
			request => to_value(self.handle_request(request).await),
		}
	}

	pub async fn handle_request(&self, request: Value) -> Response {
		let id = request
			.get("id")
			.and_then(|id| serde_json::from_value::<Id>(id.clone()).ok())
			.unwrap_or_default();

		let response = match self.call(request).await {
			Ok(result) => Response::success(id.clone(), result),
			Err(error) => {
				if error.is_internal() {
					error!(%id, "Failed to handle JSON-RPC request: {error}");
				} else {
					debug!(%id, "JSON-RPC request failed: {error}");
				}
				Response::failure(id.clone(), error.to_error_object())
			},
		};

		let validated = serde_json::to_value(&response)
			.map_err(|error| error.to_string())
			.and_then(Response::from_value);
		let mut response = validated.unwrap_or_else(|reason| {
			error!(%id, reason, "Provider produced an invalid response");
			Response::failure(id.clone(), ProviderError::internal())
		});
		response.id = id;
		response
	}

	async fn call(&self, request: Value) -> Result<Value, Error> {
		let Request { method, params, id, .. } = Request::from_value(request)?;
		debug!(method, %id, "Handling JSON-RPC request");

		let result = self.provider.send(&method, &params).await?;
		self.track_subscription(&method, &params, &result);
		Ok(result)
	}

	fn track_subscription(&self, method: &str, params: &[Value], result: &Value) {
		let Some(sender) = &self.subscriptions else {
			return;
		};
		let change = match (method, params.first(), result) {
			("eth_subscribe", _, Value::String(id)) => SubscriptionChange::Added(id.clone()),
			("eth_unsubscribe", Some(Value::String(id)), Value::Bool(true)) => {
				SubscriptionChange::Removed(id.clone())
			},
			_ => return,
		};
		// Receiver is gone when the connection is closing
		let _ = sender.send(change);
	}
}

fn to_value(response: Response) -> Value {
	serde_json::to_value(response).unwrap_or_else(|error| {
		error!("Cannot serialize JSON-RPC response: {error}");
		Value::Null
	})
}
