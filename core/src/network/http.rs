use super::{batcher::BatchSend, configuration::HttpConfig};
use crate::{
	error::Error,
	provider::{EventEmitter, Provider},
	types::{Id, Request, Response},
};
use async_trait::async_trait;
use reqwest::{
	header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER},
	StatusCode,
};
use serde::Serialize;
use serde_json::Value;
use std::{
	collections::HashMap,
	str::FromStr,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
	time::Duration,
};
use tracing::{debug, warn};

const MAX_ATTEMPTS: usize = 6;
const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Provider sending every call as an HTTP POST to a JSON-RPC endpoint.
pub struct HttpProvider {
	client: reqwest::Client,
	url: String,
	network_name: String,
	next_id: AtomicU64,
	events: EventEmitter,
}

impl HttpProvider {
	pub fn new(config: HttpConfig) -> Result<Self, Error> {
		let mut headers = HeaderMap::new();
		for (name, value) in &config.http_headers {
			let header_name = HeaderName::from_str(name)
				.map_err(|_| Error::InvalidArgument(format!("Invalid HTTP header name {name:?}")))?;
			let header_value = HeaderValue::from_str(value).map_err(|_| {
				Error::InvalidArgument(format!("Invalid value for HTTP header {name:?}"))
			})?;
			headers.insert(header_name, header_value);
		}

		let client = reqwest::Client::builder()
			.default_headers(headers)
			.timeout(config.timeout)
			.build()
			.map_err(|error| Error::Transport(Arc::new(error)))?;

		Ok(Self {
			client,
			url: config.url,
			network_name: config.network_name,
			next_id: AtomicU64::new(1),
			events: EventEmitter::default(),
		})
	}

	/// Shared code path of single and batch calls, returns the raw response body.
	async fn post<T: Serialize + ?Sized>(&self, body: &T) -> Result<String, Error> {
		let mut attempt = 1;
		loop {
			let response = self
				.client
				.post(&self.url)
				.json(body)
				.send()
				.await
				.map_err(|error| self.transport_error(error))?;

			if response.status() == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_ATTEMPTS {
				if let Some(delay) = retry_after(&response).filter(|delay| *delay <= MAX_RETRY_DELAY) {
					warn!(attempt, ?delay, url = self.url, "Rate limited by the node, retrying");
					tokio::time::sleep(delay).await;
					attempt += 1;
					continue;
				}
			}

			return response
				.text()
				.await
				.map_err(|error| self.transport_error(error));
		}
	}

	fn transport_error(&self, error: reqwest::Error) -> Error {
		if error.is_timeout() {
			Error::NetworkTimeout
		} else if error.is_connect() {
			Error::NodeIsNotRunning {
				network: self.network_name.clone(),
			}
		} else {
			Error::Transport(Arc::new(error))
		}
	}
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
	let seconds = response.headers().get(RETRY_AFTER)?.to_str().ok()?;
	seconds.trim().parse::<u64>().ok().map(Duration::from_secs)
}

fn parse_body(body: &str) -> Result<Value, Error> {
	serde_json::from_str(body).map_err(|_| Error::InvalidJsonResponse {
		body: body.to_string(),
	})
}

#[async_trait]
impl Provider for HttpProvider {
	async fn send(&self, method: &str, params: &[Value]) -> Result<Value, Error> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let request = Request::new(id, method, params.to_vec());
		debug!(method, id, "Sending JSON-RPC request");

		let body = self.post(&request).await?;
		let response = Response::from_value(parse_body(&body)?)
			.map_err(|_| Error::InvalidJsonResponse { body })?;

		response.into_result()
	}

	fn events(&self) -> &EventEmitter {
		&self.events
	}
}

#[async_trait]
impl BatchSend for HttpProvider {
	/// Sends all requests in one POST and returns the responses in request order.
	async fn send_batch(&self, batch: &[Request]) -> Result<Vec<Response>, Error> {
		debug!(batch_size = batch.len(), "Sending JSON-RPC batch");
		let body = self.post(batch).await?;
		let invalid = || Error::InvalidJsonResponse { body: body.clone() };

		let Value::Array(values) = parse_body(&body)? else {
			return Err(invalid());
		};

		let mut responses = values
			.into_iter()
			.map(|value| Response::from_value(value).map(|response| (response.id.clone(), response)))
			.collect::<Result<HashMap<Id, Response>, _>>()
			.map_err(|_| invalid())?;

		batch
			.iter()
			.map(|request| responses.remove(&request.id).ok_or_else(invalid))
			.collect()
	}
}
