//! Coalesces concurrent calls into batch requests.
//!
//! Calls are queued as deferred calls. The first call reaching an empty queue
//! schedules a flush after the batching delay, later calls only join the queue.
//! A flush takes the whole queue at once, so calls made while a batch is in
//! flight start a new batch.
use crate::{
	error::Error,
	provider::{EventEmitter, Provider},
	types::{Id, Request, Response},
	utils::spawn_in_span,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::{
	collections::HashMap,
	mem,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
	time::Duration,
};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Transport able to send several requests in one physical call.
#[async_trait]
pub trait BatchSend: Send + Sync + 'static {
	async fn send_batch(&self, batch: &[Request]) -> Result<Vec<Response>, Error>;
}

struct DeferredCall {
	request: Request,
	responder: oneshot::Sender<Result<Value, Error>>,
}

struct Inner<T> {
	transport: T,
	queue: Mutex<Vec<DeferredCall>>,
	next_id: AtomicU64,
	delay: Duration,
	events: EventEmitter,
}

pub struct RequestBatcher<T> {
	inner: Arc<Inner<T>>,
}

impl<T> Clone for RequestBatcher<T> {
	fn clone(&self) -> Self {
		Self {
			inner: self.inner.clone(),
		}
	}
}

impl<T: BatchSend> RequestBatcher<T> {
	pub fn new(transport: T, delay: Duration) -> Self {
		Self {
			inner: Arc::new(Inner {
				transport,
				queue: Mutex::new(Vec::new()),
				next_id: AtomicU64::new(1),
				delay,
				events: EventEmitter::default(),
			}),
		}
	}

	pub fn transport(&self) -> &T {
		&self.inner.transport
	}

	fn enqueue(&self, request: Request) -> oneshot::Receiver<Result<Value, Error>> {
		let (responder, receiver) = oneshot::channel();

		let mut queue = self.inner.queue.lock();
		let schedule_flush = queue.is_empty();
		queue.push(DeferredCall { request, responder });
		drop(queue);

		if schedule_flush {
			let inner = self.inner.clone();
			spawn_in_span(async move {
				tokio::time::sleep(inner.delay).await;
				inner.flush().await;
			});
		}

		receiver
	}
}

impl<T: BatchSend> Inner<T> {
	async fn flush(&self) {
		let calls = mem::take(&mut *self.queue.lock());
		if calls.is_empty() {
			return;
		}

		let (requests, responders): (Vec<_>, Vec<_>) = calls
			.into_iter()
			.map(|call| (call.request, call.responder))
			.unzip();
		let batch_size = requests.len();
		debug!(batch_size, "Flushing request batch");

		let responses = match self.transport.send_batch(&requests).await {
			Ok(responses) => responses,
			Err(error) => {
				warn!(batch_size, "Batch request failed: {error}");
				for responder in responders {
					let _ = responder.send(Err(error.clone()));
				}
				return;
			},
		};

		let mut responses = responses
			.into_iter()
			.map(|response| (response.id.clone(), response))
			.collect::<HashMap<Id, Response>>();

		for (request, responder) in requests.iter().zip(responders) {
			let outcome = responses
				.remove(&request.id)
				.ok_or_else(|| Error::InvalidJsonResponse {
					body: format!("Batch response has no entry for request id {}", request.id),
				})
				.and_then(Response::into_result);
			// Caller gave up waiting
			let _ = responder.send(outcome);
		}
	}
}

#[async_trait]
impl<T: BatchSend> Provider for RequestBatcher<T> {
	async fn send(&self, method: &str, params: &[Value]) -> Result<Value, Error> {
		let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
		let receiver = self.enqueue(Request::new(id, method, params.to_vec()));

		receiver
			.await
			.map_err(|_| Error::Internal(format!("Batched call {method} was dropped")))?
	}

	fn events(&self) -> &EventEmitter {
		&self.inner.events
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures::future::join_all;
	use proptest::prelude::*;
	use serde_json::json;

	#[derive(Default)]
	struct RecordingTransport {
		batches: Mutex<Vec<Vec<Request>>>,
		latency: Duration,
		failure: Option<Error>,
		order: Option<Vec<usize>>,
	}

	impl RecordingTransport {
		fn methods(&self) -> Vec<Vec<String>> {
			self.batches
				.lock()
				.iter()
				.map(|batch| batch.iter().map(|request| request.method.clone()).collect())
				.collect()
		}
	}

	#[async_trait]
	impl BatchSend for RecordingTransport {
		async fn send_batch(&self, batch: &[Request]) -> Result<Vec<Response>, Error> {
			self.batches.lock().push(batch.to_vec());
			if !self.latency.is_zero() {
				tokio::time::sleep(self.latency).await;
			}
			if let Some(error) = &self.failure {
				return Err(error.clone());
			}

			let responses = batch
				.iter()
				.map(|request| Response::success(request.id.clone(), json!(request.method)))
				.collect::<Vec<_>>();
			Ok(match &self.order {
				Some(order) => order.iter().map(|&index| responses[index].clone()).collect(),
				None => responses,
			})
		}
	}

	fn batcher(transport: RecordingTransport) -> RequestBatcher<RecordingTransport> {
		RequestBatcher::new(transport, Duration::from_millis(1))
	}

	#[tokio::test(start_paused = true)]
	async fn concurrent_calls_share_one_batch() {
		let batcher = batcher(RecordingTransport::default());

		let first = tokio::spawn({
			let batcher = batcher.clone();
			async move { batcher.send("eth_chainId", &[]).await }
		});
		let second = tokio::spawn({
			let batcher = batcher.clone();
			async move { batcher.send("eth_blockNumber", &[]).await }
		});
		tokio::time::sleep(Duration::from_millis(5)).await;
		let third = batcher.send("net_version", &[]).await;

		assert_eq!(first.await.unwrap().unwrap(), json!("eth_chainId"));
		assert_eq!(second.await.unwrap().unwrap(), json!("eth_blockNumber"));
		assert_eq!(third.unwrap(), json!("net_version"));
		assert_eq!(
			batcher.transport().methods(),
			vec![vec!["eth_chainId", "eth_blockNumber"], vec!["net_version"]]
		);
	}

	#[tokio::test(start_paused = true)]
	async fn transport_failure_rejects_the_whole_batch() {
		let batcher = batcher(RecordingTransport {
			failure: Some(Error::NodeIsNotRunning {
				network: "localhost".to_string(),
			}),
			..Default::default()
		});

		let outcomes = join_all([
			batcher.send("eth_chainId", &[]),
			batcher.send("eth_blockNumber", &[]),
			batcher.send("net_version", &[]),
		])
		.await;

		assert_eq!(batcher.transport().methods().len(), 1);
		for outcome in outcomes {
			assert!(matches!(outcome, Err(Error::NodeIsNotRunning { network }) if network == "localhost"));
		}
	}

	#[tokio::test(start_paused = true)]
	async fn calls_during_a_flush_start_a_new_batch() {
		let batcher = batcher(RecordingTransport {
			latency: Duration::from_millis(10),
			..Default::default()
		});

		let in_flight = tokio::spawn({
			let batcher = batcher.clone();
			async move { batcher.send("eth_chainId", &[]).await }
		});
		// The first flush happens at 1ms and completes at 11ms
		tokio::time::sleep(Duration::from_millis(5)).await;
		assert_eq!(batcher.transport().methods().len(), 1);

		let later = batcher.send("eth_blockNumber", &[]).await.unwrap();
		assert_eq!(later, json!("eth_blockNumber"));
		assert_eq!(in_flight.await.unwrap().unwrap(), json!("eth_chainId"));
		assert_eq!(
			batcher.transport().methods(),
			vec![vec!["eth_chainId"], vec!["eth_blockNumber"]]
		);
	}

	#[tokio::test(start_paused = true)]
	async fn missing_response_only_fails_its_own_call() {
		let batcher = batcher(RecordingTransport {
			order: Some(vec![0]),
			..Default::default()
		});

		let (first, second) = tokio::join!(
			batcher.send("eth_chainId", &[]),
			batcher.send("eth_blockNumber", &[])
		);
		assert_eq!(first.unwrap(), json!("eth_chainId"));
		assert!(matches!(second, Err(Error::InvalidJsonResponse { .. })));
	}

	proptest! {
		#[test]
		fn responses_are_matched_by_id(order in (1usize..16).prop_flat_map(|size| Just((0..size).collect::<Vec<_>>()).prop_shuffle())) {
			let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
			let size = order.len();
			let batcher = batcher(RecordingTransport { order: Some(order), ..Default::default() });

			let outcomes = runtime.block_on(async {
				let methods = (0..size).map(|index| format!("method_{index}")).collect::<Vec<_>>();
				let calls = methods.iter().map(|method| batcher.send(method, &[]));
				join_all(calls).await
			});

			prop_assert_eq!(batcher.transport().methods().len(), 1);
			for (index, outcome) in outcomes.into_iter().enumerate() {
				prop_assert_eq!(outcome.unwrap(), json!(format!("method_{index}")));
			}
		}
	}
}
