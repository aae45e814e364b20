//! Provider abstraction shared by the transport, the middleware chain and the server.
//!
//! Every middleware holds the next inner [`Provider`] and either fully handles a
//! method or forwards it untouched. Event subscriptions are never handled by a
//! middleware: [`Provider::events`] always resolves to the emitter owned by the
//! innermost provider.
use crate::error::Error;
use async_trait::async_trait;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Event name used for subscription notifications (`eth_subscription` payloads).
pub const NOTIFICATION_EVENT: &str = "notification";

pub type ListenerId = u64;

struct Listener {
	event: String,
	sender: UnboundedSender<Value>,
}

/// Out-of-band event channel of a provider.
#[derive(Default)]
pub struct EventEmitter {
	next_id: AtomicU64,
	listeners: Mutex<HashMap<ListenerId, Listener>>,
}

impl EventEmitter {
	pub fn add_listener(&self, event: &str, sender: UnboundedSender<Value>) -> ListenerId {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let listener = Listener {
			event: event.to_string(),
			sender,
		};
		self.listeners.lock().insert(id, listener);
		id
	}

	pub fn subscribe(&self, event: &str) -> (ListenerId, UnboundedReceiver<Value>) {
		let (sender, receiver) = mpsc::unbounded_channel();
		(self.add_listener(event, sender), receiver)
	}

	pub fn unsubscribe(&self, id: ListenerId) -> bool {
		self.listeners.lock().remove(&id).is_some()
	}

	/// Delivers the payload to every listener of the event.
	///
	/// Returns `true` if at least one listener received it.
	pub fn emit(&self, event: &str, payload: Value) -> bool {
		let mut listeners = self.listeners.lock();
		listeners.retain(|_, listener| !listener.sender.is_closed());

		let mut delivered = false;
		for listener in listeners.values().filter(|listener| listener.event == event) {
			delivered |= listener.sender.send(payload.clone()).is_ok();
		}
		delivered
	}

	pub fn listener_count(&self, event: &str) -> usize {
		self.listeners
			.lock()
			.values()
			.filter(|listener| listener.event == event && !listener.sender.is_closed())
			.count()
	}
}

#[async_trait]
pub trait Provider: Send + Sync {
	/// Sends a JSON-RPC call and returns its `result`.
	///
	/// Fails with [`Error::Provider`] when the call reached a node that answered with an error.
	async fn send(&self, method: &str, params: &[Value]) -> Result<Value, Error>;

	/// Event emitter shared by the whole chain.
	fn events(&self) -> &EventEmitter;

	fn subscribe(&self, event: &str) -> (ListenerId, UnboundedReceiver<Value>) {
		self.events().subscribe(event)
	}

	fn unsubscribe(&self, id: ListenerId) -> bool {
		self.events().unsubscribe(id)
	}

	fn emit(&self, event: &str, payload: Value) -> bool {
		self.events().emit(event, payload)
	}

	/// Registers a listener and returns the provider it was called on, so that
	/// chained calls keep going through the same layer.
	fn on(&self, event: &str, sender: UnboundedSender<Value>) -> &Self
	where
		Self: Sized,
	{
		self.events().add_listener(event, sender);
		self
	}
}

#[async_trait]
impl<P: Provider + ?Sized> Provider for Arc<P> {
	async fn send(&self, method: &str, params: &[Value]) -> Result<Value, Error> {
		(**self).send(method, params).await
	}

	fn events(&self) -> &EventEmitter {
		(**self).events()
	}
}

#[async_trait]
impl<P: Provider + ?Sized> Provider for Box<P> {
	async fn send(&self, method: &str, params: &[Value]) -> Result<Value, Error> {
		(**self).send(method, params).await
	}

	fn events(&self) -> &EventEmitter {
		(**self).events()
	}
}

pub type SendFuture = BoxFuture<'static, Result<Value, Error>>;

/// Provider whose `send` goes through an interception function.
///
/// The function receives the inner provider, the method and a deep copy of the
/// caller's parameters, so it may mutate them freely.
pub struct WrappedProvider<P, F> {
	inner: Arc<P>,
	intercept: F,
}

pub fn wrap_send<P, F>(inner: P, intercept: F) -> WrappedProvider<P, F>
where
	P: Provider + 'static,
	F: Fn(Arc<P>, String, Vec<Value>) -> SendFuture + Send + Sync,
{
	WrappedProvider {
		inner: Arc::new(inner),
		intercept,
	}
}

impl<P, F> WrappedProvider<P, F> {
	pub fn inner(&self) -> &P {
		&self.inner
	}
}

#[async_trait]
impl<P, F> Provider for WrappedProvider<P, F>
where
	P: Provider + 'static,
	F: Fn(Arc<P>, String, Vec<Value>) -> SendFuture + Send + Sync,
{
	async fn send(&self, method: &str, params: &[Value]) -> Result<Value, Error> {
		(self.intercept)(self.inner.clone(), method.to_string(), params.to_vec()).await
	}

	fn events(&self) -> &EventEmitter {
		self.inner.events()
	}
}
