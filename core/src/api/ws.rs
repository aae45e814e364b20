use super::handler::{JsonRpcHandler, SubscriptionChange};
use crate::{provider::NOTIFICATION_EVENT, types::Notification, utils::spawn_in_span};
use color_eyre::{eyre::WrapErr, Result};
use futures::{FutureExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use tokio::{sync::mpsc, task::JoinSet};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn, Instrument};
use warp::ws::{Message, WebSocket};

type Sender = mpsc::UnboundedSender<Result<Message, warp::Error>>;

fn send<T: Serialize>(sender: &Sender, message: &T) -> Result<()> {
	let ws_message = serde_json::to_string(message)
		.map(Message::text)
		.wrap_err("Failed to serialize message")?;

	sender
		.send(Ok(ws_message))
		.wrap_err("Failed to send message")
}

fn is_owned(subscriptions: &HashSet<String>, notification: &Value) -> bool {
	notification
		.get("subscription")
		.and_then(Value::as_str)
		.is_some_and(|id| subscriptions.contains(id))
}

/// Serves JSON-RPC frames of one WebSocket connection.
///
/// Requests are handled concurrently and answered as soon as they complete.
/// Subscriptions created over the socket are forwarded to it, and removed
/// when the socket closes or the server shuts down.
pub async fn connect(web_socket: WebSocket, handler: JsonRpcHandler, shutdown: CancellationToken) {
	let (web_socket_sender, mut web_socket_receiver) = web_socket.split();
	let (sender, receiver) = mpsc::unbounded_channel();
	let receiver_stream = UnboundedReceiverStream::new(receiver);

	let forwarder = spawn_in_span(receiver_stream.forward(web_socket_sender).map(|result| {
		if let Err(error) = result {
			debug!(%error, "Error sending web socket message");
		}
	}));

	let (changes_sender, mut changes) = mpsc::unbounded_channel();
	let handler = handler.with_subscription_tracking(changes_sender);
	let (listener, mut notifications) = handler.provider().subscribe(NOTIFICATION_EVENT);
	let mut subscriptions = HashSet::new();
	let mut requests = JoinSet::new();

	loop {
		tokio::select! {
			biased;

			_ = shutdown.cancelled() => break,
			Some(change) = changes.recv() => match change {
				SubscriptionChange::Added(id) => {
					subscriptions.insert(id);
				},
				SubscriptionChange::Removed(id) => {
					subscriptions.remove(&id);
				},
			},
			Some(notification) = notifications.recv() => {
				if !is_owned(&subscriptions, &notification) {
					continue;
				}
				if let Err(error) = send(&sender, &Notification::subscription(notification)) {
					warn!("Error sending notification: {error:#}");
				}
			},
			Some(result) = requests.join_next(), if !requests.is_empty() => {
				if let Err(error) = result {
					error!(%error, "Web socket request task failed");
				}
			},
			message = web_socket_receiver.next() => {
				let message = match message {
					None => break,
					Some(Err(error)) => {
						debug!(%error, "Error receiving client message");
						break;
					},
					Some(Ok(message)) if message.is_close() => break,
					Some(Ok(message)) if !message.is_text() => continue,
					Some(Ok(message)) => message,
				};

				let handler = handler.clone();
				let sender = sender.clone();
				requests.spawn(
					async move {
						let response = handler.handle(message.as_bytes()).await;
						if let Err(error) = send(&sender, &response) {
							warn!("Error sending message: {error:#}");
						}
					}
					.in_current_span(),
				);
			},
		}
	}

	handler.provider().unsubscribe(listener);
	requests.shutdown().await;

	for subscription in subscriptions {
		let params = [json!(subscription)];
		if let Err(error) = handler.provider().send("eth_unsubscribe", &params).await {
			debug!(subscription, "Cannot remove subscription of a closed socket: {error}");
		}
	}

	drop(sender);
	if let Err(error) = forwarder.await {
		error!(%error, "Web socket forwarder failed");
	}
}
