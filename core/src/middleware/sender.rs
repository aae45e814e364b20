use crate::{
	error::Error,
	provider::{EventEmitter, Provider},
	types::transaction_mut,
};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;

const METHODS_WITH_SENDER: [&str; 3] = ["eth_sendTransaction", "eth_call", "eth_estimateGas"];

fn needs_sender(method: &str, params: &[Value]) -> bool {
	METHODS_WITH_SENDER.contains(&method)
		&& matches!(params.first(), Some(Value::Object(tx)) if !tx.contains_key("from"))
}

fn with_sender(params: &[Value], sender: &str) -> Vec<Value> {
	let mut params = params.to_vec();
	if let Some(tx) = transaction_mut(&mut params) {
		tx.insert("from".to_string(), Value::String(sender.to_string()));
	}
	params
}

/// Fills a missing `from` with a configured address.
pub struct FixedSender<P> {
	inner: P,
	sender: String,
}

impl<P: Provider> FixedSender<P> {
	pub fn new(inner: P, sender: String) -> Self {
		Self { inner, sender }
	}
}

#[async_trait]
impl<P: Provider> Provider for FixedSender<P> {
	async fn send(&self, method: &str, params: &[Value]) -> Result<Value, Error> {
		if !needs_sender(method, params) {
			return self.inner.send(method, params).await;
		}
		let params = with_sender(params, &self.sender);
		self.inner.send(method, &params).await
	}

	fn events(&self) -> &EventEmitter {
		self.inner.events()
	}
}

/// Fills a missing `from` with the first account of the node.
///
/// The account is looked up until one is found, and cached from then on.
pub struct AutomaticSender<P> {
	inner: P,
	sender: OnceCell<String>,
}

impl<P: Provider> AutomaticSender<P> {
	pub fn new(inner: P) -> Self {
		Self {
			inner,
			sender: OnceCell::new(),
		}
	}

	pub fn inner(&self) -> &P {
		&self.inner
	}

	async fn first_account(&self) -> Result<Option<&String>, Error> {
		let lookup = self.sender.get_or_try_init(|| async {
			let accounts = self.inner.send("eth_accounts", &[]).await?;
			match accounts.get(0) {
				Some(Value::String(account)) => Ok(account.clone()),
				_ => Err(Error::NoRemoteAccountAvailable),
			}
		});

		match lookup.await {
			Ok(account) => Ok(Some(account)),
			Err(Error::NoRemoteAccountAvailable) => Ok(None),
			Err(error) => Err(error),
		}
	}
}

#[async_trait]
impl<P: Provider> Provider for AutomaticSender<P> {
	async fn send(&self, method: &str, params: &[Value]) -> Result<Value, Error> {
		if !needs_sender(method, params) {
			return self.inner.send(method, params).await;
		}

		match self.first_account().await? {
			Some(sender) => {
				let params = with_sender(params, sender);
				self.inner.send(method, &params).await
			},
			None if method == "eth_sendTransaction" => Err(Error::NoRemoteAccountAvailable),
			None => self.inner.send(method, params).await,
		}
	}

	fn events(&self) -> &EventEmitter {
		self.inner.events()
	}
}
