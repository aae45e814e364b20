//! Gas and gas price policies.
//!
//! Values supplied by the caller are never replaced. Transactions carrying
//! EIP-1559 fee fields never get a `gasPrice`.
use crate::{
	error::Error,
	provider::{EventEmitter, Provider},
	types::{parse_quantity, quantity, transaction_mut},
};
use async_trait::async_trait;
use ethers_core::types::U256;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

fn missing(method: &str, params: &[Value], expected_method: &str, field: &str) -> bool {
	method == expected_method
		&& matches!(params.first(), Some(Value::Object(tx)) if !tx.contains_key(field))
}

fn needs_gas_price(method: &str, params: &[Value]) -> bool {
	missing(method, params, "eth_sendTransaction", "gasPrice")
		&& matches!(params.first(), Some(Value::Object(tx)) if !is_eip1559(tx))
}

fn is_eip1559(tx: &Map<String, Value>) -> bool {
	tx.contains_key("maxFeePerGas") || tx.contains_key("maxPriorityFeePerGas")
}

fn to_u64(value: U256, name: &str) -> Result<u64, Error> {
	if value > U256::from(u64::MAX) {
		return Err(Error::InvalidArgument(format!("Invalid {name} {value}")));
	}
	Ok(value.as_u64())
}

fn with_field(params: &[Value], field: &str, value: Value) -> Vec<Value> {
	let mut params = params.to_vec();
	if let Some(tx) = transaction_mut(&mut params) {
		tx.insert(field.to_string(), value);
	}
	params
}

pub struct FixedGas<P> {
	inner: P,
	gas: U256,
}

impl<P: Provider> FixedGas<P> {
	pub fn new(inner: P, gas: u64) -> Self {
		Self {
			inner,
			gas: U256::from(gas),
		}
	}
}

#[async_trait]
impl<P: Provider> Provider for FixedGas<P> {
	async fn send(&self, method: &str, params: &[Value]) -> Result<Value, Error> {
		if method == "eth_estimateGas" {
			return Ok(quantity(self.gas));
		}
		if missing(method, params, "eth_sendTransaction", "gas") {
			let params = with_field(params, "gas", quantity(self.gas));
			return self.inner.send(method, &params).await;
		}
		self.inner.send(method, params).await
	}

	fn events(&self) -> &EventEmitter {
		self.inner.events()
	}
}

/// Estimates the gas of transactions sent without one.
///
/// The estimation is multiplied and capped at the latest block gas limit,
/// which is read again for every estimation.
pub struct AutomaticGas<P> {
	inner: P,
	multiplier: f64,
}

impl<P: Provider> AutomaticGas<P> {
	pub fn new(inner: P, multiplier: f64) -> Self {
		Self {
			inner,
			multiplier,
		}
	}

	pub fn inner(&self) -> &P {
		&self.inner
	}

	async fn block_gas_limit(&self) -> Result<u64, Error> {
		let block = self
			.inner
			.send("eth_getBlockByNumber", &[json!("latest"), json!(false)])
			.await?;
		to_u64(parse_quantity(&block["gasLimit"])?, "block gas limit")
	}

	async fn estimate(&self, tx: &Value) -> Result<U256, Error> {
		let estimation = match self.inner.send("eth_estimateGas", &[tx.clone()]).await {
			Ok(estimation) => estimation,
			Err(error) if error.to_string().to_lowercase().contains("execution error") => {
				warn!("Gas estimation failed, using the block gas limit: {error}");
				return self.block_gas_limit().await.map(U256::from);
			},
			Err(error) => return Err(error),
		};

		let estimation = parse_quantity(&estimation)?;
		if self.multiplier == 1.0 {
			return Ok(estimation);
		}

		let estimation = to_u64(estimation, "gas estimation")?;
		let multiplied = (estimation as f64 * self.multiplier).floor() as u64;
		let gas = multiplied.min(self.block_gas_limit().await?);
		debug!(estimation, gas, "Estimated transaction gas");
		Ok(U256::from(gas))
	}
}

#[async_trait]
impl<P: Provider> Provider for AutomaticGas<P> {
	async fn send(&self, method: &str, params: &[Value]) -> Result<Value, Error> {
		if !missing(method, params, "eth_sendTransaction", "gas") {
			return self.inner.send(method, params).await;
		}
		let gas = self.estimate(&params[0]).await?;
		let params = with_field(params, "gas", quantity(gas));
		self.inner.send(method, &params).await
	}

	fn events(&self) -> &EventEmitter {
		self.inner.events()
	}
}

pub struct FixedGasPrice<P> {
	inner: P,
	gas_price: U256,
}

impl<P: Provider> FixedGasPrice<P> {
	pub fn new(inner: P, gas_price: u64) -> Self {
		Self {
			inner,
			gas_price: U256::from(gas_price),
		}
	}
}

#[async_trait]
impl<P: Provider> Provider for FixedGasPrice<P> {
	async fn send(&self, method: &str, params: &[Value]) -> Result<Value, Error> {
		if method == "eth_gasPrice" {
			return Ok(quantity(self.gas_price));
		}
		if needs_gas_price(method, params) {
			let params = with_field(params, "gasPrice", quantity(self.gas_price));
			return self.inner.send(method, &params).await;
		}
		self.inner.send(method, params).await
	}

	fn events(&self) -> &EventEmitter {
		self.inner.events()
	}
}

/// Fills a missing `gasPrice` with the node's `eth_gasPrice`.
pub struct AutomaticGasPrice<P> {
	inner: P,
}

impl<P: Provider> AutomaticGasPrice<P> {
	pub fn new(inner: P) -> Self {
		Self { inner }
	}
}

#[async_trait]
impl<P: Provider> Provider for AutomaticGasPrice<P> {
	async fn send(&self, method: &str, params: &[Value]) -> Result<Value, Error> {
		if !needs_gas_price(method, params) {
			return self.inner.send(method, params).await;
		}
		let gas_price = self.inner.send("eth_gasPrice", &[]).await?;
		let params = with_field(params, "gasPrice", gas_price);
		self.inner.send(method, &params).await
	}

	fn events(&self) -> &EventEmitter {
		self.inner.events()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		error::ProviderError,
		provider::{mock::MockProvider, wrap_send},
	};
	use futures::FutureExt;
	use parking_lot::Mutex;
	use std::sync::Arc;
	use test_case::test_case;

	fn node() -> MockProvider {
		MockProvider::default()
			.with("eth_estimateGas", json!("0x5208"))
			.with("eth_gasPrice", json!("0x3b9aca00"))
			.with("eth_getBlockByNumber", json!({"gasLimit": "0x1c9c380"}))
			.with("eth_sendTransaction", json!("0xhash"))
	}

	#[tokio::test]
	async fn fixed_gas_answers_estimations() {
		let provider = FixedGas::new(node(), 50000);
		assert_eq!(provider.send("eth_estimateGas", &[json!({})]).await.unwrap(), json!("0xc350"));
		assert!(provider.inner.methods().is_empty());

		provider.send("eth_sendTransaction", &[json!({"to": "0x01"})]).await.unwrap();
		assert_eq!(
			provider.inner.calls_to("eth_sendTransaction"),
			vec![vec![json!({"to": "0x01", "gas": "0xc350"})]]
		);
	}

	#[tokio::test]
	async fn automatic_gas_multiplies_the_estimation() {
		let provider = AutomaticGas::new(node(), 1.25);
		provider.send("eth_sendTransaction", &[json!({"to": "0x01"})]).await.unwrap();

		// floor(21000 * 1.25) = 26250
		assert_eq!(
			provider.inner().calls_to("eth_sendTransaction"),
			vec![vec![json!({"to": "0x01", "gas": "0x668a"})]]
		);
		assert_eq!(provider.inner().calls_to("eth_estimateGas"), vec![vec![json!({"to": "0x01"})]]);
	}

	#[tokio::test]
	async fn automatic_gas_is_capped_by_the_block_gas_limit() {
		let provider = AutomaticGas::new(
			node().with("eth_getBlockByNumber", json!({"gasLimit": "0x6000"})),
			1.25,
		);
		provider.send("eth_sendTransaction", &[json!({})]).await.unwrap();
		assert_eq!(
			provider.inner().calls_to("eth_sendTransaction"),
			vec![vec![json!({"gas": "0x6000"})]]
		);
	}

	#[tokio::test]
	async fn block_gas_limit_is_read_for_every_estimation() {
		let blocks = Arc::new(Mutex::new(vec![
			json!({"gasLimit": "0x5000"}),
			json!({"gasLimit": "0x6000"}),
		]));
		let node = wrap_send(node(), move |inner, method, params| {
			let blocks = blocks.clone();
			async move {
				let block = match method.as_str() {
					"eth_getBlockByNumber" => blocks.lock().pop(),
					_ => None,
				};
				match block {
					Some(block) => Ok(block),
					None => inner.send(&method, &params).await,
				}
			}
			.boxed()
		});
		let provider = AutomaticGas::new(node, 1.25);

		provider.send("eth_sendTransaction", &[json!({})]).await.unwrap();
		provider.send("eth_sendTransaction", &[json!({})]).await.unwrap();

		assert_eq!(
			provider.inner().inner().calls_to("eth_sendTransaction"),
			vec![vec![json!({"gas": "0x6000"})], vec![json!({"gas": "0x5000"})]]
		);
	}

	#[tokio::test]
	async fn execution_errors_fall_back_to_the_block_gas_limit() {
		let reverted = ProviderError::new(-32000, "Execution error: reverted");
		let provider = AutomaticGas::new(node().with_error("eth_estimateGas", reverted.into()), 1.25);
		provider.send("eth_sendTransaction", &[json!({})]).await.unwrap();
		assert_eq!(
			provider.inner().calls_to("eth_sendTransaction"),
			vec![vec![json!({"gas": "0x1c9c380"})]]
		);
	}

	#[tokio::test]
	async fn other_estimation_errors_are_returned() {
		let provider = AutomaticGas::new(node().with_error("eth_estimateGas", Error::NetworkTimeout), 1.25);
		let error = provider.send("eth_sendTransaction", &[json!({})]).await.unwrap_err();
		assert!(matches!(error, Error::NetworkTimeout));
		assert!(provider.inner().calls_to("eth_sendTransaction").is_empty());
	}

	#[tokio::test]
	async fn fixed_gas_price() {
		let provider = FixedGasPrice::new(node(), 7);
		assert_eq!(provider.send("eth_gasPrice", &[]).await.unwrap(), json!("0x7"));

		provider.send("eth_sendTransaction", &[json!({})]).await.unwrap();
		assert_eq!(
			provider.inner.calls_to("eth_sendTransaction"),
			vec![vec![json!({"gasPrice": "0x7"})]]
		);
	}

	#[tokio::test]
	async fn automatic_gas_price() {
		let provider = AutomaticGasPrice::new(node());
		provider.send("eth_sendTransaction", &[json!({})]).await.unwrap();
		assert_eq!(
			provider.inner.calls_to("eth_sendTransaction"),
			vec![vec![json!({"gasPrice": "0x3b9aca00"})]]
		);
	}

	#[test_case(json!({"gas": "0x1", "gasPrice": "0x2"}) ; "Legacy values")]
	#[test_case(json!({"gas": "0x1", "maxFeePerGas": "0x2", "maxPriorityFeePerGas": "0x1"}) ; "EIP-1559 values")]
	#[tokio::test]
	async fn explicit_values_are_untouched(tx: Value) {
		let provider = AutomaticGasPrice::new(AutomaticGas::new(node(), 1.25));
		provider.send("eth_sendTransaction", &[tx.clone()]).await.unwrap();

		let inner = provider.inner.inner();
		assert_eq!(inner.calls_to("eth_sendTransaction"), vec![vec![tx]]);
		assert_eq!(inner.methods(), vec!["eth_sendTransaction"]);
	}
}
