use crate::{
	error::Error,
	provider::{EventEmitter, Provider},
	types::parse_chain_id,
};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, error};

/// Asks the node for its chain id with `eth_chainId`, falling back to `net_version`.
pub async fn resolve_chain_id<P: Provider + ?Sized>(provider: &P) -> Result<u64, Error> {
	match provider.send("eth_chainId", &[]).await.and_then(|id| parse_chain_id(&id)) {
		Ok(chain_id) => Ok(chain_id),
		Err(error) => {
			debug!("eth_chainId failed, falling back to net_version: {error}");
			let version = provider.send("net_version", &[]).await?;
			parse_chain_id(&version)
		},
	}
}

/// Fails every call when the node is on another chain than the configured one.
///
/// The node's chain id is resolved on the first call and never queried again.
pub struct ChainIdValidator<P> {
	inner: P,
	configured: u64,
	connected: OnceCell<u64>,
}

impl<P: Provider> ChainIdValidator<P> {
	pub fn new(inner: P, configured: u64) -> Self {
		Self {
			inner,
			configured,
			connected: OnceCell::new(),
		}
	}

	pub fn inner(&self) -> &P {
		&self.inner
	}
}

#[async_trait]
impl<P: Provider> Provider for ChainIdValidator<P> {
	async fn send(&self, method: &str, params: &[Value]) -> Result<Value, Error> {
		let connected = *self
			.connected
			.get_or_try_init(|| resolve_chain_id(&self.inner))
			.await?;

		if connected != self.configured {
			error!(configured = self.configured, connected, "Connected to an unexpected chain");
			return Err(Error::InvalidGlobalChainId {
				configured: self.configured,
				connected,
			});
		}

		self.inner.send(method, params).await
	}

	fn events(&self) -> &EventEmitter {
		self.inner.events()
	}
}
