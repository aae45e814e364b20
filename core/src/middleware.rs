//! Provider middlewares.
//!
//! Every middleware owns the next inner provider, handles its own methods and
//! forwards everything else untouched.
use crate::{error::Error, provider::Provider};
use configuration::{AccountsConfig, GasValue, MiddlewareConfig};
use tracing::info;

pub mod accounts;
pub mod chain_id;
pub mod configuration;
pub mod gas;
pub mod sender;

pub use accounts::LocalAccounts;
pub use chain_id::{resolve_chain_id, ChainIdValidator};
pub use gas::{AutomaticGas, AutomaticGasPrice, FixedGas, FixedGasPrice};
pub use sender::{AutomaticSender, FixedSender};

/// Wraps the provider with the configured middlewares.
///
/// Layers are applied in the order accounts, sender, gas, gas price and chain id,
/// so the chain id check is the outermost one and local signing the innermost.
pub fn apply(
	provider: Box<dyn Provider>,
	config: &MiddlewareConfig,
) -> Result<Box<dyn Provider>, Error> {
	let provider: Box<dyn Provider> = match &config.accounts {
		AccountsConfig::Remote(_) => provider,
		AccountsConfig::PrivateKeys(keys) => Box::new(LocalAccounts::new(provider, keys)?),
		AccountsConfig::Hd(hd) => Box::new(LocalAccounts::from_mnemonic(provider, hd)?),
	};

	let provider: Box<dyn Provider> = match &config.from {
		Some(from) => Box::new(FixedSender::new(provider, from.clone())),
		None => Box::new(AutomaticSender::new(provider)),
	};

	let provider: Box<dyn Provider> = match config.gas {
		GasValue::Auto(_) => Box::new(AutomaticGas::new(provider, config.gas_multiplier)),
		GasValue::Fixed(gas) => Box::new(FixedGas::new(provider, gas)),
	};

	let provider: Box<dyn Provider> = match config.gas_price {
		GasValue::Auto(_) => Box::new(AutomaticGasPrice::new(provider)),
		GasValue::Fixed(gas_price) => Box::new(FixedGasPrice::new(provider, gas_price)),
	};

	let provider: Box<dyn Provider> = match config.chain_id {
		Some(chain_id) => Box::new(ChainIdValidator::new(provider, chain_id)),
		None => provider,
	};

	info!(
		local_accounts = !matches!(config.accounts, AccountsConfig::Remote(_)),
		chain_id = ?config.chain_id,
		"Middleware chain configured"
	);
	Ok(provider)
}
