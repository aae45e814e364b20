use serde::{Deserialize, Serialize};

pub const DEFAULT_HD_PATH: &str = "m/44'/60'/0'/0";

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RemoteKeyword {
	Remote,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AutoKeyword {
	Auto,
}

/// Key material used to sign locally, or `remote` to use the node's accounts.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(untagged)]
pub enum AccountsConfig {
	Remote(RemoteKeyword),
	PrivateKeys(Vec<String>),
	Hd(HdAccountsConfig),
}

impl Default for AccountsConfig {
	fn default() -> Self {
		AccountsConfig::Remote(RemoteKeyword::Remote)
	}
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct HdAccountsConfig {
	pub mnemonic: String,
	/// BIP32 path accounts are derived under (default: m/44'/60'/0'/0).
	pub path: String,
	/// First derived index (default: 0).
	pub initial_index: u32,
	/// Number of derived accounts (default: 20).
	pub count: u32,
	/// BIP39 passphrase (default: empty).
	pub passphrase: String,
}

impl Default for HdAccountsConfig {
	fn default() -> Self {
		Self {
			mnemonic: String::new(),
			path: DEFAULT_HD_PATH.to_string(),
			initial_index: 0,
			count: 20,
			passphrase: String::new(),
		}
	}
}

/// Either `auto` or a fixed quantity.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
#[serde(untagged)]
pub enum GasValue {
	Auto(AutoKeyword),
	Fixed(u64),
}

impl Default for GasValue {
	fn default() -> Self {
		GasValue::Auto(AutoKeyword::Auto)
	}
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct MiddlewareConfig {
	pub accounts: AccountsConfig,
	/// Sender used when a transaction has no `from` (default: first node account).
	pub from: Option<String>,
	pub gas: GasValue,
	pub gas_price: GasValue,
	/// Multiplier applied to automatic gas estimations (default: 1.25).
	pub gas_multiplier: f64,
	/// Expected chain id, every call fails if the node reports another one.
	pub chain_id: Option<u64>,
}

impl Default for MiddlewareConfig {
	fn default() -> Self {
		Self {
			accounts: AccountsConfig::default(),
			from: None,
			gas: GasValue::default(),
			gas_price: GasValue::default(),
			gas_multiplier: 1.25,
			chain_id: None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn defaults() {
		let config: MiddlewareConfig = serde_json::from_value(json!({})).unwrap();
		assert_eq!(config, MiddlewareConfig::default());
		assert_eq!(config.accounts, AccountsConfig::Remote(RemoteKeyword::Remote));
	}

	#[test]
	fn accounts_variants() {
		let config: MiddlewareConfig = serde_json::from_value(json!({
			"accounts": {"mnemonic": "test test test test test test test test test test test junk", "count": 2},
			"gas": 21000,
			"gas_price": "auto",
		}))
		.unwrap();

		let AccountsConfig::Hd(hd) = config.accounts else {
			panic!("Expected HD accounts");
		};
		assert_eq!(hd.path, DEFAULT_HD_PATH);
		assert_eq!(hd.count, 2);
		assert_eq!(config.gas, GasValue::Fixed(21000));
		assert_eq!(config.gas_price, GasValue::Auto(AutoKeyword::Auto));

		let config: MiddlewareConfig = serde_json::from_value(json!({"accounts": ["0x01"]})).unwrap();
		assert_eq!(config.accounts, AccountsConfig::PrivateKeys(vec!["0x01".to_string()]));
	}

	#[test]
	fn unknown_keyword_is_rejected() {
		assert!(serde_json::from_value::<MiddlewareConfig>(json!({"gas": "manual"})).is_err());
	}
}
