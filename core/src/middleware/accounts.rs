//! Local key management.
//!
//! Answers account listing and signing methods with local keys, and turns
//! `eth_sendTransaction` into a locally signed `eth_sendRawTransaction`.
use super::{chain_id::resolve_chain_id, configuration::HdAccountsConfig};
use crate::{
	error::Error,
	provider::{EventEmitter, Provider},
	types::parse_quantity,
};
use async_trait::async_trait;
use ethers_core::types::{
	transaction::{eip2718::TypedTransaction, eip712::TypedData},
	Address, Eip1559TransactionRequest, Signature, TransactionRequest,
};
use ethers_signers::{coins_bip39::English, LocalWallet, MnemonicBuilder, Signer};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Map, Value};
use tokio::sync::OnceCell;
use tracing::debug;

static HD_PATH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^m(/\d+'?)+/?$").unwrap());

const EIP1559_FIELDS: [&str; 2] = ["maxFeePerGas", "maxPriorityFeePerGas"];

fn wallet_from_key(key: &str) -> Result<LocalWallet, Error> {
	let invalid = || Error::InvalidArgument("Invalid private key".to_string());
	let bytes = hex::decode(key.trim_start_matches("0x")).map_err(|_| invalid())?;
	LocalWallet::from_bytes(&bytes).map_err(|_| invalid())
}

fn derive_wallets(config: &HdAccountsConfig) -> Result<Vec<LocalWallet>, Error> {
	if !HD_PATH.is_match(&config.path) {
		return Err(Error::InvalidHdPath {
			path: config.path.clone(),
		});
	}

	let base = config.path.trim_end_matches('/');
	let last = config
		.initial_index
		.checked_add(config.count)
		.ok_or_else(|| {
			Error::InvalidArgument(format!(
				"Cannot derive {} accounts starting at index {}",
				config.count, config.initial_index
			))
		})?;
	(config.initial_index..last)
		.map(|index| {
			let path = format!("{base}/{index}");
			MnemonicBuilder::<English>::default()
				.phrase(config.mnemonic.as_str())
				.derivation_path(&path)
				.and_then(|builder| builder.password(&config.passphrase).build())
				.map_err(|error| Error::CantDeriveKey {
					path,
					reason: error.to_string(),
				})
		})
		.collect()
}

fn format_address(address: Address) -> String {
	format!("{address:#x}")
}

fn format_signature(signature: Signature) -> Value {
	Value::String(format!("0x{}", hex::encode(signature.to_vec())))
}

/// Hex data is signed as bytes, any other string as its UTF-8 encoding.
fn message_bytes(data: &Value) -> Result<Vec<u8>, Error> {
	match data {
		Value::String(text) => match text.strip_prefix("0x") {
			Some(digits) => hex::decode(digits)
				.map_err(|_| Error::InvalidArgument(format!("Invalid hex data {text:?}"))),
			None => Ok(text.as_bytes().to_vec()),
		},
		other => Err(Error::InvalidArgument(format!("Invalid data {other}"))),
	}
}

fn typed_data(data: &Value) -> Result<TypedData, Error> {
	let parsed = match data {
		Value::String(text) => serde_json::from_str(text),
		other => serde_json::from_value(other.clone()),
	};
	parsed.map_err(|error| Error::InvalidArgument(format!("Invalid typed data: {error}")))
}

fn data_param(params: &[Value], index: usize) -> Result<&Value, Error> {
	match params.get(index) {
		None | Some(Value::Null) => Err(Error::EthSignMissingDataParam),
		Some(data) => Ok(data),
	}
}

fn require(tx: &Map<String, Value>, param: &'static str) -> Result<(), Error> {
	if tx.contains_key(param) {
		Ok(())
	} else {
		Err(Error::MissingTxParamToSignLocally { param })
	}
}

pub struct LocalAccounts<P> {
	inner: P,
	wallets: Vec<LocalWallet>,
	chain_id: OnceCell<u64>,
}

impl<P: Provider> LocalAccounts<P> {
	pub fn new(inner: P, private_keys: &[String]) -> Result<Self, Error> {
		let wallets = private_keys
			.iter()
			.map(|key| wallet_from_key(key))
			.collect::<Result<Vec<_>, _>>()?;
		Ok(Self::with_wallets(inner, wallets))
	}

	/// Derives `count` accounts from a mnemonic, starting at `initial_index`.
	pub fn from_mnemonic(inner: P, config: &HdAccountsConfig) -> Result<Self, Error> {
		Ok(Self::with_wallets(inner, derive_wallets(config)?))
	}

	fn with_wallets(inner: P, wallets: Vec<LocalWallet>) -> Self {
		debug!(accounts = wallets.len(), "Local accounts loaded");
		Self {
			inner,
			wallets,
			chain_id: OnceCell::new(),
		}
	}

	pub fn inner(&self) -> &P {
		&self.inner
	}

	pub fn addresses(&self) -> Vec<Address> {
		self.wallets.iter().map(Signer::address).collect()
	}

	fn wallet(&self, address: Option<&Value>) -> Result<&LocalWallet, Error> {
		let Some(Value::String(text)) = address else {
			return Err(Error::InvalidArgument(format!(
				"Invalid address {}",
				address.unwrap_or(&Value::Null)
			)));
		};
		let address = text
			.parse::<Address>()
			.map_err(|_| Error::InvalidArgument(format!("Invalid address {text:?}")))?;

		self.wallets
			.iter()
			.find(|wallet| wallet.address() == address)
			.ok_or_else(|| Error::NotLocalAccount {
				account: text.clone(),
			})
	}

	async fn chain_id(&self) -> Result<u64, Error> {
		let chain_id = self
			.chain_id
			.get_or_try_init(|| resolve_chain_id(&self.inner))
			.await?;
		Ok(*chain_id)
	}

	async fn sign_message(&self, address: Option<&Value>, data: &Value) -> Result<Value, Error> {
		let wallet = self.wallet(address)?;
		let message = message_bytes(data)?;
		let signature = wallet
			.sign_message(message)
			.await
			.map_err(|error| Error::Internal(error.to_string()))?;
		Ok(format_signature(signature))
	}

	async fn sign_typed_data(&self, params: &[Value]) -> Result<Value, Error> {
		let data = data_param(params, 1)?;
		let wallet = self.wallet(params.first())?;
		let signature = wallet
			.sign_typed_data(&typed_data(data)?)
			.await
			.map_err(|error| Error::Internal(error.to_string()))?;
		Ok(format_signature(signature))
	}

	async fn send_transaction(&self, params: &[Value]) -> Result<Value, Error> {
		let Some(Value::Object(tx)) = params.first() else {
			return Err(Error::InvalidArgument(
				"eth_sendTransaction expects a transaction object".to_string(),
			));
		};

		require(tx, "from")?;
		require(tx, "gas")?;
		let eip1559 = EIP1559_FIELDS.iter().any(|field| tx.contains_key(*field));
		if eip1559 {
			if tx.contains_key("gasPrice") {
				return Err(Error::InvalidArgument(
					"Cannot send both gasPrice and maxFeePerGas params".to_string(),
				));
			}
			for field in EIP1559_FIELDS {
				require(tx, field)?;
			}
		} else {
			require(tx, "gasPrice")?;
		}

		let wallet = self.wallet(tx.get("from"))?;
		let nonce = match tx.get("nonce") {
			Some(nonce) => parse_quantity(nonce)?,
			None => {
				let params = [json!(format_address(wallet.address())), json!("pending")];
				parse_quantity(&self.inner.send("eth_getTransactionCount", &params).await?)?
			},
		};
		let chain_id = self.chain_id().await?;

		let mut request = tx.clone();
		let mut transaction: TypedTransaction = if eip1559 {
			request.entry("accessList").or_insert_with(|| json!([]));
			serde_json::from_value::<Eip1559TransactionRequest>(Value::Object(request)).map(Into::into)
		} else {
			serde_json::from_value::<TransactionRequest>(Value::Object(request)).map(Into::into)
		}
		.map_err(|error| Error::InvalidArgument(format!("Invalid transaction: {error}")))?;

		transaction.set_from(wallet.address());
		transaction.set_nonce(nonce);
		transaction.set_chain_id(chain_id);

		let signature = wallet
			.sign_transaction_sync(&transaction)
			.map_err(|error| Error::Internal(error.to_string()))?;
		let raw = transaction.rlp_signed(&signature);
		debug!(chain_id, %nonce, "Sending locally signed transaction");

		self.inner.send("eth_sendRawTransaction", &[json!(raw)]).await
	}
}

#[async_trait]
impl<P: Provider> Provider for LocalAccounts<P> {
	async fn send(&self, method: &str, params: &[Value]) -> Result<Value, Error> {
		match method {
			"eth_accounts" | "eth_requestAccounts" => {
				let addresses = self.addresses().into_iter().map(format_address);
				Ok(Value::Array(addresses.map(Value::String).collect()))
			},
			"eth_sign" => {
				let data = data_param(params, 1)?;
				self.sign_message(params.first(), data).await
			},
			"personal_sign" => {
				let data = data_param(params, 0)?;
				self.sign_message(params.get(1), data).await
			},
			"eth_signTypedData" | "eth_signTypedData_v4" => self.sign_typed_data(params).await,
			"eth_sendTransaction" => self.send_transaction(params).await,
			_ => self.inner.send(method, params).await,
		}
	}

	fn events(&self) -> &EventEmitter {
		self.inner.events()
	}
}
