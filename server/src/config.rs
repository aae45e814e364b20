use crate::cli::CliOpts;
use color_eyre::{
	eyre::{eyre, WrapErr},
	Result,
};
use devnet_rpc_core::{
	api::configuration::APIConfig,
	middleware::configuration::MiddlewareConfig,
	network::configuration::{BatchConfig, HttpConfig},
	types::tracing_level_format,
};
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::Level;

/// Representation of a configuration used by this project.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
	#[serde(flatten)]
	pub api: APIConfig,
	#[serde(flatten)]
	pub http: HttpConfig,
	#[serde(flatten)]
	pub batch: BatchConfig,
	#[serde(flatten)]
	pub middleware: MiddlewareConfig,
	/// Log level, default is `INFO`. See `<https://docs.rs/log/0.4.14/log/enum.LevelFilter.html>` for possible log level values. (default: `INFO`).
	#[serde(with = "tracing_level_format")]
	pub log_level: Level,
	/// Set to display structured logs in JSON format. Otherwise, plain text format is used. (default: false).
	pub log_format_json: bool,
}

impl Default for RuntimeConfig {
	fn default() -> Self {
		Self {
			api: Default::default(),
			http: Default::default(),
			batch: Default::default(),
			middleware: Default::default(),
			log_level: Level::INFO,
			log_format_json: false,
		}
	}
}

pub fn load_runtime_config(opts: &CliOpts) -> Result<RuntimeConfig> {
	let mut cfg = if let Some(config_path) = &opts.config {
		fs::metadata(config_path).map_err(|_| eyre!("Provided config file doesn't exist."))?;
		confy::load_path(config_path)
			.wrap_err(format!("Failed to load configuration from {}", config_path))?
	} else {
		RuntimeConfig::default()
	};

	cfg.log_format_json = opts.logs_json || cfg.log_format_json;
	cfg.log_level = opts.verbosity.unwrap_or(cfg.log_level);

	// Flags override the config parameters
	if let Some(host) = &opts.host {
		cfg.api.http_server_host = host.clone();
	}
	if let Some(port) = opts.port {
		cfg.api.http_server_port = port;
	}
	if let Some(url) = &opts.url {
		cfg.http.url = url.clone();
	}
	cfg.middleware.chain_id = opts.chain_id.or(cfg.middleware.chain_id);
	cfg.batch.batch_enable |= opts.batch;

	if cfg.middleware.gas_multiplier <= 0.0 {
		return Err(eyre!("Gas multiplier must be positive"));
	}

	Ok(cfg)
}
