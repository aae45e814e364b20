use crate::{cli::CliOpts, config::RuntimeConfig};
use clap::Parser;
use color_eyre::{eyre::WrapErr, Result};
use config::load_runtime_config;
use devnet_rpc_core::{
	api::JsonRpcServer,
	middleware,
	network::{HttpProvider, RequestBatcher},
	provider::Provider,
	utils::{default_subscriber, install_panic_hooks, json_subscriber},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod cli;
mod config;

/// JSON-RPC endpoint in front of a node
async fn run(cfg: RuntimeConfig, shutdown: CancellationToken) -> Result<()> {
	let version = clap::crate_version!();
	info!("Running devnet-rpc-server version: {version}.");
	info!(
		url = cfg.http.url,
		batch = cfg.batch.batch_enable,
		chain_id = ?cfg.middleware.chain_id,
		"Using node"
	);

	let http = HttpProvider::new(cfg.http.clone()).wrap_err("Cannot create HTTP provider")?;
	let transport: Box<dyn Provider> = if cfg.batch.batch_enable {
		Box::new(RequestBatcher::new(http, cfg.batch.batch_delay))
	} else {
		Box::new(http)
	};

	let provider: Arc<dyn Provider> = middleware::apply(transport, &cfg.middleware)
		.wrap_err("Cannot configure provider middlewares")?
		.into();

	let server = JsonRpcServer::new(cfg.api.clone(), provider).listen().await?;

	tokio::select! {
		result = tokio::signal::ctrl_c() => {
			result.wrap_err("Cannot listen for Ctrl-C")?;
			info!("User signaled shutdown");
		},
		_ = shutdown.cancelled() => warn!("Shutdown triggered"),
	}

	server.close().await
}

#[tokio::main]
pub async fn main() -> Result<()> {
	let shutdown = CancellationToken::new();
	let opts = CliOpts::parse();
	let cfg = load_runtime_config(&opts)?;

	if cfg.log_format_json {
		tracing::subscriber::set_global_default(json_subscriber(cfg.log_level))?;
	} else {
		tracing::subscriber::set_global_default(default_subscriber(cfg.log_level))?;
	};

	// install custom panic hooks
	install_panic_hooks(shutdown.clone())?;

	if let Err(error) = run(cfg, shutdown).await {
		error!("{error:#}");
		return Err(error.wrap_err("Running JSON-RPC server failed"));
	};

	Ok(())
}
