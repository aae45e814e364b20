//! JSON-RPC server.
//!
//! One listener serves both protocols on `/`:
//!
//! * `POST /` - JSON-RPC request or batch, answered with status 200
//! * `GET /` with a WebSocket upgrade - JSON-RPC frames and subscription notifications

use super::{configuration::APIConfig, handler::JsonRpcHandler, ws};
use crate::{provider::Provider, utils::spawn_in_span};
use color_eyre::{
	eyre::{eyre, WrapErr},
	Result,
};
use std::{convert::Infallible, net::SocketAddr, sync::Arc};
use tokio::task::JoinHandle;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::info;
use warp::{hyper::body::Bytes, Filter, Rejection, Reply};

fn with_handler(
	handler: JsonRpcHandler,
) -> impl Filter<Extract = (JsonRpcHandler,), Error = Infallible> + Clone {
	warp::any().map(move || handler.clone())
}

fn http_route(
	handler: JsonRpcHandler,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
	warp::post()
		.and(warp::path::end())
		.and(warp::body::bytes())
		.and(with_handler(handler))
		.then(|body: Bytes, handler: JsonRpcHandler| async move {
			warp::reply::json(&handler.handle(&body).await)
		})
}

fn ws_route(
	handler: JsonRpcHandler,
	shutdown: CancellationToken,
	connections: TaskTracker,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
	warp::path::end()
		.and(warp::ws())
		.and(with_handler(handler))
		.map(move |upgrade: warp::ws::Ws, handler: JsonRpcHandler| {
			let shutdown = shutdown.clone();
			let connections = connections.clone();
			upgrade.on_upgrade(move |web_socket| {
				connections.track_future(ws::connect(web_socket, handler, shutdown))
			})
		})
}

pub(crate) fn routes(
	handler: JsonRpcHandler,
	shutdown: CancellationToken,
	connections: TaskTracker,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
	ws_route(handler.clone(), shutdown, connections).or(http_route(handler))
}

pub struct JsonRpcServer {
	config: APIConfig,
	handler: JsonRpcHandler,
}

impl JsonRpcServer {
	pub fn new(config: APIConfig, provider: Arc<dyn Provider>) -> Self {
		Self {
			config,
			handler: JsonRpcHandler::new(provider),
		}
	}

	/// Binds the listener and starts serving.
	///
	/// Returns once the listener is bound, with the address it is bound to.
	pub async fn listen(self) -> Result<ServerHandle> {
		let host = self.config.http_server_host.as_str();
		let port = self.config.http_server_port;
		let address = tokio::net::lookup_host((host, port))
			.await
			.wrap_err("Unable to resolve host address from config")?
			.next()
			.ok_or_else(|| eyre!("No address found for host {host}"))?;

		let shutdown = CancellationToken::new();
		let connections = TaskTracker::new();

		let cors = warp::cors()
			.allow_any_origin()
			.allow_header("content-type")
			.allow_methods(vec!["GET", "POST"]);
		let routes = routes(self.handler, shutdown.clone(), connections.clone()).with(cors);

		let (local_address, server) = warp::serve(routes)
			.try_bind_with_graceful_shutdown(address, shutdown.clone().cancelled_owned())
			.wrap_err_with(|| format!("Unable to bind JSON-RPC server to {address}"))?;
		info!("JSON-RPC server running on http://{local_address} and ws://{local_address}");

		Ok(ServerHandle {
			local_address,
			shutdown,
			connections,
			server: spawn_in_span(server),
		})
	}
}

/// Running server, stopped with [`ServerHandle::close`].
pub struct ServerHandle {
	local_address: SocketAddr,
	shutdown: CancellationToken,
	connections: TaskTracker,
	server: JoinHandle<()>,
}

impl ServerHandle {
	pub fn local_address(&self) -> SocketAddr {
		self.local_address
	}

	/// Stops accepting connections, closes open WebSockets, and waits for both
	/// the HTTP listener and every WebSocket connection to finish.
	pub async fn close(self) -> Result<()> {
		self.shutdown.cancel();
		self.server.await.wrap_err("JSON-RPC server task failed")?;

		self.connections.close();
		self.connections.wait().await;
		info!("JSON-RPC server closed");
		Ok(())
	}
}
