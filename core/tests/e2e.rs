use async_trait::async_trait;
use devnet_rpc_core::{
	api::{configuration::APIConfig, JsonRpcServer, ServerHandle},
	error::Error,
	middleware::{self, configuration::MiddlewareConfig},
	network::{configuration::HttpConfig, HttpProvider, RequestBatcher},
	provider::{EventEmitter, Provider},
};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tokio_tungstenite::tungstenite::Message;
use warp::Filter;

const BLOCK_NUMBER: &str = r#"{"jsonrpc":"2.0","method":"eth_blockNumber","params":[],"id":1}"#;

#[derive(Default)]
struct EchoProvider {
	events: EventEmitter,
}

#[async_trait]
impl Provider for EchoProvider {
	async fn send(&self, method: &str, params: &[Value]) -> Result<Value, Error> {
		if method == "eth_chainId" {
			return Ok(json!("0x1"));
		}
		Ok(json!({"method": method, "params": params}))
	}

	fn events(&self) -> &EventEmitter {
		&self.events
	}
}

async fn listen(provider: Arc<dyn Provider>) -> ServerHandle {
	let config = APIConfig {
		http_server_host: "127.0.0.1".to_string(),
		http_server_port: 0,
	};
	JsonRpcServer::new(config, provider).listen().await.unwrap()
}

async fn post(address: std::net::SocketAddr, body: &'static str) -> Value {
	reqwest::Client::new()
		.post(format!("http://{address}"))
		.header("content-type", "application/json")
		.body(body)
		.send()
		.await
		.unwrap()
		.json()
		.await
		.unwrap()
}

#[tokio::test]
async fn http_and_ws_answer_identically() {
	let server = listen(Arc::new(EchoProvider::default())).await;
	let address = server.local_address();
	let expected = json!({
		"jsonrpc": "2.0",
		"id": 1,
		"result": {"method": "eth_blockNumber", "params": []}
	});

	assert_eq!(post(address, BLOCK_NUMBER).await, expected);

	let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{address}")).await.unwrap();
	socket.send(Message::Text(BLOCK_NUMBER.to_string())).await.unwrap();
	let frame = socket.next().await.unwrap().unwrap();
	assert_eq!(serde_json::from_str::<Value>(frame.to_text().unwrap()).unwrap(), expected);

	server.close().await.unwrap();
	let closed = tokio::time::timeout(Duration::from_secs(5), socket.next()).await.unwrap();
	assert!(matches!(closed, None | Some(Ok(Message::Close(_))) | Some(Err(_))));
}

#[tokio::test]
async fn requests_flow_through_the_whole_chain() {
	let node = warp::post().and(warp::body::json()).map(|body: Value| {
		let answer = |request: &Value| {
			let result = match request["method"].as_str() {
				Some("eth_chainId") => json!("0x7a69"),
				Some("eth_blockNumber") => json!("0x10"),
				_ => json!(null),
			};
			json!({"jsonrpc": "2.0", "id": request["id"], "result": result})
		};
		let response = match &body {
			Value::Array(requests) => Value::Array(requests.iter().map(answer).collect()),
			request => answer(request),
		};
		warp::reply::json(&response)
	});
	let (node_address, node_server) = warp::serve(node).bind_ephemeral(([127, 0, 0, 1], 0));
	tokio::spawn(node_server);

	let http = HttpProvider::new(HttpConfig {
		url: format!("http://{node_address}"),
		..Default::default()
	})
	.unwrap();
	let batcher = RequestBatcher::new(http, Duration::from_millis(1));
	let config = MiddlewareConfig {
		chain_id: Some(31337),
		..Default::default()
	};
	let provider = middleware::apply(Box::new(batcher), &config).unwrap();

	let server = listen(provider.into()).await;
	let response = post(
		server.local_address(),
		r#"[
			{"jsonrpc":"2.0","method":"eth_blockNumber","params":[],"id":1},
			{"jsonrpc":"2.0","method":"eth_chainId","params":[],"id":"two"}
		]"#,
	)
	.await;

	assert_eq!(
		response,
		json!([
			{"jsonrpc": "2.0", "id": 1, "result": "0x10"},
			{"jsonrpc": "2.0", "id": "two", "result": "0x7a69"}
		])
	);
	server.close().await.unwrap();
}

#[tokio::test]
async fn chain_id_mismatch_reaches_the_caller() {
	let server = listen(Arc::from(
		middleware::apply(
			Box::new(EchoProvider::default()),
			&MiddlewareConfig {
				chain_id: Some(5),
				..Default::default()
			},
		)
		.unwrap(),
	))
	.await;

	let response = post(server.local_address(), BLOCK_NUMBER).await;
	assert_eq!(response["id"], json!(1));
	assert_eq!(response["error"]["code"], json!(-32603));
	let message = response["error"]["message"].as_str().unwrap();
	assert!(message.contains("chain id 5"), "{message}");
	server.close().await.unwrap();
}
