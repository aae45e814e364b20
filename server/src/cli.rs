use clap::{command, Parser};
use tracing::Level;

#[derive(Parser)]
#[command(version)]
pub struct CliOpts {
	/// Path to the toml configuration file
	#[arg(short, long, value_name = "FILE")]
	pub config: Option<String>,
	/// JSON-RPC server host name
	#[arg(long)]
	pub host: Option<String>,
	/// JSON-RPC server port, 0 picks a free port
	#[arg(short, long)]
	pub port: Option<u16>,
	/// JSON-RPC endpoint of the node
	#[arg(short, long)]
	pub url: Option<String>,
	/// Fail every call if the node is not on this chain
	#[arg(long)]
	pub chain_id: Option<u64>,
	/// Coalesce concurrent calls into batch requests
	#[arg(long)]
	pub batch: bool,
	/// Log level
	#[arg(long)]
	pub verbosity: Option<Level>,
	/// Set logs format to JSON
	#[arg(long)]
	pub logs_json: bool,
}
