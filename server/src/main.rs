use clap::Parser;
use env_logger::Env;
use log::{info, warn};
use server::config::{parse_plugin, MasterConfig, ServerConfig};
use server::network::{Server, ServerHandle};
use server::script::ConfigHooks;
use shared::{PluginManifest, DEFAULT_PORT};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Name reported to the master directory
    #[arg(short, long, default_value = "Relay server")]
    name: String,

    /// Maximum number of simultaneous connections
    #[arg(short = 'm', long, default_value = "64")]
    max_connections: usize,

    /// Server password; the default password is used when omitted
    #[arg(long)]
    password: Option<String>,

    /// Required plugin as NAME or NAME=HASH[,HASH...]; repeat in load order
    #[arg(long = "plugin", value_parser = parse_plugin)]
    plugins: Vec<shared::PluginEntry>,

    /// Master directory address
    #[arg(long)]
    master: Option<SocketAddr>,

    /// Seconds between master heartbeats
    #[arg(long, default_value = "10")]
    heartbeat_secs: u64,

    /// Seconds of silence before a connection is dropped
    #[arg(long, default_value = "10")]
    timeout_secs: u64,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            bind_addr: format!("{}:{}", self.host, self.port),
            server_name: self.name,
            max_connections: self.max_connections,
            password: self.password,
            plugins: PluginManifest::new(self.plugins),
            master: self.master.map(|addr| MasterConfig {
                addr,
                interval: Duration::from_secs(self.heartbeat_secs.max(1)),
            }),
            connection_timeout: Duration::from_secs(self.timeout_secs.max(1)),
            ..ServerConfig::default()
        }
    }
}

/// Stops the server on Ctrl-C or when Enter is pressed on the console.
fn spawn_stop_listeners(handle: ServerHandle) {
    let ctrl_c = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            ctrl_c.stop(0);
        }
    });

    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                info!("Enter pressed, shutting down...");
                handle.stop(0);
                break;
            }
        }
    });
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Args::parse().into_config();
    if config.password.is_none() {
        warn!("No password set, clients must use the default password");
    }

    let hooks = ConfigHooks::new(config.plugins.clone());
    let mut server = Server::new(config, Box::new(hooks)).await?;
    info!("Press Enter or Ctrl+C to stop the server");
    spawn_stop_listeners(server.handle());

    let exit_code = server.run().await?;
    if exit_code != 0 {
        std::process::exit(exit_code);
    }

    Ok(())
}
