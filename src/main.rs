use anyhow::Result;
use clap::Parser;
use redis_auth_proxy::{
    ProxyConfig, ProxyServer, UpstreamSettings,
    config::{DEFAULT_LISTEN_ADDR, HOST_VAR, PASS_VAR, PORT_VAR, USER_VAR},
};
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "A transparent AUTH-injecting proxy for Redis", long_about = None)]
struct Args {
    /// Listener address
    #[arg(short, long, env = "PROXY_LISTEN", default_value = DEFAULT_LISTEN_ADDR)]
    listen: String,

    /// Upstream Redis host
    #[arg(long, env = HOST_VAR)]
    host: Option<String>,

    /// Upstream Redis port
    #[arg(long, env = PORT_VAR)]
    port: Option<String>,

    /// Username sent in the injected AUTH
    #[arg(short, long, env = USER_VAR)]
    username: Option<String>,

    /// Password sent in the injected AUTH
    #[arg(short, long, env = PASS_VAR, hide_env_values = true)]
    password: Option<String>,

    /// Seconds to wait for the upstream connection
    #[arg(long, env = "PROXY_CONNECT_TIMEOUT", default_value_t = 10)]
    connect_timeout: u64,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse args
    let args = Args::parse();

    // Initialize tracing subscriber
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(level).init();

    // Every missing field is reported at once, before anything is bound
    let upstream = UpstreamSettings {
        host: args.host,
        port: args.port,
        username: args.username,
        password: args.password,
    }
    .resolve()?;

    let config = ProxyConfig::new(args.listen, upstream)
        .with_connect_timeout(Duration::from_secs(args.connect_timeout));

    // Instantiate server
    let mut server = ProxyServer::new(config);
    server.bind().await?;

    // Run it
    info!("Starting Redis proxy: {}", server.listen_addr);
    server.run().await
}
