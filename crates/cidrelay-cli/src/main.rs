//! cidrelay - multi-gateway IPFS content relay

use cidrelay_cli::{run_server_with_shutdown, RelayConfig};
use cidrelay_resolver::{KuboApiConfig, KuboCliConfig, NodeConfig};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum NodeBackend {
    /// Spawn the `ipfs` binary
    Cli,
    /// Call the Kubo HTTP RPC API
    Api,
}

#[derive(Parser, Debug)]
#[command(name = "cidrelay")]
#[command(about = "Serve IPFS content through a primary gateway with fallbacks")]
#[command(version)]
struct Args {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, env = "CIDRELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(short = 'H', long, env = "CIDRELAY_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "CIDRELAY_PORT")]
    port: Option<u16>,

    /// Name of the gateway to start with as primary
    #[arg(long, env = "CIDRELAY_PRIMARY_GATEWAY")]
    primary_gateway: Option<String>,

    /// Local node backend
    #[arg(long, value_enum, env = "CIDRELAY_NODE_BACKEND")]
    node_backend: Option<NodeBackend>,

    /// Kubo RPC API URL (api backend)
    #[arg(long, env = "IPFS_API_URL")]
    ipfs_api_url: Option<String>,

    /// Enable debug logging
    #[arg(short, long, env = "CIDRELAY_DEBUG")]
    debug: bool,
}

impl Args {
    /// Apply command-line overrides on top of the layered configuration
    fn apply(self, mut config: RelayConfig) -> RelayConfig {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(primary) = self.primary_gateway {
            config.registry.primary = primary;
        }

        match self.node_backend {
            Some(NodeBackend::Cli) if !matches!(config.node, NodeConfig::Cli(_)) => {
                config.node = NodeConfig::Cli(KuboCliConfig::default());
            }
            Some(NodeBackend::Api) if !matches!(config.node, NodeConfig::Api(_)) => {
                config.node = NodeConfig::Api(KuboApiConfig::default());
            }
            _ => {}
        }
        if let (Some(url), NodeConfig::Api(api)) = (self.ipfs_api_url, &mut config.node) {
            api.api_url = url;
        }

        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "cidrelay_cli={level},cidrelay_resolver={level},tower_http=debug",
                    level = log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RelayConfig::load(args.config.as_deref())?;
    let config = args.apply(config);

    tracing::info!("Starting cidrelay on {}", config.bind_addr());
    tracing::info!(
        primary = %config.registry.primary,
        fallbacks = ?config.registry.fallbacks,
        node = config.node.backend_name(),
        "Gateway configuration"
    );

    run_server_with_shutdown(config, async {
        tokio::signal::ctrl_c().await.ok();
    })
    .await
}
