//! lakeview-mcp binary.
//!
//! Bootstrap only: parse the CLI (with the warehouse's conventional env
//! fallbacks), initialize tracing, build the connection pool and tool
//! registry, then hand off to the selected transport. The core library
//! never touches the environment itself.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use miette::Diagnostic;
use sqlx::mysql::MySqlPoolOptions;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lakeview::config::{RowLimits, ServerConfig, TransportMode};
use lakeview::mcp::{serve_http, serve_stdio};
use lakeview::registry::ToolRegistry;
use lakeview::router::Router;
use lakeview::warehouse::MySqlExecutor;

#[derive(Error, Diagnostic, Debug)]
enum BinaryError {
    #[error("Startup error: {0}")]
    #[diagnostic(code(lakeview::binary::startup))]
    Startup(#[from] lakeview::error::StartupError),

    #[error("Transport error: {0}")]
    #[diagnostic(code(lakeview::binary::transport))]
    Transport(String),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Transport {
    Stdio,
    Http,
}

#[derive(Parser)]
#[command(name = "lakeview-mcp")]
#[command(author, version, about = "MCP server for an engineering analytics warehouse", long_about = None)]
struct Cli {
    /// Transport to serve on
    #[arg(long, value_enum, default_value = "stdio")]
    transport: Transport,

    /// Host address for the HTTP transport
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Port for the HTTP transport
    #[arg(long, default_value = "3000")]
    port: u16,

    /// Warehouse database host (falls back to $DB_HOST)
    #[arg(long)]
    db_host: Option<String>,

    /// Warehouse database port (falls back to $DB_PORT)
    #[arg(long)]
    db_port: Option<u16>,

    /// Warehouse database user (falls back to $DB_USER)
    #[arg(long)]
    db_user: Option<String>,

    /// Warehouse database password (falls back to $DB_PASSWORD)
    #[arg(long)]
    db_password: Option<String>,

    /// Warehouse database name (falls back to $DB_DATABASE)
    #[arg(long)]
    db_database: Option<String>,

    /// Maximum concurrently executing tool calls
    #[arg(long, default_value = "8")]
    concurrency: usize,

    /// Calls allowed to queue beyond the concurrency ceiling
    #[arg(long, default_value = "32")]
    queue: usize,

    /// Default rows per page
    #[arg(long, default_value = "10")]
    default_limit: u32,

    /// Hard per-page row cap
    #[arg(long, default_value = "100")]
    max_limit: u32,

    /// Per-call timeout in seconds
    #[arg(long, default_value = "30")]
    call_timeout: u64,

    /// Log level filter (falls back to $LOG_LEVEL, then "info")
    #[arg(long)]
    log_level: Option<String>,
}

fn env_or(flag: Option<String>, var: &str, default: &str) -> String {
    flag.or_else(|| std::env::var(var).ok())
        .unwrap_or_else(|| default.to_string())
}

impl Cli {
    fn database_url(&self) -> String {
        let host = env_or(self.db_host.clone(), "DB_HOST", "localhost");
        let port = self
            .db_port
            .or_else(|| std::env::var("DB_PORT").ok().and_then(|p| p.parse().ok()))
            .unwrap_or(3306);
        let user = env_or(self.db_user.clone(), "DB_USER", "devlake");
        let password = env_or(self.db_password.clone(), "DB_PASSWORD", "devlake_password");
        let database = env_or(self.db_database.clone(), "DB_DATABASE", "lake");
        format!("mysql://{user}:{password}@{host}:{port}/{database}")
    }

    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            database_url: self.database_url(),
            transport: match self.transport {
                Transport::Stdio => TransportMode::Stdio,
                Transport::Http => TransportMode::Http {
                    host: self.host,
                    port: self.port,
                },
            },
            concurrency_limit: self.concurrency,
            queue_limit: self.queue,
            limits: RowLimits {
                default: self.default_limit,
                max: self.max_limit,
            },
            call_timeout: Duration::from_secs(self.call_timeout),
            ..ServerConfig::default()
        }
    }
}

fn init_tracing(level: &str) {
    // With the stdio transport the protocol owns stdout; logs go to stderr.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("lakeview={level},tower_http=warn").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_database_url_matches_config_default() {
        // Skipped when the environment overrides the warehouse defaults.
        let overridden = ["DB_HOST", "DB_PORT", "DB_USER", "DB_PASSWORD", "DB_DATABASE"]
            .iter()
            .any(|var| std::env::var_os(var).is_some());
        if overridden {
            return;
        }
        let cli = Cli::parse_from(["lakeview-mcp"]);
        assert_eq!(cli.database_url(), ServerConfig::default().database_url);
    }
}

#[tokio::main]
async fn main() -> Result<(), BinaryError> {
    let cli = Cli::parse();
    let level = env_or(cli.log_level.clone(), "LOG_LEVEL", "info").to_lowercase();
    init_tracing(&level);

    let config = cli.server_config();

    let pool = MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.database_url)
        .await
        .map_err(lakeview::error::StartupError::Pool)?;
    info!("connected to warehouse");

    let registry = Arc::new(ToolRegistry::builtin()?);
    let executor = Arc::new(MySqlExecutor::new(pool, config.acquire_timeout));
    let router = Arc::new(Router::new(registry, executor, &config));

    match config.transport {
        TransportMode::Stdio => serve_stdio(router)
            .await
            .map_err(|e| BinaryError::Transport(e.to_string())),
        TransportMode::Http { host, port } => {
            let ct = CancellationToken::new();
            serve_http(router, host, port, ct)
                .await
                .map_err(|e| BinaryError::Transport(e.to_string()))
        }
    }
}
