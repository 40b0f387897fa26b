use std::sync::Arc;

use clap::{Parser, ValueEnum};
use serde_json::json;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use parseable_mcp_runtime::{
    BackendConnection, ConnectionFlags, McpServer, ParseableClient, ToolRegistry, resolve_setting,
};

mod http;

const LISTEN_ADDR_ENV: &str = "LISTEN_ADDR";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:9034";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Long-lived HTTP listener serving POST /mcp
    Http,
    /// Single client over stdin/stdout
    Stdio,
}

#[derive(Parser, Debug)]
#[command(
    name = "parseable-mcp",
    version,
    about = "Parseable MCP server exposing data streams and SQL queries as MCP tools"
)]
struct Cli {
    /// Server mode
    #[arg(long, value_enum, default_value_t = Mode::Http)]
    mode: Mode,

    /// Base URL of the Parseable instance (PARSEABLE_URL takes precedence)
    #[arg(long)]
    parseable_url: Option<String>,

    /// Basic auth username (PARSEABLE_USERNAME takes precedence)
    #[arg(long)]
    parseable_username: Option<String>,

    /// Basic auth password (PARSEABLE_PASSWORD takes precedence)
    #[arg(long)]
    parseable_password: Option<String>,

    /// Skip TLS certificate verification (UNSECURE takes precedence)
    #[arg(long)]
    unsecure: bool,

    /// Address to listen on in http mode (LISTEN_ADDR takes precedence)
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(err) => {
            tracing::error!(error = %err, "parseable-mcp failed");
            let payload = json!({
                "error": "mcp_server_error",
                "message": err.to_string(),
            });
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
            );
            1
        }
    };
    std::process::exit(code);
}

// Logs go to stderr so stdout stays reserved for MCP frames in stdio mode.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "parseable_mcp=info,parseable_mcp_runtime=info,tower_http=info".into());
    let json_output = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json_output {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let connection = BackendConnection::from_env(&ConnectionFlags {
        url: cli.parseable_url,
        username: cli.parseable_username,
        password: cli.parseable_password,
        unsecure: cli.unsecure,
    })?;
    tracing::info!(
        parseable_url = %connection.base_url,
        username = %connection.username,
        skip_tls_verify = connection.transport.skip_tls_verify,
        "resolved Parseable connection"
    );

    let client = ParseableClient::new(connection)?;
    let server = Arc::new(McpServer::new(ToolRegistry::new(client)));

    match cli.mode {
        Mode::Stdio => server.serve_stdio().await?,
        Mode::Http => {
            let listen = normalize_listen_addr(&resolve_setting(
                std::env::var(LISTEN_ADDR_ENV).ok(),
                cli.listen.as_deref(),
                DEFAULT_LISTEN_ADDR,
            ));
            http::serve(server, &listen).await?;
        }
    }
    Ok(())
}

/// Accepts the port-only form `:9034` by binding all interfaces.
fn normalize_listen_addr(raw: &str) -> String {
    if raw.starts_with(':') {
        format!("0.0.0.0{raw}")
    } else {
        raw.to_string()
    }
}
