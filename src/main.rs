//! toolhost-mcp server binary
//!
//! Run with: toolhost-mcp [--tools calculator|weather|all]

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use toolhost_mcp::{build_registry, McpServer, McpSession, ServerConfig, ToolSet};
#[cfg(feature = "weather")]
use toolhost_mcp::tools::weather::{WeatherConfig, DEFAULT_BASE_URL};

#[derive(Parser, Debug)]
#[command(name = "toolhost-mcp")]
#[command(version, about = "MCP tool server over stdio")]
struct Args {
    /// Tool set to expose
    #[arg(long, value_enum, env = "TOOLHOST_TOOLS", default_value_t = ToolSet::All)]
    tools: ToolSet,

    /// Per-call handler timeout in milliseconds
    #[arg(long, env = "TOOLHOST_CALL_TIMEOUT_MS", default_value = "30000")]
    call_timeout_ms: u64,

    /// OpenWeatherMap API key
    #[cfg(feature = "weather")]
    #[arg(long, env = "OPENWEATHERMAP_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// OpenWeatherMap API root
    #[cfg(feature = "weather")]
    #[arg(long, env = "OPENWEATHERMAP_BASE_URL", default_value = DEFAULT_BASE_URL)]
    weather_base_url: String,

    /// HTTP timeout for weather requests, in seconds
    #[cfg(feature = "weather")]
    #[arg(long, env = "API_TIMEOUT", default_value = "30")]
    http_timeout_secs: f64,

    /// Retries for transient weather API failures
    #[cfg(feature = "weather")]
    #[arg(long, env = "API_MAX_RETRIES", default_value = "3")]
    max_retries: u32,
}

impl Args {
    fn into_config(self) -> Result<ServerConfig, String> {
        if self.call_timeout_ms == 0 {
            return Err("--call-timeout-ms must be greater than zero".to_string());
        }
        let config = ServerConfig::default()
            .with_tools(self.tools)
            .with_call_timeout(Duration::from_millis(self.call_timeout_ms));

        #[cfg(feature = "weather")]
        let config = {
            let timeout = Duration::try_from_secs_f64(self.http_timeout_secs)
                .ok()
                .filter(|t| !t.is_zero())
                .ok_or_else(|| {
                    format!(
                        "--http-timeout-secs must be a positive number, got {}",
                        self.http_timeout_secs
                    )
                })?;
            config.with_weather(WeatherConfig {
                api_key: self.api_key,
                base_url: self.weather_base_url,
                timeout,
                max_retries: self.max_retries,
            })
        };

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Logs go to stderr; stdout carries only protocol messages
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Args::parse().into_config() {
        Ok(config) => config,
        Err(message) => {
            error!("Invalid configuration: {message}");
            return ExitCode::FAILURE;
        }
    };

    let registry = match build_registry(&config) {
        Ok(registry) => registry,
        Err(e) => {
            error!(error = %e, "Failed to build tool registry");
            return ExitCode::FAILURE;
        }
    };

    info!(
        name = %config.server_name,
        version = %config.server_version,
        tools = registry.len(),
        toolset = ?config.tools,
        "Starting MCP server"
    );

    let session = McpSession::new(registry, &config);
    let mut server = McpServer::new(session);

    match server.run().await {
        Ok(()) => {
            info!("MCP server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "MCP server failed");
            ExitCode::FAILURE
        }
    }
}
