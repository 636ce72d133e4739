//! Server configuration.
//!
//! Built by the binary from command-line flags and environment variables;
//! library users and tests construct it directly.

use std::time::Duration;

#[cfg(feature = "weather")]
use crate::tools::weather::WeatherConfig;

/// Default per-call timeout for tool handlers.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Which built-in tools to expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ToolSet {
    /// add, subtract, multiply, divide
    Calculator,
    /// get_current_weather, search_cities, validate_config
    Weather,
    /// Both sets, calculator first
    #[default]
    All,
}

impl ToolSet {
    /// Whether the calculator tools are included.
    pub fn includes_calculator(self) -> bool {
        matches!(self, ToolSet::Calculator | ToolSet::All)
    }

    /// Whether the weather tools are included.
    pub fn includes_weather(self) -> bool {
        matches!(self, ToolSet::Weather | ToolSet::All)
    }
}

/// Configuration for one server process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Name reported in `serverInfo`
    pub server_name: String,
    /// Version reported in `serverInfo`
    pub server_version: String,
    /// Upper bound on a single tool call
    pub call_timeout: Duration,
    /// Built-in tools to register
    pub tools: ToolSet,
    /// OpenWeatherMap client settings
    #[cfg(feature = "weather")]
    pub weather: WeatherConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: env!("CARGO_PKG_NAME").to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            tools: ToolSet::default(),
            #[cfg(feature = "weather")]
            weather: WeatherConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Set the per-call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Set the tool set.
    pub fn with_tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }

    /// Set the weather client settings.
    #[cfg(feature = "weather")]
    pub fn with_weather(mut self, weather: WeatherConfig) -> Self {
        self.weather = weather;
        self
    }
}
