//! Weather tools backed by the OpenWeatherMap REST API.
//!
//! Tools: get_current_weather, search_cities, validate_config

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::convert::{get_optional_f64, get_optional_string, get_string_arg};
use crate::error::{HandlerError, McpError, Result};
use crate::schema::{InputShape, ParamSpec, ParamType};
use crate::tools::{HandlerResult, ToolDef, ToolHandler, ToolRegistry};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

/// Keys shorter than this are treated as not configured.
pub const MIN_API_KEY_LEN: usize = 10;

const GEOCODING_PATH: &str = "/geo/1.0/direct";
const WEATHER_PATH: &str = "/data/2.5/weather";
const MAX_CITY_RESULTS: u64 = 20;
const RETRY_BASE_DELAY: Duration = Duration::from_millis(250);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(4);

/// OpenWeatherMap client settings.
#[derive(Debug, Clone)]
pub struct WeatherConfig {
    /// API key; weather lookups fail without one
    pub api_key: Option<String>,
    /// API root, without a trailing path
    pub base_url: String,
    /// Per-request HTTP timeout
    pub timeout: Duration,
    /// Retries after the first attempt for transient failures
    pub max_retries: u32,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

impl WeatherConfig {
    /// Whether an API key of plausible length is set.
    pub fn has_valid_api_key(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|k| k.trim().len() >= MIN_API_KEY_LEN)
    }
}

/// Failures of a weather lookup.
///
/// Each maps to a stable `code` carried in the handler error details.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WeatherError {
    /// No usable key, or the API rejected it.
    #[error("{0}")]
    InvalidApiKey(String),

    /// Geocoding found nothing, or the API has no data for the location.
    #[error("{0}")]
    CityNotFound(String),

    /// HTTP 429.
    #[error("weather API rate limit exceeded")]
    RateLimited,

    /// Any other upstream failure.
    #[error("weather API error: {message}")]
    Upstream {
        /// HTTP status, when a response was received
        status: Option<u16>,
        /// What went wrong
        message: String,
    },

    /// The HTTP request timed out.
    #[error("weather API did not respond in time")]
    Timeout,

    /// An argument failed a domain check.
    #[error("{0}")]
    InvalidParameter(String),
}

impl WeatherError {
    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            WeatherError::InvalidApiKey(_) => "INVALID_API_KEY",
            WeatherError::CityNotFound(_) => "CITY_NOT_FOUND",
            WeatherError::RateLimited => "RATE_LIMITED",
            WeatherError::Upstream { .. } => "UPSTREAM_ERROR",
            WeatherError::Timeout => "UPSTREAM_TIMEOUT",
            WeatherError::InvalidParameter(_) => "INVALID_PARAMETER",
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            WeatherError::Timeout => true,
            WeatherError::Upstream { status, .. } => status.map_or(true, |s| s >= 500),
            _ => false,
        }
    }
}

impl From<WeatherError> for HandlerError {
    fn from(err: WeatherError) -> Self {
        let mut details = json!({ "code": err.code() });
        if let WeatherError::Upstream {
            status: Some(status),
            ..
        } = &err
        {
            details["status"] = json!(status);
        }
        HandlerError::new(err.to_string()).with_details(details)
    }
}

/// Map a non-success HTTP status to a weather error.
pub fn status_error(status: u16) -> WeatherError {
    match status {
        401 | 403 => {
            WeatherError::InvalidApiKey("API key is invalid or lacks permission".to_string())
        }
        404 => WeatherError::CityNotFound("location not found by the weather API".to_string()),
        429 => WeatherError::RateLimited,
        s => WeatherError::Upstream {
            status: Some(s),
            message: format!("HTTP {s}"),
        },
    }
}

/// Delay before retry number `attempt` (0-indexed).
fn backoff_delay(attempt: u32) -> Duration {
    RETRY_BASE_DELAY
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(RETRY_MAX_DELAY)
}

/// A geocoding match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// City name
    pub name: String,
    /// ISO country code
    #[serde(default)]
    pub country: String,
    /// State or region, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Latitude
    pub lat: f64,
    /// Longitude
    pub lon: f64,
}

/// HTTP client for the OpenWeatherMap API.
pub struct WeatherClient {
    http: reqwest::Client,
    config: WeatherConfig,
}

impl WeatherClient {
    /// Build a client. Fails only if the HTTP stack cannot be initialized.
    pub fn new(config: WeatherConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| McpError::Config(format!("failed to build HTTP client: {e}")))?;

        if !config.has_valid_api_key() {
            warn!("No valid OpenWeatherMap API key configured; weather lookups will fail");
        }
        Ok(Self { http, config })
    }

    /// Client settings.
    pub fn config(&self) -> &WeatherConfig {
        &self.config
    }

    fn api_key(&self) -> std::result::Result<&str, WeatherError> {
        match self.config.api_key.as_deref() {
            Some(key) if self.config.has_valid_api_key() => Ok(key.trim()),
            _ => Err(WeatherError::InvalidApiKey(
                "API key not configured or invalid".to_string(),
            )),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn send_once(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<JsonValue, WeatherError> {
        let response = self
            .http
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status.as_u16()));
        }
        response.json().await.map_err(|e| WeatherError::Upstream {
            status: Some(status.as_u16()),
            message: format!("invalid response body: {}", e.without_url()),
        })
    }

    async fn get_json(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> std::result::Result<JsonValue, WeatherError> {
        let mut attempt = 0;
        loop {
            match self.send_once(path, query).await {
                Ok(body) => return Ok(body),
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    let delay = backoff_delay(attempt);
                    warn!(
                        path,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Weather API request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Look up locations matching a free-text query.
    pub async fn geocode(
        &self,
        query: &str,
        limit: u64,
    ) -> std::result::Result<Vec<GeoLocation>, WeatherError> {
        let key = self.api_key()?;
        let body = self
            .get_json(
                GEOCODING_PATH,
                &[
                    ("q", query.to_string()),
                    ("limit", limit.to_string()),
                    ("appid", key.to_string()),
                ],
            )
            .await?;
        serde_json::from_value(body).map_err(|e| WeatherError::Upstream {
            status: None,
            message: format!("unexpected geocoding response: {e}"),
        })
    }

    /// Resolve a city to one location, retrying without the country code
    /// when the qualified query finds nothing.
    pub async fn locate(
        &self,
        city: &str,
        country_code: Option<&str>,
    ) -> std::result::Result<GeoLocation, WeatherError> {
        if let Some(cc) = country_code {
            let qualified = format!("{city},{cc}");
            if let Some(found) = self.geocode(&qualified, 1).await?.into_iter().next() {
                return Ok(found);
            }
            debug!(city, country_code = cc, "Qualified lookup empty, retrying unqualified");
        }
        self.geocode(city, 1)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                WeatherError::CityNotFound(format!(
                    "city '{city}' not found; check the name or add a country code"
                ))
            })
    }

    /// Fetch raw current conditions at a location.
    pub async fn current(
        &self,
        location: &GeoLocation,
        units: &str,
        lang: &str,
    ) -> std::result::Result<JsonValue, WeatherError> {
        let key = self.api_key()?;
        self.get_json(
            WEATHER_PATH,
            &[
                ("lat", location.lat.to_string()),
                ("lon", location.lon.to_string()),
                ("units", units.to_string()),
                ("lang", lang.to_string()),
                ("appid", key.to_string()),
            ],
        )
        .await
    }

    /// Single-attempt connectivity check. Returns `(reachable, status)`.
    pub async fn probe(&self) -> (bool, String) {
        let key = match self.api_key() {
            Ok(key) => key,
            Err(_) => return (false, "API key not configured".to_string()),
        };
        let query = [
            ("q", "London,UK".to_string()),
            ("units", "metric".to_string()),
            ("appid", key.to_string()),
        ];
        match self.send_once(WEATHER_PATH, &query).await {
            Ok(_) => (true, "Connected".to_string()),
            Err(WeatherError::InvalidApiKey(_)) => (false, "Invalid API key".to_string()),
            Err(WeatherError::Upstream {
                status: Some(s), ..
            }) => (false, format!("HTTP error {s}")),
            Err(err) => (false, format!("Connection error: {err}")),
        }
    }
}

fn transport_error(err: reqwest::Error) -> WeatherError {
    if err.is_timeout() {
        WeatherError::Timeout
    } else {
        WeatherError::Upstream {
            status: None,
            message: err.without_url().to_string(),
        }
    }
}

/// Human-readable label for a unit system.
pub fn units_label(units: &str) -> String {
    let symbol = match units {
        "metric" => "°C",
        "imperial" => "°F",
        "standard" => "K",
        _ => "N/A",
    };
    format!("{units} ({symbol})")
}

/// Format a UNIX timestamp as `HH:MM` in a zone `offset_secs` east of UTC.
pub fn local_clock(timestamp: i64, offset_secs: i64) -> Option<String> {
    chrono::DateTime::from_timestamp(timestamp.checked_add(offset_secs)?, 0)
        .map(|t| t.format("%H:%M").to_string())
}

/// Condense a raw current-weather response into the tool payload.
pub fn summarize_weather(raw: &JsonValue, units: &str) -> JsonValue {
    let main = &raw["main"];
    let sys = &raw["sys"];
    let wind = &raw["wind"];
    let timezone = raw["timezone"].as_i64().unwrap_or(0);
    let clock = |field: &str| {
        sys[field]
            .as_i64()
            .and_then(|ts| local_clock(ts, timezone))
    };

    json!({
        "city": raw["name"].as_str().unwrap_or_default(),
        "country": sys["country"].as_str().unwrap_or_default(),
        "coordinates": {
            "lat": raw["coord"]["lat"].as_f64().unwrap_or(0.0),
            "lon": raw["coord"]["lon"].as_f64().unwrap_or(0.0),
        },
        "temperature": main["temp"].as_f64().unwrap_or(0.0),
        "feels_like": main["feels_like"].as_f64().unwrap_or(0.0),
        "humidity": main["humidity"].as_i64().unwrap_or(0),
        "pressure": main["pressure"].as_i64().unwrap_or(0),
        "visibility": raw["visibility"].as_f64(),
        "conditions": raw["weather"][0]["description"].as_str().unwrap_or_default(),
        "wind": {
            "speed": wind["speed"].as_f64().unwrap_or(0.0),
            "direction": wind["deg"].as_i64().unwrap_or(0),
            "gust": wind["gust"].as_f64(),
        },
        "clouds": {
            "percent": raw["clouds"]["all"].as_i64().unwrap_or(0),
        },
        "sunrise": clock("sunrise"),
        "sunset": clock("sunset"),
        "timezone": timezone,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "units": units_label(units),
    })
}

/// Payload for a city search.
pub fn summarize_cities(query: &str, locations: &[GeoLocation]) -> JsonValue {
    json!({
        "results": locations,
        "total": locations.len(),
        "query": query,
    })
}

fn check_city(city: &str) -> std::result::Result<&str, WeatherError> {
    let city = city.trim();
    if city.is_empty() {
        return Err(WeatherError::InvalidParameter(
            "city name must not be blank".to_string(),
        ));
    }
    Ok(city)
}

fn check_country_code(code: &str) -> std::result::Result<&str, WeatherError> {
    if code.len() == 2 && code.bytes().all(|b| b.is_ascii_uppercase()) {
        Ok(code)
    } else {
        Err(WeatherError::InvalidParameter(format!(
            "country_code must be two uppercase letters, got '{code}'"
        )))
    }
}

fn check_query(query: &str) -> std::result::Result<&str, WeatherError> {
    let query = query.trim();
    if query.chars().count() < 2 {
        return Err(WeatherError::InvalidParameter(
            "query must be at least 2 characters".to_string(),
        ));
    }
    Ok(query)
}

fn check_limit(limit: f64) -> std::result::Result<u64, WeatherError> {
    if limit.fract() == 0.0 && (1.0..=MAX_CITY_RESULTS as f64).contains(&limit) {
        Ok(limit as u64)
    } else {
        Err(WeatherError::InvalidParameter(format!(
            "limit must be between 1 and {MAX_CITY_RESULTS}, got {limit}"
        )))
    }
}

/// Get all weather tool definitions.
pub fn tools() -> Vec<ToolDef> {
    vec![
        ToolDef::new(
            "get_current_weather",
            "Get current weather conditions for a city. Returns temperature, \
             feels-like, humidity, pressure, wind, clouds, sunrise and sunset \
             (local time), and the unit system used.",
            InputShape::new()
                .with(
                    ParamSpec::required("city", ParamType::String)
                        .with_description("City name, e.g. 'Madrid' or 'New York'"),
                )
                .with(
                    ParamSpec::optional("country_code", ParamType::String)
                        .with_description("ISO 3166 alpha-2 country code, e.g. 'ES'"),
                )
                .with(
                    ParamSpec::optional(
                        "units",
                        ParamType::one_of(["metric", "imperial", "standard"]),
                    )
                    .with_default(json!("metric"))
                    .with_description("metric (Celsius), imperial (Fahrenheit), standard (Kelvin)"),
                )
                .with(
                    ParamSpec::optional("lang", ParamType::String)
                        .with_default(json!("en"))
                        .with_description("Language code for condition descriptions"),
                ),
        ),
        ToolDef::new(
            "search_cities",
            "Search for cities matching a name. Returns {results, total, query} \
             where each result has name, country, state, lat and lon.",
            InputShape::new()
                .with(
                    ParamSpec::required("query", ParamType::String)
                        .with_description("Search term, at least 2 characters"),
                )
                .with(
                    ParamSpec::optional("limit", ParamType::Integer)
                        .with_default(json!(5))
                        .with_description("Maximum results, 1 to 20"),
                ),
        ),
        ToolDef::new(
            "validate_config",
            "Check the weather client configuration and API connectivity.",
            InputShape::new(),
        ),
    ]
}

/// Handler for `get_current_weather`.
pub struct CurrentWeather {
    client: Arc<WeatherClient>,
}

#[async_trait]
impl ToolHandler for CurrentWeather {
    async fn call(&self, args: Map<String, JsonValue>) -> HandlerResult {
        let city = get_string_arg(&args, "city")?;
        let city = check_city(&city)?;
        let country_code = get_optional_string(&args, "country_code");
        let country_code = country_code.as_deref().map(check_country_code).transpose()?;
        let units = get_optional_string(&args, "units").unwrap_or_else(|| "metric".to_string());
        let lang = get_optional_string(&args, "lang").unwrap_or_else(|| "en".to_string());

        self.client.api_key()?;

        info!(city, country_code, units = %units, "Fetching current weather");
        let location = self.client.locate(city, country_code).await?;
        let raw = self.client.current(&location, &units, &lang).await?;
        Ok(summarize_weather(&raw, &units))
    }
}

/// Handler for `search_cities`.
pub struct CitySearch {
    client: Arc<WeatherClient>,
}

#[async_trait]
impl ToolHandler for CitySearch {
    async fn call(&self, args: Map<String, JsonValue>) -> HandlerResult {
        let query = get_string_arg(&args, "query")?;
        let query = check_query(&query)?;
        let limit = check_limit(get_optional_f64(&args, "limit").unwrap_or(5.0))?;

        info!(query, limit, "Searching cities");
        let locations = self.client.geocode(query, limit).await?;
        Ok(summarize_cities(query, &locations))
    }
}

/// Handler for `validate_config`.
pub struct ValidateConfig {
    client: Arc<WeatherClient>,
}

#[async_trait]
impl ToolHandler for ValidateConfig {
    async fn call(&self, _args: Map<String, JsonValue>) -> HandlerResult {
        let config = self.client.config();
        let (reachable, status) = self.client.probe().await;
        debug!(reachable, status = %status, "Weather configuration probed");

        Ok(json!({
            "configuration": {
                "api_key_configured": config.has_valid_api_key(),
                "timeout_secs": config.timeout.as_secs_f64(),
                "base_url": config.base_url,
                "max_retries": config.max_retries,
                "server_version": env!("CARGO_PKG_VERSION"),
            },
            "api_reachable": reachable,
            "connection_status": status,
            "overall_status": if reachable { "OK" } else { "NEEDS_ATTENTION" },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }))
    }
}

/// Register and bind the weather tools.
pub fn register(registry: &mut ToolRegistry, client: Arc<WeatherClient>) -> Result<()> {
    let mut defs = tools().into_iter();
    let handlers: [Arc<dyn ToolHandler>; 3] = [
        Arc::new(CurrentWeather {
            client: client.clone(),
        }),
        Arc::new(CitySearch {
            client: client.clone(),
        }),
        Arc::new(ValidateConfig { client }),
    ];
    for handler in handlers {
        let def = defs
            .next()
            .ok_or_else(|| McpError::Internal("weather tool list is short".to_string()))?;
        registry.register_with(def, handler)?;
    }
    Ok(())
}
