//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, num::NonZeroU32, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::domain::views::HelloWorldFixture;

mod cli;

pub use cli::{
    CliArgs, Command, ProviderOverrides, ServeArgs, ServeOverrides, ViewsArgs, ViewsOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "folio-views";
const ENV_PREFIX: &str = "FOLIO_VIEWS";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_CACHE_TTL_SECS: u64 = 60 * 60;
const DEFAULT_MIN_REQUEST_DELAY_MS: u64 = 1000;
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 5;
const DEFAULT_PROVIDER_API_BASE: &str = "https://api.cloudflare.com/client/v4/";
const DEFAULT_PROVIDER_LOOKBACK_DAYS: u64 = 30;
const DEFAULT_API_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const DEFAULT_API_RATE_LIMIT_MAX_REQUESTS: u64 = 120;
const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub views: ViewsSettings,
    pub provider: ProviderSettings,
    pub api_rate_limit: ApiRateLimitSettings,
    pub cors: CorsSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct ViewsSettings {
    pub cache_ttl: Duration,
    pub min_request_delay: Duration,
    pub provider_timeout: Duration,
    pub hello_world_fixture: HelloWorldFixture,
}

/// Analytics provider credentials; both must be present to leave fallback mode.
#[derive(Clone)]
pub struct ProviderSettings {
    pub zone_id: Option<String>,
    pub api_token: Option<String>,
    pub api_base: Url,
    pub lookback_days: NonZeroU32,
}

impl ProviderSettings {
    pub fn is_configured(&self) -> bool {
        self.zone_id.is_some() && self.api_token.is_some()
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("zone_id", &self.zone_id)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("api_base", &self.api_base.as_str())
            .field("lookback_days", &self.lookback_days)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ApiRateLimitSettings {
    pub window_seconds: NonZeroU32,
    pub max_requests: NonZeroU32,
    /// Identify clients by `x-forwarded-for` / `x-real-ip` (set when behind a proxy).
    pub trust_forwarded_headers: bool,
}

#[derive(Debug, Clone)]
pub struct CorsSettings {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .list_separator(",")
            .with_list_parse_key("cors.allowed_origins")
            .try_parsing(true),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Views(args)) => raw.apply_views_overrides(&args.overrides),
        None => {}
    }

    Settings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    views: RawViewsSettings,
    provider: RawProviderSettings,
    api_rate_limit: RawApiRateLimitSettings,
    cors: RawCorsSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(window) = overrides.api_rate_limit_window_seconds {
            self.api_rate_limit.window_seconds = Some(window);
        }
        if let Some(max) = overrides.api_rate_limit_max_requests {
            self.api_rate_limit.max_requests = Some(max);
        }
        if let Some(trust) = overrides.api_rate_limit_trust_forwarded {
            self.api_rate_limit.trust_forwarded_headers = Some(trust);
        }
        if !overrides.cors_allowed_origins.is_empty() {
            self.cors.allowed_origins = Some(overrides.cors_allowed_origins.clone());
        }

        self.apply_views_overrides(&overrides.views);
    }

    fn apply_views_overrides(&mut self, overrides: &ViewsOverrides) {
        if let Some(seconds) = overrides.cache_ttl_seconds {
            self.views.cache_ttl_seconds = Some(seconds);
        }
        if let Some(millis) = overrides.min_request_delay_ms {
            self.views.min_request_delay_ms = Some(millis);
        }
        if let Some(seconds) = overrides.provider_timeout_seconds {
            self.views.provider_timeout_seconds = Some(seconds);
        }
        if let Some(fixture) = overrides.hello_world_fixture.as_ref() {
            self.views.hello_world_fixture = Some(fixture.clone());
        }

        self.apply_provider_overrides(&overrides.provider);
    }

    fn apply_provider_overrides(&mut self, overrides: &ProviderOverrides) {
        if let Some(zone_id) = overrides.zone_id.as_ref() {
            self.provider.zone_id = Some(zone_id.clone());
        }
        if let Some(token) = overrides.api_token.as_ref() {
            self.provider.api_token = Some(token.clone());
        }
        if let Some(base) = overrides.api_base.as_ref() {
            self.provider.api_base = Some(base.clone());
        }
        if let Some(days) = overrides.lookback_days {
            self.provider.lookback_days = Some(days.into());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            views,
            provider,
            api_rate_limit,
            cors,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            views: build_views_settings(views)?,
            provider: build_provider_settings(provider)?,
            api_rate_limit: build_api_rate_limit_settings(api_rate_limit)?,
            cors: build_cors_settings(cors),
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_views_settings(views: RawViewsSettings) -> Result<ViewsSettings, LoadError> {
    let ttl_secs = views.cache_ttl_seconds.unwrap_or(DEFAULT_CACHE_TTL_SECS);
    if ttl_secs == 0 {
        return Err(LoadError::invalid(
            "views.cache_ttl_seconds",
            "must be greater than zero",
        ));
    }

    let timeout_secs = views
        .provider_timeout_seconds
        .unwrap_or(DEFAULT_PROVIDER_TIMEOUT_SECS);
    if timeout_secs == 0 {
        return Err(LoadError::invalid(
            "views.provider_timeout_seconds",
            "must be greater than zero",
        ));
    }

    // Zero is allowed: it disables throttling.
    let delay_ms = views
        .min_request_delay_ms
        .unwrap_or(DEFAULT_MIN_REQUEST_DELAY_MS);

    let hello_world_fixture = match views.hello_world_fixture {
        Some(value) => value
            .parse::<HelloWorldFixture>()
            .map_err(|err| LoadError::invalid("views.hello_world_fixture", err.to_string()))?,
        None => HelloWorldFixture::default(),
    };

    Ok(ViewsSettings {
        cache_ttl: Duration::from_secs(ttl_secs),
        min_request_delay: Duration::from_millis(delay_ms),
        provider_timeout: Duration::from_secs(timeout_secs),
        hello_world_fixture,
    })
}

fn build_provider_settings(provider: RawProviderSettings) -> Result<ProviderSettings, LoadError> {
    let api_base_raw = provider
        .api_base
        .unwrap_or_else(|| DEFAULT_PROVIDER_API_BASE.to_string());
    // Relative joins need a trailing slash on the base.
    let api_base_raw = if api_base_raw.ends_with('/') {
        api_base_raw
    } else {
        format!("{api_base_raw}/")
    };
    let api_base = Url::parse(&api_base_raw).map_err(|err| {
        LoadError::invalid("provider.api_base", format!("invalid url `{api_base_raw}`: {err}"))
    })?;

    let lookback = provider
        .lookback_days
        .unwrap_or(DEFAULT_PROVIDER_LOOKBACK_DAYS);

    Ok(ProviderSettings {
        zone_id: non_blank(provider.zone_id),
        api_token: non_blank(provider.api_token),
        api_base,
        lookback_days: non_zero_u32(lookback, "provider.lookback_days")?,
    })
}

fn build_api_rate_limit_settings(
    rate_limit: RawApiRateLimitSettings,
) -> Result<ApiRateLimitSettings, LoadError> {
    let window_seconds_val = rate_limit
        .window_seconds
        .unwrap_or(DEFAULT_API_RATE_LIMIT_WINDOW_SECS);
    let window_seconds = non_zero_u32(window_seconds_val, "api_rate_limit.window_seconds")?;

    let max_requests_val = rate_limit
        .max_requests
        .unwrap_or(DEFAULT_API_RATE_LIMIT_MAX_REQUESTS);
    let max_requests = non_zero_u32(max_requests_val, "api_rate_limit.max_requests")?;

    Ok(ApiRateLimitSettings {
        window_seconds,
        max_requests,
        trust_forwarded_headers: rate_limit.trust_forwarded_headers.unwrap_or(true),
    })
}

fn build_cors_settings(cors: RawCorsSettings) -> CorsSettings {
    let allowed_origins = cors
        .allowed_origins
        .unwrap_or_else(|| vec![DEFAULT_CORS_ORIGIN.to_string()])
        .into_iter()
        .filter_map(|origin| non_blank(Some(origin)))
        .collect();

    CorsSettings { allowed_origins }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawViewsSettings {
    cache_ttl_seconds: Option<u64>,
    min_request_delay_ms: Option<u64>,
    provider_timeout_seconds: Option<u64>,
    hello_world_fixture: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawProviderSettings {
    zone_id: Option<String>,
    api_token: Option<String>,
    api_base: Option<String>,
    lookback_days: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawApiRateLimitSettings {
    window_seconds: Option<u64>,
    max_requests: Option<u64>,
    trust_forwarded_headers: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCorsSettings {
    allowed_origins: Option<Vec<String>>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
///
/// A bare invocation is treated as `serve`.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse()
        .with_default_command()
        .unwrap_or_else(|err| err.exit());
    let settings = load(&args)?;
    Ok((args, settings))
}
