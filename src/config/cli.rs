use std::path::PathBuf;

use clap::{Args, FromArgMatches, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the folio-views binary.
#[derive(Debug, Parser)]
#[command(name = "folio-views", version, about = "Blog view-count service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "FOLIO_VIEWS_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl CliArgs {
    /// Resolve a missing subcommand to `serve`.
    ///
    /// The serve arguments are parsed from an empty command line so their
    /// `env` fallbacks (provider credentials among them) still apply.
    pub fn with_default_command(mut self) -> Result<Self, clap::Error> {
        if self.command.is_none() {
            let matches = ServeArgs::augment_args(clap::Command::new("serve"))
                .try_get_matches_from(["serve"])?;
            let serve = ServeArgs::from_arg_matches(&matches)?;
            self.command = Some(Command::Serve(Box::new(serve)));
        }
        Ok(self)
    }
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the view-count HTTP service.
    Serve(Box<ServeArgs>),
    /// Resolve view counts for the given paths and print them as JSON.
    #[command(name = "views")]
    Views(ViewsArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Clone)]
pub struct ViewsArgs {
    #[command(flatten)]
    pub overrides: ViewsOverrides,

    /// Print origin and cache status alongside each count.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub detailed: bool,

    /// Paths or URLs to resolve.
    #[arg(value_name = "PATH", required = true)]
    pub paths: Vec<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ProviderOverrides {
    /// Analytics zone identifier.
    #[arg(long = "provider-zone-id", env = "CLOUDFLARE_ZONE_ID", value_name = "ID")]
    pub zone_id: Option<String>,

    /// Analytics API token.
    #[arg(
        long = "provider-api-token",
        env = "CLOUDFLARE_API_TOKEN",
        value_name = "TOKEN",
        hide_env_values = true
    )]
    pub api_token: Option<String>,

    /// Override the analytics API base URL.
    #[arg(long = "provider-api-base", value_name = "URL")]
    pub api_base: Option<String>,

    /// Override how many days of analytics are summed per lookup.
    #[arg(long = "provider-lookback-days", value_name = "DAYS")]
    pub lookback_days: Option<u32>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ViewsOverrides {
    #[command(flatten)]
    pub provider: ProviderOverrides,

    /// Override the view cache time-to-live.
    #[arg(long = "views-cache-ttl-seconds", value_name = "SECONDS")]
    pub cache_ttl_seconds: Option<u64>,

    /// Override the minimum delay between analytics requests.
    #[arg(long = "views-min-request-delay-ms", value_name = "MILLIS")]
    pub min_request_delay_ms: Option<u64>,

    /// Override the analytics request timeout.
    #[arg(long = "views-provider-timeout-seconds", value_name = "SECONDS")]
    pub provider_timeout_seconds: Option<u64>,

    /// Which recorded value the hello-world fixture reports (api|client).
    #[arg(long = "views-hello-world-fixture", value_name = "FIXTURE")]
    pub hello_world_fixture: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub views: ViewsOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the API rate limit window size.
    #[arg(long = "api-rate-limit-window-seconds", value_name = "SECONDS")]
    pub api_rate_limit_window_seconds: Option<u64>,

    /// Override the API rate limit request ceiling.
    #[arg(long = "api-rate-limit-max-requests", value_name = "COUNT")]
    pub api_rate_limit_max_requests: Option<u64>,

    /// Key rate limits on forwarded client headers instead of the socket peer.
    #[arg(
        long = "api-rate-limit-trust-forwarded",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub api_rate_limit_trust_forwarded: Option<bool>,

    /// Replace the list of origins allowed by CORS (repeatable).
    #[arg(long = "cors-allowed-origin", value_name = "ORIGIN")]
    pub cors_allowed_origins: Vec<String>,
}
