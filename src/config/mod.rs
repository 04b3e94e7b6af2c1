//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    num::{NonZeroU32, NonZeroU64, NonZeroUsize},
    path::PathBuf,
    str::FromStr,
};

use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "plaza";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CACHE_MAX_SIZE: u64 = 15;
const DEFAULT_CACHE_EXPIRE_SECONDS: u64 = 180;
const DEFAULT_TIMEZONE: &str = "UTC";

/// Command-line arguments for the plaza binary.
#[derive(Debug, Parser)]
#[command(
    name = "plaza",
    version,
    about = "Hot post listings and usage analytics for the plaza forum"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PLAZA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// List posts, served from the hot-post cache for the global hot listing.
    Posts(PostsArgs),
    /// Count listed posts.
    Rows(RowsArgs),
    /// Show one post by id.
    Post(PostArgs),
    /// Record a visit by `VISITOR` (typically a client address).
    Visit(VisitArgs),
    /// Mark a user active.
    Active(ActiveArgs),
    /// Estimate unique visitors over an inclusive date range.
    #[command(name = "uv")]
    UniqueVisitors(RangeArgs),
    /// Count users active on at least one day of an inclusive date range.
    #[command(name = "dau")]
    ActiveUsers(RangeArgs),
    /// Check database connectivity.
    Health,
}

#[derive(Debug, Args, Clone)]
pub struct PostsArgs {
    /// Author filter; 0 lists every author.
    #[arg(long = "user", default_value_t = 0, value_name = "USER_ID")]
    pub user_id: i64,

    #[arg(long, default_value_t = 0)]
    pub offset: u32,

    #[arg(long, default_value_t = 10)]
    pub limit: u32,

    /// Listing order: `latest` (0) or `hot` (1).
    #[arg(long, default_value = "hot", value_name = "ORDER")]
    pub order: String,
}

#[derive(Debug, Args, Clone)]
pub struct RowsArgs {
    /// Author filter; 0 counts every author.
    #[arg(long = "user", default_value_t = 0, value_name = "USER_ID")]
    pub user_id: i64,
}

#[derive(Debug, Args, Clone)]
pub struct PostArgs {
    #[arg(value_name = "POST_ID")]
    pub id: i64,
}

#[derive(Debug, Args, Clone)]
pub struct VisitArgs {
    #[arg(value_name = "VISITOR")]
    pub visitor: String,

    /// Day to record into (YYYYMMDD or YYYY-MM-DD); defaults to today.
    #[arg(long, value_name = "DAY")]
    pub day: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct ActiveArgs {
    #[arg(value_name = "USER_ID")]
    pub user_id: u32,

    /// Day to record into (YYYYMMDD or YYYY-MM-DD); defaults to today.
    #[arg(long, value_name = "DAY")]
    pub day: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct RangeArgs {
    /// First day of the range (YYYYMMDD or YYYY-MM-DD).
    #[arg(long, value_name = "DAY")]
    pub start: Option<String>,

    /// Last day of the range, inclusive.
    #[arg(long, value_name = "DAY")]
    pub end: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT", global = true)]
    pub database_max_connections: Option<u32>,

    /// Override the key-value store URL.
    #[arg(long = "store-url", value_name = "URL", global = true)]
    pub store_url: Option<String>,

    /// Override the cache entry bound.
    #[arg(long = "cache-max-size", value_name = "COUNT", global = true)]
    pub cache_max_size: Option<u64>,

    /// Override the cache time-to-live.
    #[arg(long = "cache-expire-seconds", value_name = "SECONDS", global = true)]
    pub cache_expire_seconds: Option<u64>,

    /// Override the timezone that decides the current analytics day.
    #[arg(long = "analytics-timezone", value_name = "TZ", global = true)]
    pub analytics_timezone: Option<String>,
}

/// Fully-resolved settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub store: StoreSettings,
    pub cache: CacheSettings,
    pub analytics: AnalyticsSettings,
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
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub max_connections: NonZeroU32,
}

/// Without a URL the process keeps analytics in memory.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub max_size: NonZeroUsize,
    pub expire_seconds: NonZeroU64,
}

#[derive(Debug, Clone)]
pub struct AnalyticsSettings {
    pub timezone: Tz,
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

    builder = builder.add_source(Environment::with_prefix("PLAZA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    store: RawStoreSettings,
    cache: RawCacheSettings,
    analytics: RawAnalyticsSettings,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(max) = overrides.database_max_connections {
            self.database.max_connections = Some(max);
        }
        if let Some(url) = overrides.store_url.as_ref() {
            self.store.url = Some(url.clone());
        }
        if let Some(size) = overrides.cache_max_size {
            self.cache.max_size = Some(size);
        }
        if let Some(seconds) = overrides.cache_expire_seconds {
            self.cache.expire_seconds = Some(seconds);
        }
        if let Some(timezone) = overrides.analytics_timezone.as_ref() {
            self.analytics.timezone = Some(timezone.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            database,
            store,
            cache,
            analytics,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            store: build_store_settings(store),
            cache: build_cache_settings(cache)?,
            analytics: build_analytics_settings(analytics)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::WARN,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let max_connections = database
        .max_connections
        .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
    let max_connections = NonZeroU32::new(max_connections).ok_or_else(|| {
        LoadError::invalid("database.max_connections", "must be greater than zero")
    })?;

    Ok(DatabaseSettings {
        url: non_blank(database.url),
        max_connections,
    })
}

fn build_store_settings(store: RawStoreSettings) -> StoreSettings {
    StoreSettings {
        url: non_blank(store.url),
    }
}

fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let max_size = cache.max_size.unwrap_or(DEFAULT_CACHE_MAX_SIZE);
    let max_size = usize::try_from(max_size)
        .ok()
        .and_then(NonZeroUsize::new)
        .ok_or_else(|| {
            LoadError::invalid("cache.max_size", "must be a positive entry count")
        })?;

    let expire_seconds = cache
        .expire_seconds
        .unwrap_or(DEFAULT_CACHE_EXPIRE_SECONDS);
    let expire_seconds = NonZeroU64::new(expire_seconds).ok_or_else(|| {
        LoadError::invalid("cache.expire_seconds", "must be greater than zero")
    })?;

    Ok(CacheSettings {
        max_size,
        expire_seconds,
    })
}

fn build_analytics_settings(
    analytics: RawAnalyticsSettings,
) -> Result<AnalyticsSettings, LoadError> {
    let name = analytics
        .timezone
        .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
    let timezone = Tz::from_str(name.trim()).map_err(|err| {
        LoadError::invalid("analytics.timezone", format!("unknown timezone `{name}`: {err}"))
    })?;

    Ok(AnalyticsSettings { timezone })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStoreSettings {
    url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    max_size: Option<u64>,
    expire_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawAnalyticsSettings {
    timezone: Option<String>,
}
