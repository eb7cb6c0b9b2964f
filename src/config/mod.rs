//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "dispensa";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 7575;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_CAPACITY_BYTES: u64 = 4 * 1024 * 1024 * 1024;
const DEFAULT_MAX_ARTIFACT_BYTES: u64 = 256 * 1024 * 1024;
const DEFAULT_SHARD_COUNT: u32 = 16;
const DEFAULT_EVICTION_GRACE_SECS: u64 = 120;
const DEFAULT_MAX_CONCURRENT_REQUESTS: u32 = 256;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Command-line arguments for the dispensa binary.
#[derive(Debug, Parser)]
#[command(name = "dispensa", version, about = "dispensa artifact-cache server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "DISPENSA_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the cache server.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Listen on a Unix domain socket instead of TCP.
    #[arg(long = "server-socket-path", value_name = "PATH")]
    pub server_socket_path: Option<PathBuf>,

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

    /// Override the total store byte budget.
    #[arg(long = "storage-capacity-bytes", value_name = "BYTES")]
    pub storage_capacity_bytes: Option<u64>,

    /// Override the per-artifact size ceiling.
    #[arg(long = "storage-max-artifact-bytes", value_name = "BYTES")]
    pub storage_max_artifact_bytes: Option<u64>,

    /// Override the content-store shard count.
    #[arg(long = "storage-shard-count", value_name = "COUNT")]
    pub storage_shard_count: Option<u32>,

    /// Override the eviction grace window.
    #[arg(long = "storage-eviction-grace-seconds", value_name = "SECONDS")]
    pub storage_eviction_grace_seconds: Option<u64>,

    /// Override the concurrent in-flight request ceiling.
    #[arg(long = "limits-max-concurrent-requests", value_name = "COUNT")]
    pub limits_max_concurrent_requests: Option<u32>,

    /// Override the per-request deadline.
    #[arg(long = "limits-request-timeout-seconds", value_name = "SECONDS")]
    pub limits_request_timeout_seconds: Option<u64>,

    /// Honor the cache_key extension field on Save requests.
    #[arg(
        long = "service-inline-association",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub service_inline_association: Option<bool>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub storage: StorageSettings,
    pub limits: LimitSettings,
    pub service: ServiceSettings,
}

/// Where the server listens. A configured socket path wins over TCP,
/// matching the protocol's preference for Unix domain sockets.
#[derive(Debug, Clone)]
pub enum ListenAddr {
    Tcp(SocketAddr),
    Unix(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub listen: ListenAddr,
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
pub struct StorageSettings {
    pub capacity_bytes: NonZeroU64,
    pub max_artifact_bytes: NonZeroU64,
    pub shard_count: NonZeroU32,
    pub eviction_grace: Duration,
}

#[derive(Debug, Clone)]
pub struct LimitSettings {
    pub max_concurrent_requests: NonZeroU32,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub inline_association: bool,
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

    builder = builder.add_source(Environment::with_prefix("DISPENSA").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

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
    server: RawServerSettings,
    logging: RawLoggingSettings,
    storage: RawStorageSettings,
    limits: RawLimitSettings,
    service: RawServiceSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(path) = overrides.server_socket_path.as_ref() {
            self.server.socket_path = Some(path.clone());
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
        if let Some(bytes) = overrides.storage_capacity_bytes {
            self.storage.capacity_bytes = Some(bytes);
        }
        if let Some(bytes) = overrides.storage_max_artifact_bytes {
            self.storage.max_artifact_bytes = Some(bytes);
        }
        if let Some(count) = overrides.storage_shard_count {
            self.storage.shard_count = Some(count);
        }
        if let Some(seconds) = overrides.storage_eviction_grace_seconds {
            self.storage.eviction_grace_seconds = Some(seconds);
        }
        if let Some(count) = overrides.limits_max_concurrent_requests {
            self.limits.max_concurrent_requests = Some(count);
        }
        if let Some(seconds) = overrides.limits_request_timeout_seconds {
            self.limits.request_timeout_seconds = Some(seconds);
        }
        if let Some(inline) = overrides.service_inline_association {
            self.service.inline_association = Some(inline);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            storage,
            limits,
            service,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            storage: build_storage_settings(storage)?,
            limits: build_limit_settings(limits)?,
            service: ServiceSettings {
                inline_association: service.inline_association.unwrap_or(false),
            },
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let listen = match server.socket_path {
        Some(path) => {
            if path.as_os_str().is_empty() {
                return Err(LoadError::invalid(
                    "server.socket_path",
                    "path must not be empty",
                ));
            }
            ListenAddr::Unix(path)
        }
        None => {
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
            ListenAddr::Tcp(addr)
        }
    };

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
        listen,
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

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let capacity = storage.capacity_bytes.unwrap_or(DEFAULT_CAPACITY_BYTES);
    let capacity_bytes = NonZeroU64::new(capacity)
        .ok_or_else(|| LoadError::invalid("storage.capacity_bytes", "must be greater than zero"))?;

    let max_artifact = storage
        .max_artifact_bytes
        .unwrap_or(DEFAULT_MAX_ARTIFACT_BYTES);
    let max_artifact_bytes = NonZeroU64::new(max_artifact).ok_or_else(|| {
        LoadError::invalid("storage.max_artifact_bytes", "must be greater than zero")
    })?;

    if max_artifact_bytes > capacity_bytes {
        return Err(LoadError::invalid(
            "storage.max_artifact_bytes",
            "must not exceed storage.capacity_bytes",
        ));
    }

    let shard_count = non_zero_u32(
        storage.shard_count.unwrap_or(DEFAULT_SHARD_COUNT).into(),
        "storage.shard_count",
    )?;

    let grace_seconds = storage
        .eviction_grace_seconds
        .unwrap_or(DEFAULT_EVICTION_GRACE_SECS);

    Ok(StorageSettings {
        capacity_bytes,
        max_artifact_bytes,
        shard_count,
        eviction_grace: Duration::from_secs(grace_seconds),
    })
}

fn build_limit_settings(limits: RawLimitSettings) -> Result<LimitSettings, LoadError> {
    let max_concurrent = non_zero_u32(
        limits
            .max_concurrent_requests
            .unwrap_or(DEFAULT_MAX_CONCURRENT_REQUESTS)
            .into(),
        "limits.max_concurrent_requests",
    )?;

    let timeout_seconds = limits
        .request_timeout_seconds
        .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS);
    if timeout_seconds == 0 {
        return Err(LoadError::invalid(
            "limits.request_timeout_seconds",
            "must be greater than zero",
        ));
    }

    Ok(LimitSettings {
        max_concurrent_requests: max_concurrent,
        request_timeout: Duration::from_secs(timeout_seconds),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    socket_path: Option<PathBuf>,
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
struct RawStorageSettings {
    capacity_bytes: Option<u64>,
    max_artifact_bytes: Option<u64>,
    shard_count: Option<u32>,
    eviction_grace_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLimitSettings {
    max_concurrent_requests: Option<u32>,
    request_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServiceSettings {
    inline_association: Option<bool>,
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
