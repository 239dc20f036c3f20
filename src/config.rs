//! Configuration management for the StackRox MCP server
//!
//! Configuration is read from an optional YAML file, then overridden by
//! `STACKROX_MCP__<SECTION>__<KEY>` environment variables and finally by
//! CLI flags. [`Config::validate`] must pass before any connection to
//! Central is attempted.

use crate::error::{McpError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Prefix shared by every environment override
pub const ENV_PREFIX: &str = "STACKROX_MCP";

/// Placeholder written over secrets by [`Config::redacted`]
pub const REDACTED: &str = "***REDACTED***";

/// Port used when the Central endpoint does not name one
pub const DEFAULT_CENTRAL_PORT: u16 = 443;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Connection settings for StackRox Central
    #[serde(default)]
    pub central: CentralConfig,
    /// Settings that apply to every toolset
    #[serde(default)]
    pub global: GlobalConfig,
    /// MCP server transport settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Per-toolset enablement
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// How outbound calls to Central are authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthType {
    /// Forward the bearer token the MCP caller sent
    Passthrough,
    /// Use the configured `api_token`
    Static,
}

impl AuthType {
    /// Resolve the configured auth type string
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "passthrough" => Some(Self::Passthrough),
            "static" => Some(Self::Static),
            _ => None,
        }
    }

    /// Configuration spelling of this auth type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passthrough => "passthrough",
            Self::Static => "static",
        }
    }
}

/// StackRox Central connection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentralConfig {
    /// Central endpoint, either `host:port` or a full URL
    #[serde(default = "default_central_url")]
    pub url: String,

    /// `passthrough` or `static`
    #[serde(default = "default_auth_type")]
    pub auth_type: String,

    /// API token used with the `static` auth type
    #[serde(default)]
    pub api_token: String,

    /// Accept any server certificate (development only)
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,

    /// Use the gRPC-Web over HTTP/1.1 compatibility transport
    #[serde(default)]
    pub force_http1: bool,

    /// Timeout applied to each RPC attempt
    #[serde(default = "default_request_timeout", with = "duration_str")]
    pub request_timeout: Duration,

    /// Number of attempts for retriable failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff before the second attempt
    #[serde(default = "default_initial_backoff", with = "duration_str")]
    pub initial_backoff: Duration,

    /// Ceiling for the exponential backoff
    #[serde(default = "default_max_backoff", with = "duration_str")]
    pub max_backoff: Duration,
}

fn default_central_url() -> String {
    "central.stackrox:443".to_string()
}

fn default_auth_type() -> String {
    AuthType::Passthrough.as_str().to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff() -> Duration {
    Duration::from_secs(1)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(10)
}

impl Default for CentralConfig {
    fn default() -> Self {
        Self {
            url: default_central_url(),
            auth_type: default_auth_type(),
            api_token: String::new(),
            insecure_skip_tls_verify: false,
            force_http1: false,
            request_timeout: default_request_timeout(),
            max_retries: default_max_retries(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

impl CentralConfig {
    /// Parse the endpoint, assuming `https` when no scheme was given
    ///
    /// # Errors
    ///
    /// Returns an error when the endpoint is not a valid URL or has no host
    pub fn endpoint(&self) -> Result<Url> {
        let raw = self.url.trim();
        let candidate = if raw.contains("://") {
            raw.to_string()
        } else {
            format!("https://{}", raw)
        };

        let url = Url::parse(&candidate).map_err(|e| {
            McpError::Config(format!("central.url is not a valid URL: {}", e))
        })?;

        if url.host_str().map_or(true, str::is_empty) {
            return Err(
                McpError::Config("central.url is not a valid URL: missing host".to_string()).into(),
            );
        }

        Ok(url)
    }

    /// Hostname used for SNI and certificate validation
    ///
    /// Works for both `https://host:port` and bare `host:port` forms.
    pub fn hostname(&self) -> Result<String> {
        let url = self.endpoint()?;
        let host = url.host_str().unwrap_or_default();
        Ok(host
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string())
    }
}

/// Settings that apply across toolsets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Expose only read-only tools
    #[serde(default = "default_read_only_tools")]
    pub read_only_tools: bool,
}

fn default_read_only_tools() -> bool {
    true
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            read_only_tools: default_read_only_tools(),
        }
    }
}

/// MCP transport the server listens on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerType {
    /// JSON-RPC over HTTP
    StreamableHttp,
    /// Newline-delimited JSON-RPC over stdin/stdout
    Stdio,
}

impl ServerType {
    /// Resolve the configured server type string
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "streamable-http" => Some(Self::StreamableHttp),
            "stdio" => Some(Self::Stdio),
            _ => None,
        }
    }

    /// Configuration spelling of this server type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StreamableHttp => "streamable-http",
            Self::Stdio => "stdio",
        }
    }
}

/// MCP server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// `streamable-http` or `stdio`
    #[serde(rename = "type", default = "default_server_type")]
    pub server_type: String,

    /// Listen address for the HTTP server
    #[serde(default = "default_server_address")]
    pub address: String,

    /// Listen port for the HTTP server
    #[serde(default = "default_server_port")]
    pub port: u32,
}

fn default_server_type() -> String {
    ServerType::StreamableHttp.as_str().to_string()
}

fn default_server_address() -> String {
    "0.0.0.0".to_string()
}

fn default_server_port() -> u32 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_type: default_server_type(),
            address: default_server_address(),
            port: default_server_port(),
        }
    }
}

/// Toolset enablement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ToolsConfig {
    /// Vulnerability toolset
    #[serde(default)]
    pub vulnerability: ToolsetConfig,
    /// Config manager toolset
    #[serde(default)]
    pub config_manager: ToolsetConfig,
}

/// Enablement flag of a single toolset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ToolsetConfig {
    /// Whether the toolset's tools are exposed
    #[serde(default)]
    pub enabled: bool,
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// A missing file is not an error: defaults are used and the
    /// environment can supply everything.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    /// Parse configuration from a YAML file
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| McpError::Config(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from a YAML document
    pub fn from_yaml(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents)
            .map_err(|e| McpError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        // Central
        if let Some(value) = env_string("CENTRAL__URL") {
            self.central.url = value;
        }
        if let Some(value) = env_string("CENTRAL__AUTH_TYPE") {
            self.central.auth_type = value;
        }
        if let Some(value) = env_string("CENTRAL__API_TOKEN") {
            self.central.api_token = value;
        }
        if let Some(value) = env_parsed("CENTRAL__INSECURE_SKIP_TLS_VERIFY", parse_bool) {
            self.central.insecure_skip_tls_verify = value;
        }
        if let Some(value) = env_parsed("CENTRAL__FORCE_HTTP1", parse_bool) {
            self.central.force_http1 = value;
        }
        if let Some(value) = env_parsed("CENTRAL__REQUEST_TIMEOUT", parse_duration) {
            self.central.request_timeout = value;
        }
        if let Some(value) = env_parsed("CENTRAL__MAX_RETRIES", |v| {
            v.parse::<u32>().map_err(|e| e.to_string())
        }) {
            self.central.max_retries = value;
        }
        if let Some(value) = env_parsed("CENTRAL__INITIAL_BACKOFF", parse_duration) {
            self.central.initial_backoff = value;
        }
        if let Some(value) = env_parsed("CENTRAL__MAX_BACKOFF", parse_duration) {
            self.central.max_backoff = value;
        }

        // Global
        if let Some(value) = env_parsed("GLOBAL__READ_ONLY_TOOLS", parse_bool) {
            self.global.read_only_tools = value;
        }

        // Server
        if let Some(value) = env_string("SERVER__TYPE") {
            self.server.server_type = value;
        }
        if let Some(value) = env_string("SERVER__ADDRESS") {
            self.server.address = value;
        }
        if let Some(value) = env_parsed("SERVER__PORT", |v| v.parse::<u32>().map_err(|e| e.to_string()))
        {
            self.server.port = value;
        }

        // Tools
        if let Some(value) = env_parsed("TOOLS__VULNERABILITY__ENABLED", parse_bool) {
            self.tools.vulnerability.enabled = value;
        }
        if let Some(value) = env_parsed("TOOLS__CONFIG_MANAGER__ENABLED", parse_bool) {
            self.tools.config_manager.enabled = value;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        if let Some(crate::cli::Commands::Serve {
            server_type,
            port,
        }) = &cli.command
        {
            if let Some(server_type) = server_type {
                tracing::debug!(server_type = %server_type, "Server type overridden from CLI");
                self.server.server_type = server_type.clone();
            }
            if let Some(port) = port {
                tracing::debug!(port, "Server port overridden from CLI");
                self.server.port = u32::from(*port);
            }
        }
    }

    /// Validate the configuration
    ///
    /// Checks run in a fixed order and the first failure is returned.
    ///
    /// # Errors
    ///
    /// Returns a [`McpError::Config`] describing the first invalid setting
    pub fn validate(&self) -> Result<()> {
        self.validate_central()?;
        self.validate_server()?;

        if !self.tools.vulnerability.enabled && !self.tools.config_manager.enabled {
            return Err(
                McpError::Config("at least one tool has to be enabled".to_string()).into(),
            );
        }

        if self.server_type() == Some(ServerType::Stdio)
            && self.auth_type() != Some(AuthType::Static)
        {
            return Err(McpError::Config(
                "stdio server does require static auth type".to_string(),
            )
            .into());
        }

        Ok(())
    }

    fn validate_central(&self) -> Result<()> {
        let central = &self.central;

        if central.url.trim().is_empty() {
            return Err(McpError::Config("central.url is required".to_string()).into());
        }

        central.endpoint()?;

        match AuthType::parse(&central.auth_type) {
            None => {
                return Err(McpError::Config(
                    "central.auth_type must be either passthrough or static".to_string(),
                )
                .into());
            }
            Some(AuthType::Static) if central.api_token.is_empty() => {
                return Err(McpError::Config(
                    "central.api_token is required for static auth type".to_string(),
                )
                .into());
            }
            Some(AuthType::Passthrough) if !central.api_token.is_empty() => {
                return Err(McpError::Config(
                    "central.api_token can not be set for passthrough auth type".to_string(),
                )
                .into());
            }
            Some(_) => {}
        }

        if central.request_timeout.is_zero() {
            return Err(McpError::Config(
                "central.request_timeout must be positive".to_string(),
            )
            .into());
        }

        if central.max_retries > 10 {
            return Err(McpError::Config(
                "central.max_retries must be between 0 and 10".to_string(),
            )
            .into());
        }

        if central.initial_backoff.is_zero() {
            return Err(McpError::Config(
                "central.initial_backoff must be positive".to_string(),
            )
            .into());
        }

        if central.max_backoff.is_zero() {
            return Err(
                McpError::Config("central.max_backoff must be positive".to_string()).into(),
            );
        }

        if central.max_backoff < central.initial_backoff {
            return Err(McpError::Config(
                "central.max_backoff must be greater than or equal to central.initial_backoff"
                    .to_string(),
            )
            .into());
        }

        Ok(())
    }

    fn validate_server(&self) -> Result<()> {
        let Some(server_type) = self.server_type() else {
            return Err(McpError::Config(format!(
                "server.type must be either {} or {}",
                ServerType::StreamableHttp.as_str(),
                ServerType::Stdio.as_str()
            ))
            .into());
        };

        if server_type == ServerType::Stdio {
            return Ok(());
        }

        if self.server.address.trim().is_empty() {
            return Err(McpError::Config("server.address is required".to_string()).into());
        }

        if !(1..=65535).contains(&self.server.port) {
            return Err(McpError::Config(
                "server.port must be between 1 and 65535".to_string(),
            )
            .into());
        }

        Ok(())
    }

    /// Resolved auth type, `None` when the configured value is unknown
    pub fn auth_type(&self) -> Option<AuthType> {
        AuthType::parse(&self.central.auth_type)
    }

    /// Resolved server type, `None` when the configured value is unknown
    pub fn server_type(&self) -> Option<ServerType> {
        ServerType::parse(&self.server.server_type)
    }

    /// Copy of the configuration that is safe to log
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.central.api_token.is_empty() {
            copy.central.api_token = REDACTED.to_string();
        }
        copy
    }
}

fn env_key(key: &str) -> String {
    format!("{}__{}", ENV_PREFIX, key)
}

fn env_string(key: &str) -> Option<String> {
    let name = env_key(key);
    let value = std::env::var(&name).ok()?;
    tracing::debug!("Applying {} from environment", name);
    Some(value)
}

fn env_parsed<T>(key: &str, parse: impl Fn(&str) -> std::result::Result<T, String>) -> Option<T> {
    let name = env_key(key);
    let raw = std::env::var(&name).ok()?;
    match parse(raw.trim()) {
        Ok(value) => {
            tracing::debug!("Applying {} from environment", name);
            Some(value)
        }
        Err(e) => {
            tracing::warn!("Invalid {}: {} ({})", name, raw, e);
            None
        }
    }
}

fn parse_bool(value: &str) -> std::result::Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(format!("expected a boolean, got '{}'", other)),
    }
}

/// Parse a duration such as `500ms`, `1m30s`, `1.5s` or `100us`
///
/// Accepts one or more `<number><unit>` segments, where the number may be
/// fractional and the unit is one of `ns`, `us` (or `µs`), `ms`, `s`, `m`,
/// `h`. A bare integer is a number of seconds.
pub fn parse_duration(value: &str) -> std::result::Result<Duration, String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("empty duration".to_string());
    }
    if value.bytes().all(|b| b.is_ascii_digit()) {
        return value
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| format!("invalid duration '{}'", value));
    }

    let mut total: u128 = 0;
    let mut rest = value;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);

        let scale = unit_nanos(unit)
            .ok_or_else(|| format!("unknown duration unit '{}' in '{}'", unit, value))?;
        let segment = segment_nanos(number, scale)
            .ok_or_else(|| format!("invalid duration '{}'", value))?;
        total = total
            .checked_add(segment)
            .ok_or_else(|| format!("duration '{}' is out of range", value))?;
        rest = tail;
    }

    let secs = u64::try_from(total / NANOS_PER_SEC)
        .map_err(|_| format!("duration '{}' is out of range", value))?;
    // The remainder is below one second, so it fits in u32.
    let nanos = (total % NANOS_PER_SEC) as u32;
    Ok(Duration::new(secs, nanos))
}

const NANOS_PER_SEC: u128 = 1_000_000_000;

fn unit_nanos(unit: &str) -> Option<u128> {
    match unit {
        "ns" => Some(1),
        "us" | "µs" | "μs" => Some(1_000),
        "ms" => Some(1_000_000),
        "s" => Some(NANOS_PER_SEC),
        "m" => Some(60 * NANOS_PER_SEC),
        "h" => Some(3_600 * NANOS_PER_SEC),
        _ => None,
    }
}

/// `number` (`12`, `1.5`, `.25`) scaled by `scale` nanoseconds
fn segment_nanos(number: &str, scale: u128) -> Option<u128> {
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let whole: u128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos = whole.checked_mul(scale)?;

    // Digits past the 18th are below any unit's resolution.
    let fraction = &fraction[..fraction.len().min(18)];
    if !fraction.is_empty() {
        let digits: u128 = fraction.parse().ok()?;
        let divisor = 10u128.pow(u32::try_from(fraction.len()).ok()?);
        nanos = nanos.checked_add(digits * scale / divisor)?;
    }
    Some(nanos)
}

/// Render a duration in the form accepted by [`parse_duration`]
///
/// Uses the largest unit that represents the value exactly.
pub fn format_duration(duration: &Duration) -> String {
    let nanos = duration.as_nanos();
    if nanos % NANOS_PER_SEC == 0 {
        format!("{}s", duration.as_secs())
    } else if nanos % 1_000_000 == 0 {
        format!("{}ms", nanos / 1_000_000)
    } else if nanos % 1_000 == 0 {
        format!("{}us", nanos / 1_000)
    } else {
        format!("{}ns", nanos)
    }
}

mod duration_str {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Seconds(u64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(duration))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Seconds(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(text) => super::parse_duration(&text).map_err(de::Error::custom),
        }
    }
}
