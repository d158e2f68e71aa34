//! Adapter configuration structures.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing the configuration file failed.
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for this structure.
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configuration could not be rendered as TOML.
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level adapter configuration.
///
/// # Example
///
/// ```rust
/// use kvtab_common::config::{AdapterConfig, GatewayMode};
///
/// let config: AdapterConfig = toml::from_str(
///     r#"
///     [store]
///     host = "10.0.0.5"
///     port = 6380
///
///     [gateway]
///     mode = "transient"
///     "#,
/// )
/// .unwrap();
///
/// assert_eq!(config.store.host, "10.0.0.5");
/// assert_eq!(config.gateway.mode, GatewayMode::Transient);
/// assert_eq!(config.table.key_column, "k");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Where the key-value store lives and how to talk to it.
    #[serde(default)]
    pub store: StoreConfig,

    /// How connections are obtained for each operation.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Column binding and scan behavior.
    #[serde(default)]
    pub table: TableConfig,

    /// Share registry limits.
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Table lock coordination.
    #[serde(default)]
    pub lock: LockConfig,
}

impl AdapterConfig {
    /// Creates a default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a TOML file, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if rendering or writing fails.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_toml()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.store.host.trim().is_empty() {
            return invalid("store.host must not be empty");
        }
        if self.store.port == 0 {
            return invalid("store.port must be greater than 0");
        }
        if self.gateway.max_connections == 0 {
            return invalid("gateway.max_connections must be greater than 0");
        }
        if self.table.key_column.is_empty() || self.table.value_column.is_empty() {
            return invalid("table.key_column and table.value_column must not be empty");
        }
        if self.table.key_column == self.table.value_column {
            return invalid("table.key_column and table.value_column must differ");
        }
        if self.table.key_pattern.is_empty() {
            return invalid("table.key_pattern must not be empty");
        }
        if self.registry.max_shares == 0 {
            return invalid("registry.max_shares must be greater than 0");
        }

        Ok(())
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    6379
}

/// Connection target of the key-value store.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store host.
    #[serde(default = "default_host")]
    pub host: String,

    /// Store port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for `AUTH`, if the store uses ACLs.
    #[serde(default)]
    pub username: Option<String>,

    /// Password for `AUTH`. Never written back out.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Logical database selected after connecting.
    #[serde(default)]
    pub database: Option<u32>,

    /// Connect timeout in milliseconds. Unset means wait for the OS.
    #[serde(default)]
    pub connect_timeout_ms: Option<u64>,

    /// Read/write timeout in milliseconds. Unset means block indefinitely.
    #[serde(default)]
    pub io_timeout_ms: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: None,
            password: None,
            database: None,
            connect_timeout_ms: None,
            io_timeout_ms: None,
        }
    }
}

impl StoreConfig {
    /// Creates a store configuration for the given target.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Sets the username.
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the logical database.
    #[must_use]
    pub fn database(mut self, database: u32) -> Self {
        self.database = Some(database);
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = Some(duration_ms(timeout));
        self
    }

    /// Sets the read/write timeout.
    #[must_use]
    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout_ms = Some(duration_ms(timeout));
        self
    }

    /// Returns `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the connect timeout, if any.
    #[must_use]
    pub fn connect_timeout_duration(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }

    /// Returns the read/write timeout, if any.
    #[must_use]
    pub fn io_timeout_duration(&self) -> Option<Duration> {
        self.io_timeout_ms.map(Duration::from_millis)
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("database", &self.database)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("io_timeout_ms", &self.io_timeout_ms)
            .finish()
    }
}

/// How the gateway hands out connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayMode {
    /// A fresh connection per operation, closed afterwards.
    Transient,
    /// Connections borrowed from a bounded pool.
    #[default]
    Pooled,
}

/// Gateway and connection pool configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Transient or pooled connections.
    pub mode: GatewayMode,
    /// Maximum number of pooled connections.
    pub max_connections: usize,
    /// How long to wait for a free pooled connection.
    pub acquire_timeout_ms: u64,
    /// How long a pooled connection may sit idle before it is closed.
    pub idle_timeout_ms: u64,
    /// Maximum lifetime of a pooled connection.
    pub max_lifetime_ms: u64,
    /// Idle time after which a borrowed connection is pinged first.
    pub health_check_interval_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            mode: GatewayMode::Pooled,
            max_connections: 8,
            acquire_timeout_ms: 5_000,
            idle_timeout_ms: 600_000,
            max_lifetime_ms: 3_600_000,
            health_check_interval_ms: 30_000,
        }
    }
}

impl GatewayConfig {
    /// Creates a gateway configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the gateway mode.
    #[must_use]
    pub fn mode(mut self, mode: GatewayMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the maximum pool size.
    #[must_use]
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the acquire timeout.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout_ms = duration_ms(timeout);
        self
    }

    /// Sets the idle timeout.
    #[must_use]
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = duration_ms(timeout);
        self
    }

    /// Sets the maximum connection lifetime.
    #[must_use]
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime_ms = duration_ms(lifetime);
        self
    }

    /// Sets the health check interval.
    #[must_use]
    pub fn health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval_ms = duration_ms(interval);
        self
    }

    /// Returns the acquire timeout.
    #[must_use]
    pub fn acquire_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Returns the idle timeout.
    #[must_use]
    pub fn idle_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Returns the maximum connection lifetime.
    #[must_use]
    pub fn max_lifetime_duration(&self) -> Duration {
        Duration::from_millis(self.max_lifetime_ms)
    }

    /// Returns the health check interval.
    #[must_use]
    pub fn health_check_interval_duration(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }
}

/// What to do with declared columns beyond the key and value columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaPolicy {
    /// Reject the table at open time.
    #[default]
    Strict,
    /// Accept the table; extra columns are never read or written.
    Lenient,
}

/// When a scan enumerates the key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotPolicy {
    /// Enumerate once per scan and iterate the cached key list.
    #[default]
    PerScan,
    /// Re-enumerate before every row. Quadratic in the number of keys.
    PerRow,
}

/// Column binding and scan behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Column mapped to the store key.
    pub key_column: String,
    /// Column mapped to the store value.
    pub value_column: String,
    /// Handling of extra declared columns.
    pub schema_policy: SchemaPolicy,
    /// Pattern passed to `KEYS` when scanning.
    pub key_pattern: String,
    /// When scans enumerate keys.
    pub snapshot: SnapshotPolicy,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            key_column: "k".to_string(),
            value_column: "v".to_string(),
            schema_policy: SchemaPolicy::Strict,
            key_pattern: "*".to_string(),
            snapshot: SnapshotPolicy::PerScan,
        }
    }
}

impl TableConfig {
    /// Creates a table configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the key and value column names.
    #[must_use]
    pub fn columns(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.key_column = key.into();
        self.value_column = value.into();
        self
    }

    /// Sets the schema policy.
    #[must_use]
    pub fn schema_policy(mut self, policy: SchemaPolicy) -> Self {
        self.schema_policy = policy;
        self
    }

    /// Sets the snapshot policy.
    #[must_use]
    pub fn snapshot(mut self, policy: SnapshotPolicy) -> Self {
        self.snapshot = policy;
        self
    }

    /// Sets the `KEYS` pattern.
    #[must_use]
    pub fn key_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.key_pattern = pattern.into();
        self
    }
}

/// Share registry limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum number of live shares. Opening a further table fails.
    pub max_shares: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { max_shares: 1024 }
    }
}

/// Table lock coordination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// How long the coordinator waits for a conflicting holder.
    pub timeout_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self { timeout_ms: 30_000 }
    }
}

impl LockConfig {
    /// Returns the lock wait timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
