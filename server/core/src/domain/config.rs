// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Server Configuration Types
//
// Defines the settings tree consumed at startup:
// - HTTP listener, distribution and upload directories
// - VFS mountpoints
// - Reverse proxy rules and MIME overrides
// - Authenticator and settings storage modules
// - Package search paths
// - Observability settings

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::domain::mount::{MountConfig, MountTable, DEFAULT_TRANSPORT, EXAMPLE_TRANSPORT};

/// Transports compiled into the server
pub const KNOWN_TRANSPORTS: &[&str] = &[DEFAULT_TRANSPORT, EXAMPLE_TRANSPORT];

pub const AUTH_MODULES: &[&str] = &["null", "static"];

pub const STORAGE_MODULES: &[&str] = &["memory", "file"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("http.port cannot be 0")]
    InvalidPort,

    #[error("Invalid mount protocol '{0}': must be non-empty and contain no ':' or '/'")]
    InvalidProtocol(String),

    #[error("Mount '{protocol}' uses unknown transport '{transport}'")]
    UnknownTransport { protocol: String, transport: String },

    #[error("Invalid proxy rule '{rule}': {reason}")]
    InvalidProxyRule { rule: String, reason: String },

    #[error("Unknown auth module '{0}'")]
    UnknownAuthModule(String),

    #[error("Unknown storage module '{0}'")]
    UnknownStorageModule(String),

    #[error("storage.module 'file' requires storage.path")]
    MissingStoragePath,

    #[error("http.tls is not supported; terminate TLS in a fronting proxy")]
    TlsUnsupported,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub vfs: VfsConfig,

    /// Rule -> upstream URL. A rule wrapped in slashes (`/^\/api\/v2/`) is a
    /// regular expression, anything else a literal path prefix.
    #[serde(default)]
    pub proxies: BTreeMap<String, String>,

    /// Extension -> MIME type
    #[serde(default)]
    pub mimes: HashMap<String, String>,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub packages: PackagesConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    /// Plain HTTP only
    #[default]
    Http,
    /// HTTP plus a WebSocket endpoint at `ws_path`
    Ws,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_http_port")]
    pub port: u16,

    #[serde(default)]
    pub mode: ConnectionMode,

    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Client distribution directory (`%DIST%`)
    #[serde(default = "default_dist")]
    pub dist: PathBuf,

    /// Server root directory (`%DROOT%`)
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Where multipart uploads are buffered; OS temp dir when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_dir: Option<PathBuf>,

    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls: Option<TlsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VfsConfig {
    #[serde(default)]
    pub mounts: BTreeMap<String, MountConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_auth_module")]
    pub module: String,

    /// Accounts for the `static` module
    #[serde(default)]
    pub users: Vec<StaticUserConfig>,

    /// API method -> groups allowed to call it (unlisted methods are open)
    #[serde(default)]
    pub api_groups: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticUserConfig {
    pub username: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Hex-encoded SHA-256 of the password
    pub password_sha256: String,

    #[serde(default)]
    pub groups: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_module")]
    pub module: String,

    /// Directory for the `file` module
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackagesConfig {
    /// System manifest, relative paths are resolved against `http.dist`
    #[serde(default = "default_system_manifest")]
    pub system_manifest: PathBuf,

    /// VFS directories scanned for user packages
    #[serde(default = "default_user_paths")]
    pub user_paths: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle lifetime; sessions never expire when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8000
}

fn default_ws_path() -> String {
    "/ws".to_string()
}

fn default_dist() -> PathBuf {
    PathBuf::from("dist")
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_session_cookie() -> String {
    "cloudesk.sid".to_string()
}

fn default_auth_module() -> String {
    "null".to_string()
}

fn default_storage_module() -> String {
    "memory".to_string()
}

fn default_system_manifest() -> PathBuf {
    PathBuf::from("packages.json")
}

fn default_user_paths() -> Vec<String> {
    vec!["home:///.packages".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9091
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_http_port(),
            mode: ConnectionMode::default(),
            ws_path: default_ws_path(),
            dist: default_dist(),
            root: default_root(),
            upload_dir: None,
            session_cookie: default_session_cookie(),
            tls: None,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            module: default_auth_module(),
            users: Vec::new(),
            api_groups: BTreeMap::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            module: default_storage_module(),
            path: None,
        }
    }
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            system_manifest: default_system_manifest(),
            user_paths: default_user_paths(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

/// Regex body of a `/.../` proxy rule, `None` for literal rules
pub fn proxy_rule_pattern(rule: &str) -> Option<&str> {
    if rule.len() > 2 && rule.starts_with('/') && rule.ends_with('/') {
        Some(&rule[1..rule.len() - 1])
    } else {
        None
    }
}

impl ServerConfig {
    /// Load from a file; `.json` is parsed as JSON, anything else as YAML
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Discover configuration file using precedence order
    /// 1. CLOUDESK_CONFIG_PATH environment variable
    /// 2. ./cloudesk.json, ./cloudesk.yaml (working directory)
    /// 3. ~/.cloudesk/config.yaml (user home)
    /// 4. /etc/cloudesk/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("CLOUDESK_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        for candidate in ["./cloudesk.json", "./cloudesk.yaml"] {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return Some(path);
            }
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".cloudesk").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/cloudesk/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = match Self::discover_config() {
            Some(path) => {
                tracing::info!("Loading configuration from discovered path: {:?}", path);
                Self::from_file(&path)?
            }
            None => {
                tracing::warn!("No configuration file found in standard locations. Using defaults.");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("CLOUDESK_PORT") {
            match val.parse::<u16>() {
                Ok(port) => {
                    tracing::info!("Environment override: CLOUDESK_PORT={}", port);
                    self.http.port = port;
                }
                Err(_) => tracing::warn!("Invalid value for CLOUDESK_PORT: '{}'. Ignoring.", val),
            }
        }

        if let Ok(val) = std::env::var("CLOUDESK_BIND_ADDRESS") {
            tracing::info!("Environment override: CLOUDESK_BIND_ADDRESS={}", val);
            self.http.bind_address = val;
        }

        if let Ok(val) = std::env::var("CLOUDESK_DIST") {
            tracing::info!("Environment override: CLOUDESK_DIST={}", val);
            self.http.dist = PathBuf::from(val);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        if self.http.tls.is_some() {
            return Err(ConfigError::TlsUnsupported);
        }

        for (protocol, mount) in &self.vfs.mounts {
            if protocol.is_empty() || protocol.contains(':') || protocol.contains('/') {
                return Err(ConfigError::InvalidProtocol(protocol.clone()));
            }
            if let MountConfig::Detailed(options) = mount {
                if !KNOWN_TRANSPORTS.contains(&options.transport.as_str()) {
                    return Err(ConfigError::UnknownTransport {
                        protocol: protocol.clone(),
                        transport: options.transport.clone(),
                    });
                }
            }
        }

        for rule in self.proxies.keys() {
            if let Some(pattern) = proxy_rule_pattern(rule) {
                regex::Regex::new(pattern).map_err(|e| ConfigError::InvalidProxyRule {
                    rule: rule.clone(),
                    reason: e.to_string(),
                })?;
            }
        }

        if !AUTH_MODULES.contains(&self.auth.module.as_str()) {
            return Err(ConfigError::UnknownAuthModule(self.auth.module.clone()));
        }

        if !STORAGE_MODULES.contains(&self.storage.module.as_str()) {
            return Err(ConfigError::UnknownStorageModule(self.storage.module.clone()));
        }
        if self.storage.module == "file" && self.storage.path.is_none() {
            return Err(ConfigError::MissingStoragePath);
        }

        Ok(())
    }

    pub fn mount_table(&self) -> MountTable {
        MountTable::from_config(&self.vfs.mounts)
    }

    /// System manifest location with relative paths resolved against `http.dist`
    pub fn system_manifest_path(&self) -> PathBuf {
        if self.packages.system_manifest.is_absolute() {
            self.packages.system_manifest.clone()
        } else {
            self.http.dist.join(&self.packages.system_manifest)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::mount::MountOptions;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http.port, 8000);
        assert_eq!(config.http.session_cookie, "cloudesk.sid");
        assert_eq!(config.auth.module, "null");
        assert_eq!(config.storage.module, "memory");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_and_json_parse() {
        let yaml = r#"
http:
  port: 8080
  mode: ws
vfs:
  mounts:
    home: /srv/users/%USERNAME%
    apps:
      destination: "%DIST%/packages"
      ro: true
proxies:
  "/^\\/legacy/": "http://127.0.0.1:9000"
"#;
        let config = ServerConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.http.mode, ConnectionMode::Ws);
        assert_eq!(config.mount_table().len(), 2);
        assert!(config.validate().is_ok());

        let json = r#"{"http": {"port": 9000}, "mimes": {".md": "text/markdown"}}"#;
        let config = ServerConfig::from_json_str(json).unwrap();
        assert_eq!(config.http.port, 9000);
        assert_eq!(config.http.bind_address, "0.0.0.0");
        assert_eq!(config.mimes[".md"], "text/markdown");
    }

    #[test]
    fn test_from_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("cloudesk.json");
        std::fs::write(&json_path, r#"{"http": {"port": 7000}}"#).unwrap();
        assert_eq!(ServerConfig::from_file(&json_path).unwrap().http.port, 7000);

        let yaml_path = dir.path().join("cloudesk.yaml");
        std::fs::write(&yaml_path, "http:\n  port: 7001\n").unwrap();
        assert_eq!(ServerConfig::from_file(&yaml_path).unwrap().http.port, 7001);
    }

    #[test]
    fn test_validation() {
        let mut config = ServerConfig::default();

        config.http.port = 0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidPort));
        config.http.port = 8000;

        config
            .vfs
            .mounts
            .insert("bad:proto".to_string(), MountConfig::Template("/x".to_string()));
        assert!(matches!(config.validate(), Err(ConfigError::InvalidProtocol(_))));
        config.vfs.mounts.clear();

        config.vfs.mounts.insert(
            "s3".to_string(),
            MountConfig::Detailed(MountOptions {
                destination: None,
                transport: "s3".to_string(),
                enabled: true,
                ro: false,
                groups: vec![],
            }),
        );
        assert!(matches!(config.validate(), Err(ConfigError::UnknownTransport { .. })));
        config.vfs.mounts.clear();

        config
            .proxies
            .insert("/([unclosed/".to_string(), "http://x".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::InvalidProxyRule { .. })));
        config.proxies.clear();

        config.auth.module = "ldap".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::UnknownAuthModule(_))));
        config.auth.module = "static".to_string();

        config.storage.module = "file".to_string();
        assert_eq!(config.validate(), Err(ConfigError::MissingStoragePath));
        config.storage.path = Some(PathBuf::from("/var/lib/cloudesk"));
        assert!(config.validate().is_ok());

        config.http.tls = Some(TlsConfig {
            cert_path: "c".to_string(),
            key_path: "k".to_string(),
        });
        assert_eq!(config.validate(), Err(ConfigError::TlsUnsupported));
    }

    #[test]
    fn test_proxy_rule_pattern() {
        assert_eq!(proxy_rule_pattern("/^\\/api/"), Some("^\\/api"));
        assert_eq!(proxy_rule_pattern("/legacy"), None);
        assert_eq!(proxy_rule_pattern("/"), None);
    }

    #[test]
    fn test_system_manifest_path() {
        let mut config = ServerConfig::default();
        config.http.dist = PathBuf::from("/opt/dist");
        assert_eq!(config.system_manifest_path(), PathBuf::from("/opt/dist/packages.json"));
        config.packages.system_manifest = PathBuf::from("/etc/cloudesk/packages.json");
        assert_eq!(
            config.system_manifest_path(),
            PathBuf::from("/etc/cloudesk/packages.json")
        );
    }
}
