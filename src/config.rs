//! Configuration for both ends of the plugin protocol
//!
//! The server core never reads the process environment directly. Binaries
//! build a [`ServeConfig`] through [`ServeConfig::from_env`], which reads
//! through the [`PluginEnv`] trait so tests can inject values without
//! touching global state.

use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

use crate::handshake::negotiate_protocol_version;
use crate::{
    CLIENT_CERT_KEY, DEFAULT_MAX_CONCURRENT_RPCS, DEFAULT_MAX_PORT, DEFAULT_MIN_PORT,
    DEFAULT_PROTOCOL_VERSION, MAGIC_COOKIE_KEY, MAX_PORT_KEY, MIN_PORT_KEY, PROTOCOL_VERSIONS_KEY,
};

/// Grace period for in-flight RPCs once shutdown is requested
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(200);

/// Ports tried before giving up on binding
pub const DEFAULT_BIND_ATTEMPTS: usize = 32;

/// Trait for reading plugin environment variables
///
/// Abstracts the process environment, enabling unit tests without
/// manipulating global state.
#[cfg_attr(test, mockall::automock)]
pub trait PluginEnv: Send + Sync {
    /// Value of the variable, if set and valid unicode
    fn var(&self, key: &str) -> Option<String>;
}

/// Default implementation that reads from the process environment
#[derive(Clone, Default)]
pub struct OsEnv;

impl PluginEnv for OsEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// How the plugin secures its listener
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum SecurityMode {
    /// Mutual TLS when the host sent a client certificate, plain otherwise
    #[default]
    Auto,
    /// Always plain HTTP/2
    Insecure,
    /// Mutual TLS, refuse to start without a client certificate
    Mutual,
    /// TLS without client authentication (weaker, opt-in)
    ServerAuthOnly,
}

/// Plugin server configuration
#[derive(Debug, Clone)]
pub struct ServeConfig {
    /// Magic cookie value found in the environment
    pub magic_cookie: Option<String>,
    /// Raw `PLUGIN_PROTOCOL_VERSIONS` announcement from the host
    pub protocol_versions: Option<String>,
    /// Host certificate (PEM) for mutual TLS
    pub client_cert_pem: Option<String>,
    /// Listener security policy
    pub security: SecurityMode,
    /// Lowest port to bind
    pub min_port: u16,
    /// Highest port to bind
    pub max_port: u16,
    /// Ports tried before giving up
    pub bind_attempts: usize,
    /// RPCs served concurrently per connection
    pub max_concurrent_rpcs: usize,
    /// Time in-flight RPCs get after shutdown is requested
    pub grace_period: Duration,
    /// Listen for SIGINT/SIGTERM
    pub handle_signals: bool,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            magic_cookie: None,
            protocol_versions: None,
            client_cert_pem: None,
            security: SecurityMode::Auto,
            min_port: DEFAULT_MIN_PORT,
            max_port: DEFAULT_MAX_PORT,
            bind_attempts: DEFAULT_BIND_ATTEMPTS,
            max_concurrent_rpcs: DEFAULT_MAX_CONCURRENT_RPCS,
            grace_period: DEFAULT_GRACE_PERIOD,
            handle_signals: true,
        }
    }
}

impl ServeConfig {
    /// Read the plugin environment contract
    ///
    /// Unparseable port overrides fall back to the defaults with a warning;
    /// an inverted range is reported when binding.
    pub fn from_env(env: &dyn PluginEnv) -> Self {
        Self {
            magic_cookie: env.var(MAGIC_COOKIE_KEY),
            protocol_versions: env.var(PROTOCOL_VERSIONS_KEY),
            client_cert_pem: env.var(CLIENT_CERT_KEY).filter(|pem| !pem.trim().is_empty()),
            min_port: port_from_env(env, MIN_PORT_KEY, DEFAULT_MIN_PORT),
            max_port: port_from_env(env, MAX_PORT_KEY, DEFAULT_MAX_PORT),
            ..Self::default()
        }
    }

    /// The application protocol version this server will speak
    pub fn negotiated_version(&self) -> u32 {
        negotiate_protocol_version(self.protocol_versions.as_deref())
    }
}

fn port_from_env(env: &dyn PluginEnv, key: &str, default: u16) -> u16 {
    match env.var(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, default, "ignoring invalid port override");
            default
        }),
    }
}

/// Plugin launcher configuration
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Plugin executable
    pub executable: PathBuf,
    /// Application protocol version to request
    pub protocol_version: u32,
    /// Generate a client identity and require TLS
    pub secure: bool,
    /// Extra variables set on the child, on top of the inherited environment
    pub env: Vec<(String, String)>,
}

impl LaunchConfig {
    /// Launch `executable` insecurely with the default protocol version
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            protocol_version: DEFAULT_PROTOCOL_VERSION,
            secure: false,
            env: Vec::new(),
        }
    }

    /// Require mutual TLS
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Request a specific protocol version
    pub fn protocol_version(mut self, version: u32) -> Self {
        self.protocol_version = version;
        self
    }

    /// Set an additional environment variable on the child
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_with(vars: &'static [(&'static str, &'static str)]) -> MockPluginEnv {
        let mut mock = MockPluginEnv::new();
        mock.expect_var().returning(move |key| {
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        });
        mock
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = ServeConfig::from_env(&env_with(&[]));

        assert_eq!(config.magic_cookie, None);
        assert_eq!(config.client_cert_pem, None);
        assert_eq!(config.min_port, 49152);
        assert_eq!(config.max_port, 61000);
        assert_eq!(config.security, SecurityMode::Auto);
        assert_eq!(config.max_concurrent_rpcs, 10);
        assert_eq!(config.grace_period, Duration::from_millis(200));
        assert_eq!(config.negotiated_version(), 5);
    }

    #[test]
    fn reads_the_plugin_contract() {
        let config = ServeConfig::from_env(&env_with(&[
            (MAGIC_COOKIE_KEY, crate::MAGIC_COOKIE_VALUE),
            (PROTOCOL_VERSIONS_KEY, "4 5"),
            (CLIENT_CERT_KEY, "-----BEGIN CERTIFICATE-----"),
            (MIN_PORT_KEY, "10000"),
            (MAX_PORT_KEY, "10010"),
        ]));

        assert_eq!(config.magic_cookie.as_deref(), Some(crate::MAGIC_COOKIE_VALUE));
        assert_eq!(config.negotiated_version(), 5);
        assert!(config.client_cert_pem.is_some());
        assert_eq!((config.min_port, config.max_port), (10000, 10010));
    }

    #[test]
    fn blank_client_certificate_means_none() {
        let config = ServeConfig::from_env(&env_with(&[(CLIENT_CERT_KEY, "   ")]));
        assert_eq!(config.client_cert_pem, None);
    }

    #[test]
    fn invalid_port_override_falls_back() {
        let config = ServeConfig::from_env(&env_with(&[
            (MIN_PORT_KEY, "low"),
            (MAX_PORT_KEY, "70000"),
        ]));
        assert_eq!(config.min_port, DEFAULT_MIN_PORT);
        assert_eq!(config.max_port, DEFAULT_MAX_PORT);
    }

    #[test]
    fn highest_announced_version_wins() {
        let config = ServeConfig::from_env(&env_with(&[(PROTOCOL_VERSIONS_KEY, "4 6 5")]));
        assert_eq!(config.negotiated_version(), 6);
    }

    #[test]
    fn launch_config_builder() {
        let config = LaunchConfig::new("/bin/provider")
            .secure(true)
            .protocol_version(5)
            .env("TF_LOG", "trace");

        assert!(config.secure);
        assert_eq!(config.protocol_version, 5);
        assert_eq!(config.env, vec![("TF_LOG".to_string(), "trace".to_string())]);
        assert_eq!(config.executable, PathBuf::from("/bin/provider"));
    }
}
