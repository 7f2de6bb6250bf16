//! tfplugin - provider plugins over the tfplugin5 protocol
//!
//! A provider plugin is a child process spawned by an orchestrator. The two
//! sides agree on how to talk through a single handshake line the child
//! writes to stdout, then speak gRPC over a channel secured with throwaway
//! certificates that live exactly as long as the process.
//!
//! # Architecture
//!
//! - The host launches the plugin executable with a magic cookie, the
//!   protocol versions it speaks and (in secure mode) its own certificate
//! - The plugin binds a loopback port, generates its own identity, prints
//!   the handshake line and serves the provider contract
//! - Each side trusts exactly one certificate: the peer's
//!
//! # Modules
//!
//! - [`pki`] - Ephemeral self-signed identities
//! - [`handshake`] - Handshake line codec and protocol version negotiation
//! - [`transport`] - Channel establishment (plain or pinned mTLS)
//! - [`plugin`] - Launcher (host side) and server (plugin side)
//! - [`provider`] - The provider trait and its gRPC adapter
//! - [`schema`] - Schema model shared by providers and the value codec
//! - [`value`] - Schema-driven `DynamicValue` encoding
//! - [`diagnostics`] - User-facing diagnostics carried in responses
//! - [`proto`] - Generated tfplugin5 protocol types
//! - [`config`] - Environment-backed configuration
//! - [`telemetry`] - Logging setup
//! - [`error`] - Error types

#![deny(missing_docs)]

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod handshake;
pub mod pki;
pub mod plugin;
pub mod proto;
pub mod provider;
pub mod schema;
pub mod telemetry;
pub mod transport;
pub mod value;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Protocol Constants
// =============================================================================
// These values are part of the contract between host and plugin and must
// match exactly on both sides.

/// Version of the handshake itself (first handshake field)
pub const CORE_PROTOCOL_VERSION: u32 = 1;

/// Application protocol version used when the host announces none
pub const DEFAULT_PROTOCOL_VERSION: u32 = 5;

/// Environment variable carrying the magic cookie
pub const MAGIC_COOKIE_KEY: &str = "TF_PLUGIN_MAGIC_COOKIE";

/// Value of the magic cookie shared by host and plugin
pub const MAGIC_COOKIE_VALUE: &str =
    "d602bf8f470bc67ca7faa0386276bbdd4330efaf76d1a219cb4d6991ca9872b2";

/// Environment variable listing the protocol versions the host speaks
pub const PROTOCOL_VERSIONS_KEY: &str = "PLUGIN_PROTOCOL_VERSIONS";

/// Environment variable carrying the host's PEM certificate in secure mode
pub const CLIENT_CERT_KEY: &str = "PLUGIN_CLIENT_CERT";

/// Environment variable overriding the lowest port the plugin may bind
pub const MIN_PORT_KEY: &str = "PLUGIN_MIN_PORT";

/// Environment variable overriding the highest port the plugin may bind
pub const MAX_PORT_KEY: &str = "PLUGIN_MAX_PORT";

/// Hostname every ephemeral certificate is issued for
pub const LOOPBACK_HOSTNAME: &str = "localhost";

/// Default lowest port in the plugin listener range
pub const DEFAULT_MIN_PORT: u16 = 49152;

/// Default highest port in the plugin listener range
pub const DEFAULT_MAX_PORT: u16 = 61000;

/// Default number of RPCs the plugin serves concurrently
pub const DEFAULT_MAX_CONCURRENT_RPCS: usize = 10;
