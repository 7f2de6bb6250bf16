//! Error types for plugin hosts and servers

use thiserror::Error;

use crate::handshake::HandshakeError;
use crate::pki::PkiError;
use crate::plugin::{LaunchError, ServeError};
use crate::schema::SchemaError;
use crate::telemetry::TelemetryError;
use crate::transport::TransportError;
use crate::value::ValueError;

/// Exit code for a successful run
pub const EXIT_SUCCESS: u8 = 0;
/// Exit code for anything not covered below
pub const EXIT_FAILURE: u8 = 1;
/// Exit code when the plugin could not be started or announced itself badly
pub const EXIT_BOOTSTRAP: u8 = 2;
/// Exit code when an ephemeral identity could not be produced
pub const EXIT_IDENTITY: u8 = 3;
/// Exit code when the channel could not be set up or broke
pub const EXIT_TRANSPORT: u8 = 4;

/// Main error type for plugin operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Identity generation or certificate handling failed
    #[error("identity error: {0}")]
    Pki(#[from] PkiError),

    /// Handshake line could not be decoded
    #[error("handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// Channel setup failed
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Launching a plugin failed
    #[error("launch error: {0}")]
    Launch(#[from] LaunchError),

    /// Serving as a plugin failed
    #[error("serve error: {0}")]
    Serve(#[from] ServeError),

    /// A schema could not be interpreted
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// A value could not be encoded or decoded
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// Logging could not be set up
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    /// The plugin answered with an RPC failure
    #[error("rpc failed: {0}")]
    Rpc(#[from] tonic::Status),
}

impl Error {
    /// Process exit code for this error
    ///
    /// Bootstrap and handshake failures, identity failures and transport
    /// failures each get their own code so scripts can tell them apart from
    /// a plain failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Handshake(_) => EXIT_BOOTSTRAP,
            Self::Pki(_) => EXIT_IDENTITY,
            Self::Transport(_) => EXIT_TRANSPORT,
            Self::Launch(err) => match err {
                LaunchError::Identity(_) => EXIT_IDENTITY,
                LaunchError::Transport(_) => EXIT_TRANSPORT,
                LaunchError::Wait(_) => EXIT_FAILURE,
                LaunchError::Spawn { .. }
                | LaunchError::Read(_)
                | LaunchError::EmptyHandshake
                | LaunchError::Handshake(_)
                | LaunchError::VersionMismatch { .. }
                | LaunchError::ProtocolMismatch { .. } => EXIT_BOOTSTRAP,
            },
            Self::Serve(err) => match err {
                ServeError::Identity(_) => EXIT_IDENTITY,
                ServeError::Transport(_) | ServeError::Serve(_) => EXIT_TRANSPORT,
                ServeError::MagicCookie
                | ServeError::InvalidPortRange { .. }
                | ServeError::Bind { .. }
                | ServeError::Handshake(_) => EXIT_BOOTSTRAP,
            },
            Self::Rpc(_) => EXIT_TRANSPORT,
            Self::Schema(_) | Self::Value(_) | Self::Telemetry(_) => EXIT_FAILURE,
        }
    }
}
