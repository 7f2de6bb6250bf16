//! The two ends of a plugin process
//!
//! - [`PluginClient`] runs in the host: spawns the plugin, reads its
//!   handshake line and opens the channel
//! - [`PluginServer`] runs in the plugin: binds, announces itself and serves
//!   the provider contract until told to stop
//!
//! A [`ShutdownHandle`] is shared between the server loop, the signal
//! listener and the `Stop` RPC, so any of them can end the process.

pub mod client;
pub mod server;

pub use client::{LaunchError, PluginClient};
pub use server::{serve, BoundServer, PluginServer, ServeError};

use tokio_util::sync::CancellationToken;

/// Shared request to stop serving
///
/// Cloning yields a handle to the same request. Once requested it cannot be
/// withdrawn.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    token: CancellationToken,
}

impl ShutdownHandle {
    /// A handle nobody has triggered yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the server to stop
    pub fn request(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been requested
    pub fn is_requested(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once shutdown has been requested
    pub async fn requested(&self) {
        self.token.cancelled().await
    }
}
