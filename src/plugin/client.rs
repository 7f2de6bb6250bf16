//! Host side: spawn a plugin and connect to it
//!
//! The child inherits the host environment plus the plugin contract
//! variables. Its first stdout line must be the handshake; it is read once
//! and never retried. Everything the child writes afterwards, and all of its
//! stderr, is forwarded to the host's log.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::process::{Child, Command};
use tonic::transport::Channel;
use tracing::{debug, info, warn};

use crate::config::LaunchConfig;
use crate::handshake::{HandshakeError, HandshakeLine, RpcType};
use crate::pki::{EphemeralIdentity, PkiError};
use crate::proto;
use crate::proto::provider_client::ProviderClient;
use crate::transport::{build_client_channel, TransportError};
use crate::{
    CLIENT_CERT_KEY, CORE_PROTOCOL_VERSION, MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE,
    PROTOCOL_VERSIONS_KEY,
};

/// Plugin launch errors
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The executable could not be started
    #[error("failed to start plugin {}: {source}", path.display())]
    Spawn {
        /// Executable path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Reading the handshake line failed
    #[error("failed to read plugin handshake: {0}")]
    Read(#[source] io::Error),

    /// The plugin closed stdout (or wrote a blank line) before announcing
    #[error("plugin exited or closed stdout without writing a handshake line")]
    EmptyHandshake,

    /// The handshake line is malformed
    #[error("invalid plugin handshake: {0}")]
    Handshake(#[from] HandshakeError),

    /// The plugin speaks a different protocol version
    #[error("plugin speaks {which} protocol version {actual}, expected {expected}")]
    VersionMismatch {
        /// `core` or `app`
        which: &'static str,
        /// Version the host asked for
        expected: u32,
        /// Version the plugin announced
        actual: u32,
    },

    /// The plugin does not speak gRPC
    #[error("plugin uses the {actual} rpc protocol, expected {expected}")]
    ProtocolMismatch {
        /// Protocol the host speaks
        expected: RpcType,
        /// Announced protocol
        actual: RpcType,
    },

    /// The client identity could not be generated
    #[error(transparent)]
    Identity(#[from] PkiError),

    /// The channel could not be established
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Waiting for the plugin to exit failed
    #[error("failed waiting for plugin to exit: {0}")]
    Wait(#[source] io::Error),
}

/// A running plugin and the channel to it
///
/// Dropping the client kills the child process.
pub struct PluginClient {
    child: Child,
    handshake: HandshakeLine,
    channel: Channel,
}

impl PluginClient {
    /// Spawn the plugin, read its handshake and connect
    pub async fn launch(config: LaunchConfig) -> Result<Self, LaunchError> {
        let executable =
            std::path::absolute(&config.executable).map_err(|source| LaunchError::Spawn {
                path: config.executable.clone(),
                source,
            })?;
        let identity = if config.secure {
            Some(EphemeralIdentity::generate()?)
        } else {
            None
        };

        let mut command = Command::new(&executable);
        command
            .arg(&executable)
            .env(MAGIC_COOKIE_KEY, MAGIC_COOKIE_VALUE)
            .env(PROTOCOL_VERSIONS_KEY, config.protocol_version.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // An inherited certificate would make the plugin expect TLS
        match &identity {
            Some(identity) => command.env(CLIENT_CERT_KEY, identity.certificate_pem()),
            None => command.env_remove(CLIENT_CERT_KEY),
        };
        command.envs(config.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let mut child = command.spawn().map_err(|source| LaunchError::Spawn {
            path: executable.clone(),
            source,
        })?;
        let name = plugin_name(&executable);
        info!(plugin = %name, pid = child.id(), secure = config.secure, "plugin started");

        if let Some(stderr) = child.stderr.take() {
            forward_lines(name.clone(), "stderr", BufReader::new(stderr).lines());
        }
        let stdout = child.stdout.take().ok_or_else(|| {
            LaunchError::Read(io::Error::new(io::ErrorKind::BrokenPipe, "stdout not captured"))
        })?;
        let mut lines = BufReader::new(stdout).lines();

        let handshake = read_handshake(&mut lines).await?;
        check_handshake(&handshake, config.protocol_version)?;
        debug!(plugin = %name, endpoint = %handshake.endpoint(), "handshake accepted");
        forward_lines(name, "stdout", lines);

        let channel = build_client_channel(&handshake, identity.as_ref()).await?;
        Ok(Self {
            child,
            handshake,
            channel,
        })
    }

    /// Handshake the plugin announced
    pub fn handshake(&self) -> &HandshakeLine {
        &self.handshake
    }

    /// Process id, while the child runs
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// The channel to the plugin
    pub fn channel(&self) -> Channel {
        self.channel.clone()
    }

    /// Provider contract client over the channel
    pub fn provider(&self) -> ProviderClient<Channel> {
        ProviderClient::new(self.channel())
    }

    /// Ask the plugin to stop and wait for it to exit
    ///
    /// Each step gets `grace`; a plugin that is still running afterwards is
    /// killed.
    pub async fn shutdown(mut self, grace: Duration) -> Result<ExitStatus, LaunchError> {
        let mut provider = self.provider();
        match tokio::time::timeout(grace, provider.stop(proto::stop::Request {})).await {
            Ok(Ok(response)) => {
                let error = response.into_inner().error;
                if !error.is_empty() {
                    warn!(%error, "plugin reported an error while stopping");
                }
            }
            Ok(Err(status)) => warn!(%status, "stop call failed"),
            Err(_) => warn!(?grace, "stop call timed out"),
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => status.map_err(LaunchError::Wait),
            Err(_) => {
                warn!(pid = self.child.id(), "plugin did not exit in time, killing it");
                self.child.kill().await.map_err(LaunchError::Wait)?;
                self.child.wait().await.map_err(LaunchError::Wait)
            }
        }
    }
}

/// Read exactly one line and decode it as a handshake
async fn read_handshake<R>(lines: &mut Lines<R>) -> Result<HandshakeLine, LaunchError>
where
    R: AsyncBufRead + Unpin,
{
    let line = lines
        .next_line()
        .await
        .map_err(LaunchError::Read)?
        .filter(|line| !line.trim().is_empty())
        .ok_or(LaunchError::EmptyHandshake)?;
    Ok(HandshakeLine::decode(&line)?)
}

/// Check the announced versions and transport against what the host speaks
fn check_handshake(handshake: &HandshakeLine, expected_version: u32) -> Result<(), LaunchError> {
    if handshake.core_protocol_version != CORE_PROTOCOL_VERSION {
        return Err(LaunchError::VersionMismatch {
            which: "core",
            expected: CORE_PROTOCOL_VERSION,
            actual: handshake.core_protocol_version,
        });
    }
    if handshake.app_protocol_version != expected_version {
        return Err(LaunchError::VersionMismatch {
            which: "app",
            expected: expected_version,
            actual: handshake.app_protocol_version,
        });
    }
    if handshake.rpc_type != RpcType::Grpc {
        return Err(LaunchError::ProtocolMismatch {
            expected: RpcType::Grpc,
            actual: handshake.rpc_type,
        });
    }
    Ok(())
}

fn plugin_name(executable: &Path) -> String {
    executable
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| executable.display().to_string())
}

fn forward_lines<R>(plugin: String, stream: &'static str, mut lines: Lines<BufReader<R>>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => debug!(%plugin, stream, "{}", line),
                Ok(None) => break,
                Err(e) => {
                    debug!(%plugin, stream, error = %e, "stopped reading plugin output");
                    break;
                }
            }
        }
    });
}
