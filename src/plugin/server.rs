//! Plugin side: bind, announce, serve
//!
//! The handshake line is only printed once the listener is bound, so the
//! host can never dial an address nobody listens on. Connections arriving
//! between the handshake and [`BoundServer::run`] wait in the accept queue.

use std::io::{self, Write};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::{debug, info, warn};

use super::ShutdownHandle;
use crate::config::ServeConfig;
use crate::handshake::{HandshakeLine, NetworkType, RpcType};
use crate::pki::{EphemeralIdentity, PkiError};
use crate::provider::{GrpcProvider, Provider};
use crate::transport::{mtls, tls_incoming, ServerSecurity, TransportError};
use crate::{CORE_PROTOCOL_VERSION, MAGIC_COOKIE_VALUE};

/// Plugin server errors
#[derive(Debug, Error)]
pub enum ServeError {
    /// Started without the magic cookie, i.e. not by a plugin host
    #[error(
        "This binary is a plugin. These are not meant to be executed directly. \
         Please execute the program that consumes these plugins, which will load \
         any plugins automatically"
    )]
    MagicCookie,

    /// Lowest port above highest port
    #[error("invalid port range {min}-{max}")]
    InvalidPortRange {
        /// Lowest port
        min: u16,
        /// Highest port
        max: u16,
    },

    /// No port in the range could be bound
    #[error("failed to bind a port in {min}-{max} after {attempts} attempts: {source}")]
    Bind {
        /// Lowest port
        min: u16,
        /// Highest port
        max: u16,
        /// Ports tried
        attempts: usize,
        /// Last bind error
        #[source]
        source: io::Error,
    },

    /// Server identity could not be generated
    #[error(transparent)]
    Identity(#[from] PkiError),

    /// TLS could not be set up
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The handshake line could not be written
    #[error("failed to write handshake line: {0}")]
    Handshake(#[source] io::Error),

    /// The gRPC server failed
    #[error("gRPC server error: {0}")]
    Serve(#[from] tonic::transport::Error),
}

/// A plugin server that has not bound yet
pub struct PluginServer<P> {
    provider: P,
    config: ServeConfig,
}

impl<P: Provider> PluginServer<P> {
    /// Server for `provider`
    pub fn new(provider: P, config: ServeConfig) -> Self {
        Self { provider, config }
    }

    /// Check the cookie, bind a loopback port and prepare the handshake
    pub async fn bind(self) -> Result<BoundServer<P>, ServeError> {
        let config = self.config;
        if config.magic_cookie.as_deref() != Some(MAGIC_COOKIE_VALUE) {
            return Err(ServeError::MagicCookie);
        }

        let version = config.negotiated_version();
        let listener = bind_listener(config.min_port, config.max_port, config.bind_attempts).await?;
        let addr = listener.local_addr().map_err(|source| ServeError::Bind {
            min: config.min_port,
            max: config.max_port,
            attempts: 1,
            source,
        })?;

        let security =
            ServerSecurity::resolve(config.security, config.client_cert_pem.as_deref())?;
        let mut handshake = HandshakeLine {
            core_protocol_version: CORE_PROTOCOL_VERSION,
            app_protocol_version: version,
            network_type: NetworkType::Tcp,
            network_address: addr.to_string(),
            rpc_type: RpcType::Grpc,
            server_cert_b64: None,
        };

        let acceptor = if security.is_tls() {
            let identity = EphemeralIdentity::generate()?;
            let tls = mtls::server_config(&identity, security.client_cert_der())?;
            handshake = handshake.with_server_certificate(identity.certificate_der());
            Some(TlsAcceptor::from(Arc::new(tls)))
        } else {
            None
        };

        info!(%addr, version, ?security, "plugin listener bound");
        Ok(BoundServer {
            listener,
            addr,
            handshake,
            acceptor,
            provider: self.provider,
            config,
            shutdown: ShutdownHandle::new(),
        })
    }
}

/// A plugin server with a bound listener, ready to announce and serve
pub struct BoundServer<P> {
    listener: TcpListener,
    addr: SocketAddr,
    handshake: HandshakeLine,
    acceptor: Option<TlsAcceptor>,
    provider: P,
    config: ServeConfig,
    shutdown: ShutdownHandle,
}

impl<P: Provider> BoundServer<P> {
    /// The line to announce on stdout
    pub fn handshake(&self) -> &HandshakeLine {
        &self.handshake
    }

    /// Bound address
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Handle that stops [`run`](Self::run) when triggered
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Serve until a signal or `Stop`, then give in-flight calls the grace
    /// period before returning
    pub async fn run(self) -> Result<(), ServeError> {
        let Self {
            listener,
            addr,
            handshake: _,
            acceptor,
            provider,
            config,
            shutdown,
        } = self;

        if config.handle_signals {
            spawn_signal_listener(shutdown.clone());
        }

        let service = GrpcProvider::new(provider, shutdown.clone()).into_service();
        let mut builder =
            Server::builder().concurrency_limit_per_connection(config.max_concurrent_rpcs);
        let router = builder.add_service(service);

        info!(
            %addr,
            tls = acceptor.is_some(),
            max_concurrent_rpcs = config.max_concurrent_rpcs,
            "serving provider"
        );

        let serve = async {
            match acceptor {
                Some(acceptor) => {
                    router
                        .serve_with_incoming_shutdown(
                            Box::pin(tls_incoming(listener, acceptor)),
                            shutdown.requested(),
                        )
                        .await
                }
                None => {
                    router
                        .serve_with_incoming_shutdown(
                            TcpListenerStream::new(listener),
                            shutdown.requested(),
                        )
                        .await
                }
            }
        };

        let grace = config.grace_period;
        let grace_elapsed = async {
            shutdown.requested().await;
            debug!(?grace, "shutdown requested, draining");
            tokio::time::sleep(grace).await;
        };

        tokio::select! {
            result = serve => result?,
            () = grace_elapsed => warn!(?grace, "grace period elapsed, abandoning in-flight calls"),
        }

        info!("plugin server stopped");
        Ok(())
    }
}

/// Serve `provider` as a plugin process
///
/// Prints the handshake line to stdout once the listener is bound, then
/// blocks until a signal or a `Stop` call ends the server.
pub async fn serve<P: Provider>(provider: P, config: ServeConfig) -> Result<(), ServeError> {
    let server = PluginServer::new(provider, config).bind().await?;
    announce(server.handshake())?;
    server.run().await
}

fn announce(handshake: &HandshakeLine) -> Result<(), ServeError> {
    let line = handshake.encode();
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(line.as_bytes())
        .and_then(|()| stdout.flush())
        .map_err(ServeError::Handshake)?;
    debug!(endpoint = %handshake.endpoint(), tls = handshake.server_cert_b64.is_some(), "handshake announced");
    Ok(())
}

/// Bind a random loopback port in `[min, max]`
///
/// `0-0` lets the OS pick any free port.
async fn bind_listener(min: u16, max: u16, attempts: usize) -> Result<TcpListener, ServeError> {
    if min > max {
        return Err(ServeError::InvalidPortRange { min, max });
    }

    let attempts = attempts.max(1);
    let mut last_error = None;
    for attempt in 1..=attempts {
        let port = if max == 0 {
            0
        } else {
            rand::thread_rng().gen_range(min..=max)
        };
        match TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await {
            Ok(listener) => return Ok(listener),
            Err(e) => {
                debug!(port, attempt, error = %e, "port unavailable");
                last_error = Some(e);
            }
        }
    }

    Err(ServeError::Bind {
        min,
        max,
        attempts,
        source: last_error
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::AddrInUse, "no port available")),
    })
}

fn spawn_signal_listener(shutdown: ShutdownHandle) {
    tokio::spawn(async move {
        tokio::select! {
            signal = termination_signal() => {
                info!(signal, "termination signal received");
                shutdown.request();
            }
            () = shutdown.requested() => {}
        }
    });
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for SIGINT");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn termination_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => tokio::select! {
            () = ctrl_c() => "SIGINT",
            _ = term.recv() => "SIGTERM",
        },
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM");
            ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn termination_signal() -> &'static str {
    ctrl_c().await;
    "ctrl-c"
}
