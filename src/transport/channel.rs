//! Client channel to a launched plugin
//!
//! Every connection goes through a custom connector so that TCP and Unix
//! sockets, with or without TLS, share one code path. Whether TLS is used
//! is decided by the handshake: a plugin that announced a certificate is
//! dialled over TLS pinned to that certificate.

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use hyper_util::rt::TokioIo;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
#[cfg(unix)]
use tokio::net::UnixStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;
use tracing::{debug, info};

use super::{mtls, TransportError};
use crate::handshake::{HandshakeLine, NetworkType};
use crate::pki::EphemeralIdentity;
use crate::LOOPBACK_HOSTNAME;

/// Where to dial
#[derive(Debug, Clone)]
enum Target {
    Tcp(String),
    #[cfg(unix)]
    Unix(String),
}

impl Target {
    fn from_handshake(handshake: &HandshakeLine) -> Result<Self, TransportError> {
        match handshake.network_type {
            NetworkType::Tcp => Ok(Self::Tcp(handshake.network_address.clone())),
            #[cfg(unix)]
            NetworkType::Unix => Ok(Self::Unix(handshake.network_address.clone())),
            #[cfg(not(unix))]
            NetworkType::Unix => Err(TransportError::InvalidAddress(
                handshake.network_address.clone(),
            )),
        }
    }

    /// URI handed to tonic; only its authority reaches the wire
    fn uri(&self) -> String {
        match self {
            Self::Tcp(addr) => format!("http://{}", addr),
            #[cfg(unix)]
            Self::Unix(_) => format!("http://{}", LOOPBACK_HOSTNAME),
        }
    }

    async fn dial(&self) -> io::Result<PluginStream> {
        match self {
            Self::Tcp(addr) => {
                let stream = TcpStream::connect(addr.as_str()).await?;
                stream.set_nodelay(true)?;
                Ok(PluginStream::Tcp(stream))
            }
            #[cfg(unix)]
            Self::Unix(path) => Ok(PluginStream::Unix(UnixStream::connect(path).await?)),
        }
    }
}

/// Raw socket to the plugin
enum PluginStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl AsyncRead for PluginStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_read(cx, buf),
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for PluginStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_write(cx, buf),
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_flush(cx),
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Tcp(s) => Pin::new(s).poll_shutdown(cx),
            #[cfg(unix)]
            Self::Unix(s) => Pin::new(s).poll_shutdown(cx),
        }
    }
}

/// Plain or TLS connection, as handed to hyper
enum Connection {
    Plain(PluginStream),
    Tls(Box<TlsStream<PluginStream>>),
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_read(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_write(cx, buf),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_flush(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(s) => Pin::new(s).poll_shutdown(cx),
            Self::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}

/// Open a gRPC channel to the plugin described by `handshake`
///
/// When `identity` is given the caller asked for a secure channel, and a
/// plugin that announced no certificate is refused rather than dialled in
/// the clear.
pub async fn build_client_channel(
    handshake: &HandshakeLine,
    identity: Option<&EphemeralIdentity>,
) -> Result<Channel, TransportError> {
    let target = Target::from_handshake(handshake)?;
    let server_cert = handshake
        .server_certificate_der()
        .map_err(|e| TransportError::InvalidServerCertificate(e.to_string()))?;

    let tls = match (server_cert, identity) {
        (Some(der), identity) => {
            let config = mtls::client_config(identity, &der)?;
            Some(TlsConnector::from(Arc::new(config)))
        }
        (None, Some(_)) => return Err(TransportError::MissingServerCertificate),
        (None, None) => None,
    };

    let endpoint = Endpoint::from_shared(target.uri())
        .map_err(|_| TransportError::InvalidAddress(handshake.network_address.clone()))?;

    info!(
        endpoint = %handshake.endpoint(),
        tls = tls.is_some(),
        mutual = identity.is_some(),
        "connecting to plugin"
    );

    let connector = service_fn(move |_: Uri| {
        let target = target.clone();
        let tls = tls.clone();
        async move {
            let stream = target.dial().await?;
            let conn = match tls {
                Some(connector) => {
                    let name = ServerName::try_from(LOOPBACK_HOSTNAME)
                        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
                    let stream = connector.connect(name, stream).await?;
                    debug!("TLS session with plugin established");
                    Connection::Tls(Box::new(stream))
                }
                None => Connection::Plain(stream),
            };
            Ok::<_, io::Error>(TokioIo::new(conn))
        }
    });

    endpoint
        .connect_with_connector(connector)
        .await
        .map_err(TransportError::Connect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::RpcType;

    fn handshake(network_type: NetworkType, address: &str) -> HandshakeLine {
        HandshakeLine {
            core_protocol_version: 1,
            app_protocol_version: 5,
            network_type,
            network_address: address.to_string(),
            rpc_type: RpcType::Grpc,
            server_cert_b64: None,
        }
    }

    #[test]
    fn tcp_uri_uses_the_announced_address() {
        let target = Target::from_handshake(&handshake(NetworkType::Tcp, "127.0.0.1:1234")).unwrap();
        assert_eq!(target.uri(), "http://127.0.0.1:1234");
    }

    #[cfg(unix)]
    #[test]
    fn unix_uri_uses_a_placeholder_authority() {
        let target =
            Target::from_handshake(&handshake(NetworkType::Unix, "/tmp/plugin.sock")).unwrap();
        assert_eq!(target.uri(), "http://localhost");
    }

    #[tokio::test]
    async fn secure_client_refuses_a_plaintext_plugin() {
        let host = EphemeralIdentity::generate().unwrap();
        let err = build_client_channel(&handshake(NetworkType::Tcp, "127.0.0.1:1"), Some(&host))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::MissingServerCertificate));
    }

    #[tokio::test]
    async fn unreachable_plugin_is_a_connect_error() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = build_client_channel(&handshake(NetworkType::Tcp, &addr), None)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)));
    }

    #[tokio::test]
    async fn invalid_certificate_in_handshake_is_rejected() {
        let mut line = handshake(NetworkType::Tcp, "127.0.0.1:1");
        line.server_cert_b64 = Some("AAAA".to_string());
        let err = build_client_channel(&line, None).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidServerCertificate(_)));
    }
}
