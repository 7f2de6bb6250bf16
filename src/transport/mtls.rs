//! Pinned-certificate TLS configuration for both ends of the channel
//!
//! Neither side has a CA to verify against. Each side instead pins the one
//! certificate the other handed over out of band and accepts only that
//! exact DER, inside its validity window. Handshake signatures are still
//! checked against the pinned certificate's key, so presenting a copy of
//! the certificate without the private key fails.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::{
    CertificateError, ClientConfig, DigitallySignedStruct, DistinguishedName, ServerConfig,
    SignatureScheme,
};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tokio_stream::wrappers::TcpListenerStream;
use tracing::{debug, warn};

use super::TransportError;
use crate::pki::{self, EphemeralIdentity};

/// ALPN protocol negotiated on every TLS connection
pub const ALPN_H2: &[u8] = b"h2";

/// Upper bound on a single TLS handshake on the server
pub const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// The crypto provider used by every config built here
///
/// P-521 certificates need aws-lc-rs; ring has no P-521 support.
pub fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}

fn check_pinned(
    pinned: &[u8],
    presented: &CertificateDer<'_>,
    now: UnixTime,
) -> Result<(), rustls::Error> {
    if presented.as_ref() != pinned {
        return Err(rustls::Error::InvalidCertificate(
            CertificateError::ApplicationVerificationFailure,
        ));
    }

    let info = pki::inspect_certificate(pinned)
        .map_err(|_| rustls::Error::InvalidCertificate(CertificateError::BadEncoding))?;
    let now = now.as_secs() as i64;
    if now < info.not_before {
        return Err(rustls::Error::InvalidCertificate(
            CertificateError::NotValidYet,
        ));
    }
    if now > info.not_after {
        return Err(rustls::Error::InvalidCertificate(CertificateError::Expired));
    }
    Ok(())
}

/// Server certificate verifier that accepts exactly one certificate
#[derive(Debug)]
pub struct PinnedServerVerifier {
    pinned: Vec<u8>,
    provider: Arc<CryptoProvider>,
}

impl PinnedServerVerifier {
    /// Pin the given DER certificate
    pub fn new(pinned: Vec<u8>, provider: Arc<CryptoProvider>) -> Self {
        Self { pinned, provider }
    }
}

impl ServerCertVerifier for PinnedServerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        check_pinned(&self.pinned, end_entity, now)?;
        debug!("server presented the pinned certificate");
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Client certificate verifier that requires exactly one certificate
#[derive(Debug)]
pub struct PinnedClientVerifier {
    pinned: Vec<u8>,
    provider: Arc<CryptoProvider>,
}

impl PinnedClientVerifier {
    /// Pin the given DER certificate
    pub fn new(pinned: Vec<u8>, provider: Arc<CryptoProvider>) -> Self {
        Self { pinned, provider }
    }
}

impl ClientCertVerifier for PinnedClientVerifier {
    fn root_hint_subjects(&self) -> &[DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        check_pinned(&self.pinned, end_entity, now)?;
        debug!("client presented the pinned certificate");
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }

    fn client_auth_mandatory(&self) -> bool {
        true
    }
}

/// Build the host side TLS config
///
/// Trusts only `server_cert_der`. Presents `identity` when given.
pub fn client_config(
    identity: Option<&EphemeralIdentity>,
    server_cert_der: &[u8],
) -> Result<ClientConfig, TransportError> {
    pki::inspect_certificate(server_cert_der)
        .map_err(|e| TransportError::InvalidServerCertificate(e.to_string()))?;

    let provider = crypto_provider();
    let verifier = Arc::new(PinnedServerVerifier::new(
        server_cert_der.to_vec(),
        provider.clone(),
    ));

    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(verifier);

    let mut config = match identity {
        Some(identity) => {
            builder.with_client_auth_cert(identity.rustls_chain(), identity.rustls_private_key())?
        }
        None => builder.with_no_client_auth(),
    };
    config.alpn_protocols = vec![ALPN_H2.to_vec()];
    Ok(config)
}

/// Build the plugin side TLS config
///
/// With `client_cert_der` the client must present exactly that certificate;
/// without it no client certificate is requested.
pub fn server_config(
    identity: &EphemeralIdentity,
    client_cert_der: Option<&[u8]>,
) -> Result<ServerConfig, TransportError> {
    let provider = crypto_provider();
    let builder =
        ServerConfig::builder_with_provider(provider.clone()).with_safe_default_protocol_versions()?;

    let builder = match client_cert_der {
        Some(der) => builder.with_client_cert_verifier(Arc::new(PinnedClientVerifier::new(
            der.to_vec(),
            provider,
        ))),
        None => builder.with_no_client_auth(),
    };

    let mut config =
        builder.with_single_cert(identity.rustls_chain(), identity.rustls_private_key())?;
    config.alpn_protocols = vec![ALPN_H2.to_vec()];
    Ok(config)
}

/// Turn a listener into a stream of established TLS connections
///
/// Connections whose handshake fails or stalls are logged and dropped; they
/// never end the stream.
pub fn tls_incoming(
    listener: TcpListener,
    acceptor: TlsAcceptor,
) -> impl Stream<Item = Result<TlsStream<TcpStream>, std::io::Error>> + Send + 'static {
    TcpListenerStream::new(listener).filter_map(move |conn| {
        let acceptor = acceptor.clone();
        async move {
            let tcp = match conn {
                Ok(tcp) => tcp,
                Err(e) => {
                    warn!(error = %e, "failed to accept connection");
                    return None;
                }
            };
            let peer: Option<SocketAddr> = tcp.peer_addr().ok();

            match tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(tcp)).await {
                Ok(Ok(tls)) => {
                    debug!(?peer, "TLS connection established");
                    Some(Ok(tls))
                }
                Ok(Err(e)) => {
                    warn!(?peer, error = %e, "TLS handshake rejected");
                    None
                }
                Err(_) => {
                    warn!(?peer, "TLS handshake timed out");
                    None
                }
            }
        }
    })
}
