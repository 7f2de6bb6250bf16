//! Channel establishment between host and plugin
//!
//! The channel is either plain HTTP/2 or TLS where each side trusts exactly
//! one certificate: the one the peer handed over out of band (the host via
//! `PLUGIN_CLIENT_CERT`, the plugin via the handshake line).
//!
//! # Security Model
//!
//! - [`ServerSecurity::Mutual`]: the plugin presents its ephemeral identity
//!   and requires the client to present the exact certificate received in
//!   the environment
//! - [`ServerSecurity::ServerAuthOnly`]: the plugin presents its identity but
//!   does not authenticate the client. Explicit opt-in only
//! - [`ServerSecurity::Insecure`]: no TLS at all
//!
//! WebPKI path validation refuses a `ca=true` certificate as an end entity,
//! so both directions use the pinned verifiers in [`mtls`] instead of a
//! root store.

pub mod channel;
pub mod mtls;

use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SecurityMode;
use crate::pki;

pub use channel::build_client_channel;
pub use mtls::{tls_incoming, PinnedClientVerifier, PinnedServerVerifier};

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// Client certificate from the environment is unusable
    #[error("invalid client certificate: {0}")]
    InvalidClientCertificate(String),

    /// Mutual TLS requested but no client certificate was provided
    #[error("mutual TLS requires a client certificate")]
    MissingClientCertificate,

    /// Server certificate from the handshake is unusable
    #[error("invalid server certificate: {0}")]
    InvalidServerCertificate(String),

    /// Secure channel requested but the plugin announced no certificate
    #[error("plugin did not announce a server certificate")]
    MissingServerCertificate,

    /// rustls configuration error
    #[error("TLS configuration error: {0}")]
    Tls(String),

    /// Address from the handshake cannot be dialled
    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    /// Connecting to the plugin failed
    #[error("failed to connect to plugin: {0}")]
    Connect(#[source] tonic::transport::Error),
}

impl From<rustls::Error> for TransportError {
    fn from(e: rustls::Error) -> Self {
        Self::Tls(e.to_string())
    }
}

/// How the plugin server protects its listener
#[derive(Clone, PartialEq, Eq)]
pub enum ServerSecurity {
    /// Plain HTTP/2
    Insecure,
    /// TLS, client must present exactly this certificate (DER)
    Mutual {
        /// Pinned client certificate
        client_cert_der: Vec<u8>,
    },
    /// TLS without client authentication
    ServerAuthOnly,
}

impl ServerSecurity {
    /// Decide the listener security from the configured mode and the client
    /// certificate the host put in the environment
    pub fn resolve(
        mode: SecurityMode,
        client_cert_pem: Option<&str>,
    ) -> Result<Self, TransportError> {
        let client_cert_pem = client_cert_pem.map(str::trim).filter(|pem| !pem.is_empty());

        match (mode, client_cert_pem) {
            (SecurityMode::Auto, None) => {
                debug!("no client certificate provided, serving without TLS");
                Ok(Self::Insecure)
            }
            (SecurityMode::Auto | SecurityMode::Mutual, Some(pem)) => {
                let client_cert_der = decode_client_certificate(pem)?;
                Ok(Self::Mutual { client_cert_der })
            }
            (SecurityMode::Mutual, None) => Err(TransportError::MissingClientCertificate),
            (SecurityMode::Insecure, cert) => {
                if cert.is_some() {
                    warn!("client certificate ignored, TLS disabled by configuration");
                }
                Ok(Self::Insecure)
            }
            (SecurityMode::ServerAuthOnly, _) => {
                warn!("serving TLS without client authentication; any local process can call this plugin");
                Ok(Self::ServerAuthOnly)
            }
        }
    }

    /// Whether the listener speaks TLS
    pub fn is_tls(&self) -> bool {
        !matches!(self, Self::Insecure)
    }

    /// Pinned client certificate, in mutual mode
    pub fn client_cert_der(&self) -> Option<&[u8]> {
        match self {
            Self::Mutual { client_cert_der } => Some(client_cert_der),
            _ => None,
        }
    }
}

impl fmt::Debug for ServerSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insecure => f.write_str("Insecure"),
            Self::Mutual { client_cert_der } => f
                .debug_struct("Mutual")
                .field("client_cert_len", &client_cert_der.len())
                .finish(),
            Self::ServerAuthOnly => f.write_str("ServerAuthOnly"),
        }
    }
}

fn decode_client_certificate(pem: &str) -> Result<Vec<u8>, TransportError> {
    let der = pki::parse_pem(pem)
        .map_err(|e| TransportError::InvalidClientCertificate(e.to_string()))?;
    let info = pki::inspect_certificate(&der)
        .map_err(|e| TransportError::InvalidClientCertificate(e.to_string()))?;
    debug!(
        common_name = %info.common_name,
        not_after = info.not_after,
        "pinned client certificate"
    );
    Ok(der)
}
