//! Handshake line codec
//!
//! The plugin announces itself with exactly one line on stdout:
//!
//! ```text
//! CORE-VERSION|APP-VERSION|NETWORK-TYPE|NETWORK-ADDR|PROTOCOL[|SERVER-CERT]
//! 1|5|tcp|127.0.0.1:54321|grpc|MIIB...
//! ```
//!
//! The certificate is the DER encoding of the plugin's ephemeral certificate
//! as standard base64 with the `=` padding stripped. A line that does not
//! decode is a protocol incompatibility, so callers must not retry.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine};
use thiserror::Error;

use crate::DEFAULT_PROTOCOL_VERSION;

/// Fewest fields a handshake line can have (certificate omitted)
pub const MIN_FIELDS: usize = 5;

/// Handshake decoding errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    /// Fewer than five `|`-separated fields
    #[error("handshake line has {found} fields, expected at least {MIN_FIELDS}")]
    TooFewFields {
        /// Number of fields found
        found: usize,
    },

    /// A version field is not an unsigned integer
    #[error("invalid {field} protocol version {value:?}")]
    InvalidVersion {
        /// Which version field
        field: &'static str,
        /// Raw field content
        value: String,
    },

    /// Network type other than `tcp` or `unix`
    #[error("unsupported network type {0:?}")]
    UnsupportedNetwork(String),

    /// RPC protocol other than `grpc` or `netrpc`
    #[error("unsupported rpc protocol {0:?}")]
    UnsupportedProtocol(String),

    /// Empty network address
    #[error("handshake line has an empty network address")]
    EmptyAddress,

    /// Certificate field is not valid base64
    #[error("server certificate is not valid base64: {0}")]
    InvalidCertificate(String),
}

/// Network the plugin listens on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkType {
    /// TCP socket, address is `host:port`
    Tcp,
    /// Unix domain socket, address is a filesystem path
    Unix,
}

impl NetworkType {
    /// Wire spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Unix => "unix",
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkType {
    type Err = HandshakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "unix" => Ok(Self::Unix),
            other => Err(HandshakeError::UnsupportedNetwork(other.to_string())),
        }
    }
}

/// RPC protocol the plugin speaks
///
/// `netrpc` is recognised so the launcher can report a precise mismatch;
/// only `grpc` can actually be served or dialled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcType {
    /// gRPC over HTTP/2
    Grpc,
    /// Legacy Go net/rpc
    NetRpc,
}

impl RpcType {
    /// Wire spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Grpc => "grpc",
            Self::NetRpc => "netrpc",
        }
    }
}

impl fmt::Display for RpcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RpcType {
    type Err = HandshakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grpc" => Ok(Self::Grpc),
            "netrpc" => Ok(Self::NetRpc),
            other => Err(HandshakeError::UnsupportedProtocol(other.to_string())),
        }
    }
}

/// The single line a plugin emits to announce how to reach it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeLine {
    /// Version of the handshake format
    pub core_protocol_version: u32,
    /// Negotiated application protocol version
    pub app_protocol_version: u32,
    /// Listener network
    pub network_type: NetworkType,
    /// Listener address
    pub network_address: String,
    /// RPC protocol
    pub rpc_type: RpcType,
    /// Server certificate, unpadded base64 of DER (secure mode only)
    pub server_cert_b64: Option<String>,
}

impl HandshakeLine {
    /// Encode the line, including the trailing newline
    pub fn encode(&self) -> String {
        let mut line = format!(
            "{}|{}|{}|{}|{}",
            self.core_protocol_version,
            self.app_protocol_version,
            self.network_type,
            self.network_address,
            self.rpc_type
        );
        if let Some(cert) = &self.server_cert_b64 {
            line.push('|');
            line.push_str(cert);
        }
        line.push('\n');
        line
    }

    /// Decode a handshake line (surrounding whitespace is ignored)
    pub fn decode(line: &str) -> Result<Self, HandshakeError> {
        let fields: Vec<&str> = line.trim().split('|').collect();
        if fields.len() < MIN_FIELDS {
            return Err(HandshakeError::TooFewFields {
                found: fields.len(),
            });
        }

        let parse_version = |field: &'static str, value: &str| {
            value.parse::<u32>().map_err(|_| HandshakeError::InvalidVersion {
                field,
                value: value.to_string(),
            })
        };

        let core_protocol_version = parse_version("core", fields[0])?;
        let app_protocol_version = parse_version("app", fields[1])?;
        let network_type = fields[2].parse::<NetworkType>()?;
        let network_address = fields[3].to_string();
        if network_address.is_empty() {
            return Err(HandshakeError::EmptyAddress);
        }
        let rpc_type = fields[4].parse::<RpcType>()?;

        // Anything past the certificate is reserved and ignored
        let server_cert_b64 = fields
            .get(5)
            .filter(|cert| !cert.is_empty())
            .map(|cert| cert.to_string());

        Ok(Self {
            core_protocol_version,
            app_protocol_version,
            network_type,
            network_address,
            rpc_type,
            server_cert_b64,
        })
    }

    /// Attach a DER certificate, encoded the way the handshake expects
    pub fn with_server_certificate(mut self, der: &[u8]) -> Self {
        self.server_cert_b64 = Some(encode_certificate(der));
        self
    }

    /// Decode the server certificate to DER, if one was announced
    pub fn server_certificate_der(&self) -> Result<Option<Vec<u8>>, HandshakeError> {
        self.server_cert_b64
            .as_deref()
            .map(decode_certificate)
            .transpose()
    }

    /// Address in `network:address` form, for logging
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.network_type, self.network_address)
    }
}

impl fmt::Display for HandshakeLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode().trim_end())
    }
}

/// Base64 a DER certificate without `=` padding
pub fn encode_certificate(der: &[u8]) -> String {
    STANDARD.encode(der).trim_end_matches('=').to_string()
}

/// Decode an unpadded base64 certificate, re-adding padding first
pub fn decode_certificate(encoded: &str) -> Result<Vec<u8>, HandshakeError> {
    let mut padded = encoded.trim().to_string();
    let missing = (4 - padded.len() % 4) % 4;
    padded.extend(std::iter::repeat('=').take(missing));
    STANDARD
        .decode(padded.as_bytes())
        .map_err(|e| HandshakeError::InvalidCertificate(e.to_string()))
}

/// Pick the application protocol version from the host's announcement
///
/// The announcement is a space separated list of integers. The highest
/// entry that parses wins; an empty or entirely non-numeric list falls back
/// to [`DEFAULT_PROTOCOL_VERSION`].
pub fn negotiate_protocol_version(announced: Option<&str>) -> u32 {
    announced
        .unwrap_or("")
        .split_whitespace()
        .filter_map(|v| v.parse::<u32>().ok())
        .max()
        .unwrap_or(DEFAULT_PROTOCOL_VERSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn insecure_line() -> HandshakeLine {
        HandshakeLine {
            core_protocol_version: 1,
            app_protocol_version: 5,
            network_type: NetworkType::Tcp,
            network_address: "127.0.0.1:54321".to_string(),
            rpc_type: RpcType::Grpc,
            server_cert_b64: None,
        }
    }

    #[test]
    fn decodes_insecure_handshake() {
        let line = HandshakeLine::decode("1|5|tcp|127.0.0.1:54321|grpc\n").unwrap();
        assert_eq!(line, insecure_line());
        assert_eq!(line.endpoint(), "tcp:127.0.0.1:54321");
    }

    #[test]
    fn encodes_fields_in_order_with_newline() {
        assert_eq!(insecure_line().encode(), "1|5|tcp|127.0.0.1:54321|grpc\n");
        assert_eq!(insecure_line().to_string(), "1|5|tcp|127.0.0.1:54321|grpc");
    }

    #[rstest]
    #[case::insecure(insecure_line())]
    #[case::with_cert(insecure_line().with_server_certificate(&[0x30, 0x82, 0x01, 0x0a, 0xff]))]
    #[case::unix(HandshakeLine {
        network_type: NetworkType::Unix,
        network_address: "/tmp/plugin123.sock".to_string(),
        ..insecure_line()
    })]
    #[case::netrpc(HandshakeLine { rpc_type: RpcType::NetRpc, ..insecure_line() })]
    fn round_trips(#[case] line: HandshakeLine) {
        assert_eq!(HandshakeLine::decode(&line.encode()).unwrap(), line);
    }

    #[rstest]
    #[case::empty("", 1)]
    #[case::one("1", 1)]
    #[case::four("1|5|tcp|127.0.0.1:1234", 4)]
    fn rejects_short_lines(#[case] line: &str, #[case] found: usize) {
        assert_eq!(
            HandshakeLine::decode(line),
            Err(HandshakeError::TooFewFields { found })
        );
    }

    #[test]
    fn rejects_non_numeric_versions() {
        let err = HandshakeLine::decode("one|5|tcp|127.0.0.1:1|grpc").unwrap_err();
        assert!(matches!(err, HandshakeError::InvalidVersion { field: "core", .. }));

        let err = HandshakeLine::decode("1|five|tcp|127.0.0.1:1|grpc").unwrap_err();
        assert!(matches!(err, HandshakeError::InvalidVersion { field: "app", .. }));
    }

    #[test]
    fn rejects_unknown_network_and_protocol() {
        assert_eq!(
            HandshakeLine::decode("1|5|udp|127.0.0.1:1|grpc"),
            Err(HandshakeError::UnsupportedNetwork("udp".to_string()))
        );
        assert_eq!(
            HandshakeLine::decode("1|5|tcp|127.0.0.1:1|http"),
            Err(HandshakeError::UnsupportedProtocol("http".to_string()))
        );
    }

    #[test]
    fn rejects_empty_address() {
        assert_eq!(
            HandshakeLine::decode("1|5|tcp||grpc"),
            Err(HandshakeError::EmptyAddress)
        );
    }

    #[test]
    fn empty_certificate_field_means_no_certificate() {
        let line = HandshakeLine::decode("1|5|tcp|127.0.0.1:1|grpc|").unwrap();
        assert_eq!(line.server_cert_b64, None);
        assert_eq!(line.server_certificate_der().unwrap(), None);
    }

    #[test]
    fn extra_fields_are_ignored() {
        let line = HandshakeLine::decode("1|5|tcp|127.0.0.1:1|grpc|AAEC|future").unwrap();
        assert_eq!(line.server_cert_b64.as_deref(), Some("AAEC"));
    }

    #[rstest]
    #[case::len_mod_0(vec![1, 2, 3])]
    #[case::len_mod_1(vec![1, 2, 3, 4])]
    #[case::len_mod_2(vec![1, 2, 3, 4, 5])]
    #[case::empty(vec![])]
    fn certificate_padding_is_repaired(#[case] der: Vec<u8>) {
        let encoded = encode_certificate(&der);
        assert!(!encoded.contains('='));
        assert_eq!(decode_certificate(&encoded).unwrap(), der);
    }

    #[test]
    fn real_certificate_survives_the_handshake() {
        let identity = crate::pki::EphemeralIdentity::generate().unwrap();
        let line = insecure_line().with_server_certificate(identity.certificate_der());

        let decoded = HandshakeLine::decode(&line.encode()).unwrap();
        let der = decoded.server_certificate_der().unwrap().unwrap();
        assert_eq!(der, identity.certificate_der());
    }

    #[test]
    fn garbage_certificate_is_rejected() {
        let line = HandshakeLine::decode("1|5|tcp|127.0.0.1:1|grpc|!!not-base64!!").unwrap();
        assert!(matches!(
            line.server_certificate_der(),
            Err(HandshakeError::InvalidCertificate(_))
        ));
    }

    #[rstest]
    #[case::absent(None, 5)]
    #[case::empty(Some(""), 5)]
    #[case::single(Some("5"), 5)]
    #[case::highest_wins(Some("4 5 6"), 6)]
    #[case::numeric_not_lexical(Some("9 10"), 10)]
    #[case::unordered(Some("6 4 5"), 6)]
    #[case::skips_garbage(Some("x 4 beta"), 4)]
    #[case::all_garbage(Some("a b c"), 5)]
    #[case::extra_whitespace(Some("  3   7 "), 7)]
    fn negotiates_protocol_version(#[case] announced: Option<&str>, #[case] expected: u32) {
        assert_eq!(negotiate_protocol_version(announced), expected);
    }
}
