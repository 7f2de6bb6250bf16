//! Stories about securing the channel

use tfplugin::pki::{unix_now, verify_self_signed};
use tfplugin::plugin::{LaunchError, PluginClient};
use tfplugin::proto;
use tfplugin::transport::TransportError;

use super::helpers::{example_provider, EXAMPLE_TYPE, GRACE};

/// Story: a secure host hands the plugin its certificate; the plugin
/// announces its own, and each side trusts exactly the other.
#[tokio::test]
async fn story_mutual_tls_with_ephemeral_certificates() {
    let client = PluginClient::launch(example_provider().secure(true))
        .await
        .expect("secure launch");

    let der = client
        .handshake()
        .server_certificate_der()
        .unwrap()
        .expect("secure plugin announces a certificate");
    let check = verify_self_signed(&der, unix_now()).expect("certificate parses");
    assert!(check.valid, "{:?}", check.reason);

    let schema = client
        .provider()
        .get_schema(proto::get_provider_schema::Request {})
        .await
        .expect("schema over mutual TLS")
        .into_inner();
    assert!(schema.resource_schemas.contains_key(EXAMPLE_TYPE));

    let status = client.shutdown(GRACE).await.unwrap();
    assert!(status.success());
}

/// Story: an operator opts into server-only TLS; the host verifies the
/// plugin without presenting a certificate of its own.
#[tokio::test]
async fn story_server_auth_only_is_an_explicit_opt_in() {
    let config = example_provider().env("TFPLUGIN_SECURITY", "server-auth-only");
    let client = PluginClient::launch(config).await.expect("launch");
    assert!(client.handshake().server_cert_b64.is_some());

    client
        .provider()
        .get_schema(proto::get_provider_schema::Request {})
        .await
        .expect("schema over server-authenticated TLS");

    client.shutdown(GRACE).await.unwrap();
}

/// Story: a host that asked for TLS never falls back to plaintext when the
/// plugin was forced insecure.
#[tokio::test]
async fn story_secure_host_refuses_plaintext_plugin() {
    let config = example_provider()
        .secure(true)
        .env("TFPLUGIN_SECURITY", "insecure");

    match PluginClient::launch(config).await {
        Err(LaunchError::Transport(TransportError::MissingServerCertificate)) => {}
        Err(other) => panic!("expected missing server certificate, got {}", other),
        Ok(_) => panic!("a secure host must not connect in plaintext"),
    }
}
