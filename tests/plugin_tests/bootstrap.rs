//! Stories about starting a plugin

use std::process::Command;

use tfplugin::plugin::{LaunchError, PluginClient};
use tfplugin::MAGIC_COOKIE_KEY;

use super::helpers::{example_provider, EXAMPLE_PROVIDER, GRACE};

/// Story: someone runs the plugin binary by hand. It explains itself and
/// exits with the bootstrap failure code instead of listening.
#[test]
fn story_plugin_refuses_to_run_by_hand() {
    let output = Command::new(EXAMPLE_PROVIDER)
        .env_remove(MAGIC_COOKIE_KEY)
        .output()
        .expect("binary runs");

    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty(), "no handshake may be printed");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("This binary is a plugin"), "{}", stderr);
}

/// Story: the host asks for a protocol version and the plugin echoes it in
/// its handshake.
#[tokio::test]
async fn story_requested_version_is_negotiated() {
    let client = PluginClient::launch(example_provider().protocol_version(6))
        .await
        .expect("launch");
    assert_eq!(client.handshake().app_protocol_version, 6);
    client.shutdown(GRACE).await.unwrap();
}

/// Story: the plugin is forced into mutual TLS but the host sent no
/// certificate. It exits before announcing anything.
#[tokio::test]
async fn story_plugin_without_client_certificate_exits_before_handshake() {
    let config = example_provider().env("TFPLUGIN_SECURITY", "mutual");

    match PluginClient::launch(config).await {
        Err(LaunchError::EmptyHandshake) => {}
        Err(other) => panic!("expected an empty handshake, got {}", other),
        Ok(_) => panic!("plugin should not have started"),
    }
}
