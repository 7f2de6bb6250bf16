//! Stories about a host driving an insecure plugin

use tfplugin::plugin::PluginClient;
use tfplugin::proto;
use tfplugin::value::{decode_dynamic, Value};

use super::helpers::{example_provider, json, resource_block, EXAMPLE_TYPE, GRACE};

/// Story: a host without TLS launches the plugin, reads its schema, plans a
/// create and stops it cleanly.
#[tokio::test]
async fn story_insecure_plugin_plans_and_stops() {
    let client = PluginClient::launch(example_provider())
        .await
        .expect("plugin should launch");

    let handshake = client.handshake();
    assert_eq!(handshake.core_protocol_version, 1);
    assert_eq!(handshake.app_protocol_version, 5);
    assert!(handshake.network_address.starts_with("127.0.0.1:"));
    assert_eq!(handshake.server_cert_b64, None);

    let mut provider = client.provider();
    let schema = provider
        .get_schema(proto::get_provider_schema::Request {})
        .await
        .expect("schema")
        .into_inner();
    assert!(schema.resource_schemas.contains_key(EXAMPLE_TYPE));
    assert!(schema.data_source_schemas.contains_key(EXAMPLE_TYPE));
    let block = resource_block(&schema);

    let planned = provider
        .plan_resource_change(proto::plan_resource_change::Request {
            type_name: EXAMPLE_TYPE.to_string(),
            prior_state: json("{}"),
            proposed_new_state: json(r#"{"input":"x"}"#),
            config: json(r#"{"input":"x"}"#),
            prior_private: Vec::new(),
        })
        .await
        .expect("plan")
        .into_inner();
    assert!(planned.diagnostics.is_empty(), "{:?}", planned.diagnostics);
    assert_eq!(
        decode_dynamic(planned.planned_state.as_ref(), &block).unwrap(),
        Value::object([
            ("input", Value::from("x")),
            ("output", Value::from("outputted: x")),
        ])
    );

    let status = client.shutdown(GRACE).await.expect("plugin should exit");
    assert!(status.success(), "plugin exited with {}", status);
}

/// Story: a host asks about a resource type the plugin never declared and
/// gets a diagnostic, not a broken connection.
#[tokio::test]
async fn story_undeclared_type_is_diagnosed() {
    let client = PluginClient::launch(example_provider()).await.unwrap();
    let mut provider = client.provider();

    let response = provider
        .read_resource(proto::read_resource::Request {
            type_name: "example_missing".to_string(),
            current_state: json(r#"{"input":"x"}"#),
        })
        .await
        .expect("the call itself succeeds")
        .into_inner();
    assert_eq!(response.diagnostics.len(), 1);
    assert!(response.diagnostics[0].detail.contains("example_missing"));

    // The channel is still usable afterwards
    provider
        .get_schema(proto::get_provider_schema::Request {})
        .await
        .expect("schema after a rejected call");

    client.shutdown(GRACE).await.unwrap();
}

/// Story: after Stop the plugin accepts no further calls and exits.
#[tokio::test]
async fn story_stop_ends_the_plugin() {
    let client = PluginClient::launch(example_provider()).await.unwrap();
    let mut provider = client.provider();

    let stopped = provider
        .stop(proto::stop::Request {})
        .await
        .expect("stop")
        .into_inner();
    assert_eq!(stopped.error, "");

    let refused = provider
        .get_schema(proto::get_provider_schema::Request {})
        .await;
    assert!(refused.is_err(), "calls after Stop must fail");

    let status = client.shutdown(GRACE).await.unwrap();
    assert!(status.success());
}
