//! Shared helpers for plugin integration tests

use std::time::Duration;

use tfplugin::config::LaunchConfig;
use tfplugin::proto;
use tfplugin::schema::Block;

/// Path of the example provider built alongside the tests
pub const EXAMPLE_PROVIDER: &str = env!("CARGO_BIN_EXE_example-provider");

/// Resource and data source type the example provider declares
pub const EXAMPLE_TYPE: &str = "example_example";

/// Time the plugin gets to exit after Stop
pub const GRACE: Duration = Duration::from_secs(5);

/// Launch configuration for the example provider
pub fn example_provider() -> LaunchConfig {
    LaunchConfig::new(EXAMPLE_PROVIDER).env("TFPLUGIN_LOG_FORMAT", "text")
}

/// A JSON encoded dynamic value
pub fn json(raw: &str) -> Option<proto::DynamicValue> {
    Some(proto::DynamicValue {
        msgpack: Vec::new(),
        json: raw.as_bytes().to_vec(),
    })
}

/// The resource block from a schema response
pub fn resource_block(schema: &proto::get_provider_schema::Response) -> Block {
    let wire = schema.resource_schemas[EXAMPLE_TYPE]
        .block
        .clone()
        .expect("resource schema has a block");
    Block::try_from(wire).expect("resource block decodes")
}
