//! Example provider used to exercise the protocol end to end
//!
//! Declares one resource and one data source, both named `example_example`.
//! The resource derives `output` from `input`; the data source additionally
//! fills computed attributes of every type and nested blocks of every
//! nesting mode, so a host can check its decoder against all shapes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{debug, info};

use super::{
    AppliedChange, ApplyRequest, ImportedResource, PlanRequest, PlannedChange, Provider,
    ProviderError, UpgradeRequest,
};
use crate::diagnostics::{AttributePath, Diagnostic};
use crate::schema::{Attribute, AttributeType, Block, NestedBlock, NestingMode, ProviderSchema, Schema};
use crate::value::Value;

/// Resource and data source type name
pub const EXAMPLE_TYPE: &str = "example_example";

const OUTPUT_PREFIX: &str = "outputted: ";

fn resource_block() -> Block {
    Block::new()
        .attribute(
            Attribute::required("input", AttributeType::String)
                .description("Value the output is derived from"),
        )
        .attribute(Attribute::computed("output", AttributeType::String))
}

fn nested(nesting: NestingMode) -> NestedBlock {
    let name = format!("{:?}_block", nesting).to_lowercase();
    NestedBlock::new(
        name,
        nesting,
        Block::new().attribute(Attribute::optional_computed("value", AttributeType::String)),
    )
}

fn data_source_block() -> Block {
    [
        NestingMode::Single,
        NestingMode::List,
        NestingMode::Set,
        NestingMode::Map,
        NestingMode::Group,
    ]
    .into_iter()
    .fold(resource_block(), |block, mode| block.block_type(nested(mode)))
    .attribute(Attribute::computed("number", AttributeType::Number))
    .attribute(Attribute::computed("float", AttributeType::Number))
    .attribute(Attribute::computed("flag", AttributeType::Bool))
    .attribute(Attribute::computed("tags", AttributeType::map(AttributeType::String)))
    .attribute(Attribute::computed("items", AttributeType::list(AttributeType::String)))
    .attribute(Attribute::computed("labels", AttributeType::set(AttributeType::String)))
}

/// Derive `output` from `input`; unknown input plans an unknown output
fn with_output(mut fields: BTreeMap<String, Value>) -> Value {
    let output = match fields.get("input") {
        Some(Value::String(input)) => Value::String(format!("{}{}", OUTPUT_PREFIX, input)),
        Some(Value::Unknown) => Value::Unknown,
        _ => Value::Null,
    };
    fields.insert("output".to_string(), output);
    Value::Object(fields)
}

fn into_fields(value: Value) -> BTreeMap<String, Value> {
    match value {
        Value::Object(fields) => fields,
        _ => BTreeMap::new(),
    }
}

fn nested_value(label: &str) -> Value {
    Value::object([("value", Value::from(label))])
}

/// The example provider
#[derive(Debug, Default)]
pub struct ExampleProvider;

impl ExampleProvider {
    /// Create the provider
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Provider for ExampleProvider {
    fn schema(&self) -> ProviderSchema {
        ProviderSchema::new(Schema::new(Block::new()))
            .resource(EXAMPLE_TYPE, Schema::new(resource_block()))
            .data_source(EXAMPLE_TYPE, Schema::new(data_source_block()))
    }

    async fn prepare_provider_config(&self, config: Value) -> Result<Value, ProviderError> {
        Ok(config)
    }

    async fn configure(&self, terraform_version: &str, _config: Value) -> Result<(), ProviderError> {
        info!(terraform_version, "example provider configured");
        Ok(())
    }

    async fn validate_resource_config(&self, _type_name: &str, config: &Value) -> Vec<Diagnostic> {
        match config.get("input").and_then(Value::as_str) {
            Some("") => vec![Diagnostic::error(
                "Invalid input",
                "input must not be empty",
            )
            .with_attribute(AttributePath::attribute_root("input"))],
            _ => Vec::new(),
        }
    }

    async fn validate_data_source_config(
        &self,
        type_name: &str,
        config: &Value,
    ) -> Vec<Diagnostic> {
        self.validate_resource_config(type_name, config).await
    }

    async fn upgrade_resource_state(
        &self,
        request: UpgradeRequest,
    ) -> Result<serde_json::Value, ProviderError> {
        debug!(version = request.version, "state kept as is");
        Ok(request.state)
    }

    async fn read_resource(
        &self,
        _type_name: &str,
        current_state: Value,
    ) -> Result<Value, ProviderError> {
        if current_state.is_null() {
            return Ok(Value::Null);
        }
        Ok(with_output(into_fields(current_state)))
    }

    async fn plan_resource_change(
        &self,
        request: PlanRequest,
    ) -> Result<PlannedChange, ProviderError> {
        if request.proposed_new_state.is_null() {
            return Ok(PlannedChange::new(Value::Null));
        }

        let mut fields = into_fields(request.prior_state);
        for (name, value) in into_fields(request.proposed_new_state) {
            if !value.is_null() || !fields.contains_key(&name) {
                fields.insert(name, value);
            }
        }
        Ok(PlannedChange::new(with_output(fields)))
    }

    async fn apply_resource_change(
        &self,
        request: ApplyRequest,
    ) -> Result<AppliedChange, ProviderError> {
        if request.planned_state.is_null() {
            debug!("destroying");
            return Ok(AppliedChange::new(Value::Null));
        }
        Ok(AppliedChange::new(with_output(into_fields(
            request.planned_state,
        ))))
    }

    async fn import_resource_state(
        &self,
        type_name: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let state = with_output(BTreeMap::from([("input".to_string(), Value::from(id))]));
        Ok(vec![ImportedResource {
            type_name: type_name.to_string(),
            state,
            private: Vec::new(),
        }])
    }

    async fn read_data_source(&self, _type_name: &str, config: Value) -> Result<Value, ProviderError> {
        let mut fields = into_fields(with_output(into_fields(config)));

        fields.insert("number".to_string(), Value::from(42));
        fields.insert("float".to_string(), Value::from(1.5));
        fields.insert("flag".to_string(), Value::from(true));
        fields.insert(
            "tags".to_string(),
            Value::Map(BTreeMap::from([("env".to_string(), Value::from("test"))])),
        );
        fields.insert(
            "items".to_string(),
            Value::List(vec![Value::from("a"), Value::from("b")]),
        );
        fields.insert("labels".to_string(), Value::Set(vec![Value::from("x")]));

        fields.insert("single_block".to_string(), nested_value("single"));
        fields.insert(
            "list_block".to_string(),
            Value::List(vec![nested_value("list-0"), nested_value("list-1")]),
        );
        fields.insert("set_block".to_string(), Value::Set(vec![nested_value("set")]));
        fields.insert(
            "map_block".to_string(),
            Value::Map(BTreeMap::from([("key".to_string(), nested_value("map"))])),
        );
        fields.insert("group_block".to_string(), nested_value("group"));

        Ok(Value::Object(fields))
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        info!("example provider stopping");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::msgpack;

    fn plan(prior: Value, proposed: Value) -> PlanRequest {
        PlanRequest {
            type_name: EXAMPLE_TYPE.to_string(),
            prior_state: prior,
            config: proposed.clone(),
            proposed_new_state: proposed,
            prior_private: Vec::new(),
        }
    }

    #[tokio::test]
    async fn create_plans_output_from_input() {
        let change = ExampleProvider::new()
            .plan_resource_change(plan(
                Value::Null,
                Value::object([("input", Value::from("x")), ("output", Value::Null)]),
            ))
            .await
            .unwrap();

        assert_eq!(
            change.planned_state,
            Value::object([
                ("input", Value::from("x")),
                ("output", Value::from("outputted: x")),
            ])
        );
        assert_eq!(change.planned_private, None);
    }

    #[tokio::test]
    async fn unknown_input_plans_unknown_output() {
        let change = ExampleProvider::new()
            .plan_resource_change(plan(
                Value::Null,
                Value::object([("input", Value::Unknown)]),
            ))
            .await
            .unwrap();

        assert_eq!(change.planned_state.get("output"), Some(&Value::Unknown));
    }

    #[tokio::test]
    async fn null_proposal_plans_destroy_and_apply_destroys() {
        let provider = ExampleProvider::new();
        let prior = Value::object([
            ("input", Value::from("x")),
            ("output", Value::from("outputted: x")),
        ]);

        let change = provider
            .plan_resource_change(plan(prior.clone(), Value::Null))
            .await
            .unwrap();
        assert!(change.planned_state.is_null());

        let applied = provider
            .apply_resource_change(ApplyRequest {
                type_name: EXAMPLE_TYPE.to_string(),
                prior_state: prior,
                planned_state: Value::Null,
                config: Value::Null,
                planned_private: Vec::new(),
            })
            .await
            .unwrap();
        assert!(applied.new_state.is_null());
    }

    #[tokio::test]
    async fn empty_input_fails_validation() {
        let diags = ExampleProvider::new()
            .validate_resource_config(EXAMPLE_TYPE, &Value::object([("input", Value::from(""))]))
            .await;

        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].attribute, Some(AttributePath::attribute_root("input")));
    }

    #[tokio::test]
    async fn import_derives_state_from_id() {
        let imported = ExampleProvider::new()
            .import_resource_state(EXAMPLE_TYPE, "abc")
            .await
            .unwrap();

        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].state.get("output"), Some(&Value::from("outputted: abc")));
    }

    /// Everything the data source returns must encode against its own schema
    #[tokio::test]
    async fn data_source_state_matches_its_schema() {
        let provider = ExampleProvider::new();
        let schema = provider.schema();
        let block = &schema.data_source_schemas[EXAMPLE_TYPE].block;

        let state = provider
            .read_data_source(EXAMPLE_TYPE, Value::object([("input", Value::from("x"))]))
            .await
            .unwrap();

        let encoded = msgpack::encode_block(&state, block).unwrap();
        let decoded = msgpack::decode_block(&encoded, block).unwrap();
        assert_eq!(decoded.get("output"), Some(&Value::from("outputted: x")));
        assert_eq!(decoded.get("number"), Some(&Value::from(42)));
        assert_eq!(decoded.get("float"), Some(&Value::from(1.5)));
        assert_eq!(block.block_types.len(), 5);
        for nested in &block.block_types {
            assert!(
                !decoded.get(&nested.type_name).unwrap_or(&Value::Null).is_null(),
                "{} should be filled",
                nested.type_name
            );
        }
    }
}
