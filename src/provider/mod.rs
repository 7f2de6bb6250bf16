//! Provider abstraction
//!
//! A provider describes its configuration, managed resources and data
//! sources through a [`ProviderSchema`] and implements the [`Provider`]
//! trait over decoded [`Value`]s. The gRPC adapter in [`grpc`] takes care of
//! the wire: decoding `DynamicValue`s against the schema, turning failures
//! into diagnostics and refusing work once shutdown has been requested.
//!
//! # Example
//!
//! ```text
//! let shutdown = ShutdownHandle::new();
//! let service = GrpcProvider::new(ExampleProvider::new(), shutdown).into_service();
//! Server::builder().add_service(service).serve(addr).await?;
//! ```

pub mod example;
pub mod grpc;

pub use example::ExampleProvider;
pub use grpc::GrpcProvider;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use thiserror::Error;

use crate::diagnostics::{AttributePath, Diagnostic};
use crate::schema::ProviderSchema;
use crate::value::Value;

/// Errors returned by provider implementations
///
/// These never fail the RPC; the adapter reports them as error diagnostics.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The operation failed
    #[error("{summary}")]
    Failed {
        /// One-line summary
        summary: String,
        /// Longer explanation
        detail: String,
        /// Attribute the failure refers to
        attribute: Option<AttributePath>,
    },

    /// An operation that needs configuration ran before `Configure`
    #[error("provider is not configured")]
    NotConfigured,

    /// The resource type does not support the operation
    #[error("{type_name} does not support {operation}")]
    Unsupported {
        /// Operation name
        operation: &'static str,
        /// Resource or data source type
        type_name: String,
    },
}

impl ProviderError {
    /// Create a failure with summary and detail
    pub fn failed(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Failed {
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(operation: &'static str, type_name: impl Into<String>) -> Self {
        Self::Unsupported {
            operation,
            type_name: type_name.into(),
        }
    }

    /// Point a failure at an attribute
    pub fn at(self, path: AttributePath) -> Self {
        match self {
            Self::Failed {
                summary, detail, ..
            } => Self::Failed {
                summary,
                detail,
                attribute: Some(path),
            },
            other => other,
        }
    }

    /// Convert to an error diagnostic
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            Self::Failed {
                summary,
                detail,
                attribute,
            } => {
                let diag = Diagnostic::error(summary.clone(), detail.clone());
                match attribute {
                    Some(path) => diag.with_attribute(path.clone()),
                    None => diag,
                }
            }
            Self::NotConfigured => Diagnostic::error(
                "Provider not configured",
                "The provider must be configured before this operation.",
            ),
            Self::Unsupported { .. } => Diagnostic::error("Unsupported operation", self.to_string()),
        }
    }
}

/// Stored state to bring up to the current schema version
#[derive(Debug, Clone, PartialEq)]
pub struct UpgradeRequest {
    /// Resource type
    pub type_name: String,
    /// Schema version the state was written with
    pub version: i64,
    /// Stored state exactly as that version wrote it
    pub state: serde_json::Value,
}

/// Input to planning a resource change
#[derive(Debug, Clone, PartialEq)]
pub struct PlanRequest {
    /// Resource type
    pub type_name: String,
    /// State before the change (null on create)
    pub prior_state: Value,
    /// Configuration merged over the prior state (null on destroy)
    pub proposed_new_state: Value,
    /// Configuration as written
    pub config: Value,
    /// Opaque data stored with the prior state
    pub prior_private: Vec<u8>,
}

/// A planned resource change
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlannedChange {
    /// State expected after apply; unknown where only apply can tell
    pub planned_state: Value,
    /// Attributes whose change forces replacement
    pub requires_replace: Vec<AttributePath>,
    /// Opaque data for apply; `None` carries the prior private data forward
    pub planned_private: Option<Vec<u8>>,
    /// Warnings to surface alongside the plan
    pub diagnostics: Vec<Diagnostic>,
}

impl PlannedChange {
    /// Plan to reach `planned_state`
    pub fn new(planned_state: Value) -> Self {
        Self {
            planned_state,
            ..Self::default()
        }
    }

    /// Mark an attribute as forcing replacement
    pub fn requires_replace(mut self, path: AttributePath) -> Self {
        self.requires_replace.push(path);
        self
    }

    /// Replace the private data handed to apply
    pub fn with_private(mut self, private: Vec<u8>) -> Self {
        self.planned_private = Some(private);
        self
    }

    /// Attach a diagnostic
    pub fn with_diagnostic(mut self, diagnostic: Diagnostic) -> Self {
        self.diagnostics.push(diagnostic);
        self
    }
}

/// Input to applying a planned change
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyRequest {
    /// Resource type
    pub type_name: String,
    /// State before the change
    pub prior_state: Value,
    /// State produced by planning (null on destroy)
    pub planned_state: Value,
    /// Configuration as written
    pub config: Value,
    /// Opaque data returned by planning
    pub planned_private: Vec<u8>,
}

/// Result of applying a change
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppliedChange {
    /// State after the change, fully known
    pub new_state: Value,
    /// Opaque data to store; `None` keeps the planned private data
    pub private: Option<Vec<u8>>,
    /// Warnings to surface alongside the result
    pub diagnostics: Vec<Diagnostic>,
}

impl AppliedChange {
    /// Applied change ending in `new_state`
    pub fn new(new_state: Value) -> Self {
        Self {
            new_state,
            ..Self::default()
        }
    }
}

/// A resource produced by importing an existing object
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedResource {
    /// Resource type of the imported object
    pub type_name: String,
    /// State of the imported object
    pub state: Value,
    /// Opaque data to store with the state
    pub private: Vec<u8>,
}

/// A provider plugin implementation
///
/// Values arrive already decoded against the matching schema, and results
/// are encoded against it on the way out. Type names have been checked
/// against the schema before any method receiving one is called.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    /// Everything the provider exposes; called once and cached
    fn schema(&self) -> ProviderSchema;

    /// Normalize provider configuration before validation
    async fn prepare_provider_config(&self, config: Value) -> Result<Value, ProviderError>;

    /// Configure the provider; called once before resource operations
    async fn configure(&self, terraform_version: &str, config: Value) -> Result<(), ProviderError>;

    /// Provider-specific checks on resource configuration
    async fn validate_resource_config(&self, type_name: &str, config: &Value) -> Vec<Diagnostic>;

    /// Provider-specific checks on data source configuration
    async fn validate_data_source_config(&self, type_name: &str, config: &Value)
        -> Vec<Diagnostic>;

    /// Bring stored state up to the current schema version
    ///
    /// The result is decoded against the current schema; attributes it no
    /// longer declares are dropped.
    async fn upgrade_resource_state(
        &self,
        request: UpgradeRequest,
    ) -> Result<serde_json::Value, ProviderError>;

    /// Refresh state; null means the object no longer exists
    async fn read_resource(&self, type_name: &str, current_state: Value)
        -> Result<Value, ProviderError>;

    /// Plan a create, update or destroy
    async fn plan_resource_change(&self, request: PlanRequest)
        -> Result<PlannedChange, ProviderError>;

    /// Carry out a planned change
    async fn apply_resource_change(&self, request: ApplyRequest)
        -> Result<AppliedChange, ProviderError>;

    /// Adopt an existing object by id
    async fn import_resource_state(
        &self,
        type_name: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError>;

    /// Read a data source
    async fn read_data_source(&self, type_name: &str, config: Value) -> Result<Value, ProviderError>;

    /// Abort in-flight work ahead of shutdown
    async fn stop(&self) -> Result<(), ProviderError>;
}
