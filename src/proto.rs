//! gRPC protocol definitions for the provider plugin contract
//!
//! This module contains the generated Protobuf and gRPC code for protocol
//! version 5.1 of the provider plugin interface.
//!
//! # Protocol Overview
//!
//! The orchestrator spawns the plugin, reads its handshake line and then
//! drives it with unary calls only (no streaming):
//!
//! - `GetSchema` is called once, early, and its result cached by the caller
//! - `PrepareProviderConfig` / `Configure` set the provider up
//! - `ValidateResourceTypeConfig`, `UpgradeResourceState`, `ReadResource`,
//!   `PlanResourceChange`, `ApplyResourceChange` drive a managed resource
//! - `ValidateDataSourceConfig` / `ReadDataSource` drive a data source
//! - `Stop` requests a graceful shutdown
//!
//! # Example
//!
//! ```ignore
//! use tfplugin::proto::provider_client::ProviderClient;
//! use tfplugin::proto::get_provider_schema;
//!
//! let mut client = ProviderClient::new(channel);
//! let schema = client
//!     .get_schema(get_provider_schema::Request {})
//!     .await?
//!     .into_inner();
//! ```

#![allow(missing_docs)] // Generated code doesn't have docs
#![allow(clippy::doc_overindented_list_items)] // Generated proto docs have formatting issues
#![allow(clippy::large_enum_variant)]

/// Generated protobuf and gRPC code for the provider protocol
pub mod tfplugin5 {
    tonic::include_proto!("tfplugin5");
}

// Re-export commonly used types at the module level for convenience
pub use tfplugin5::*;
