//! gRPC adapter from [`Provider`] to the tfplugin5 service
//!
//! Every handler follows the same shape: look the `type_name` up in the
//! schema cached at construction, decode the payloads against it, call the
//! provider and encode the result. Anything that goes wrong along the way
//! becomes a diagnostic in an otherwise successful response. Only a
//! shutdown in progress fails the RPC itself, with `UNAVAILABLE`.

use std::sync::Arc;

use tonic::{Request, Response, Status};
use tracing::{debug, info, instrument, warn};

use super::{ApplyRequest, PlanRequest, Provider, ProviderError, UpgradeRequest};
use crate::diagnostics::{self, has_errors, Diagnostic};
use crate::plugin::ShutdownHandle;
use crate::proto;
use crate::proto::provider_server::{Provider as ProviderRpc, ProviderServer};
use crate::schema::{Block, ProviderSchema, Schema};
use crate::value::{self, json, Value};

/// Diagnostics that end a handler early
struct Rejected(Vec<Diagnostic>);

impl From<Diagnostic> for Rejected {
    fn from(diag: Diagnostic) -> Self {
        Self(vec![diag])
    }
}

impl From<ProviderError> for Rejected {
    fn from(err: ProviderError) -> Self {
        Self(vec![err.to_diagnostic()])
    }
}

type Outcome<T> = Result<T, Rejected>;

/// Responses that carry diagnostics
trait WithDiagnostics: Default {
    fn diagnostics_mut(&mut self) -> &mut Vec<proto::Diagnostic>;
}

macro_rules! with_diagnostics {
    ($($response:ty),* $(,)?) => {
        $(
            impl WithDiagnostics for $response {
                fn diagnostics_mut(&mut self) -> &mut Vec<proto::Diagnostic> {
                    &mut self.diagnostics
                }
            }
        )*
    };
}

with_diagnostics!(
    proto::prepare_provider_config::Response,
    proto::validate_resource_type_config::Response,
    proto::validate_data_source_config::Response,
    proto::upgrade_resource_state::Response,
    proto::configure::Response,
    proto::read_resource::Response,
    proto::plan_resource_change::Response,
    proto::apply_resource_change::Response,
    proto::import_resource_state::Response,
    proto::read_data_source::Response,
);

fn respond<T: WithDiagnostics>(outcome: Outcome<T>) -> Result<Response<T>, Status> {
    let response = match outcome {
        Ok(response) => response,
        Err(Rejected(diags)) => {
            debug!(count = diags.len(), "request rejected with diagnostics");
            let mut response = T::default();
            response
                .diagnostics_mut()
                .extend(diagnostics::to_proto(diags));
            response
        }
    };
    Ok(Response::new(response))
}

fn decode(what: &str, dv: Option<&proto::DynamicValue>, block: &Block) -> Result<Value, Diagnostic> {
    value::decode_dynamic(dv, block).map_err(|e| e.to_diagnostic(&format!("Invalid {}", what)))
}

fn encode(what: &str, value: &Value, block: &Block) -> Result<proto::DynamicValue, Diagnostic> {
    value::encode_dynamic(value, block)
        .map_err(|e| e.to_diagnostic(&format!("Provider returned an invalid {}", what)))
}

fn check_config(config: &Value, block: &Block) -> Outcome<()> {
    let diags = block.validate(config);
    if has_errors(&diags) {
        return Err(Rejected(diags));
    }
    Ok(())
}

fn unsupported_type(kind: &str, type_name: &str) -> Diagnostic {
    Diagnostic::error(
        format!("Unsupported {} type", kind),
        format!("This provider does not support {} type {:?}.", kind, type_name),
    )
}

/// tfplugin5 service backed by a [`Provider`]
pub struct GrpcProvider<P> {
    provider: Arc<P>,
    schema: Arc<ProviderSchema>,
    shutdown: ShutdownHandle,
}

impl<P> Clone for GrpcProvider<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            schema: Arc::clone(&self.schema),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<P: Provider> GrpcProvider<P> {
    /// Wrap `provider`; `Stop` triggers `shutdown`
    pub fn new(provider: P, shutdown: ShutdownHandle) -> Self {
        let schema = provider.schema();
        debug!(
            resources = schema.resource_schemas.len(),
            data_sources = schema.data_source_schemas.len(),
            "provider schema cached"
        );
        Self {
            provider: Arc::new(provider),
            schema: Arc::new(schema),
            shutdown,
        }
    }

    /// Wrap in the generated tonic service
    pub fn into_service(self) -> ProviderServer<Self> {
        ProviderServer::new(self)
    }

    /// Cached provider schema
    pub fn schema(&self) -> &ProviderSchema {
        &self.schema
    }

    fn ensure_running(&self) -> Result<(), Status> {
        if self.shutdown.is_requested() {
            return Err(Status::unavailable("plugin is shutting down"));
        }
        Ok(())
    }

    fn resource(&self, type_name: &str) -> Result<&Schema, Diagnostic> {
        self.schema
            .resource_schemas
            .get(type_name)
            .ok_or_else(|| unsupported_type("resource", type_name))
    }

    fn data_source(&self, type_name: &str) -> Result<&Schema, Diagnostic> {
        self.schema
            .data_source_schemas
            .get(type_name)
            .ok_or_else(|| unsupported_type("data source", type_name))
    }

    async fn prepare(
        &self,
        request: proto::prepare_provider_config::Request,
    ) -> Outcome<proto::prepare_provider_config::Response> {
        let block = &self.schema.provider.block;
        let config = decode("provider configuration", request.config.as_ref(), block)?;
        let prepared = self.provider.prepare_provider_config(config).await?;
        check_config(&prepared, block)?;

        Ok(proto::prepare_provider_config::Response {
            prepared_config: Some(encode("provider configuration", &prepared, block)?),
            diagnostics: Vec::new(),
        })
    }

    async fn validate_resource(
        &self,
        request: proto::validate_resource_type_config::Request,
    ) -> Outcome<proto::validate_resource_type_config::Response> {
        let schema = self.resource(&request.type_name)?;
        let config = decode("configuration", request.config.as_ref(), &schema.block)?;

        let mut diags = schema.block.validate(&config);
        diags.extend(
            self.provider
                .validate_resource_config(&request.type_name, &config)
                .await,
        );
        Ok(proto::validate_resource_type_config::Response {
            diagnostics: diagnostics::to_proto(diags),
        })
    }

    async fn validate_data_source(
        &self,
        request: proto::validate_data_source_config::Request,
    ) -> Outcome<proto::validate_data_source_config::Response> {
        let schema = self.data_source(&request.type_name)?;
        let config = decode("configuration", request.config.as_ref(), &schema.block)?;

        let mut diags = schema.block.validate(&config);
        diags.extend(
            self.provider
                .validate_data_source_config(&request.type_name, &config)
                .await,
        );
        Ok(proto::validate_data_source_config::Response {
            diagnostics: diagnostics::to_proto(diags),
        })
    }

    async fn upgrade(
        &self,
        request: proto::upgrade_resource_state::Request,
    ) -> Outcome<proto::upgrade_resource_state::Response> {
        let schema = self.resource(&request.type_name)?;
        let raw = request.raw_state.unwrap_or_default();

        if raw.json.is_empty() {
            if !raw.flatmap.is_empty() {
                return Err(Diagnostic::error(
                    "Unsupported state format",
                    format!(
                        "State for {} is in the legacy flatmap format, which this provider cannot upgrade.",
                        request.type_name
                    ),
                )
                .into());
            }
            return Ok(proto::upgrade_resource_state::Response {
                upgraded_state: Some(encode("upgraded state", &Value::Null, &schema.block)?),
                diagnostics: Vec::new(),
            });
        }

        if request.version > schema.version {
            return Err(Diagnostic::error(
                "Resource state is newer than the provider",
                format!(
                    "State for {} was written with schema version {}, but this provider only supports up to version {}.",
                    request.type_name, request.version, schema.version
                ),
            )
            .into());
        }

        let state =
            json::parse(&raw.json).map_err(|e| e.to_diagnostic("Invalid stored state"))?;
        let upgraded = self
            .provider
            .upgrade_resource_state(UpgradeRequest {
                type_name: request.type_name.clone(),
                version: request.version,
                state,
            })
            .await?;
        let upgraded = json::state_from_json(upgraded, &schema.block)
            .map_err(|e| e.to_diagnostic("Provider returned an invalid upgraded state"))?;

        Ok(proto::upgrade_resource_state::Response {
            upgraded_state: Some(encode("upgraded state", &upgraded, &schema.block)?),
            diagnostics: Vec::new(),
        })
    }

    async fn configure_provider(
        &self,
        request: proto::configure::Request,
    ) -> Outcome<proto::configure::Response> {
        let block = &self.schema.provider.block;
        let config = decode("provider configuration", request.config.as_ref(), block)?;
        check_config(&config, block)?;
        self.provider
            .configure(&request.terraform_version, config)
            .await?;

        Ok(proto::configure::Response::default())
    }

    async fn read(
        &self,
        request: proto::read_resource::Request,
    ) -> Outcome<proto::read_resource::Response> {
        let schema = self.resource(&request.type_name)?;
        let current = decode("current state", request.current_state.as_ref(), &schema.block)?;
        let new_state = self
            .provider
            .read_resource(&request.type_name, current)
            .await?;

        Ok(proto::read_resource::Response {
            new_state: Some(encode("new state", &new_state, &schema.block)?),
            diagnostics: Vec::new(),
        })
    }

    async fn plan(
        &self,
        request: proto::plan_resource_change::Request,
    ) -> Outcome<proto::plan_resource_change::Response> {
        let schema = self.resource(&request.type_name)?;
        let block = &schema.block;
        let prior_state = decode("prior state", request.prior_state.as_ref(), block)?;
        let proposed_new_state =
            decode("proposed new state", request.proposed_new_state.as_ref(), block)?;
        let config = decode("configuration", request.config.as_ref(), block)?;

        let change = self
            .provider
            .plan_resource_change(PlanRequest {
                type_name: request.type_name.clone(),
                prior_state,
                proposed_new_state,
                config,
                prior_private: request.prior_private.clone(),
            })
            .await?;

        Ok(proto::plan_resource_change::Response {
            planned_state: Some(encode("planned state", &change.planned_state, block)?),
            requires_replace: change.requires_replace.into_iter().map(Into::into).collect(),
            planned_private: change.planned_private.unwrap_or(request.prior_private),
            diagnostics: diagnostics::to_proto(change.diagnostics),
            legacy_type_system: false,
        })
    }

    async fn apply(
        &self,
        request: proto::apply_resource_change::Request,
    ) -> Outcome<proto::apply_resource_change::Response> {
        let schema = self.resource(&request.type_name)?;
        let block = &schema.block;
        let prior_state = decode("prior state", request.prior_state.as_ref(), block)?;
        let planned_state = decode("planned state", request.planned_state.as_ref(), block)?;
        let config = decode("configuration", request.config.as_ref(), block)?;

        let applied = self
            .provider
            .apply_resource_change(ApplyRequest {
                type_name: request.type_name.clone(),
                prior_state,
                planned_state,
                config,
                planned_private: request.planned_private.clone(),
            })
            .await?;

        Ok(proto::apply_resource_change::Response {
            new_state: Some(encode("new state", &applied.new_state, block)?),
            private: applied.private.unwrap_or(request.planned_private),
            diagnostics: diagnostics::to_proto(applied.diagnostics),
            legacy_type_system: false,
        })
    }

    async fn import(
        &self,
        request: proto::import_resource_state::Request,
    ) -> Outcome<proto::import_resource_state::Response> {
        self.resource(&request.type_name)?;
        let imported = self
            .provider
            .import_resource_state(&request.type_name, &request.id)
            .await?;

        let imported_resources = imported
            .into_iter()
            .map(|resource| {
                let schema = self.resource(&resource.type_name)?;
                Ok(proto::import_resource_state::ImportedResource {
                    state: Some(encode("imported state", &resource.state, &schema.block)?),
                    type_name: resource.type_name,
                    private: resource.private,
                })
            })
            .collect::<Result<Vec<_>, Diagnostic>>()?;

        Ok(proto::import_resource_state::Response {
            imported_resources,
            diagnostics: Vec::new(),
        })
    }

    async fn read_data(
        &self,
        request: proto::read_data_source::Request,
    ) -> Outcome<proto::read_data_source::Response> {
        let schema = self.data_source(&request.type_name)?;
        let config = decode("configuration", request.config.as_ref(), &schema.block)?;
        let state = self
            .provider
            .read_data_source(&request.type_name, config)
            .await?;

        Ok(proto::read_data_source::Response {
            state: Some(encode("data source state", &state, &schema.block)?),
            diagnostics: Vec::new(),
        })
    }
}

#[tonic::async_trait]
impl<P: Provider> ProviderRpc for GrpcProvider<P> {
    #[instrument(skip(self, _request))]
    async fn get_schema(
        &self,
        _request: Request<proto::get_provider_schema::Request>,
    ) -> Result<Response<proto::get_provider_schema::Response>, Status> {
        self.ensure_running()?;
        Ok(Response::new(self.schema.as_ref().into()))
    }

    #[instrument(skip(self, request))]
    async fn prepare_provider_config(
        &self,
        request: Request<proto::prepare_provider_config::Request>,
    ) -> Result<Response<proto::prepare_provider_config::Response>, Status> {
        self.ensure_running()?;
        respond(self.prepare(request.into_inner()).await)
    }

    #[instrument(skip(self, request), fields(type_name = %request.get_ref().type_name))]
    async fn validate_resource_type_config(
        &self,
        request: Request<proto::validate_resource_type_config::Request>,
    ) -> Result<Response<proto::validate_resource_type_config::Response>, Status> {
        self.ensure_running()?;
        respond(self.validate_resource(request.into_inner()).await)
    }

    #[instrument(skip(self, request), fields(type_name = %request.get_ref().type_name))]
    async fn validate_data_source_config(
        &self,
        request: Request<proto::validate_data_source_config::Request>,
    ) -> Result<Response<proto::validate_data_source_config::Response>, Status> {
        self.ensure_running()?;
        respond(self.validate_data_source(request.into_inner()).await)
    }

    #[instrument(
        skip(self, request),
        fields(type_name = %request.get_ref().type_name, version = request.get_ref().version)
    )]
    async fn upgrade_resource_state(
        &self,
        request: Request<proto::upgrade_resource_state::Request>,
    ) -> Result<Response<proto::upgrade_resource_state::Response>, Status> {
        self.ensure_running()?;
        respond(self.upgrade(request.into_inner()).await)
    }

    #[instrument(skip(self, request), fields(terraform_version = %request.get_ref().terraform_version))]
    async fn configure(
        &self,
        request: Request<proto::configure::Request>,
    ) -> Result<Response<proto::configure::Response>, Status> {
        self.ensure_running()?;
        respond(self.configure_provider(request.into_inner()).await)
    }

    #[instrument(skip(self, request), fields(type_name = %request.get_ref().type_name))]
    async fn read_resource(
        &self,
        request: Request<proto::read_resource::Request>,
    ) -> Result<Response<proto::read_resource::Response>, Status> {
        self.ensure_running()?;
        respond(self.read(request.into_inner()).await)
    }

    #[instrument(skip(self, request), fields(type_name = %request.get_ref().type_name))]
    async fn plan_resource_change(
        &self,
        request: Request<proto::plan_resource_change::Request>,
    ) -> Result<Response<proto::plan_resource_change::Response>, Status> {
        self.ensure_running()?;
        respond(self.plan(request.into_inner()).await)
    }

    #[instrument(skip(self, request), fields(type_name = %request.get_ref().type_name))]
    async fn apply_resource_change(
        &self,
        request: Request<proto::apply_resource_change::Request>,
    ) -> Result<Response<proto::apply_resource_change::Response>, Status> {
        self.ensure_running()?;
        respond(self.apply(request.into_inner()).await)
    }

    #[instrument(skip(self, request), fields(type_name = %request.get_ref().type_name))]
    async fn import_resource_state(
        &self,
        request: Request<proto::import_resource_state::Request>,
    ) -> Result<Response<proto::import_resource_state::Response>, Status> {
        self.ensure_running()?;
        respond(self.import(request.into_inner()).await)
    }

    #[instrument(skip(self, request), fields(type_name = %request.get_ref().type_name))]
    async fn read_data_source(
        &self,
        request: Request<proto::read_data_source::Request>,
    ) -> Result<Response<proto::read_data_source::Response>, Status> {
        self.ensure_running()?;
        respond(self.read_data(request.into_inner()).await)
    }

    #[instrument(skip(self, _request))]
    async fn stop(
        &self,
        _request: Request<proto::stop::Request>,
    ) -> Result<Response<proto::stop::Response>, Status> {
        info!("stop requested");
        let error = match self.provider.stop().await {
            Ok(()) => String::new(),
            Err(e) => {
                warn!(error = %e, "provider did not stop cleanly");
                e.to_string()
            }
        };
        self.shutdown.request();
        Ok(Response::new(proto::stop::Response { error }))
    }
}
