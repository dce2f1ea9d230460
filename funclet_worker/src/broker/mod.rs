// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT
use crate::binding::ResolvedValue;
use crate::callable::{CallableHost, CallableOutcome, InstanceRef, WorkerExtensions};
use crate::context::ExecutionContext;
use crate::pipeline::{ExecutionStage, InvocationPipeline};
use funclet_api::common::{LoadError, WorkerError};
use funclet_api::function::{CallableRef, FunctionMetadata, FunctionSignature, ParameterBinding, ParameterType};
use funclet_api::typed_value::{NamedTypedValue, TypedValue};
use funclet_api::worker::{InvocationOutcome, InvocationRequest, InvocationResponse};
use funclet_telemetry::telemetry_events::{TelemetryEvent, TelemetryHandleAPI};

#[cfg(test)]
pub mod test;

/// One loaded function: its metadata, its inspected signature, and its
/// lazily-built invocation pipeline. Entries are created on load, never
/// removed, and mutated only to attach the pipeline.
pub struct FunctionEntry {
    pub metadata: FunctionMetadata,
    pub signature: FunctionSignature,
    pipeline: tokio::sync::OnceCell<Result<std::sync::Arc<InvocationPipeline>, WorkerError>>,
}

/// Registry of loaded functions, shared by all invocation tasks. Loading and
/// pipeline construction for one function never block work on another.
pub struct FunctionBroker {
    host: std::sync::Arc<dyn CallableHost>,
    extensions: std::sync::Arc<dyn WorkerExtensions>,
    entries: tokio::sync::RwLock<std::collections::HashMap<String, std::sync::Arc<FunctionEntry>>>,
    telemetry_handle: std::sync::Mutex<Box<dyn TelemetryHandleAPI>>,
}

impl FunctionBroker {
    pub fn new(
        host: std::sync::Arc<dyn CallableHost>,
        extensions: std::sync::Arc<dyn WorkerExtensions>,
        telemetry_handle: Box<dyn TelemetryHandleAPI>,
    ) -> Self {
        Self {
            host,
            extensions,
            entries: tokio::sync::RwLock::new(std::collections::HashMap::new()),
            telemetry_handle: std::sync::Mutex::new(telemetry_handle),
        }
    }

    /// Validate and register one function. Idempotent for identical
    /// metadata; a second load with a different signature is rejected.
    pub async fn load_function(&self, metadata: FunctionMetadata) -> Result<(), WorkerError> {
        let start = tokio::time::Instant::now();

        if metadata.function_id.is_empty() {
            return Err(WorkerError::Load(LoadError::MalformedMetadata("empty function id".to_string())));
        }
        if metadata.name.is_empty() {
            return Err(WorkerError::Load(LoadError::MalformedMetadata(format!(
                "empty name for function {}",
                metadata.function_id
            ))));
        }

        let signature = self
            .host
            .inspect_signature(&metadata.function_id, &metadata.callable)
            .map_err(|err| WorkerError::Load(LoadError::MalformedMetadata(err.to_string())))?;

        let mut entries = self.entries.write().await;
        if let Some(existing) = entries.get(&metadata.function_id) {
            if existing.signature == signature && existing.metadata == metadata {
                return Ok(());
            }
            return Err(WorkerError::Load(LoadError::DuplicateConflict(metadata.function_id)));
        }
        log::info!("loaded function {} ({})", metadata.function_id, metadata.name);
        entries.insert(
            metadata.function_id.clone(),
            std::sync::Arc::new(FunctionEntry {
                metadata,
                signature,
                pipeline: tokio::sync::OnceCell::new(),
            }),
        );
        drop(entries);

        self.observe(TelemetryEvent::FunctionLoaded(start.elapsed()), std::collections::BTreeMap::new());
        Ok(())
    }

    /// Read-only lookup, safe under concurrent load and invocation.
    pub async fn resolve(&self, function_id: &str) -> Result<std::sync::Arc<FunctionEntry>, WorkerError> {
        self.entries
            .read()
            .await
            .get(function_id)
            .cloned()
            .ok_or_else(|| WorkerError::Load(LoadError::NotFound(function_id.to_string())))
    }

    pub async fn loaded_functions(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Build the function's pipeline exactly once; every task racing on the
    /// first invocation waits for the same build and sees the same outcome,
    /// including a failed one.
    pub async fn pipeline(&self, entry: &FunctionEntry) -> Result<std::sync::Arc<InvocationPipeline>, WorkerError> {
        entry
            .pipeline
            .get_or_init(|| async {
                let start = tokio::time::Instant::now();
                let stages = match self.extensions.discover_middleware() {
                    Ok(stages) => stages,
                    Err(err) => return Err(WorkerError::PipelineBuild(err.to_string())),
                };
                let terminal = ExecutionStage::new(
                    entry.signature.clone(),
                    entry.metadata.callable.clone(),
                    self.host.clone(),
                    self.extensions.provisioning_strategy(),
                );
                log::debug!("built pipeline for function {}", entry.signature.function_id);
                self.observe(
                    TelemetryEvent::PipelineBuilt(start.elapsed()),
                    std::collections::BTreeMap::from([("FUNCTION_ID".to_string(), entry.signature.function_id.clone())]),
                );
                Ok(std::sync::Arc::new(InvocationPipeline::new(stages, terminal)))
            })
            .await
            .clone()
    }

    /// Run one invocation end to end. Every failure is recovered into the
    /// response; the broker and its entries stay usable afterwards.
    pub async fn invoke(&self, request: InvocationRequest) -> InvocationResponse {
        let invocation_id = request.invocation_id;
        match self.try_invoke(request).await {
            Ok(response) => response,
            Err(err) => InvocationResponse {
                invocation_id,
                outcome: InvocationOutcome::Failure(err),
            },
        }
    }

    async fn try_invoke(&self, request: InvocationRequest) -> Result<InvocationResponse, WorkerError> {
        let entry = self.resolve(&request.function_id).await?;
        let pipeline = self.pipeline(&entry).await?;

        let function_tags = std::collections::BTreeMap::from([("FUNCTION_ID".to_string(), request.function_id.clone())]);
        let start = tokio::time::Instant::now();
        let mut context = ExecutionContext::new(&request);
        match pipeline.run(&mut context).await {
            Ok(()) => {
                self.observe(TelemetryEvent::InvocationCompleted(start.elapsed()), function_tags);
                Ok(context.into_response())
            }
            Err(err) => {
                self.observe(TelemetryEvent::InvocationFailed(start.elapsed()), function_tags);
                Err(err)
            }
        }
    }

    /// Push a synthetic invocation through the full pipeline machinery to
    /// force one-time resolution costs, without registering anything
    /// user-visible.
    pub async fn warmup(&self) -> Result<(), WorkerError> {
        let signature = FunctionSignature::new(
            "_warmup",
            vec![ParameterBinding::input("payload", ParameterType::String)],
            ParameterType::String,
        );
        let callable = CallableRef::new("internal", "warmup-echo");
        let stages = self
            .extensions
            .discover_middleware()
            .map_err(|err| WorkerError::PipelineBuild(err.to_string()))?;
        let terminal = ExecutionStage::new(
            signature,
            callable,
            std::sync::Arc::new(WarmupHost {}),
            self.extensions.provisioning_strategy(),
        );
        let pipeline = InvocationPipeline::new(stages, terminal);

        let request = InvocationRequest::new("_warmup", vec![NamedTypedValue::new("payload", TypedValue::String("warmup".to_string()))]);
        let mut context = ExecutionContext::new(&request);
        pipeline.run(&mut context).await?;
        log::info!("warmup invocation completed");
        Ok(())
    }

    fn observe(&self, event: TelemetryEvent, event_tags: std::collections::BTreeMap<String, String>) {
        if let Ok(mut handle) = self.telemetry_handle.lock() {
            handle.observe(event, event_tags);
        }
    }
}

/// Internal host backing the warmup invocation; echoes its payload.
struct WarmupHost {}

#[async_trait::async_trait]
impl CallableHost for WarmupHost {
    fn inspect_signature(&self, function_id: &str, _callable: &CallableRef) -> anyhow::Result<FunctionSignature> {
        Ok(FunctionSignature::new(
            function_id,
            vec![ParameterBinding::input("payload", ParameterType::String)],
            ParameterType::String,
        ))
    }

    async fn invoke(
        &self,
        _instance: &InstanceRef,
        _callable: &CallableRef,
        args: Vec<crate::binding::BoundParameter>,
    ) -> anyhow::Result<CallableOutcome> {
        match args.into_iter().next() {
            Some(payload) => Ok(CallableOutcome::of(payload.value)),
            None => Ok(CallableOutcome::of(ResolvedValue::String(String::new()))),
        }
    }
}
