// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT
use crate::callable::{CallableHost, ProvisioningStrategy};
use crate::context::ExecutionContext;
use funclet_api::common::{InvocationFailure, SerializationError, WorkerError};
use funclet_api::function::{CallableRef, FunctionSignature};
use funclet_api::typed_value::TypedValue;


/// One pluggable stage of the invocation pipeline. A stage either performs
/// its work and proceeds to the rest of the chain, observing whatever the
/// downstream stages did to the context once control returns, or it
/// short-circuits by not proceeding.
#[async_trait::async_trait]
pub trait InvocationMiddleware: Send + Sync {
    async fn handle(&self, context: &mut ExecutionContext, next: Next<'_>) -> Result<(), WorkerError>;
}

/// Continuation handle passed to each middleware stage.
pub struct Next<'a> {
    stages: &'a [std::sync::Arc<dyn InvocationMiddleware>],
    terminal: &'a ExecutionStage,
}

impl Next<'_> {
    pub async fn proceed(self, context: &mut ExecutionContext) -> Result<(), WorkerError> {
        match self.stages.split_first() {
            Some((stage, remaining)) => {
                stage
                    .handle(
                        context,
                        Next {
                            stages: remaining,
                            terminal: self.terminal,
                        },
                    )
                    .await
            }
            None => self.terminal.execute(context).await,
        }
    }
}

/// The fixed last stage of every pipeline: provision an instance, resolve
/// parameters, invoke the callable, convert outputs and store the result.
pub struct ExecutionStage {
    signature: FunctionSignature,
    callable: CallableRef,
    host: std::sync::Arc<dyn CallableHost>,
    provisioning: std::sync::Arc<dyn ProvisioningStrategy>,
}

impl ExecutionStage {
    pub fn new(
        signature: FunctionSignature,
        callable: CallableRef,
        host: std::sync::Arc<dyn CallableHost>,
        provisioning: std::sync::Arc<dyn ProvisioningStrategy>,
    ) -> Self {
        Self {
            signature,
            callable,
            host,
            provisioning,
        }
    }

    async fn execute(&self, context: &mut ExecutionContext) -> Result<(), WorkerError> {
        let instance = self
            .provisioning
            .provision_instance(&self.callable)
            .await
            .map_err(|err| WorkerError::Invocation(InvocationFailure::CallableThrew(format!("instance provisioning failed: {}", err))))?;

        let args = crate::binding::resolve_parameters(&self.signature, context.inputs())?;

        let outcome = self
            .host
            .invoke(&instance, &self.callable, args)
            .await
            .map_err(|err| WorkerError::Invocation(InvocationFailure::CallableThrew(err.to_string())))?;

        for (name, value) in &outcome.output_bindings {
            let binding = self
                .signature
                .parameters
                .iter()
                .find(|binding| binding.name == *name)
                .ok_or_else(|| {
                    WorkerError::Serialization(SerializationError::Unsupported(format!(
                        "callable wrote undeclared output binding '{}'",
                        name
                    )))
                })?;
            let wire = crate::binding::from_result(value, &binding.declared_type)?;
            context.set_output(name, wire);
        }

        // A result payload is attached iff the function has an effective
        // return type; a void function with implicit outputs sends back the
        // aggregated output-binding set.
        if self.signature.has_effective_return_type() {
            if self.signature.has_non_void_return_type() {
                let wire = crate::binding::from_result(&outcome.return_value, &self.signature.return_type)?;
                context.set_result(wire);
            } else {
                let mut aggregate = serde_json::Map::new();
                for binding in self.signature.parameters.iter().filter(|binding| binding.implicit_output) {
                    if let Some(output) = context.outputs().iter().find(|output| output.name == binding.name) {
                        aggregate.insert(binding.name.clone(), crate::binding::typed_value_to_json(&output.value)?);
                    }
                }
                context.set_result(TypedValue::Json(serde_json::Value::Object(aggregate).to_string()));
            }
        }

        Ok(())
    }
}

/// Ordered middleware chain wrapping the terminal execution stage. Built
/// once per function and reused; holds no per-invocation state.
pub struct InvocationPipeline {
    stages: Vec<std::sync::Arc<dyn InvocationMiddleware>>,
    terminal: ExecutionStage,
}

impl InvocationPipeline {
    pub fn new(stages: Vec<std::sync::Arc<dyn InvocationMiddleware>>, terminal: ExecutionStage) -> Self {
        Self { stages, terminal }
    }

    pub async fn run(&self, context: &mut ExecutionContext) -> Result<(), WorkerError> {
        Next {
            stages: &self.stages,
            terminal: &self.terminal,
        }
        .proceed(context)
        .await
    }

    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

/// Example middleware logging every invocation around the rest of the chain;
/// failures from downstream stages pass through it unchanged.
pub struct InvocationLogStage {}

#[async_trait::async_trait]
impl InvocationMiddleware for InvocationLogStage {
    async fn handle(&self, context: &mut ExecutionContext, next: Next<'_>) -> Result<(), WorkerError> {
        let start = tokio::time::Instant::now();
        log::debug!("invocation {} of function {} started", context.invocation_id(), context.function_id());
        let res = next.proceed(context).await;
        match &res {
            Ok(_) => log::debug!(
                "invocation {} of function {} completed in {:?}",
                context.invocation_id(),
                context.function_id(),
                start.elapsed()
            ),
            Err(err) => log::warn!("invocation {} of function {} failed: {}", context.invocation_id(), context.function_id(), err),
        }
        res
    }
}
