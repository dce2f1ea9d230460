// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT
use crate::binding::{BoundParameter, ResolvedValue};
use crate::callable::{CallableHost, CallableOutcome, InstanceRef, ProvisioningStrategy, WorkerExtensions};
use crate::pipeline::{InvocationLogStage, InvocationMiddleware};
use funclet_api::function::{CallableRef, FunctionSignature, ParameterBinding, ParameterType};

/// In-tree callable host with a fixed table of builtin functions, keyed by
/// the callable's entry point. Lets the worker daemon run standalone and
/// gives tests a concrete host.
pub struct BuiltinCallableHost {}

impl BuiltinCallableHost {
    pub fn new() -> Self {
        Self {}
    }

    fn argument(args: &[BoundParameter], name: &str) -> anyhow::Result<String> {
        match args.iter().find(|arg| arg.name == name) {
            Some(BoundParameter {
                value: ResolvedValue::String(val),
                ..
            }) => Ok(val.clone()),
            Some(arg) => anyhow::bail!("argument '{}' is not a string but a {}", name, arg.value.kind()),
            None => anyhow::bail!("argument '{}' is missing", name),
        }
    }
}

impl Default for BuiltinCallableHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CallableHost for BuiltinCallableHost {
    fn inspect_signature(&self, function_id: &str, callable: &CallableRef) -> anyhow::Result<FunctionSignature> {
        match callable.entry_point.as_str() {
            "echo" | "uppercase" => Ok(FunctionSignature::new(
                function_id,
                vec![ParameterBinding::input("text", ParameterType::String)],
                ParameterType::String,
            )),
            "concat" => Ok(FunctionSignature::new(
                function_id,
                vec![
                    ParameterBinding::input("first", ParameterType::String),
                    ParameterBinding::input("second", ParameterType::String),
                ],
                ParameterType::String,
            )),
            other => anyhow::bail!("unknown builtin callable '{}'", other),
        }
    }

    async fn invoke(&self, _instance: &InstanceRef, callable: &CallableRef, args: Vec<BoundParameter>) -> anyhow::Result<CallableOutcome> {
        match callable.entry_point.as_str() {
            "echo" => Ok(CallableOutcome::of(ResolvedValue::String(Self::argument(&args, "text")?))),
            "uppercase" => Ok(CallableOutcome::of(ResolvedValue::String(
                Self::argument(&args, "text")?.to_uppercase(),
            ))),
            "concat" => Ok(CallableOutcome::of(ResolvedValue::String(format!(
                "{}{}",
                Self::argument(&args, "first")?,
                Self::argument(&args, "second")?
            )))),
            other => anyhow::bail!("unknown builtin callable '{}'", other),
        }
    }
}

/// Provisioning policy handing out a fresh instance for every invocation.
pub struct OnDemandProvisioning {}

#[async_trait::async_trait]
impl ProvisioningStrategy for OnDemandProvisioning {
    async fn provision_instance(&self, _callable: &CallableRef) -> anyhow::Result<InstanceRef> {
        Ok(InstanceRef::fresh())
    }
}

/// Extension set used when no external discovery mechanism is plugged in:
/// a single invocation-logging middleware and on-demand provisioning.
pub struct DefaultExtensions {
    middleware: Vec<std::sync::Arc<dyn InvocationMiddleware>>,
}

impl DefaultExtensions {
    pub fn new() -> Self {
        Self {
            middleware: vec![std::sync::Arc::new(InvocationLogStage {})],
        }
    }
}

impl Default for DefaultExtensions {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerExtensions for DefaultExtensions {
    fn discover_middleware(&self) -> anyhow::Result<Vec<std::sync::Arc<dyn InvocationMiddleware>>> {
        Ok(self.middleware.clone())
    }

    fn provisioning_strategy(&self) -> std::sync::Arc<dyn ProvisioningStrategy> {
        std::sync::Arc::new(OnDemandProvisioning {})
    }
}
