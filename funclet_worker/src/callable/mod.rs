// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT
use crate::binding::{BoundParameter, ResolvedValue};
use funclet_api::function::{CallableRef, FunctionSignature};

/// Opaque handle to a provisioned callable instance. Whether it refers to a
/// fresh or a reused instance is the provisioning strategy's policy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceRef(pub uuid::Uuid);

impl InstanceRef {
    pub fn fresh() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

/// Everything a callable produced in one invocation: its return value plus
/// the values it wrote into its output bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct CallableOutcome {
    pub return_value: ResolvedValue,
    pub output_bindings: Vec<(String, ResolvedValue)>,
}

impl CallableOutcome {
    pub fn of(return_value: ResolvedValue) -> Self {
        Self {
            return_value,
            output_bindings: vec![],
        }
    }
}

/// The surrounding system's capability to resolve and run callable units.
/// The worker core never inspects callable internals, only signatures.
#[async_trait::async_trait]
pub trait CallableHost: Send + Sync {
    /// Resolve the declared parameter/return signature of a callable unit.
    fn inspect_signature(&self, function_id: &str, callable: &CallableRef) -> anyhow::Result<FunctionSignature>;

    /// Run the callable against a provisioned instance with bound arguments.
    /// Completes only once the callable's result (or error) is available.
    async fn invoke(&self, instance: &InstanceRef, callable: &CallableRef, args: Vec<BoundParameter>) -> anyhow::Result<CallableOutcome>;
}

/// Policy deciding which instance a callable is invoked against.
#[async_trait::async_trait]
pub trait ProvisioningStrategy: Send + Sync {
    async fn provision_instance(&self, callable: &CallableRef) -> anyhow::Result<InstanceRef>;
}

/// Extension discovery, resolved once at process startup by the surrounding
/// system. The discovery order of middleware is stable but externally
/// determined.
pub trait WorkerExtensions: Send + Sync {
    fn discover_middleware(&self) -> anyhow::Result<Vec<std::sync::Arc<dyn crate::pipeline::InvocationMiddleware>>>;
    fn provisioning_strategy(&self) -> std::sync::Arc<dyn ProvisioningStrategy>;
}
