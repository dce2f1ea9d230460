// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT
use crate::common::WorkerError;
use crate::function::FunctionMetadata;
use crate::typed_value::{NamedTypedValue, TypedValue};

/// Phases of the worker's life. `Executing` is re-entrant: any number of
/// invocations are processed concurrently. `Terminated` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LifecyclePhase {
    Uninitialized,
    Initialized,
    EnvironmentSpecialized,
    FunctionsLoaded,
    Executing,
    Terminated,
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            LifecyclePhase::Uninitialized => write!(fmt, "uninitialized"),
            LifecyclePhase::Initialized => write!(fmt, "initialized"),
            LifecyclePhase::EnvironmentSpecialized => write!(fmt, "environment-specialized"),
            LifecyclePhase::FunctionsLoaded => write!(fmt, "functions-loaded"),
            LifecyclePhase::Executing => write!(fmt, "executing"),
            LifecyclePhase::Terminated => write!(fmt, "terminated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InitRequest {
    pub worker_id: uuid::Uuid,
    pub working_directory: Option<std::path::PathBuf>,
    pub host_version: String,
}

/// Version and feature set reported back to the host on initialization.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct WorkerProperties {
    pub worker_version: String,
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum InitResponse {
    Accepted(WorkerProperties),
    ResponseError(WorkerError),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum WarmupResponse {
    Completed,
    ResponseError(WorkerError),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EnvironmentReloadRequest {
    pub environment_variables: std::collections::HashMap<String, String>,
    pub working_directory: Option<std::path::PathBuf>,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum EnvironmentReloadResponse {
    /// `restart_requested` is set when the worker is already specialized and
    /// applying the new environment needs a full process restart, which is
    /// the host's job.
    Specialized { restart_requested: bool },
    ResponseError(WorkerError),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct LoadFunctionRequest {
    pub metadata: FunctionMetadata,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum LoadFunctionResponse {
    Accepted(String),
    ResponseError(WorkerError),
}

/// W3C-style trace propagation data attached to one invocation.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TraceContext {
    pub trace_parent: String,
    pub trace_state: String,
    pub attributes: std::collections::HashMap<String, String>,
}

impl TraceContext {
    pub fn empty() -> Self {
        Self {
            trace_parent: String::new(),
            trace_state: String::new(),
            attributes: std::collections::HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RetryContext {
    pub retry_count: i32,
    pub max_retry_count: i32,
    pub exception: Option<String>,
}

impl RetryContext {
    pub fn empty() -> Self {
        Self {
            retry_count: 0,
            max_retry_count: 0,
            exception: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InvocationRequest {
    pub invocation_id: uuid::Uuid,
    pub function_id: String,
    pub inputs: Vec<NamedTypedValue>,
    pub trace_context: TraceContext,
    pub retry_context: RetryContext,
}

impl InvocationRequest {
    pub fn new(function_id: &str, inputs: Vec<NamedTypedValue>) -> Self {
        Self {
            invocation_id: uuid::Uuid::new_v4(),
            function_id: function_id.to_string(),
            inputs,
            trace_context: TraceContext::empty(),
            retry_context: RetryContext::empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum InvocationOutcome {
    Success {
        result: Option<TypedValue>,
        outputs: Vec<NamedTypedValue>,
    },
    Failure(WorkerError),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InvocationResponse {
    pub invocation_id: uuid::Uuid,
    pub outcome: InvocationOutcome,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StatusResponse {
    pub phase: LifecyclePhase,
    pub loaded_functions: u32,
    pub inflight_invocations: u32,
    pub uptime: std::time::Duration,
}

impl std::fmt::Display for StatusResponse {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        write!(
            fmt,
            "phase {}, {} functions loaded, {} invocations in flight, up {} s",
            self.phase,
            self.loaded_functions,
            self.inflight_invocations,
            self.uptime.as_secs()
        )
    }
}

/// Full request surface of a function execution worker, one method per
/// protocol message. Transports hold this as a boxed trait object.
#[async_trait::async_trait]
pub trait FunctionWorkerAPI: FunctionWorkerAPIClone + Sync + Send {
    async fn init(&mut self, request: InitRequest) -> anyhow::Result<InitResponse>;
    async fn warmup(&mut self) -> anyhow::Result<WarmupResponse>;
    async fn reload_environment(&mut self, request: EnvironmentReloadRequest) -> anyhow::Result<EnvironmentReloadResponse>;
    async fn load_function(&mut self, request: LoadFunctionRequest) -> anyhow::Result<LoadFunctionResponse>;
    async fn invoke(&mut self, request: InvocationRequest) -> anyhow::Result<InvocationResponse>;
    async fn status(&mut self) -> anyhow::Result<StatusResponse>;
    async fn terminate(&mut self) -> anyhow::Result<()>;
}

// https://stackoverflow.com/a/30353928
pub trait FunctionWorkerAPIClone {
    fn clone_box(&self) -> Box<dyn FunctionWorkerAPI>;
}
impl<T> FunctionWorkerAPIClone for T
where
    T: 'static + FunctionWorkerAPI + Clone,
{
    fn clone_box(&self) -> Box<dyn FunctionWorkerAPI> {
        Box::new(self.clone())
    }
}
impl Clone for Box<dyn FunctionWorkerAPI> {
    fn clone(&self) -> Box<dyn FunctionWorkerAPI> {
        self.clone_box()
    }
}
