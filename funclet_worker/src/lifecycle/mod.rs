// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT
use crate::broker::FunctionBroker;
use crate::callable::{CallableHost, WorkerExtensions};
use funclet_api::common::WorkerError;
use funclet_api::worker::{
    EnvironmentReloadRequest, EnvironmentReloadResponse, FunctionWorkerAPI, InitRequest, InitResponse, InvocationOutcome, InvocationRequest,
    InvocationResponse, LifecyclePhase, LoadFunctionRequest, LoadFunctionResponse, StatusResponse, WarmupResponse, WorkerProperties,
};
use funclet_telemetry::telemetry_events::{TelemetryEvent, TelemetryHandleAPI};
use futures::{SinkExt, StreamExt};


/// Features reported to the host on initialization.
pub const WORKER_CAPABILITIES: [&str; 4] = ["TypedDataCollection", "ImplicitOutput", "EnvironmentReload", "WarmupInvocation"];

enum WorkerRequest {
    Init(InitRequest, futures::channel::oneshot::Sender<InitResponse>),
    Warmup(futures::channel::oneshot::Sender<WarmupResponse>),
    ReloadEnvironment(EnvironmentReloadRequest, futures::channel::oneshot::Sender<EnvironmentReloadResponse>),
    LoadFunction(LoadFunctionRequest, futures::channel::oneshot::Sender<LoadFunctionResponse>),
    Invoke(InvocationRequest, futures::channel::oneshot::Sender<InvocationResponse>),
    Status(futures::channel::oneshot::Sender<StatusResponse>),
    Terminate(futures::channel::oneshot::Sender<()>),
}

/// Cloneable client side of the worker; implements the protocol API by
/// forwarding to the task. Transports hold this behind the API trait.
#[derive(Clone)]
pub struct WorkerClient {
    sender: futures::channel::mpsc::UnboundedSender<WorkerRequest>,
}

/// Active component sequencing the worker through its life. Lifecycle
/// requests are handled inline (the host delivers them sequentially);
/// invocations are spawned so any number run concurrently.
pub struct WorkerTask {
    receiver: futures::channel::mpsc::UnboundedReceiver<WorkerRequest>,
    broker: std::sync::Arc<FunctionBroker>,
    phase: LifecyclePhase,
    worker_id: Option<uuid::Uuid>,
    started: tokio::time::Instant,
    inflight: tokio::task::JoinSet<()>,
    telemetry_handle: Box<dyn TelemetryHandleAPI>,
}

/// Entrypoint: split the worker into the cloneable client and the active
/// task to be run by the caller.
pub fn create(
    host: std::sync::Arc<dyn CallableHost>,
    extensions: std::sync::Arc<dyn WorkerExtensions>,
    telemetry_handle: Box<dyn TelemetryHandleAPI>,
) -> (WorkerClient, WorkerTask) {
    let (sender, receiver) = futures::channel::mpsc::unbounded();
    let mut telemetry_handle = telemetry_handle;
    let broker = std::sync::Arc::new(FunctionBroker::new(
        host,
        extensions,
        telemetry_handle.fork(std::collections::BTreeMap::new()),
    ));

    (
        WorkerClient { sender },
        WorkerTask {
            receiver,
            broker,
            phase: LifecyclePhase::Uninitialized,
            worker_id: None,
            started: tokio::time::Instant::now(),
            inflight: tokio::task::JoinSet::new(),
            telemetry_handle,
        },
    )
}

impl WorkerTask {
    pub async fn run(&mut self) {
        log::info!("Starting FUNCLET worker");
        while let Some(request) = self.receiver.next().await {
            // Reap invocation tasks that completed since the last request.
            while self.inflight.try_join_next().is_some() {}

            match request {
                WorkerRequest::Init(request, reply_sender) => {
                    let _ = reply_sender.send(self.handle_init(request));
                }
                WorkerRequest::Warmup(reply_sender) => {
                    let _ = reply_sender.send(self.handle_warmup().await);
                }
                WorkerRequest::ReloadEnvironment(request, reply_sender) => {
                    let _ = reply_sender.send(self.handle_reload_environment(request));
                }
                WorkerRequest::LoadFunction(request, reply_sender) => {
                    let _ = reply_sender.send(self.handle_load_function(request).await);
                }
                WorkerRequest::Invoke(request, reply_sender) => {
                    self.handle_invoke(request, reply_sender);
                }
                WorkerRequest::Status(reply_sender) => {
                    let _ = reply_sender.send(self.handle_status().await);
                }
                WorkerRequest::Terminate(reply_sender) => {
                    self.handle_terminate().await;
                    let _ = reply_sender.send(());
                    break;
                }
            }
        }
        log::info!("FUNCLET worker stopped");
    }

    fn handle_init(&mut self, request: InitRequest) -> InitResponse {
        if self.phase != LifecyclePhase::Uninitialized {
            return InitResponse::ResponseError(WorkerError::LifecycleViolation(format!("init received in phase {}", self.phase)));
        }
        if let Some(working_directory) = &request.working_directory {
            if let Err(err) = std::env::set_current_dir(working_directory) {
                log::warn!("could not change the working directory to {}: {}", working_directory.display(), err);
            }
        }
        self.worker_id = Some(request.worker_id);
        log::info!("initialized worker {} for host version {}", request.worker_id, request.host_version);
        self.transition(LifecyclePhase::Initialized);
        InitResponse::Accepted(WorkerProperties {
            worker_version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: WORKER_CAPABILITIES.iter().map(|capability| capability.to_string()).collect(),
        })
    }

    async fn handle_warmup(&mut self) -> WarmupResponse {
        if self.phase != LifecyclePhase::Initialized {
            return WarmupResponse::ResponseError(WorkerError::LifecycleViolation(format!("warmup received in phase {}", self.phase)));
        }
        match self.broker.warmup().await {
            Ok(()) => WarmupResponse::Completed,
            Err(err) => WarmupResponse::ResponseError(err),
        }
    }

    fn handle_reload_environment(&mut self, request: EnvironmentReloadRequest) -> EnvironmentReloadResponse {
        match self.phase {
            LifecyclePhase::Initialized => {
                for (key, value) in &request.environment_variables {
                    std::env::set_var(key, value);
                }
                if let Some(working_directory) = &request.working_directory {
                    if let Err(err) = std::env::set_current_dir(working_directory) {
                        log::warn!("could not change the working directory to {}: {}", working_directory.display(), err);
                    }
                }
                log::info!("environment specialized with {} variables", request.environment_variables.len());
                self.transition(LifecyclePhase::EnvironmentSpecialized);
                EnvironmentReloadResponse::Specialized { restart_requested: false }
            }
            LifecyclePhase::EnvironmentSpecialized | LifecyclePhase::FunctionsLoaded | LifecyclePhase::Executing => {
                // Re-specializing a live worker needs a full process restart,
                // which is the host's job.
                EnvironmentReloadResponse::Specialized { restart_requested: true }
            }
            phase => EnvironmentReloadResponse::ResponseError(WorkerError::LifecycleViolation(format!(
                "environment reload received in phase {}",
                phase
            ))),
        }
    }

    async fn handle_load_function(&mut self, request: LoadFunctionRequest) -> LoadFunctionResponse {
        match self.phase {
            LifecyclePhase::EnvironmentSpecialized | LifecyclePhase::FunctionsLoaded | LifecyclePhase::Executing => {
                let function_id = request.metadata.function_id.clone();
                match self.broker.load_function(request.metadata).await {
                    Ok(()) => {
                        if self.phase == LifecyclePhase::EnvironmentSpecialized {
                            self.transition(LifecyclePhase::FunctionsLoaded);
                        }
                        LoadFunctionResponse::Accepted(function_id)
                    }
                    Err(err) => LoadFunctionResponse::ResponseError(err),
                }
            }
            phase => LoadFunctionResponse::ResponseError(WorkerError::LifecycleViolation(format!("load received in phase {}", phase))),
        }
    }

    fn handle_invoke(&mut self, request: InvocationRequest, reply_sender: futures::channel::oneshot::Sender<InvocationResponse>) {
        match self.phase {
            LifecyclePhase::EnvironmentSpecialized | LifecyclePhase::FunctionsLoaded | LifecyclePhase::Executing => {
                if self.phase == LifecyclePhase::FunctionsLoaded {
                    self.transition(LifecyclePhase::Executing);
                }
                let broker = self.broker.clone();
                self.inflight.spawn(async move {
                    let response = broker.invoke(request).await;
                    let _ = reply_sender.send(response);
                });
            }
            phase => {
                let _ = reply_sender.send(InvocationResponse {
                    invocation_id: request.invocation_id,
                    outcome: InvocationOutcome::Failure(WorkerError::LifecycleViolation(format!("invocation received in phase {}", phase))),
                });
            }
        }
    }

    async fn handle_status(&mut self) -> StatusResponse {
        StatusResponse {
            phase: self.phase,
            loaded_functions: self.broker.loaded_functions().await as u32,
            inflight_invocations: self.inflight.len() as u32,
            uptime: self.started.elapsed(),
        }
    }

    async fn handle_terminate(&mut self) {
        log::info!(
            "terminate received for worker {}, draining {} in-flight invocations",
            self.worker_id.map(|id| id.to_string()).unwrap_or_else(|| "<uninitialized>".to_string()),
            self.inflight.len()
        );
        while self.inflight.join_next().await.is_some() {}
        self.transition(LifecyclePhase::Terminated);
    }

    fn transition(&mut self, phase: LifecyclePhase) {
        log::debug!("lifecycle transition {} -> {}", self.phase, phase);
        self.phase = phase;
        self.telemetry_handle
            .observe(TelemetryEvent::LifecycleTransition(phase.to_string()), std::collections::BTreeMap::new());
    }
}

#[async_trait::async_trait]
impl FunctionWorkerAPI for WorkerClient {
    async fn init(&mut self, request: InitRequest) -> anyhow::Result<InitResponse> {
        let (reply_sender, reply_receiver) = futures::channel::oneshot::channel();
        match self.sender.send(WorkerRequest::Init(request, reply_sender)).await {
            Ok(_) => reply_receiver.await.map_err(|_| anyhow::anyhow!("Worker Channel Error")),
            Err(_) => Err(anyhow::anyhow!("Worker Channel Error")),
        }
    }

    async fn warmup(&mut self) -> anyhow::Result<WarmupResponse> {
        let (reply_sender, reply_receiver) = futures::channel::oneshot::channel();
        match self.sender.send(WorkerRequest::Warmup(reply_sender)).await {
            Ok(_) => reply_receiver.await.map_err(|_| anyhow::anyhow!("Worker Channel Error")),
            Err(_) => Err(anyhow::anyhow!("Worker Channel Error")),
        }
    }

    async fn reload_environment(&mut self, request: EnvironmentReloadRequest) -> anyhow::Result<EnvironmentReloadResponse> {
        let (reply_sender, reply_receiver) = futures::channel::oneshot::channel();
        match self.sender.send(WorkerRequest::ReloadEnvironment(request, reply_sender)).await {
            Ok(_) => reply_receiver.await.map_err(|_| anyhow::anyhow!("Worker Channel Error")),
            Err(_) => Err(anyhow::anyhow!("Worker Channel Error")),
        }
    }

    async fn load_function(&mut self, request: LoadFunctionRequest) -> anyhow::Result<LoadFunctionResponse> {
        let (reply_sender, reply_receiver) = futures::channel::oneshot::channel();
        match self.sender.send(WorkerRequest::LoadFunction(request, reply_sender)).await {
            Ok(_) => reply_receiver.await.map_err(|_| anyhow::anyhow!("Worker Channel Error")),
            Err(_) => Err(anyhow::anyhow!("Worker Channel Error")),
        }
    }

    async fn invoke(&mut self, request: InvocationRequest) -> anyhow::Result<InvocationResponse> {
        let (reply_sender, reply_receiver) = futures::channel::oneshot::channel();
        match self.sender.send(WorkerRequest::Invoke(request, reply_sender)).await {
            Ok(_) => reply_receiver.await.map_err(|_| anyhow::anyhow!("Worker Channel Error")),
            Err(_) => Err(anyhow::anyhow!("Worker Channel Error")),
        }
    }

    async fn status(&mut self) -> anyhow::Result<StatusResponse> {
        let (reply_sender, reply_receiver) = futures::channel::oneshot::channel();
        match self.sender.send(WorkerRequest::Status(reply_sender)).await {
            Ok(_) => reply_receiver.await.map_err(|_| anyhow::anyhow!("Worker Channel Error")),
            Err(_) => Err(anyhow::anyhow!("Worker Channel Error")),
        }
    }

    async fn terminate(&mut self) -> anyhow::Result<()> {
        let (reply_sender, reply_receiver) = futures::channel::oneshot::channel();
        match self.sender.send(WorkerRequest::Terminate(reply_sender)).await {
            Ok(_) => reply_receiver.await.map_err(|_| anyhow::anyhow!("Worker Channel Error")),
            Err(_) => Err(anyhow::anyhow!("Worker Channel Error")),
        }
    }
}
