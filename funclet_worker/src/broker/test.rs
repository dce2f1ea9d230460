// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT
use super::*;
use crate::binding::BoundParameter;
use crate::pipeline::InvocationMiddleware;
use funclet_api::common::ConversionError;

struct MockTelemetryHandle {
    sender: std::sync::mpsc::Sender<(TelemetryEvent, std::collections::BTreeMap<String, String>)>,
}

impl TelemetryHandleAPI for MockTelemetryHandle {
    fn observe(&mut self, event: TelemetryEvent, event_tags: std::collections::BTreeMap<String, String>) {
        // The receiving side may be gone in tests that do not care.
        let _ = self.sender.send((event, event_tags));
    }
    fn fork(&mut self, _child_tags: std::collections::BTreeMap<String, String>) -> Box<dyn TelemetryHandleAPI> {
        Box::new(MockTelemetryHandle {
            sender: self.sender.clone(),
        })
    }
}

/// Host whose signatures and behavior depend on the callable's entry point.
struct MockHost {}

#[async_trait::async_trait]
impl CallableHost for MockHost {
    fn inspect_signature(&self, function_id: &str, callable: &CallableRef) -> anyhow::Result<FunctionSignature> {
        match callable.entry_point.as_str() {
            "process" => Ok(FunctionSignature::new(
                function_id,
                vec![ParameterBinding::input("name", ParameterType::String)],
                ParameterType::String,
            )),
            "pair" => Ok(FunctionSignature::new(
                function_id,
                vec![
                    ParameterBinding::input("first", ParameterType::String),
                    ParameterBinding::input("second", ParameterType::String),
                ],
                ParameterType::String,
            )),
            other => anyhow::bail!("cannot inspect callable '{}'", other),
        }
    }

    async fn invoke(&self, _instance: &InstanceRef, callable: &CallableRef, args: Vec<BoundParameter>) -> anyhow::Result<CallableOutcome> {
        match callable.entry_point.as_str() {
            "process" => {
                let name = match args.first() {
                    Some(BoundParameter {
                        value: ResolvedValue::String(val),
                        ..
                    }) => val.clone(),
                    _ => anyhow::bail!("missing input"),
                };
                Ok(CallableOutcome::of(ResolvedValue::String(format!("{}-processed", name))))
            }
            other => anyhow::bail!("unknown callable '{}'", other),
        }
    }
}

/// Counts how many times middleware discovery ran, i.e. how many pipeline
/// builds actually executed.
struct CountingExtensions {
    builds: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    fail: bool,
}

impl crate::callable::WorkerExtensions for CountingExtensions {
    fn discover_middleware(&self) -> anyhow::Result<Vec<std::sync::Arc<dyn InvocationMiddleware>>> {
        self.builds.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("extension discovery broke");
        }
        Ok(vec![])
    }

    fn provisioning_strategy(&self) -> std::sync::Arc<dyn crate::callable::ProvisioningStrategy> {
        std::sync::Arc::new(crate::builtin_host::OnDemandProvisioning {})
    }
}

fn new_broker(fail_builds: bool) -> (std::sync::Arc<FunctionBroker>, std::sync::Arc<std::sync::atomic::AtomicUsize>) {
    let builds = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let (telemetry_sender, _) = std::sync::mpsc::channel();
    let broker = FunctionBroker::new(
        std::sync::Arc::new(MockHost {}),
        std::sync::Arc::new(CountingExtensions {
            builds: builds.clone(),
            fail: fail_builds,
        }),
        Box::new(MockTelemetryHandle { sender: telemetry_sender }),
    );
    (std::sync::Arc::new(broker), builds)
}

fn metadata(function_id: &str, entry_point: &str) -> FunctionMetadata {
    FunctionMetadata {
        function_id: function_id.to_string(),
        name: format!("{}-name", function_id),
        callable: CallableRef::new("mock", entry_point),
        annotations: std::collections::HashMap::new(),
    }
}

#[tokio::test]
async fn test_load_and_resolve() {
    let (broker, _) = new_broker(false);

    broker.load_function(metadata("f1", "process")).await.unwrap();
    broker.load_function(metadata("f2", "pair")).await.unwrap();
    assert_eq!(broker.loaded_functions().await, 2);

    let entry = broker.resolve("f1").await.unwrap();
    assert_eq!(entry.signature.function_id, "f1");
    assert_eq!(entry.signature.parameters.len(), 1);

    match broker.resolve("ghost").await {
        Err(WorkerError::Load(LoadError::NotFound(id))) => assert_eq!(id, "ghost"),
        other => panic!("unexpected resolution: {:?}", other.map(|entry| entry.signature.function_id.clone())),
    }
}

#[tokio::test]
async fn test_load_idempotent_and_conflicting() {
    let (broker, _) = new_broker(false);

    broker.load_function(metadata("f1", "process")).await.unwrap();
    // Identical metadata: idempotent, still one entry.
    broker.load_function(metadata("f1", "process")).await.unwrap();
    assert_eq!(broker.loaded_functions().await, 1);

    // Same id, different signature.
    match broker.load_function(metadata("f1", "pair")).await {
        Err(WorkerError::Load(LoadError::DuplicateConflict(id))) => assert_eq!(id, "f1"),
        other => panic!("unexpected load outcome: {:?}", other),
    }
    assert_eq!(broker.loaded_functions().await, 1);
}

#[tokio::test]
async fn test_load_malformed_metadata() {
    let (broker, _) = new_broker(false);

    match broker.load_function(metadata("", "process")).await {
        Err(WorkerError::Load(LoadError::MalformedMetadata(_))) => {}
        other => panic!("unexpected load outcome: {:?}", other),
    }
    // The host cannot inspect this callable.
    match broker.load_function(metadata("f1", "missing")).await {
        Err(WorkerError::Load(LoadError::MalformedMetadata(_))) => {}
        other => panic!("unexpected load outcome: {:?}", other),
    }
    assert_eq!(broker.loaded_functions().await, 0);
}

#[tokio::test]
async fn test_pipeline_built_exactly_once_under_races() {
    let (broker, builds) = new_broker(false);
    broker.load_function(metadata("f1", "process")).await.unwrap();

    let mut handles = vec![];
    for i in 0..16 {
        let broker = broker.clone();
        handles.push(tokio::spawn(async move {
            broker
                .invoke(InvocationRequest::new(
                    "f1",
                    vec![NamedTypedValue::new("name", TypedValue::String(format!("input-{}", i)))],
                ))
                .await
        }));
    }
    for handle in handles {
        let response = handle.await.unwrap();
        assert!(matches!(response.outcome, InvocationOutcome::Success { .. }));
    }

    assert_eq!(builds.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_pipeline_build_failure_raised_to_every_waiter() {
    let (broker, builds) = new_broker(true);
    broker.load_function(metadata("f1", "process")).await.unwrap();

    let mut handles = vec![];
    for _ in 0..8 {
        let broker = broker.clone();
        handles.push(tokio::spawn(async move {
            broker
                .invoke(InvocationRequest::new(
                    "f1",
                    vec![NamedTypedValue::new("name", TypedValue::String("abc".to_string()))],
                ))
                .await
        }));
    }
    for handle in handles {
        let response = handle.await.unwrap();
        match response.outcome {
            InvocationOutcome::Failure(WorkerError::PipelineBuild(_)) => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    // The failed build is cached: a later invocation sees the same failure
    // without a new build attempt.
    let response = broker
        .invoke(InvocationRequest::new(
            "f1",
            vec![NamedTypedValue::new("name", TypedValue::String("abc".to_string()))],
        ))
        .await;
    assert!(matches!(response.outcome, InvocationOutcome::Failure(WorkerError::PipelineBuild(_))));
    assert_eq!(builds.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invoke_success_and_correlation() {
    let (broker, _) = new_broker(false);
    broker.load_function(metadata("f1", "process")).await.unwrap();

    let request = InvocationRequest::new("f1", vec![NamedTypedValue::new("name", TypedValue::String("abc".to_string()))]);
    let invocation_id = request.invocation_id;
    let response = broker.invoke(request).await;

    assert_eq!(response.invocation_id, invocation_id);
    match response.outcome {
        InvocationOutcome::Success { result, outputs } => {
            assert_eq!(result, Some(TypedValue::String("abc-processed".to_string())));
            assert!(outputs.is_empty());
        }
        InvocationOutcome::Failure(err) => panic!("unexpected failure: {}", err),
    }
}

#[tokio::test]
async fn test_invoke_unknown_function() {
    let (broker, _) = new_broker(false);
    let response = broker
        .invoke(InvocationRequest::new(
            "ghost",
            vec![NamedTypedValue::new("name", TypedValue::String("abc".to_string()))],
        ))
        .await;
    match response.outcome {
        InvocationOutcome::Failure(WorkerError::Load(LoadError::NotFound(id))) => assert_eq!(id, "ghost"),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_type_mismatch_leaves_registry_usable() {
    let (broker, _) = new_broker(false);
    broker.load_function(metadata("f1", "process")).await.unwrap();

    let response = broker
        .invoke(InvocationRequest::new("f1", vec![NamedTypedValue::new("name", TypedValue::Int(123))]))
        .await;
    match response.outcome {
        InvocationOutcome::Failure(WorkerError::Conversion(ConversionError::TypeMismatch { .. })) => {}
        other => panic!("unexpected outcome: {:?}", other),
    }

    // Registry and pipeline are untouched by the failed invocation.
    let response = broker
        .invoke(InvocationRequest::new(
            "f1",
            vec![NamedTypedValue::new("name", TypedValue::String("abc".to_string()))],
        ))
        .await;
    assert!(matches!(response.outcome, InvocationOutcome::Success { .. }));
}

#[tokio::test]
async fn test_warmup_registers_nothing() {
    let (broker, _) = new_broker(false);
    broker.warmup().await.unwrap();
    assert_eq!(broker.loaded_functions().await, 0);
}

#[tokio::test]
async fn test_invocation_telemetry_tagged_with_function_id() {
    let builds = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let (telemetry_sender, telemetry_receiver) = std::sync::mpsc::channel();
    let broker = std::sync::Arc::new(FunctionBroker::new(
        std::sync::Arc::new(MockHost {}),
        std::sync::Arc::new(CountingExtensions { builds, fail: false }),
        Box::new(MockTelemetryHandle { sender: telemetry_sender }),
    ));
    broker.load_function(metadata("f1", "process")).await.unwrap();
    let _ = broker
        .invoke(InvocationRequest::new(
            "f1",
            vec![NamedTypedValue::new("name", TypedValue::String("abc".to_string()))],
        ))
        .await;

    let mut saw_completion = false;
    while let Ok((event, tags)) = telemetry_receiver.try_recv() {
        if matches!(event, TelemetryEvent::InvocationCompleted(_)) {
            assert_eq!(tags.get("FUNCTION_ID"), Some(&"f1".to_string()));
            saw_completion = true;
        }
    }
    assert!(saw_completion);
}
