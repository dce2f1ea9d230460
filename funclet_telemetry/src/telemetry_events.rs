// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

#[derive(Debug)]
pub enum TelemetryEvent {
    FunctionLoaded(std::time::Duration),
    PipelineBuilt(std::time::Duration),
    InvocationCompleted(std::time::Duration),
    InvocationFailed(std::time::Duration),
    LifecycleTransition(String),
}

/// Sink for telemetry events; implementations merge their own tags with the
/// per-event tags. Forking creates a child handle with additional tags.
pub trait TelemetryHandleAPI: Send {
    fn observe(&mut self, event: TelemetryEvent, event_tags: std::collections::BTreeMap<String, String>);
    fn fork(&mut self, child_tags: std::collections::BTreeMap<String, String>) -> Box<dyn TelemetryHandleAPI>;
}

#[derive(Clone)]
pub struct TelemetryHandle {
    handle_tags: std::collections::BTreeMap<String, String>,
    sender: tokio::sync::mpsc::UnboundedSender<TelemetryProcessorInput>,
}

impl TelemetryHandleAPI for TelemetryHandle {
    fn observe(&mut self, event: TelemetryEvent, event_tags: std::collections::BTreeMap<String, String>) {
        let mut event_tags = event_tags;
        let mut merged_tags = self.handle_tags.clone();
        merged_tags.append(&mut event_tags);

        // The processor may already be gone during shutdown; late events are dropped.
        let _ = self.sender.send(TelemetryProcessorInput::TelemetryEvent(event, merged_tags));
    }

    fn fork(&mut self, child_tags: std::collections::BTreeMap<String, String>) -> Box<dyn TelemetryHandleAPI> {
        let mut child_tags = child_tags;
        let mut merged_tags = self.handle_tags.clone();
        merged_tags.append(&mut child_tags);
        Box::new(TelemetryHandle {
            handle_tags: merged_tags,
            sender: self.sender.clone(),
        })
    }
}

#[derive(PartialEq, Eq, Debug)]
pub enum TelemetryProcessingResult {
    PASSED,
    PROCESSED,
    FINAL,
}

#[derive(Debug)]
enum TelemetryProcessorInput {
    TelemetryEvent(TelemetryEvent, std::collections::BTreeMap<String, String>),
}

pub trait EventProcessor: Sync + Send {
    fn handle(&mut self, event: &TelemetryEvent, event_tags: &std::collections::BTreeMap<String, String>) -> TelemetryProcessingResult;
}

struct EventLogger {}

impl EventProcessor for EventLogger {
    fn handle(&mut self, event: &TelemetryEvent, event_tags: &std::collections::BTreeMap<String, String>) -> TelemetryProcessingResult {
        log::info!("Event: {:?} , tags: {:?}", event, event_tags);
        TelemetryProcessingResult::PROCESSED
    }
}

struct TelemetryProcessorInner {
    processing_chain: Vec<Box<dyn EventProcessor>>,
    receiver: tokio::sync::mpsc::UnboundedReceiver<TelemetryProcessorInput>,
}

impl TelemetryProcessorInner {
    async fn run(&mut self) {
        while let Some(val) = self.receiver.recv().await {
            match val {
                TelemetryProcessorInput::TelemetryEvent(event, event_tags) => {
                    self.handle_event(event, event_tags).await;
                }
            }
        }
    }

    async fn handle_event(&mut self, event: TelemetryEvent, event_tags: std::collections::BTreeMap<String, String>) {
        for processor in &mut self.processing_chain {
            let processing_result = processor.handle(&event, &event_tags);
            if processing_result == TelemetryProcessingResult::FINAL {
                break;
            }
        }
    }
}

pub struct TelemetryProcessor {
    sender: tokio::sync::mpsc::UnboundedSender<TelemetryProcessorInput>,
}

impl TelemetryProcessor {
    pub fn new() -> Self {
        Self::with_processors(vec![Box::new(EventLogger {})])
    }

    /// Custom processing chain; processors run in order until one returns FINAL.
    pub fn with_processors(processing_chain: Vec<Box<dyn EventProcessor>>) -> Self {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel::<TelemetryProcessorInput>();

        let inner = TelemetryProcessorInner {
            processing_chain,
            receiver,
        };

        tokio::spawn(async move {
            let mut inner = inner;
            inner.run().await;
        });

        Self { sender }
    }

    pub fn get_handle(&self, handle_tags: std::collections::BTreeMap<String, String>) -> TelemetryHandle {
        TelemetryHandle {
            handle_tags,
            sender: self.sender.clone(),
        }
    }
}

impl Default for TelemetryProcessor {
    fn default() -> Self {
        Self::new()
    }
}
