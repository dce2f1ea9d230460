// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT
use funclet_api::typed_value::{NamedTypedValue, TypedValue};
use funclet_api::worker::{InvocationOutcome, InvocationRequest, InvocationResponse, RetryContext, TraceContext};

/// Per-invocation scoped state: wire inputs, converted outputs, trace/retry
/// metadata and the result slot. Created fresh for every invocation, owned
/// exclusively by the task running it, discarded after the response is sent.
pub struct ExecutionContext {
    invocation_id: uuid::Uuid,
    function_id: String,
    inputs: Vec<NamedTypedValue>,
    outputs: Vec<NamedTypedValue>,
    trace_context: TraceContext,
    retry_context: RetryContext,
    result: Option<TypedValue>,
}

impl ExecutionContext {
    pub fn new(request: &InvocationRequest) -> Self {
        Self {
            invocation_id: request.invocation_id,
            function_id: request.function_id.clone(),
            inputs: request.inputs.clone(),
            outputs: vec![],
            trace_context: request.trace_context.clone(),
            retry_context: request.retry_context.clone(),
            result: None,
        }
    }

    pub fn invocation_id(&self) -> uuid::Uuid {
        self.invocation_id
    }

    pub fn function_id(&self) -> &str {
        &self.function_id
    }

    pub fn inputs(&self) -> &[NamedTypedValue] {
        &self.inputs
    }

    pub fn input(&self, name: &str) -> Option<&TypedValue> {
        self.inputs.iter().find(|input| input.name == name).map(|input| &input.value)
    }

    pub fn outputs(&self) -> &[NamedTypedValue] {
        &self.outputs
    }

    /// Record an output binding value; a later write to the same name wins.
    pub fn set_output(&mut self, name: &str, value: TypedValue) {
        if let Some(existing) = self.outputs.iter_mut().find(|output| output.name == name) {
            existing.value = value;
        } else {
            self.outputs.push(NamedTypedValue::new(name, value));
        }
    }

    pub fn trace_context(&self) -> &TraceContext {
        &self.trace_context
    }

    pub fn retry_context(&self) -> &RetryContext {
        &self.retry_context
    }

    pub fn result(&self) -> Option<&TypedValue> {
        self.result.as_ref()
    }

    pub fn set_result(&mut self, value: TypedValue) {
        self.result = Some(value);
    }

    pub fn into_response(self) -> InvocationResponse {
        InvocationResponse {
            invocation_id: self.invocation_id,
            outcome: InvocationOutcome::Success {
                result: self.result,
                outputs: self.outputs,
            },
        }
    }
}
