// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

/// Failures of the load/resolve path.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum LoadError {
    NotFound(String),
    DuplicateConflict(String),
    MalformedMetadata(String),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            LoadError::NotFound(function_id) => write!(fmt, "function not found: {}", function_id),
            LoadError::DuplicateConflict(function_id) => {
                write!(fmt, "function loaded twice with conflicting signatures: {}", function_id)
            }
            LoadError::MalformedMetadata(detail) => write!(fmt, "malformed function metadata: {}", detail),
        }
    }
}

/// Failures when converting a wire value to a typed parameter.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ConversionError {
    TypeMismatch {
        parameter: String,
        expected: String,
        actual: String,
    },
    MalformedPayload {
        parameter: String,
        detail: String,
    },
}

impl std::fmt::Display for ConversionError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            ConversionError::TypeMismatch {
                parameter,
                expected,
                actual,
            } => write!(
                fmt,
                "no conversion to parameter '{}': expected {}, got {}",
                parameter, expected, actual
            ),
            ConversionError::MalformedPayload { parameter, detail } => {
                write!(fmt, "malformed payload for parameter '{}': {}", parameter, detail)
            }
        }
    }
}

/// Failures when converting a typed result back to the wire.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum SerializationError {
    Unsupported(String),
}

impl std::fmt::Display for SerializationError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            SerializationError::Unsupported(detail) => write!(fmt, "no result serializer applies: {}", detail),
        }
    }
}

/// Failures raised while running the invocation pipeline.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum InvocationFailure {
    CallableThrew(String),
    MiddlewareAborted(String),
}

impl std::fmt::Display for InvocationFailure {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            InvocationFailure::CallableThrew(detail) => write!(fmt, "callable raised an error: {}", detail),
            InvocationFailure::MiddlewareAborted(detail) => write!(fmt, "middleware aborted the invocation: {}", detail),
        }
    }
}

/// Any error a worker response can carry. All of these are recovered at the
/// request boundary; none terminates the worker process.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum WorkerError {
    Load(LoadError),
    Conversion(ConversionError),
    Serialization(SerializationError),
    Invocation(InvocationFailure),
    /// One-time pipeline construction failed; re-raised to every task that
    /// waited on the build.
    PipelineBuild(String),
    /// A lifecycle request arrived in a phase where it is not valid.
    LifecycleViolation(String),
}

impl std::fmt::Display for WorkerError {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            WorkerError::Load(err) => write!(fmt, "{}", err),
            WorkerError::Conversion(err) => write!(fmt, "{}", err),
            WorkerError::Serialization(err) => write!(fmt, "{}", err),
            WorkerError::Invocation(err) => write!(fmt, "{}", err),
            WorkerError::PipelineBuild(detail) => write!(fmt, "pipeline construction failed: {}", detail),
            WorkerError::LifecycleViolation(detail) => write!(fmt, "lifecycle violation: {}", detail),
        }
    }
}

impl From<LoadError> for WorkerError {
    fn from(err: LoadError) -> Self {
        WorkerError::Load(err)
    }
}

impl From<ConversionError> for WorkerError {
    fn from(err: ConversionError) -> Self {
        WorkerError::Conversion(err)
    }
}

impl From<SerializationError> for WorkerError {
    fn from(err: SerializationError) -> Self {
        WorkerError::Serialization(err)
    }
}

impl From<InvocationFailure> for WorkerError {
    fn from(err: InvocationFailure) -> Self {
        WorkerError::Invocation(err)
    }
}
