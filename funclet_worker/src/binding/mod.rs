// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT
use base64::Engine;
use funclet_api::common::{ConversionError, SerializationError};
use funclet_api::function::{Direction, FunctionSignature, ParameterType};
use funclet_api::typed_value::{NamedTypedValue, TypedValue};

#[cfg(test)]
pub mod test;

/// Strongly-typed value handed to (and returned by) a callable unit, after
/// resolution against the declared parameter type.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedValue {
    Unit,
    String(String),
    Bytes(Vec<u8>),
    Int(i64),
    Double(f64),
    Bool(bool),
    Uuid(uuid::Uuid),
    Timestamp(chrono::DateTime<chrono::Utc>),
    /// Structurally-deserialized JSON or user-defined composite value.
    Json(serde_json::Value),
    Collection(Vec<ResolvedValue>),
}

impl ResolvedValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ResolvedValue::Unit => "unit",
            ResolvedValue::String(_) => "string",
            ResolvedValue::Bytes(_) => "bytes",
            ResolvedValue::Int(_) => "int",
            ResolvedValue::Double(_) => "double",
            ResolvedValue::Bool(_) => "bool",
            ResolvedValue::Uuid(_) => "uuid",
            ResolvedValue::Timestamp(_) => "timestamp",
            ResolvedValue::Json(_) => "json",
            ResolvedValue::Collection(_) => "collection",
        }
    }
}

/// One argument bound for a callable invocation, in signature order.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParameter {
    pub name: String,
    pub value: ResolvedValue,
}

/// Convert a wire value to the declared parameter type. Strategies are tried
/// in a fixed order: direct representation match, well-known conversions
/// (uuid, numeric, timestamp, bool), structural JSON deserialization, then
/// collections with the same strategies applied per element.
pub fn to_parameter(parameter: &str, value: &TypedValue, target: &ParameterType) -> Result<ResolvedValue, ConversionError> {
    match (value, target) {
        // Direct representation matches.
        (TypedValue::String(val), ParameterType::String) => Ok(ResolvedValue::String(val.clone())),
        (TypedValue::Bytes(val), ParameterType::Bytes) => Ok(ResolvedValue::Bytes(val.clone())),
        (TypedValue::Int(val), ParameterType::Int) => Ok(ResolvedValue::Int(*val)),
        (TypedValue::Double(val), ParameterType::Double) => Ok(ResolvedValue::Double(*val)),
        // Well-known conversions from strings and numeric widening.
        (TypedValue::String(val), ParameterType::Uuid) => match uuid::Uuid::parse_str(val) {
            Ok(parsed) => Ok(ResolvedValue::Uuid(parsed)),
            Err(err) => Err(malformed(parameter, &err.to_string())),
        },
        (TypedValue::String(val), ParameterType::Timestamp) => match chrono::DateTime::parse_from_rfc3339(val) {
            Ok(parsed) => Ok(ResolvedValue::Timestamp(parsed.with_timezone(&chrono::Utc))),
            Err(err) => Err(malformed(parameter, &err.to_string())),
        },
        (TypedValue::String(val), ParameterType::Int) => match val.parse::<i64>() {
            Ok(parsed) => Ok(ResolvedValue::Int(parsed)),
            Err(err) => Err(malformed(parameter, &err.to_string())),
        },
        (TypedValue::String(val), ParameterType::Double) => match val.parse::<f64>() {
            Ok(parsed) => Ok(ResolvedValue::Double(parsed)),
            Err(err) => Err(malformed(parameter, &err.to_string())),
        },
        (TypedValue::String(val), ParameterType::Bool) => match val.parse::<bool>() {
            Ok(parsed) => Ok(ResolvedValue::Bool(parsed)),
            Err(err) => Err(malformed(parameter, &err.to_string())),
        },
        (TypedValue::Int(val), ParameterType::Double) => Ok(ResolvedValue::Double(*val as f64)),
        // Structured payloads resolve via generic JSON deserialization; this
        // is what keeps the worker agnostic to user-defined types.
        (TypedValue::Json(text), ParameterType::Json | ParameterType::Composite(_)) => parse_json(parameter, text),
        (TypedValue::String(text), ParameterType::Json | ParameterType::Composite(_)) => parse_json(parameter, text),
        // Collections, element-wise with the element's declared type.
        (TypedValue::Collection(elements), ParameterType::Collection(element_type)) => Ok(ResolvedValue::Collection(
            elements
                .iter()
                .map(|element| to_parameter(parameter, element, element_type))
                .collect::<Result<Vec<_>, _>>()?,
        )),
        (value, target) => Err(ConversionError::TypeMismatch {
            parameter: parameter.to_string(),
            expected: target.to_string(),
            actual: value.kind().to_string(),
        }),
    }
}

/// Convert a callable's typed result back to the wire representation,
/// driven by the declared return/binding type.
pub fn from_result(value: &ResolvedValue, declared: &ParameterType) -> Result<TypedValue, SerializationError> {
    match (value, declared) {
        (_, ParameterType::Void) => Ok(TypedValue::None),
        (ResolvedValue::String(val), ParameterType::String) => Ok(TypedValue::String(val.clone())),
        (ResolvedValue::Bytes(val), ParameterType::Bytes) => Ok(TypedValue::Bytes(val.clone())),
        (ResolvedValue::Int(val), ParameterType::Int) => Ok(TypedValue::Int(*val)),
        (ResolvedValue::Int(val), ParameterType::Double) => Ok(TypedValue::Double(*val as f64)),
        (ResolvedValue::Double(val), ParameterType::Double) => Ok(TypedValue::Double(*val)),
        (ResolvedValue::Bool(val), ParameterType::Bool) => Ok(TypedValue::Json(val.to_string())),
        (ResolvedValue::Uuid(val), ParameterType::Uuid) => Ok(TypedValue::String(val.to_string())),
        (ResolvedValue::Uuid(val), ParameterType::String) => Ok(TypedValue::String(val.to_string())),
        (ResolvedValue::Timestamp(val), ParameterType::Timestamp) => Ok(TypedValue::String(val.to_rfc3339())),
        (ResolvedValue::Timestamp(val), ParameterType::String) => Ok(TypedValue::String(val.to_rfc3339())),
        (ResolvedValue::Json(val), ParameterType::Json | ParameterType::Composite(_)) => match serde_json::to_string(val) {
            Ok(text) => Ok(TypedValue::Json(text)),
            Err(err) => Err(SerializationError::Unsupported(err.to_string())),
        },
        (ResolvedValue::Collection(elements), ParameterType::Collection(element_type)) => Ok(TypedValue::Collection(
            elements
                .iter()
                .map(|element| from_result(element, element_type))
                .collect::<Result<Vec<_>, _>>()?,
        )),
        (value, declared) => Err(SerializationError::Unsupported(format!(
            "cannot serialize a {} result as {}",
            value.kind(),
            declared
        ))),
    }
}

/// Bind the wire inputs of one invocation onto the ordered parameter
/// signature. Output-only parameters receive a unit placeholder; their
/// values come back through the callable outcome.
pub fn resolve_parameters(signature: &FunctionSignature, inputs: &[NamedTypedValue]) -> Result<Vec<BoundParameter>, ConversionError> {
    let mut bound = Vec::with_capacity(signature.parameters.len());
    for binding in &signature.parameters {
        let value = match binding.direction {
            Direction::Out => ResolvedValue::Unit,
            Direction::In | Direction::InOut => {
                let input = inputs.iter().find(|input| input.name == binding.name);
                match input {
                    Some(input) => to_parameter(&binding.name, &input.value, &binding.declared_type)?,
                    None => {
                        return Err(ConversionError::TypeMismatch {
                            parameter: binding.name.clone(),
                            expected: binding.declared_type.to_string(),
                            actual: "absent".to_string(),
                        })
                    }
                }
            }
        };
        bound.push(BoundParameter {
            name: binding.name.clone(),
            value,
        });
    }
    Ok(bound)
}

/// Project a wire value into a plain JSON value, used when aggregating
/// implicit-output bindings into a single result document.
pub fn typed_value_to_json(value: &TypedValue) -> Result<serde_json::Value, SerializationError> {
    match value {
        TypedValue::None => Ok(serde_json::Value::Null),
        TypedValue::String(val) => Ok(serde_json::Value::String(val.clone())),
        TypedValue::Bytes(val) => Ok(serde_json::Value::String(
            base64::engine::general_purpose::STANDARD.encode(val),
        )),
        TypedValue::Json(text) => match serde_json::from_str(text) {
            Ok(parsed) => Ok(parsed),
            Err(err) => Err(SerializationError::Unsupported(err.to_string())),
        },
        TypedValue::Int(val) => Ok(serde_json::Value::Number((*val).into())),
        TypedValue::Double(val) => match serde_json::Number::from_f64(*val) {
            Some(number) => Ok(serde_json::Value::Number(number)),
            None => Err(SerializationError::Unsupported("non-finite double".to_string())),
        },
        TypedValue::Collection(elements) => Ok(serde_json::Value::Array(
            elements.iter().map(typed_value_to_json).collect::<Result<Vec<_>, _>>()?,
        )),
    }
}

fn parse_json(parameter: &str, text: &str) -> Result<ResolvedValue, ConversionError> {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(parsed) => Ok(ResolvedValue::Json(parsed)),
        Err(err) => Err(malformed(parameter, &err.to_string())),
    }
}

fn malformed(parameter: &str, detail: &str) -> ConversionError {
    ConversionError::MalformedPayload {
        parameter: parameter.to_string(),
        detail: detail.to_string(),
    }
}
