// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

/// Declared type of a parameter or return slot.
/// Drives the conversion strategy from and to the wire representation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ParameterType {
    Void,
    String,
    Bytes,
    Int,
    Double,
    Bool,
    Uuid,
    Timestamp,
    Json,
    /// User-defined composite type, resolved structurally via JSON.
    Composite(String),
    Collection(Box<ParameterType>),
}

impl std::fmt::Display for ParameterType {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            ParameterType::Void => write!(fmt, "void"),
            ParameterType::String => write!(fmt, "string"),
            ParameterType::Bytes => write!(fmt, "bytes"),
            ParameterType::Int => write!(fmt, "int"),
            ParameterType::Double => write!(fmt, "double"),
            ParameterType::Bool => write!(fmt, "bool"),
            ParameterType::Uuid => write!(fmt, "uuid"),
            ParameterType::Timestamp => write!(fmt, "timestamp"),
            ParameterType::Json => write!(fmt, "json"),
            ParameterType::Composite(name) => write!(fmt, "composite<{}>", name),
            ParameterType::Collection(element) => write!(fmt, "collection<{}>", element),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Direction {
    In,
    Out,
    InOut,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParameterBinding {
    pub name: String,
    pub declared_type: ParameterType,
    pub direction: Direction,
    /// Marks a parameter that can carry a result even when the function
    /// declares no return value.
    pub implicit_output: bool,
}

impl ParameterBinding {
    pub fn input(name: &str, declared_type: ParameterType) -> Self {
        Self {
            name: name.to_string(),
            declared_type,
            direction: Direction::In,
            implicit_output: false,
        }
    }

    pub fn output(name: &str, declared_type: ParameterType) -> Self {
        Self {
            name: name.to_string(),
            declared_type,
            direction: Direction::Out,
            implicit_output: false,
        }
    }

    pub fn implicit_output(name: &str, declared_type: ParameterType) -> Self {
        Self {
            name: name.to_string(),
            declared_type,
            direction: Direction::Out,
            implicit_output: true,
        }
    }
}

/// Ordered parameter signature of a loaded function.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionSignature {
    pub function_id: String,
    pub parameters: Vec<ParameterBinding>,
    pub return_type: ParameterType,
    has_implicit_output: bool,
}

impl FunctionSignature {
    pub fn new(function_id: &str, parameters: Vec<ParameterBinding>, return_type: ParameterType) -> Self {
        let has_implicit_output = parameters.iter().any(|param| param.implicit_output);
        Self {
            function_id: function_id.to_string(),
            parameters,
            return_type,
            has_implicit_output,
        }
    }

    pub fn has_implicit_output(&self) -> bool {
        self.has_implicit_output
    }

    pub fn has_non_void_return_type(&self) -> bool {
        self.return_type != ParameterType::Void
    }

    /// A function with a void return type is still allowed to send back data
    /// through its implicit-output bindings.
    pub fn has_effective_return_type(&self) -> bool {
        self.has_non_void_return_type() || self.has_implicit_output()
    }
}

/// Opaque name of a loadable callable unit; resolution is owned by the
/// surrounding system's callable host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct CallableRef {
    pub artifact: String,
    pub entry_point: String,
}

impl CallableRef {
    pub fn new(artifact: &str, entry_point: &str) -> Self {
        Self {
            artifact: artifact.to_string(),
            entry_point: entry_point.to_string(),
        }
    }
}

/// Load-time description of a function, as carried by a load request.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FunctionMetadata {
    pub function_id: String,
    pub name: String,
    pub callable: CallableRef,
    pub annotations: std::collections::HashMap<String, String>,
}
