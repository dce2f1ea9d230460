// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT

/// Wire-level variant carrying all host/worker payload data.
/// The value is schema-less: interpretation is driven by the declared type of
/// the target parameter or return slot, never by the payload itself.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum TypedValue {
    None,
    String(String),
    Bytes(Vec<u8>),
    /// A JSON document carried as text.
    Json(String),
    Int(i64),
    Double(f64),
    Collection(Vec<TypedValue>),
}

impl TypedValue {
    /// Short tag used in conversion error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            TypedValue::None => "none",
            TypedValue::String(_) => "string",
            TypedValue::Bytes(_) => "bytes",
            TypedValue::Json(_) => "json",
            TypedValue::Int(_) => "int",
            TypedValue::Double(_) => "double",
            TypedValue::Collection(_) => "collection",
        }
    }
}

/// An input or output binding as carried on the wire.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct NamedTypedValue {
    pub name: String,
    pub value: TypedValue,
}

impl NamedTypedValue {
    pub fn new(name: &str, value: TypedValue) -> Self {
        Self {
            name: name.to_string(),
            value,
        }
    }
}
