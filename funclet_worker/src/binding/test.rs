// SPDX-FileCopyrightText: © 2024 Technical University of Munich, Chair of Connected Mobility
// SPDX-FileCopyrightText: © 2024 Claudio Cicconetti <c.cicconetti@iit.cnr.it>
// SPDX-License-Identifier: MIT
use super::*;
use funclet_api::common::ConversionError;
use funclet_api::function::ParameterBinding;

#[test]
fn test_direct_matches() {
    assert_eq!(
        to_parameter("p", &TypedValue::String("abc".to_string()), &ParameterType::String),
        Ok(ResolvedValue::String("abc".to_string()))
    );
    assert_eq!(
        to_parameter("p", &TypedValue::Bytes(vec![1, 2, 3]), &ParameterType::Bytes),
        Ok(ResolvedValue::Bytes(vec![1, 2, 3]))
    );
    assert_eq!(to_parameter("p", &TypedValue::Int(42), &ParameterType::Int), Ok(ResolvedValue::Int(42)));
    assert_eq!(
        to_parameter("p", &TypedValue::Double(0.5), &ParameterType::Double),
        Ok(ResolvedValue::Double(0.5))
    );
}

#[test]
fn test_well_known_string_conversions() {
    let id = "0993a5ac-e56c-4d54-86bb-e6f2b4ef6a63";
    assert_eq!(
        to_parameter("p", &TypedValue::String(id.to_string()), &ParameterType::Uuid),
        Ok(ResolvedValue::Uuid(uuid::Uuid::parse_str(id).unwrap()))
    );
    assert_eq!(
        to_parameter("p", &TypedValue::String("100".to_string()), &ParameterType::Int),
        Ok(ResolvedValue::Int(100))
    );
    assert_eq!(
        to_parameter("p", &TypedValue::String("2.5".to_string()), &ParameterType::Double),
        Ok(ResolvedValue::Double(2.5))
    );
    assert_eq!(
        to_parameter("p", &TypedValue::String("true".to_string()), &ParameterType::Bool),
        Ok(ResolvedValue::Bool(true))
    );
    assert_eq!(to_parameter("p", &TypedValue::Int(7), &ParameterType::Double), Ok(ResolvedValue::Double(7.0)));

    let parsed = to_parameter("p", &TypedValue::String("2024-05-01T10:30:00Z".to_string()), &ParameterType::Timestamp).unwrap();
    match parsed {
        ResolvedValue::Timestamp(ts) => assert_eq!(ts.to_rfc3339(), "2024-05-01T10:30:00+00:00"),
        other => panic!("unexpected value: {:?}", other),
    }
}

#[test]
fn test_malformed_payloads() {
    assert!(matches!(
        to_parameter("p", &TypedValue::String("not-a-uuid".to_string()), &ParameterType::Uuid),
        Err(ConversionError::MalformedPayload { .. })
    ));
    assert!(matches!(
        to_parameter("p", &TypedValue::Json("{invalid".to_string()), &ParameterType::Json),
        Err(ConversionError::MalformedPayload { .. })
    ));
    assert!(matches!(
        to_parameter("p", &TypedValue::String("ten".to_string()), &ParameterType::Int),
        Err(ConversionError::MalformedPayload { .. })
    ));
}

#[test]
fn test_type_mismatch() {
    // A numeric wire value with a string target has no conversion strategy.
    let err = to_parameter("name", &TypedValue::Int(123), &ParameterType::String).unwrap_err();
    assert_eq!(
        err,
        ConversionError::TypeMismatch {
            parameter: "name".to_string(),
            expected: "string".to_string(),
            actual: "int".to_string(),
        }
    );
    assert!(matches!(
        to_parameter("p", &TypedValue::None, &ParameterType::String),
        Err(ConversionError::TypeMismatch { .. })
    ));
    assert!(matches!(
        to_parameter("p", &TypedValue::Int(1), &ParameterType::Collection(Box::new(ParameterType::Int))),
        Err(ConversionError::TypeMismatch { .. })
    ));
}

#[test]
fn test_collection_recursion() {
    let wire = TypedValue::Collection(vec![
        TypedValue::String("1".to_string()),
        TypedValue::Int(2),
        TypedValue::String("3".to_string()),
    ]);
    // Elements are resolved with strategies (1)-(3): direct int plus two
    // string-to-int conversions.
    assert_eq!(
        to_parameter("p", &wire, &ParameterType::Collection(Box::new(ParameterType::Int))),
        Ok(ResolvedValue::Collection(vec![
            ResolvedValue::Int(1),
            ResolvedValue::Int(2),
            ResolvedValue::Int(3)
        ]))
    );

    let bad = TypedValue::Collection(vec![TypedValue::Int(1), TypedValue::Bytes(vec![0])]);
    assert!(matches!(
        to_parameter("p", &bad, &ParameterType::Collection(Box::new(ParameterType::Int))),
        Err(ConversionError::TypeMismatch { .. })
    ));
}

#[test]
fn test_round_trips() {
    // string
    let wire = TypedValue::String("abc".to_string());
    let resolved = to_parameter("p", &wire, &ParameterType::String).unwrap();
    assert_eq!(from_result(&resolved, &ParameterType::String), Ok(wire));

    // integer
    let wire = TypedValue::Int(42);
    let resolved = to_parameter("p", &wire, &ParameterType::Int).unwrap();
    assert_eq!(from_result(&resolved, &ParameterType::Int), Ok(wire));

    // JSON object: key order is not preserved by the text form, so compare
    // the parsed documents.
    let wire = TypedValue::Json(r#"{"a":1,"b":[true,null]}"#.to_string());
    let resolved = to_parameter("p", &wire, &ParameterType::Json).unwrap();
    match from_result(&resolved, &ParameterType::Json).unwrap() {
        TypedValue::Json(text) => assert_eq!(
            serde_json::from_str::<serde_json::Value>(&text).unwrap(),
            serde_json::from_str::<serde_json::Value>(r#"{"a":1,"b":[true,null]}"#).unwrap()
        ),
        other => panic!("unexpected value: {:?}", other),
    }

    // array of strings
    let wire = TypedValue::Collection(vec![TypedValue::String("x".to_string()), TypedValue::String("y".to_string())]);
    let target = ParameterType::Collection(Box::new(ParameterType::String));
    let resolved = to_parameter("p", &wire, &target).unwrap();
    assert_eq!(from_result(&resolved, &target), Ok(wire));
}

#[test]
fn test_from_result_unsupported() {
    assert!(matches!(
        from_result(&ResolvedValue::String("abc".to_string()), &ParameterType::Int),
        Err(SerializationError::Unsupported(_))
    ));
    assert!(matches!(
        from_result(&ResolvedValue::Unit, &ParameterType::String),
        Err(SerializationError::Unsupported(_))
    ));
    // Void swallows anything: the caller decides whether a result payload is
    // attached at all.
    assert_eq!(from_result(&ResolvedValue::Unit, &ParameterType::Void), Ok(TypedValue::None));
}

#[test]
fn test_resolve_parameters_order_and_placeholders() {
    let signature = FunctionSignature::new(
        "f",
        vec![
            ParameterBinding::input("first", ParameterType::String),
            ParameterBinding::output("sink", ParameterType::Json),
            ParameterBinding::input("second", ParameterType::Int),
        ],
        ParameterType::Void,
    );
    let inputs = vec![
        NamedTypedValue::new("second", TypedValue::Int(2)),
        NamedTypedValue::new("first", TypedValue::String("one".to_string())),
    ];
    let bound = resolve_parameters(&signature, &inputs).unwrap();
    assert_eq!(bound.len(), 3);
    assert_eq!(bound[0].name, "first");
    assert_eq!(bound[0].value, ResolvedValue::String("one".to_string()));
    assert_eq!(bound[1].name, "sink");
    assert_eq!(bound[1].value, ResolvedValue::Unit);
    assert_eq!(bound[2].name, "second");
    assert_eq!(bound[2].value, ResolvedValue::Int(2));
}

#[test]
fn test_resolve_parameters_missing_input() {
    let signature = FunctionSignature::new(
        "f",
        vec![ParameterBinding::input("name", ParameterType::String)],
        ParameterType::String,
    );
    let err = resolve_parameters(&signature, &[]).unwrap_err();
    assert_eq!(
        err,
        ConversionError::TypeMismatch {
            parameter: "name".to_string(),
            expected: "string".to_string(),
            actual: "absent".to_string(),
        }
    );
}

#[test]
fn test_typed_value_to_json() {
    assert_eq!(typed_value_to_json(&TypedValue::None), Ok(serde_json::Value::Null));
    assert_eq!(
        typed_value_to_json(&TypedValue::Bytes(vec![1, 2, 3])),
        Ok(serde_json::Value::String("AQID".to_string()))
    );
    assert_eq!(
        typed_value_to_json(&TypedValue::Json("[1,2]".to_string())),
        Ok(serde_json::json!([1, 2]))
    );
    assert_eq!(
        typed_value_to_json(&TypedValue::Collection(vec![TypedValue::Int(1), TypedValue::String("a".to_string())])),
        Ok(serde_json::json!([1, "a"]))
    );
    assert!(typed_value_to_json(&TypedValue::Double(f64::NAN)).is_err());
}
