use cfn_resource_lib::{
    failure_response, Action, Envelope, Failure, HandlerErrorCode, OperationStatus,
    ResourceDefinition,
};
use serde_json::{json, Value};

fn resource_schema() -> Value {
    json!({
        "typeName": "Example::Storage::Bucket",
        "definitions": {
            "Tag": {
                "type": "object",
                "properties": {"Key": {"type": "string"}, "Value": {"type": "string"}},
                "required": ["Key"]
            }
        },
        "properties": {
            "BucketARN": {"type": "string"},
            "BucketName": {"type": "string"},
            "Versioned": {"type": "boolean"},
            "Tags": {"type": "array", "items": {"$ref": "#/definitions/Tag"}}
        },
        "required": ["BucketARN", "BucketName"],
        "primaryIdentifier": ["/properties/BucketARN"],
        "typeConfiguration": {
            "type": "object",
            "properties": {"Region": {"type": "string"}},
            "additionalProperties": false
        }
    })
}

fn envelope() -> Value {
    json!({
        "Action": "CREATE",
        "Region": "us-west-2",
        "ResourceType": "Example::Storage::Bucket",
        "RequestData": {
            "ResourceProperties": {
                "BucketName": "logs",
                "Versioned": "true",
                "Tags": [{"Key": "team", "Value": "infra"}]
            },
            "TypeConfiguration": {"Region": "us-west-2"}
        },
        "CallbackContext": {"stage": "polling"}
    })
}

#[test]
fn envelope_properties_pass_the_create_gate_and_round_trip_casing() {
    let definition = ResourceDefinition::from_resource_schema(&resource_schema()).unwrap();
    let envelope = Envelope::parse(&envelope()).unwrap();
    assert_eq!(envelope.action.parse::<Action>(), Ok(Action::Create));
    assert_eq!(envelope.callback_context(), json!({"stage": "polling"}).as_object().cloned());

    let raw = envelope.request_data.resource_properties.unwrap();
    let validated = definition.create_schema().ensure(&raw).unwrap();
    assert_eq!(validated["Versioned"], json!(true));

    let callback = definition.casing().to_callback_case(&validated);
    assert_eq!(
        callback,
        json!({"bucketName": "logs", "versioned": true, "tags": [{"key": "team", "value": "infra"}]})
    );

    let mut returned = callback.as_object().cloned().unwrap();
    returned.insert("bucketARN".into(), json!("arn:aws:s3:::logs"));
    assert!(definition.identifiers().missing_callback(&returned).is_empty());
    let wire = definition.casing().to_wire_case(&Value::Object(returned));
    assert_eq!(wire["BucketARN"], json!("arn:aws:s3:::logs"));
    assert_eq!(wire["Tags"][0]["Key"], json!("team"));
    assert!(definition.schema().ensure(&wire).is_ok());
}

#[test]
fn type_configuration_schema_is_taken_from_the_document() {
    let definition = ResourceDefinition::from_resource_schema(&resource_schema()).unwrap();
    let schema = definition.type_configuration_schema();
    assert!(schema.ensure(&json!({"Region": "us-west-2"})).is_ok());

    let failure = schema.ensure(&json!({"Endpoint": "x"})).unwrap_err();
    let response = failure_response(&Failure::from(failure));
    assert_eq!(response.status, OperationStatus::Failed);
    assert_eq!(response.error_code, Some(HandlerErrorCode::InvalidRequest));
    assert!(response.message.unwrap().starts_with("TypeConfiguration is invalid:"));
}

#[test]
fn invalid_envelope_translates_to_invalid_request() {
    let failure = Envelope::parse(&json!({"Action": "CREATE"})).unwrap_err();
    let response = failure_response(&Failure::from(failure));
    assert_eq!(response.error_code, Some(HandlerErrorCode::InvalidRequest));
    assert!(response.message.unwrap().contains("Request"));
}
