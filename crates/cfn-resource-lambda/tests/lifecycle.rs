use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use cfn_resource_lambda::{
    CreateEvent, DeleteEvent, HandlerContext, HandlerErrorCode, HandlerResult, ListEvent,
    OperationStatus, ProgressEvent, ReadEvent, Resource, ResourceBuilder, ResourceHandlers,
    UpdateEvent,
};
use lambda_runtime::{Context, LambdaEvent};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const TYPE_NAME: &str = "Example::Queue::Topic";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Topic {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    topic_arn: Option<String>,
    display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retention_days: Option<i64>,
}

/// In-memory store standing in for a real backend.
#[derive(Default)]
struct Topics {
    store: Mutex<BTreeMap<String, Topic>>,
}

#[async_trait]
impl ResourceHandlers for Topics {
    async fn create(&self, ctx: &HandlerContext, event: CreateEvent) -> anyhow::Result<HandlerResult> {
        let mut topic: Topic = event.properties_as()?;
        let arn = format!("arn:aws:sns:{}:123456789012:{}", ctx.region(), topic.display_name);
        let mut store = self.store.lock().map_err(|_| anyhow::anyhow!("store poisoned"))?;
        if store.contains_key(&arn) {
            return Err(ctx.already_exists(&arn).into());
        }
        topic.topic_arn = Some(arn.clone());
        store.insert(arn, topic.clone());
        Ok(ctx.created(&topic)?)
    }

    async fn update(&self, ctx: &HandlerContext, event: UpdateEvent) -> anyhow::Result<HandlerResult> {
        let topic: Topic = event.properties_as()?;
        let arn = topic.topic_arn.clone().unwrap_or_default();
        let mut store = self.store.lock().map_err(|_| anyhow::anyhow!("store poisoned"))?;
        if !store.contains_key(&arn) {
            return Err(ctx.not_found(&arn).into());
        }
        store.insert(arn, topic.clone());
        Ok(ctx.updated(&topic)?)
    }

    async fn delete(&self, ctx: &HandlerContext, event: DeleteEvent) -> anyhow::Result<HandlerResult> {
        let topic: Topic = event.properties_as()?;
        let arn = topic.topic_arn.unwrap_or_default();
        let mut store = self.store.lock().map_err(|_| anyhow::anyhow!("store poisoned"))?;
        match store.remove(&arn) {
            Some(_) => Ok(ctx.deleted()),
            None => Err(ctx.not_found(&arn).into()),
        }
    }

    async fn read(&self, ctx: &HandlerContext, event: ReadEvent) -> anyhow::Result<HandlerResult> {
        let arn = event
            .identifiers
            .get("topicArn")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let store = self.store.lock().map_err(|_| anyhow::anyhow!("store poisoned"))?;
        match store.get(&arn) {
            Some(topic) => Ok(ctx.read_result(topic)?),
            None => Err(ctx.not_found(&arn).into()),
        }
    }

    async fn list(&self, ctx: &HandlerContext, _event: ListEvent) -> anyhow::Result<HandlerResult> {
        let store = self.store.lock().map_err(|_| anyhow::anyhow!("store poisoned"))?;
        let ids: Vec<Value> = store.keys().map(|arn| json!({ "topicArn": arn })).collect();
        Ok(ctx.list_result(&ids, None)?)
    }
}

fn resource() -> Resource {
    ResourceBuilder::new(
        TYPE_NAME,
        json!({
            "type": "object",
            "properties": {
                "TopicArn": {"type": "string"},
                "DisplayName": {"type": "string", "minLength": 1},
                "RetentionDays": {"type": "integer", "minimum": 1}
            },
            "required": ["TopicArn", "DisplayName"],
            "additionalProperties": false
        }),
        ["TopicArn"],
    )
    .expect("valid resource definition")
    .handlers(Topics::default())
    .build()
    .expect("handlers registered")
}

fn envelope(action: &str, properties: Value) -> Value {
    json!({
        "Action": action,
        "Region": "eu-west-1",
        "ResourceType": TYPE_NAME,
        "StackId": "arn:aws:cloudformation:eu-west-1:123456789012:stack/topics/1",
        "RequestData": {
            "LogicalResourceId": "Alerts",
            "ResourceProperties": properties
        },
        "SomeFutureField": {"ignored": true}
    })
}

async fn invoke(resource: &Resource, payload: Value) -> ProgressEvent {
    let event = LambdaEvent::new(payload, Context::default());
    resource.entrypoint(event).await.expect("entry point never fails")
}

#[tokio::test]
async fn full_lifecycle_without_provider_credentials() {
    let resource = resource();
    let arn = "arn:aws:sns:eu-west-1:123456789012:alerts";

    // Numeric strings are coerced before the callback sees them.
    let created = invoke(
        &resource,
        envelope("CREATE", json!({"DisplayName": "alerts", "RetentionDays": "7"})),
    )
    .await;
    assert_eq!(created.status, OperationStatus::Success);
    assert_eq!(
        created.resource_model,
        Some(json!({"TopicArn": arn, "DisplayName": "alerts", "RetentionDays": 7}))
    );

    let duplicate = invoke(&resource, envelope("CREATE", json!({"DisplayName": "alerts"}))).await;
    assert_eq!(duplicate.error_code, Some(HandlerErrorCode::AlreadyExists));

    let updated = invoke(
        &resource,
        json!({
            "Action": "UPDATE",
            "Region": "eu-west-1",
            "ResourceType": TYPE_NAME,
            "RequestData": {
                "ResourceProperties": {"TopicArn": arn, "DisplayName": "alerts", "RetentionDays": 14},
                "PreviousResourceProperties": {"TopicArn": arn, "DisplayName": "alerts", "RetentionDays": 7}
            }
        }),
    )
    .await;
    assert_eq!(updated.status, OperationStatus::Success);

    let read = invoke(&resource, envelope("READ", json!({"TopicArn": arn}))).await;
    assert_eq!(
        read.resource_model,
        Some(json!({"TopicArn": arn, "DisplayName": "alerts", "RetentionDays": 14}))
    );

    let listed = invoke(&resource, envelope("LIST", Value::Null)).await;
    assert_eq!(
        serde_json::to_value(&listed).expect("serializable"),
        json!({"Status": "SUCCESS", "ResourceModels": [{"TopicArn": arn}], "NextToken": null})
    );

    let deleted = invoke(
        &resource,
        envelope("DELETE", json!({"TopicArn": arn, "DisplayName": "alerts"})),
    )
    .await;
    assert_eq!(deleted.status, OperationStatus::Success);
    assert!(deleted.resource_model.is_none());

    let missing = invoke(&resource, envelope("READ", json!({"TopicArn": arn}))).await;
    assert_eq!(missing.error_code, Some(HandlerErrorCode::NotFound));
}

#[tokio::test]
async fn schema_violations_never_reach_the_callback() {
    let resource = resource();

    let response = invoke(
        &resource,
        envelope("CREATE", json!({"DisplayName": "", "Unexpected": true})),
    )
    .await;
    assert_eq!(response.status, OperationStatus::Failed);
    assert_eq!(response.error_code, Some(HandlerErrorCode::InvalidRequest));

    let listed = invoke(&resource, envelope("LIST", Value::Null)).await;
    assert_eq!(listed.resource_models, Some(vec![]));
}

#[tokio::test]
async fn read_without_identifier_is_invalid_request() {
    let response = invoke(&resource(), envelope("READ", json!({"DisplayName": "alerts"}))).await;
    assert_eq!(response.error_code, Some(HandlerErrorCode::InvalidRequest));
    assert!(response.message.unwrap_or_default().contains("TopicArn"));
}
