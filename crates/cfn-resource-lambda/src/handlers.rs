//! The callback set a resource provider implements.

use async_trait::async_trait;

use crate::context::HandlerContext;
use crate::events::{CreateEvent, DeleteEvent, HandlerResult, ListEvent, ReadEvent, UpdateEvent};

/// One callback per lifecycle action.
///
/// Callbacks may fail with any error. A
/// [`HandlerError`](cfn_resource_lib::HandlerError) anywhere in the error
/// chain is reported with its own code; anything else becomes
/// `GeneralServiceException`, and a panic becomes `InternalFailure`.
///
/// # Example
///
/// ```ignore
/// struct Reports;
///
/// #[async_trait]
/// impl ResourceHandlers for Reports {
///     async fn create(&self, ctx: &HandlerContext, event: CreateEvent) -> anyhow::Result<HandlerResult> {
///         let mut model = event.properties;
///         model.insert("tpsCode".into(), "123456679".into());
///         Ok(ctx.created(&model)?)
///     }
///     // ...
/// }
/// ```
#[async_trait]
pub trait ResourceHandlers: Send + Sync {
    async fn create(&self, ctx: &HandlerContext, event: CreateEvent) -> anyhow::Result<HandlerResult>;

    async fn update(&self, ctx: &HandlerContext, event: UpdateEvent) -> anyhow::Result<HandlerResult>;

    async fn delete(&self, ctx: &HandlerContext, event: DeleteEvent) -> anyhow::Result<HandlerResult>;

    async fn read(&self, ctx: &HandlerContext, event: ReadEvent) -> anyhow::Result<HandlerResult>;

    async fn list(&self, ctx: &HandlerContext, event: ListEvent) -> anyhow::Result<HandlerResult>;
}
