use async_trait::async_trait;
use serde_json::Value;

use ableton_copilot_kernel::{AppContext, KernelResult, Tool};
use ableton_copilot_types::HistoryId;

use crate::models::EmptyRequest;

pub struct GetApplicationInfo;

#[async_trait]
impl Tool for GetApplicationInfo {
    type Params = EmptyRequest;
    const NAME: &'static str = "get_application_info";
    const DESCRIPTION: &'static str = "Get Ableton Live application information (version)";

    async fn call(&self, ctx: &AppContext, _: EmptyRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        Ok(ctx.application().info().await?)
    }
}
