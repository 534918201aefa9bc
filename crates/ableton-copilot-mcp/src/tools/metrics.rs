use async_trait::async_trait;
use serde_json::{Value, json};

use ableton_copilot_kernel::{AppContext, KernelResult, Tool};
use ableton_copilot_types::HistoryId;

use crate::models::EmptyRequest;

/// Latency summary per tool, as recorded by the pipeline.
pub struct GetPerformanceMetrics;

#[async_trait]
impl Tool for GetPerformanceMetrics {
    type Params = EmptyRequest;
    const NAME: &'static str = "get_performance_metrics";
    const DESCRIPTION: &'static str = "get call count and latency (avg/min/max ms) for every tool called so far, \
        plus the number of recorded operation histories";
    const REQUIRES_LIVE: bool = false;

    async fn call(&self, ctx: &AppContext, _: EmptyRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        ctx.perf.log_summary();
        let histories = ctx.ledger.repository().count_histories().await?;
        Ok(json!({
            "slow_threshold_ms": ctx.perf.slow_threshold().as_millis() as u64,
            "operation_histories": histories,
            "metrics": ctx.perf.summary(),
        }))
    }
}
