//! Operation history, snapshot lookup and rollback.

use async_trait::async_trait;
use serde_json::Value;

use ableton_copilot_kernel::{AppContext, KernelError, KernelResult, Tool};
use ableton_copilot_types::HistoryId;

use super::ok;
use crate::models::{HistoryIdRequest, HistoryPageRequest};

fn positive_id(history_id: i64) -> KernelResult<()> {
    if history_id < 1 {
        return Err(KernelError::invalid_argument(format!(
            "history_id must be greater than 0, got {history_id}"
        )));
    }
    Ok(())
}

fn page_arg(field: &str, value: u32) -> KernelResult<()> {
    if value < 1 {
        return Err(KernelError::invalid_argument(format!("{field} must be at least 1, got {value}")));
    }
    Ok(())
}

pub struct GetOperationHistories;

#[async_trait]
impl Tool for GetOperationHistories {
    type Params = HistoryPageRequest;
    const NAME: &'static str = "get_operation_histories";
    const DESCRIPTION: &'static str = "get mcp tools operation histories by page, newest first";
    const REQUIRES_LIVE: bool = false;

    fn validate(params: &HistoryPageRequest) -> KernelResult<()> {
        page_arg("page", params.page)?;
        page_arg("page_size", params.page_size)?;
        Ok(())
    }

    async fn call(&self, ctx: &AppContext, params: HistoryPageRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        let rows = ctx.ledger.page(params.page, params.page_size).await?;
        Ok(serde_json::to_value(rows)?)
    }
}

pub struct GetSnapshotByHistoryId;

#[async_trait]
impl Tool for GetSnapshotByHistoryId {
    type Params = HistoryIdRequest;
    const NAME: &'static str = "get_snapshot_by_history_id";
    const DESCRIPTION: &'static str = "get snapshot by history id; null when the operation recorded none";
    const REQUIRES_LIVE: bool = false;

    fn validate(params: &HistoryIdRequest) -> KernelResult<()> {
        positive_id(params.history_id)
    }

    async fn call(&self, ctx: &AppContext, params: HistoryIdRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        let snapshot = ctx.ledger.snapshot(HistoryId(params.history_id)).await?;
        Ok(serde_json::to_value(snapshot)?)
    }
}

pub struct RollbackByHistoryId;

#[async_trait]
impl Tool for RollbackByHistoryId {
    type Params = HistoryIdRequest;
    const NAME: &'static str = "rollback_by_history_id";
    const DESCRIPTION: &'static str = "rollback to the state before the operation corresponding to the history_id \
        was executed. Only successful operations with a snapshot can be rolled back; currently supports note operations";

    fn validate(params: &HistoryIdRequest) -> KernelResult<()> {
        positive_id(params.history_id)
    }

    async fn call(&self, ctx: &AppContext, params: HistoryIdRequest, _: Option<HistoryId>) -> KernelResult<Value> {
        ctx.rollback.rollback(HistoryId(params.history_id)).await?;
        Ok(ok())
    }
}
