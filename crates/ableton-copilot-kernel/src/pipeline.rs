//! Tool invocation pipeline.
//!
//! Every tool call goes through [`Pipeline::invoke`], which always returns a
//! [`ToolEnvelope`]. Per call, in this order:
//!
//! 1. Live connectivity precondition (no history row on failure)
//! 2. argument parsing and validation
//! 3. for tracked tools: `Ledger::begin`, then snapshot capture
//! 4. the tool itself, with panics caught
//! 5. `Ledger::complete` or `Ledger::fail`
//! 6. latency metric under `tool:<name>` or `tool:<name>:error`
//!
//! Nothing below this module turns an error into a response; nothing above
//! it ever sees a raw error.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use serde::Serialize;
use serde_json::{Value, json};

use ableton_copilot_types::HistoryId;

use crate::context::AppContext;
use crate::error::{KernelError, KernelResult};
use crate::registry::{ToolHandler, ToolRegistry};
use crate::snapshot::SnapshotTarget;

/// Normalized response for one tool call. `text` is always JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolEnvelope {
    pub is_error: bool,
    pub text: String,
}

impl ToolEnvelope {
    /// Parse `text` back into JSON.
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.text).unwrap_or(Value::String(self.text.clone()))
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "tool panicked".to_string()
    }
}

#[derive(Clone)]
pub struct Pipeline {
    ctx: Arc<AppContext>,
    registry: Arc<ToolRegistry>,
}

impl Pipeline {
    pub fn new(ctx: Arc<AppContext>, registry: Arc<ToolRegistry>) -> Self {
        Self { ctx, registry }
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.ctx
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    pub async fn invoke(&self, name: &str, args: Value) -> ToolEnvelope {
        let Some(handler) = self.registry.get(name) else {
            let err = KernelError::invalid_argument(format!("unknown tool: {name}"));
            tracing::warn!(tool = name, "call to unknown tool");
            return self.error_envelope(name, None, &err);
        };

        let started = Instant::now();
        let (history_id, outcome) = self.run(handler.as_ref(), args).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(result) => {
                self.ctx.perf.record(&format!("tool:{name}"), elapsed);
                tracing::debug!(tool = name, elapsed_ms = elapsed.as_millis() as u64, "tool call succeeded");
                let body = match history_id {
                    Some(id) => json!({ "history_id": id, "result": result }),
                    None => result,
                };
                ToolEnvelope {
                    is_error: false,
                    text: body.to_string(),
                }
            }
            Err(err) => {
                self.ctx.perf.record(&format!("tool:{name}:error"), elapsed);
                self.error_envelope(name, history_id, &err)
            }
        }
    }

    async fn run(&self, handler: &dyn ToolHandler, args: Value) -> (Option<HistoryId>, KernelResult<Value>) {
        let name = handler.name();

        if handler.requires_live() && !self.ctx.live.is_connected().await {
            return (
                None,
                Err(KernelError::ExternalService(
                    "Ableton is not connected, please check if Ableton is running.".into(),
                )),
            );
        }

        let call = match handler.prepare(&args) {
            Ok(call) => call,
            Err(e) => return (None, Err(e)),
        };

        let history_id = if handler.tracked() {
            let id = match self.ctx.ledger.begin(name, &args).await {
                Ok(id) => id,
                Err(e) => return (None, Err(e)),
            };
            if let Some(target) = call.snapshot_target() {
                if let Err(e) = self.capture(id, &target).await {
                    self.settle_failed(id, &e).await;
                    return (Some(id), Err(e));
                }
            }
            Some(id)
        } else {
            None
        };

        let result = AssertUnwindSafe(call.invoke(&self.ctx, history_id))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic_message(panic);
                tracing::error!(tool = name, panic = %message, "tool panicked");
                Err(KernelError::internal(format!("tool {name} panicked: {message}")))
            });

        let Some(id) = history_id else {
            return (None, result);
        };
        match result {
            Ok(value) => match self.ctx.ledger.complete(id, &value).await {
                Ok(()) => (Some(id), Ok(value)),
                Err(e) => {
                    tracing::error!(tool = name, history_id = %id, error = %e, "failed to record success");
                    self.settle_failed(id, &e).await;
                    (Some(id), Err(e))
                }
            },
            Err(e) => {
                self.settle_failed(id, &e).await;
                (Some(id), Err(e))
            }
        }
    }

    async fn capture(&self, id: HistoryId, target: &SnapshotTarget) -> KernelResult<i64> {
        let payload = target.capture(&self.ctx.live).await?;
        self.ctx.ledger.capture_snapshot(id, &payload).await
    }

    async fn settle_failed(&self, id: HistoryId, err: &KernelError) {
        if let Err(e) = self.ctx.ledger.fail(id, &err.to_string()).await {
            tracing::error!(history_id = %id, error = %e, "failed to mark history row as failed");
        }
    }

    fn error_envelope(&self, name: &str, history_id: Option<HistoryId>, err: &KernelError) -> ToolEnvelope {
        match err.code() {
            crate::error::ErrorCode::InternalError => {
                tracing::error!(tool = name, error = ?err, "tool execution error")
            }
            _ => tracing::warn!(tool = name, code = err.code().as_str(), error = %err, "tool execution error"),
        }
        let mut payload = err.payload();
        if let Some(id) = history_id {
            payload.details = Some(json!({ "history_id": id }));
        }
        let text = serde_json::to_string(&payload).unwrap_or_else(|_| {
            json!({ "code": "INTERNAL_ERROR", "message": err.to_string() }).to_string()
        });
        ToolEnvelope { is_error: true, text }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::MemoryLive;
    use crate::registry::Tool;
    use ableton_copilot_types::{Note, OperationStatus, TrackKind};
    use async_trait::async_trait;
    use schemars::JsonSchema;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema)]
    struct ClipParams {
        clip_id: String,
        #[serde(default)]
        explode: bool,
    }

    /// Tracked tool that clears a clip, or panics on request.
    struct ClearClip;

    #[async_trait]
    impl Tool for ClearClip {
        type Params = ClipParams;
        const NAME: &'static str = "clear_clip";
        const DESCRIPTION: &'static str = "Clear a clip";
        const TRACKED: bool = true;

        fn snapshot_target(params: &ClipParams) -> Option<SnapshotTarget> {
            Some(SnapshotTarget::clip_notes(params.clip_id.clone()))
        }

        async fn call(&self, ctx: &AppContext, params: ClipParams, history_id: Option<HistoryId>) -> KernelResult<Value> {
            assert!(history_id.is_some());
            if params.explode {
                panic!("kaboom");
            }
            ctx.clip(&params.clip_id).remove_all_notes().await?;
            Ok(json!("ok"))
        }
    }

    #[derive(Debug, Deserialize, JsonSchema)]
    struct Empty {}

    struct Ping;

    #[async_trait]
    impl Tool for Ping {
        type Params = Empty;
        const NAME: &'static str = "ping";
        const DESCRIPTION: &'static str = "Reply pong";
        const REQUIRES_LIVE: bool = false;

        async fn call(&self, _: &AppContext, _: Empty, _: Option<HistoryId>) -> KernelResult<Value> {
            Ok(json!({"pong": true}))
        }
    }

    fn setup() -> (Arc<MemoryLive>, Pipeline, String) {
        let live = Arc::new(MemoryLive::new());
        let track = live.add_track(TrackKind::Midi, "Keys");
        let clip = live
            .add_midi_clip(&track, 0.0, 4.0, vec![Note::new(60, 0.0, 1.0, 100.0)])
            .unwrap();
        let ctx = Arc::new(AppContext::in_memory(live.clone()).unwrap());
        let mut registry = ToolRegistry::new();
        registry.register(ClearClip).unwrap();
        registry.register(Ping).unwrap();
        (live, Pipeline::new(ctx, Arc::new(registry)), clip)
    }

    async fn history_count(pipeline: &Pipeline) -> u64 {
        pipeline.context().ledger.repository().count_histories().await.unwrap()
    }

    #[tokio::test]
    async fn test_untracked_success_is_bare_result() {
        let (_, pipeline, _) = setup();
        let env = pipeline.invoke("ping", Value::Null).await;
        assert!(!env.is_error);
        assert_eq!(env.json(), json!({"pong": true}));
        assert_eq!(history_count(&pipeline).await, 0);
        assert_eq!(pipeline.context().perf.get("tool:ping").unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_tracked_success_wraps_result() {
        let (live, pipeline, clip) = setup();
        let env = pipeline.invoke("clear_clip", json!({"clip_id": clip})).await;
        assert!(!env.is_error, "{}", env.text);

        let body = env.json();
        let id = HistoryId(body["history_id"].as_i64().unwrap());
        assert_eq!(body["result"], json!("ok"));

        let row = pipeline.context().ledger.history(id).await.unwrap().unwrap();
        assert_eq!(row.status, OperationStatus::Success);
        assert!(pipeline.context().ledger.snapshot(id).await.unwrap().is_some());
        assert!(live.clip_notes(&clip).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disconnected_creates_no_history() {
        let (live, pipeline, clip) = setup();
        live.set_connected(false);
        let env = pipeline.invoke("clear_clip", json!({"clip_id": clip})).await;
        assert!(env.is_error);
        assert_eq!(env.json()["code"], "ABLETON_ERROR");
        assert_eq!(history_count(&pipeline).await, 0);
        assert_eq!(pipeline.context().perf.get("tool:clear_clip:error").unwrap().count, 1);
    }

    #[tokio::test]
    async fn test_bad_arguments_create_no_history() {
        let (_, pipeline, _) = setup();
        let env = pipeline.invoke("clear_clip", json!({"clip": 3})).await;
        assert!(env.is_error);
        assert_eq!(env.json()["code"], "INVALID_ARGUMENT");
        assert_eq!(history_count(&pipeline).await, 0);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let (_, pipeline, _) = setup();
        let env = pipeline.invoke("teleport", json!({})).await;
        assert!(env.is_error);
        assert_eq!(env.json()["code"], "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_snapshot_failure_marks_row_failed() {
        let (_, pipeline, _) = setup();
        let env = pipeline.invoke("clear_clip", json!({"clip_id": "missing"})).await;
        assert!(env.is_error);
        let body = env.json();
        assert_eq!(body["code"], "NOT_FOUND");
        let id = HistoryId(body["details"]["history_id"].as_i64().unwrap());
        let row = pipeline.context().ledger.history(id).await.unwrap().unwrap();
        assert_eq!(row.status, OperationStatus::Failed);
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_error() {
        let (_, pipeline, clip) = setup();
        let env = pipeline.invoke("clear_clip", json!({"clip_id": clip, "explode": true})).await;
        assert!(env.is_error);
        let body = env.json();
        assert_eq!(body["code"], "INTERNAL_ERROR");
        assert!(body["message"].as_str().unwrap().contains("kaboom"));

        let id = HistoryId(body["details"]["history_id"].as_i64().unwrap());
        let row = pipeline.context().ledger.history(id).await.unwrap().unwrap();
        assert_eq!(row.status, OperationStatus::Failed);
    }
}
