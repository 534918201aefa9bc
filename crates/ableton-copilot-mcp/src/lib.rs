//! MCP server exposing Ableton Live editing tools.
//!
//! Every tool call is handed to the kernel's invocation pipeline, which
//! enforces the Live connection precondition, records operation history and
//! snapshots for note edits, and normalizes every outcome into one envelope.
//!
//! ## Module Structure
//!
//! - `config`: resolved server configuration and context wiring
//! - `models`: request types for MCP tools
//! - `tools`: tool implementations and the static registration list

pub mod config;
mod models;
pub mod tools;

use std::sync::Arc;

use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler,
    model::{
        CallToolRequestParams, CallToolResult, Content, ListToolsResult, PaginatedRequestParams,
        ServerCapabilities, ServerInfo, Tool as McpTool,
    },
    service::RequestContext,
};
use serde_json::Value;

use ableton_copilot_kernel::{AppContext, KernelResult, Pipeline, ToolEnvelope, ToolRegistry};

pub use models::*;

/// Build the registry holding every tool this server exposes.
pub fn build_registry() -> KernelResult<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    tools::register_all(&mut registry)?;
    Ok(registry)
}

const INSTRUCTIONS: &str = "Ableton Live copilot. Read and edit the song, tracks, clips, notes and device parameters. \
    Note edits return a history_id; pass it to rollback_by_history_id to undo the edit.";

/// MCP server handler.
#[derive(Clone)]
pub struct AbletonCopilotMcp {
    pipeline: Pipeline,
    instructions: String,
}

impl AbletonCopilotMcp {
    pub fn new(ctx: AppContext) -> KernelResult<Self> {
        let registry = build_registry()?;
        Ok(Self {
            pipeline: Pipeline::new(Arc::new(ctx), Arc::new(registry)),
            instructions: INSTRUCTIONS.to_string(),
        })
    }

    /// Tell clients what kind of Live set the tools act on.
    pub fn with_backend_note(mut self, note: &str) -> Self {
        self.instructions = format!("{INSTRUCTIONS} {note}");
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Invoke a tool by name, bypassing the MCP transport.
    pub async fn call(&self, name: &str, args: Value) -> ToolEnvelope {
        self.pipeline.invoke(name, args).await
    }

    /// Tool descriptors as advertised to clients, in name order.
    pub fn tool_list(&self) -> Vec<McpTool> {
        self.pipeline
            .registry()
            .handlers()
            .map(|h| McpTool::new(h.name(), h.description(), h.input_schema()))
            .collect()
    }
}

/// Wrap a pipeline envelope as an MCP tool result. The text is JSON either way.
pub fn to_call_result(envelope: ToolEnvelope) -> CallToolResult {
    let content = vec![Content::text(envelope.text)];
    if envelope.is_error {
        CallToolResult::error(content)
    } else {
        CallToolResult::success(content)
    }
}

impl ServerHandler for AbletonCopilotMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::new(ServerCapabilities::builder().enable_tools().build())
            .with_instructions(self.instructions.clone())
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        async move {
            Ok(ListToolsResult {
                meta: None,
                next_cursor: None,
                tools: self.tool_list(),
            })
        }
    }

    fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move {
            let args = request.arguments.map(Value::Object).unwrap_or(Value::Null);
            let envelope = self.pipeline.invoke(&request.name, args).await;
            Ok(to_call_result(envelope))
        }
    }
}
