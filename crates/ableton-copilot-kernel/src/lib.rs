//! Core of the ableton-copilot MCP server.
//!
//! The kernel owns everything between the MCP transport and the Live set:
//!
//! - [`ledger`]: PENDING → SUCCESS/FAILED lifecycle of tracked tool calls
//! - [`snapshot`]: prior-state payloads and their JSON codec
//! - [`rollback`]: restore a snapshot into the live set
//! - [`pipeline`]: the single entry point every tool call goes through
//! - [`repository`] / [`db`]: SQLite persistence behind an async port
//! - [`live`]: the [`live::LiveBridge`] port, typed handles and an in-memory set
//!
//! Transport adapters (see the `ableton-copilot-mcp` crate) only build a
//! [`context::AppContext`] and a [`registry::ToolRegistry`] and hand calls to
//! [`pipeline::Pipeline::invoke`].

pub mod context;
pub mod db;
pub mod error;
pub mod ledger;
pub mod listeners;
pub mod live;
pub mod perf;
pub mod pipeline;
pub mod recording;
pub mod registry;
pub mod repository;
pub mod rollback;
pub mod snapshot;

pub use context::AppContext;
pub use error::{ErrorCode, ErrorPayload, KernelError, KernelResult};
pub use ledger::Ledger;
pub use live::{BridgeError, BridgeResult, LiveBridge, MemoryLive};
pub use perf::{MetricSummary, PerformanceMonitor};
pub use pipeline::{Pipeline, ToolEnvelope};
pub use registry::{PreparedCall, Tool, ToolHandler, ToolRegistry};
pub use repository::{HistoryRepository, SqliteRepository};
pub use rollback::{RollbackEngine, RollbackReport};
pub use snapshot::{SnapshotPayload, SnapshotTarget};
