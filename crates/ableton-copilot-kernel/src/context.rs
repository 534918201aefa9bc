//! Application context shared by the pipeline and every tool.
//!
//! Built once at startup and passed by reference; there is no global state.

use std::sync::Arc;
use std::time::Duration;

use crate::error::KernelResult;
use crate::ledger::Ledger;
use crate::listeners::ListenerRegistry;
use crate::live::{
    ApplicationHandle, BrowserHandle, ClipHandle, DeviceHandle, LiveBridge, ParameterHandle, SongHandle,
    TrackHandle,
};
use crate::perf::PerformanceMonitor;
use crate::recording::Recorder;
use crate::repository::{HistoryRepository, SqliteRepository};
use crate::rollback::RollbackEngine;

pub struct AppContext {
    pub live: Arc<dyn LiveBridge>,
    pub ledger: Ledger,
    pub rollback: RollbackEngine,
    pub perf: Arc<PerformanceMonitor>,
    pub listeners: Arc<ListenerRegistry>,
    pub recorder: Recorder,
}

impl AppContext {
    pub fn new(live: Arc<dyn LiveBridge>, repo: Arc<dyn HistoryRepository>, slow_threshold: Duration) -> Self {
        let ledger = Ledger::new(repo);
        let listeners = Arc::new(ListenerRegistry::new());
        Self {
            rollback: RollbackEngine::new(ledger.clone(), live.clone()),
            recorder: Recorder::new(live.clone(), listeners.clone()),
            perf: Arc::new(PerformanceMonitor::new(slow_threshold)),
            ledger,
            listeners,
            live,
        }
    }

    /// Context over an in-memory history store (for testing).
    pub fn in_memory(live: Arc<dyn LiveBridge>) -> KernelResult<Self> {
        let repo = Arc::new(SqliteRepository::in_memory()?);
        Ok(Self::new(live, repo, crate::perf::DEFAULT_SLOW_THRESHOLD))
    }

    pub fn application(&self) -> ApplicationHandle {
        ApplicationHandle::new(self.live.clone())
    }

    pub fn song(&self) -> SongHandle {
        SongHandle::new(self.live.clone())
    }

    pub fn track(&self, id: &str) -> TrackHandle {
        TrackHandle::new(self.live.clone(), id)
    }

    pub fn clip(&self, id: &str) -> ClipHandle {
        ClipHandle::new(self.live.clone(), id)
    }

    pub fn device(&self, id: &str) -> DeviceHandle {
        DeviceHandle::new(self.live.clone(), id)
    }

    pub fn parameter(&self, id: &str) -> ParameterHandle {
        ParameterHandle::new(self.live.clone(), id)
    }

    pub fn browser(&self) -> BrowserHandle {
        BrowserHandle::new(self.live.clone())
    }
}
