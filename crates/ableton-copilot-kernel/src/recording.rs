//! Arrangement recording over a time window.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use ableton_copilot_types::ObjectRef;

use crate::error::{KernelError, KernelResult};
use crate::listeners::ListenerRegistry;
use crate::live::{Listener, LiveBridge, SongHandle};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingReport {
    pub start_time: f64,
    pub end_time: f64,
    /// Song time observed when recording was stopped.
    pub stopped_at: f64,
}

fn flag_is_on(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

#[derive(Clone)]
pub struct Recorder {
    live: Arc<dyn LiveBridge>,
    listeners: Arc<ListenerRegistry>,
}

impl Recorder {
    pub fn new(live: Arc<dyn LiveBridge>, listeners: Arc<ListenerRegistry>) -> Self {
        Self { live, listeners }
    }

    /// Watch song `record_mode`; when the user turns it off, drop every
    /// recording listener so no window keeps waiting on a stopped transport.
    pub async fn watch_record_mode(&self) -> KernelResult<JoinHandle<()>> {
        let Listener { id, mut events } = self.live.add_listener(&ObjectRef::Song, "record_mode").await?;
        let live = self.live.clone();
        let listeners = self.listeners.clone();
        Ok(tokio::spawn(async move {
            while let Some(mode) = events.recv().await {
                if !flag_is_on(&mode) {
                    listeners.drain(&live).await;
                }
            }
            tracing::debug!(listener_id = id, "record mode watch ended");
        }))
    }

    /// Record from `start_time` until the playhead reaches `end_time`.
    pub async fn record_by_time_range(&self, start_time: f64, end_time: f64) -> KernelResult<RecordingReport> {
        if !start_time.is_finite() || !end_time.is_finite() || start_time < 0.0 {
            return Err(KernelError::invalid_argument("start_time and end_time must be finite and non-negative"));
        }
        if end_time <= start_time {
            return Err(KernelError::invalid_argument(format!(
                "end_time ({end_time}) must be greater than start_time ({start_time})"
            )));
        }

        let song = SongHandle::new(self.live.clone());
        let Listener { id, mut events } = self
            .live
            .add_listener(&ObjectRef::Song, "current_song_time")
            .await?;
        self.listeners.register(id).await;
        tracing::info!(listener_id = id, start_time, end_time, "recording started");

        let stopped_at = match Self::run_window(&song, &mut events, start_time, end_time).await {
            Ok(now) => now,
            Err(e) => {
                if let Err(cleanup) = self.listeners.remove_if_registered(&self.live, id).await {
                    tracing::warn!(listener_id = id, error = %cleanup, "listener cleanup failed");
                }
                return Err(e);
            }
        };

        self.listeners.remove_if_registered(&self.live, id).await?;
        song.set_record_mode(false).await?;
        song.stop_playing().await?;
        tracing::info!(stopped_at, "recording finished");
        Ok(RecordingReport {
            start_time,
            end_time,
            stopped_at,
        })
    }

    async fn run_window(
        song: &SongHandle,
        events: &mut tokio::sync::mpsc::UnboundedReceiver<Value>,
        start_time: f64,
        end_time: f64,
    ) -> KernelResult<f64> {
        song.set_current_song_time(start_time).await?;
        song.set_record_mode(true).await?;
        song.start_playing().await?;
        while let Some(value) = events.recv().await {
            let now = value.as_f64().unwrap_or(start_time);
            if now >= end_time {
                return Ok(now);
            }
        }
        Err(KernelError::ExternalService(format!(
            "recording stopped before reaching end time {end_time}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::MemoryLive;
    use std::time::Duration;

    fn recorder() -> (Arc<MemoryLive>, Recorder, Arc<ListenerRegistry>) {
        let live = Arc::new(MemoryLive::new());
        let registry = Arc::new(ListenerRegistry::new());
        let recorder = Recorder::new(live.clone(), registry.clone());
        (live, recorder, registry)
    }

    async fn wait_for_listener(registry: &ListenerRegistry) {
        for _ in 0..100 {
            if !registry.is_empty().await {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("recording listener never registered");
    }

    #[tokio::test]
    async fn test_rejects_inverted_window() {
        let (_, recorder, _) = recorder();
        let err = recorder.record_by_time_range(8.0, 4.0).await.unwrap_err();
        assert!(matches!(err, KernelError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_stops_at_end_time() {
        let (live, recorder, registry) = recorder();
        let task = tokio::spawn({
            let recorder = recorder.clone();
            async move { recorder.record_by_time_range(4.0, 8.0).await }
        });
        wait_for_listener(&registry).await;
        // Let the setup calls run before moving the playhead.
        tokio::time::sleep(Duration::from_millis(10)).await;

        live.advance_song_time(2.0);
        live.advance_song_time(2.5);

        let report = task.await.unwrap().unwrap();
        assert!(report.stopped_at >= 8.0);
        assert!(registry.is_empty().await);
        assert_eq!(live.listener_count(), 0);

        let song = SongHandle::new(live.clone());
        assert!(!song.record_mode().await.unwrap());
    }

    #[tokio::test]
    async fn test_record_mode_off_interrupts() {
        let (live, recorder, registry) = recorder();
        let _watch = recorder.watch_record_mode().await.unwrap();
        let task = tokio::spawn({
            let recorder = recorder.clone();
            async move { recorder.record_by_time_range(0.0, 100.0).await }
        });
        wait_for_listener(&registry).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        // User presses stop on the record button.
        SongHandle::new(live.clone()).set_record_mode(false).await.unwrap();

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, KernelError::ExternalService(_)));
        assert!(registry.is_empty().await);
    }
}
