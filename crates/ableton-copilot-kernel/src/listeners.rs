//! Shared list of live listener subscriptions.
//!
//! Recording helpers register their listeners here so that turning record
//! mode off can tear all of them down at once. The list is shared across
//! concurrent tasks; every read-modify-write of it, including the bridge
//! calls that remove listeners, happens while holding the lock.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::KernelResult;
use crate::live::{ListenerId, LiveBridge};

#[derive(Default)]
pub struct ListenerRegistry {
    ids: Mutex<Vec<ListenerId>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, id: ListenerId) {
        self.ids.lock().await.push(id);
    }

    pub async fn contains(&self, id: ListenerId) -> bool {
        self.ids.lock().await.contains(&id)
    }

    pub async fn len(&self) -> usize {
        self.ids.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.ids.lock().await.is_empty()
    }

    /// Remove `id` from Live and from the list, if it is still registered.
    pub async fn remove_if_registered(&self, live: &Arc<dyn LiveBridge>, id: ListenerId) -> KernelResult<bool> {
        let mut ids = self.ids.lock().await;
        let Some(pos) = ids.iter().position(|x| *x == id) else {
            return Ok(false);
        };
        live.remove_listener(id).await?;
        ids.remove(pos);
        Ok(true)
    }

    /// Remove every registered listener. Individual failures are logged and
    /// the list is cleared regardless.
    pub async fn drain(&self, live: &Arc<dyn LiveBridge>) -> usize {
        let mut ids = self.ids.lock().await;
        let count = ids.len();
        for id in ids.iter() {
            if let Err(e) = live.remove_listener(*id).await {
                tracing::error!(listener_id = id, error = %e, "failed to remove listener");
            }
        }
        ids.clear();
        if count > 0 {
            tracing::info!(count, "removed recording listeners");
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::live::MemoryLive;
    use ableton_copilot_types::ObjectRef;

    #[tokio::test]
    async fn test_remove_if_registered_only_once() {
        let live: Arc<dyn LiveBridge> = Arc::new(MemoryLive::new());
        let registry = ListenerRegistry::new();
        let listener = live.add_listener(&ObjectRef::Song, "current_song_time").await.unwrap();
        registry.register(listener.id).await;

        assert!(registry.remove_if_registered(&live, listener.id).await.unwrap());
        assert!(!registry.remove_if_registered(&live, listener.id).await.unwrap());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_drain_removes_everything() {
        let memory = Arc::new(MemoryLive::new());
        let live: Arc<dyn LiveBridge> = memory.clone();
        let registry = ListenerRegistry::new();
        for _ in 0..3 {
            let l = live.add_listener(&ObjectRef::Song, "current_song_time").await.unwrap();
            registry.register(l.id).await;
        }
        assert_eq!(memory.listener_count(), 3);

        assert_eq!(registry.drain(&live).await, 3);
        assert_eq!(memory.listener_count(), 0);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_lock_released_after_error() {
        let memory = Arc::new(MemoryLive::new());
        let live: Arc<dyn LiveBridge> = memory.clone();
        let registry = ListenerRegistry::new();
        registry.register(7).await;

        memory.set_connected(false);
        assert!(registry.remove_if_registered(&live, 7).await.is_err());
        // The failed removal must not leave the list locked.
        assert!(registry.contains(7).await);
        memory.set_connected(true);
        assert!(registry.remove_if_registered(&live, 7).await.unwrap());
    }
}
