use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct TrackerEntry {
    task_id: Uuid,
    cancel: CancellationToken,
}

/// Live reminder tasks keyed by Slack identity.
#[derive(Clone, Default)]
pub struct TrackerRegistry {
    inner: Arc<Mutex<HashMap<String, Vec<TrackerEntry>>>>,
}

impl TrackerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, identity: &str, task_id: Uuid, cancel: CancellationToken) {
        let mut map = self.inner.lock().await;
        map.entry(identity.to_string())
            .or_default()
            .push(TrackerEntry { task_id, cancel });
    }

    /// Cancel every task for `identity` and register the new one under a single
    /// lock, so concurrent replacements leave exactly one live task. Returns how
    /// many tasks were cancelled.
    pub async fn replace(
        &self,
        identity: &str,
        task_id: Uuid,
        cancel: CancellationToken,
    ) -> usize {
        let previous = self
            .inner
            .lock()
            .await
            .insert(identity.to_string(), vec![TrackerEntry { task_id, cancel }])
            .unwrap_or_default();
        for entry in &previous {
            entry.cancel.cancel();
        }
        previous.len()
    }

    /// Forget a task that has finished on its own. Returns false if it was already gone.
    pub async fn remove(&self, identity: &str, task_id: Uuid) -> bool {
        let mut map = self.inner.lock().await;
        let Some(entries) = map.get_mut(identity) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.task_id != task_id);
        let removed = entries.len() != before;
        if entries.is_empty() {
            map.remove(identity);
        }
        removed
    }

    /// Cancel and forget every task for `identity`.
    pub async fn cancel(&self, identity: &str) -> usize {
        let entries = self.inner.lock().await.remove(identity).unwrap_or_default();
        for entry in &entries {
            entry.cancel.cancel();
        }
        entries.len()
    }

    pub async fn cancel_all(&self) -> usize {
        let drained: Vec<TrackerEntry> = {
            let mut map = self.inner.lock().await;
            map.drain().flat_map(|(_, entries)| entries).collect()
        };
        for entry in &drained {
            entry.cancel.cancel();
        }
        drained.len()
    }

    pub async fn active(&self, identity: &str) -> usize {
        self.inner.lock().await.get(identity).map_or(0, Vec::len)
    }

    pub async fn total(&self) -> usize {
        self.inner.lock().await.values().map(Vec::len).sum()
    }
}
