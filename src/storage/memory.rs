//! 内存存储
//!
//! 克隆出的句柄共享同一份数据，任一句柄 save / clear 都会通知其余 watch 订阅者（类似多标签页同步）。

use std::sync::{Arc, Mutex};

use crate::core::AgentState;
use crate::storage::{StateStorage, StorageError, Subscription, WatchCallback};

#[derive(Default)]
struct Inner {
    state: Option<AgentState>,
    watchers: Vec<(u64, WatchCallback)>,
    next_id: u64,
}

/// 进程内存储；可克隆，克隆体共享数据
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一份已保存的状态
    pub fn with_state(state: AgentState) -> Self {
        let storage = Self::new();
        if let Ok(mut inner) = storage.inner.lock() {
            inner.state = Some(state);
        }
        storage
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StorageError> {
        self.inner
            .lock()
            .map_err(|_| StorageError::Backend("memory storage lock poisoned".to_string()))
    }

    fn notify(&self, state: Option<&AgentState>) -> Result<(), StorageError> {
        // 先复制回调列表再调用，回调里可以再次访问存储
        let watchers: Vec<WatchCallback> = self.lock()?.watchers.iter().map(|(_, cb)| cb.clone()).collect();
        for cb in watchers {
            cb(state);
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage").finish_non_exhaustive()
    }
}

impl StateStorage for MemoryStorage {
    fn load(&self) -> Result<Option<AgentState>, StorageError> {
        Ok(self.lock()?.state.clone())
    }

    fn save(&self, state: &AgentState) -> Result<(), StorageError> {
        self.lock()?.state = Some(state.clone());
        self.notify(Some(state))
    }

    fn clear(&self) -> Result<(), StorageError> {
        self.lock()?.state = None;
        self.notify(None)
    }

    fn watch(&self, callback: WatchCallback) -> Option<Subscription> {
        let mut inner = self.inner.lock().ok()?;
        let id = inner.next_id;
        inner.next_id += 1;
        inner.watchers.push((id, callback));
        let weak = Arc::downgrade(&self.inner);
        Some(Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                if let Ok(mut inner) = inner.lock() {
                    inner.watchers.retain(|(wid, _)| *wid != id);
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_save_load_clear() {
        let storage = MemoryStorage::new();
        assert!(storage.load().unwrap().is_none());
        let mut state = AgentState::new();
        state.version = 4;
        storage.save(&state).unwrap();
        assert_eq!(storage.load().unwrap().unwrap().version, 4);
        storage.clear().unwrap();
        assert!(storage.load().unwrap().is_none());
    }

    #[test]
    fn test_clones_share_data_and_notify() {
        let a = MemoryStorage::new();
        let b = a.clone();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let sub = a
            .watch(Arc::new(move |_s: Option<&AgentState>| {
                h.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        b.save(&AgentState::new()).unwrap();
        assert!(a.load().unwrap().is_some());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        sub.unsubscribe();
        b.clear().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
