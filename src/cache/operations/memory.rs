use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use super::{PresenceStore, Snapshot, SnapshotHandler, Subscription};
use crate::cache::models::presence::PresenceRecord;
use crate::error::StoreError;

/// 进程内共享存储，写入时同步通知所有订阅者
#[derive(Clone)]
pub struct MemoryPresenceStore {
    inner: Arc<Inner>,
}

struct Inner {
    records: Mutex<Snapshot>,
    listeners: Mutex<HashMap<u64, SnapshotHandler>>,
    next_listener_id: AtomicU64,
    available: AtomicBool,
    writes: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Default for MemoryPresenceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPresenceStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                records: Mutex::new(HashMap::new()),
                listeners: Mutex::new(HashMap::new()),
                next_listener_id: AtomicU64::new(0),
                available: AtomicBool::new(true),
                writes: AtomicU64::new(0),
            }),
        }
    }

    /// 模拟存储不可达
    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::SeqCst);
    }

    /// 成功写入的次数
    pub fn write_count(&self) -> u64 {
        self.inner.writes.load(Ordering::SeqCst)
    }

    pub fn record(&self, user_id: &str) -> Option<PresenceRecord> {
        lock(&self.inner.records).get(user_id).cloned()
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.inner.listeners).len()
    }

    /// 向所有订阅者推送一个订阅错误
    pub fn fail_subscribers(&self, error: StoreError) {
        for handler in self.handlers() {
            handler(Err(error.clone()));
        }
    }

    fn handlers(&self) -> Vec<SnapshotHandler> {
        lock(&self.inner.listeners).values().cloned().collect()
    }

    fn current(&self) -> Snapshot {
        lock(&self.inner.records).clone()
    }
}

impl PresenceStore for MemoryPresenceStore {
    async fn write(&self, user_id: &str, record: &PresenceRecord) -> Result<(), StoreError> {
        if !self.inner.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }

        let snapshot = {
            let mut records = lock(&self.inner.records);
            records.insert(user_id.to_string(), record.clone());
            records.clone()
        };
        self.inner.writes.fetch_add(1, Ordering::SeqCst);

        // 在锁外通知，订阅者可以再次访问存储
        for handler in self.handlers() {
            handler(Ok(snapshot.clone()));
        }
        Ok(())
    }

    async fn snapshot(&self) -> Result<Snapshot, StoreError> {
        if !self.inner.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(self.current())
    }

    fn subscribe(&self, handler: SnapshotHandler) -> Subscription {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.inner.listeners).insert(id, handler.clone());

        handler(Ok(self.current()));

        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = inner.upgrade() {
                lock(&inner.listeners).remove(&id);
            }
        })
    }
}
