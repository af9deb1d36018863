/// 缓存操作
/// 共享存储的读写和订阅
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::cache::models::presence::PresenceRecord;
use crate::error::StoreError;

// 内存存储
pub mod memory;

// Redis 存储
pub mod presence;

pub use memory::MemoryPresenceStore;
pub use presence::RedisPresenceStore;

/// 用户ID到在线记录的完整映射
pub type Snapshot = HashMap<String, PresenceRecord>;

/// 每次变更都会收到完整快照，而不是增量
pub type SnapshotHandler = Arc<dyn Fn(Result<Snapshot, StoreError>) + Send + Sync>;

/// 共享实时存储
///
/// 每个键只有一个写入方（记录的所有者），读取方任意多个，最后写入的生效。
pub trait PresenceStore: Send + Sync + 'static {
    /// 整条覆盖写入用户记录
    fn write(
        &self,
        user_id: &str,
        record: &PresenceRecord,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// 读取当前所有记录
    fn snapshot(&self) -> impl Future<Output = Result<Snapshot, StoreError>> + Send;

    /// 订阅整个用户集合；订阅后立即收到一次当前快照
    fn subscribe(&self, handler: SnapshotHandler) -> Subscription;
}

/// 订阅句柄，调用 `unsubscribe` 或丢弃时取消订阅
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(mut self) {
        self.cancel_now();
    }

    fn cancel_now(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel_now();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}
