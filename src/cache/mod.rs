// 缓存模块
// 共享实时存储：数据结构、键和读写操作

pub mod keys;
pub mod models;
pub mod operations;

// 重新导出常用类型，方便其他模块使用
pub use models::presence::{PresenceRecord, Profile};
pub use operations::{
    MemoryPresenceStore, PresenceStore, RedisPresenceStore, Snapshot, SnapshotHandler,
    Subscription,
};
