/// 缓存键
/// 共享存储中使用的键和频道名
pub mod user_keys;

pub use user_keys::*;
