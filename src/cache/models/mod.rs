/// 缓存数据模型
/// 定义共享存储中的数据结构
pub mod presence;

pub use presence::{PresenceRecord, Profile};
