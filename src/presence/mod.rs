//! 位置共享和在线状态
//!
//! 数据单向流动：设备定位 → 发布 → 共享存储 → 附近用户 → 标记动画 → 地图。

pub mod animator;
pub mod clock;
pub mod feed;
pub mod location;
pub mod publisher;
pub mod view;

pub use animator::{MarkerAnimator, MarkerView};
pub use clock::{Clock, ManualClock, SystemClock};
pub use feed::{FeedFilter, FeedRefresher, FeedState, Peer, PeerFeed, SocialCard, derive_peers};
pub use location::{LocationFix, LocationStatus};
pub use publisher::{
    PresencePublisher, PublishPolicy, PublisherHandle, PublisherStatus, PublisherTask,
};
pub use view::{RadarView, SharedAnimator, lock_animator};
