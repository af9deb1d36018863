use config::Config;
use presence::{FeedState, PublisherHandle, SharedAnimator};
use render::TracingSurface;
use tokio::sync::watch;

pub mod cache;
pub mod config;
pub mod error;
pub mod middleware;
pub mod presence;
pub mod render;
pub mod router;
pub mod utils;

pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// 当前用户ID，由身份令牌解析得到
    pub actor_id: String,
    pub publisher: PublisherHandle,
    pub feed: watch::Receiver<FeedState>,
    pub animator: SharedAnimator<TracingSurface>,
}
