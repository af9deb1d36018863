//! 雷达地图视图
//!
//! 把附近用户订阅和逐帧动画绑定在一起。关闭视图时两者一起停止，
//! 之后不会再有任何回调修改标记。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::cache::operations::PresenceStore;
use crate::presence::animator::MarkerAnimator;
use crate::presence::clock::Clock;
use crate::presence::feed::{FeedFilter, FeedState, PeerFeed};
use crate::render::RenderSurface;
use crate::utils::geo::Coordinates;

/// 没有新快照时重新判断附近用户是否过期的间隔
const FRESHNESS_RECHECK: Duration = Duration::from_secs(1);

pub type SharedAnimator<R> = Arc<Mutex<MarkerAnimator<R>>>;

pub fn lock_animator<R>(
    animator: &Mutex<MarkerAnimator<R>>,
) -> MutexGuard<'_, MarkerAnimator<R>> {
    animator.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct RadarView<R: RenderSurface> {
    feed: Option<PeerFeed>,
    frames: Option<JoinHandle<()>>,
    feed_state: watch::Receiver<FeedState>,
    animator: SharedAnimator<R>,
    closed: Arc<AtomicBool>,
}

impl<R: RenderSurface + Send + 'static> RadarView<R> {
    pub fn open<S: PresenceStore>(
        store: &S,
        filter: FeedFilter,
        clock: Arc<dyn Clock>,
        animator: SharedAnimator<R>,
        mut own_position: watch::Receiver<Option<Coordinates>>,
        frame_interval: Duration,
    ) -> Self {
        let feed = PeerFeed::start(store, filter, clock);
        let feed_state = feed.state();
        let closed = Arc::new(AtomicBool::new(false));

        let refresher = feed.refresher();
        let mut peers = feed.state();
        // 第一帧就应用当前值
        peers.mark_changed();
        own_position.mark_changed();

        let frame_animator = animator.clone();
        let frame_closed = closed.clone();
        let frames = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(frame_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last_recheck = Instant::now();

            loop {
                ticker.tick().await;

                if last_recheck.elapsed() >= FRESHNESS_RECHECK {
                    refresher.refresh();
                    last_recheck = Instant::now();
                }

                let next_peers = if peers.has_changed().unwrap_or(false) {
                    Some(peers.borrow_and_update().peers.clone())
                } else {
                    None
                };
                let next_own = if own_position.has_changed().unwrap_or(false) {
                    Some(*own_position.borrow_and_update())
                } else {
                    None
                };

                {
                    let mut animator = lock_animator(&frame_animator);
                    // 关闭标志和清理都在锁内，关闭后不会再推进任何标记
                    if frame_closed.load(Ordering::SeqCst) {
                        break;
                    }
                    if let Some(next_peers) = next_peers {
                        animator.sync_peers(&next_peers);
                    }
                    match next_own {
                        Some(Some(at)) => animator.set_own_target(at),
                        Some(None) => animator.clear_own(),
                        None => {}
                    }
                    animator.tick();
                }
            }
        });

        tracing::info!("Radar view opened (frame interval {:?})", frame_interval);

        Self {
            feed: Some(feed),
            frames: Some(frames),
            feed_state,
            animator,
            closed,
        }
    }
}

impl<R: RenderSurface> RadarView<R> {
    pub fn feed_state(&self) -> watch::Receiver<FeedState> {
        self.feed_state.clone()
    }

    pub fn animator(&self) -> SharedAnimator<R> {
        self.animator.clone()
    }

    /// 同时取消订阅、停止动画并移除所有标记
    pub fn close(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        let (Some(feed), Some(frames)) = (self.feed.take(), self.frames.take()) else {
            return;
        };

        {
            let mut animator = lock_animator(&self.animator);
            self.closed.store(true, Ordering::SeqCst);
            frames.abort();
            feed.stop();
            animator.clear();
        }

        tracing::info!("Radar view closed");
    }
}

impl<R: RenderSurface> Drop for RadarView<R> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::models::presence::PresenceRecord;
    use crate::cache::operations::MemoryPresenceStore;
    use crate::presence::animator::ANIMATION_SPEED;
    use crate::presence::clock::ManualClock;
    use crate::render::testing::RecordingSurface;
    use std::collections::BTreeMap;

    const NOW: i64 = 1_700_000_000_000;
    const FRAME: Duration = Duration::from_millis(16);

    fn visible(id: &str, latitude: f64, longitude: f64) -> PresenceRecord {
        PresenceRecord {
            id: id.into(),
            coordinates: Some(Coordinates::new(latitude, longitude)),
            visible: true,
            last_updated: NOW,
            display_name: None,
            avatar_url: None,
            social_handles: BTreeMap::new(),
        }
    }

    fn open(
        store: &MemoryPresenceStore,
        own: watch::Receiver<Option<Coordinates>>,
    ) -> (RadarView<RecordingSurface>, SharedAnimator<RecordingSurface>) {
        let animator = Arc::new(Mutex::new(MarkerAnimator::new(
            RecordingSurface::default(),
            ANIMATION_SPEED,
            50.0,
        )));
        let view = RadarView::open(
            store,
            FeedFilter::new("me", Duration::from_secs(60)),
            Arc::new(ManualClock::new(NOW)),
            animator.clone(),
            own,
            FRAME,
        );
        (view, animator)
    }

    #[tokio::test(start_paused = true)]
    async fn test_frames_apply_feed_and_own_position() {
        let store = MemoryPresenceStore::new();
        store.write("p1", &visible("p1", 1.0, 1.0)).await.unwrap();
        let (own_tx, own_rx) = watch::channel(Some(Coordinates::new(0.0, 0.0)));

        let (view, animator) = open(&store, own_rx);
        tokio::time::sleep(FRAME * 2).await;
        {
            let a = lock_animator(&animator);
            assert_eq!(a.peer_position("p1"), Some(Coordinates::new(1.0, 1.0)));
            assert_eq!(a.own_position(), Some(Coordinates::new(0.0, 0.0)));
        }

        store.write("p1", &visible("p1", 2.0, 2.0)).await.unwrap();
        own_tx.send_replace(Some(Coordinates::new(0.5, 0.5)));
        tokio::time::sleep(FRAME * 100).await;
        {
            let a = lock_animator(&animator);
            let p1 = a.peer_position("p1").unwrap();
            assert!(p1.latitude > 1.9 && p1.latitude <= 2.0);
            let own = a.own_position().unwrap();
            assert!(own.latitude > 0.49 && own.latitude <= 0.5);
        }

        view.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_unsubscribes_and_stops_frames() {
        let store = MemoryPresenceStore::new();
        store.write("p1", &visible("p1", 1.0, 1.0)).await.unwrap();
        let (_own_tx, own_rx) = watch::channel(Some(Coordinates::new(0.0, 0.0)));

        let (view, animator) = open(&store, own_rx);
        tokio::time::sleep(FRAME * 2).await;
        assert_eq!(store.listener_count(), 1);
        assert_eq!(lock_animator(&animator).marker_count(), 2);

        view.close();
        assert_eq!(store.listener_count(), 0);
        assert_eq!(lock_animator(&animator).marker_count(), 0);

        // 关闭后的写入和时间推进都不会再碰到标记
        store.write("p2", &visible("p2", 3.0, 3.0)).await.unwrap();
        tokio::time::sleep(FRAME * 10).await;
        let a = lock_animator(&animator);
        assert_eq!(a.marker_count(), 0);
        assert!(a.surface().markers.is_empty());
        assert!(a.surface().circles.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_expires_without_new_snapshot() {
        let store = MemoryPresenceStore::new();
        store.write("p1", &visible("p1", 1.0, 1.0)).await.unwrap();
        let (_own_tx, own_rx) = watch::channel(None);
        let clock = ManualClock::new(NOW);
        let animator = Arc::new(Mutex::new(MarkerAnimator::new(
            RecordingSurface::default(),
            ANIMATION_SPEED,
            50.0,
        )));

        let view = RadarView::open(
            &store,
            FeedFilter::new("me", Duration::from_secs(60)),
            Arc::new(clock.clone()),
            animator.clone(),
            own_rx,
            FRAME,
        );
        tokio::time::sleep(FRAME * 2).await;
        assert_eq!(lock_animator(&animator).marker_count(), 1);

        // p1 不再写入，存储也没有任何通知
        clock.advance(Duration::from_secs(61));
        tokio::time::sleep(FRESHNESS_RECHECK * 2).await;
        assert_eq!(lock_animator(&animator).marker_count(), 0);
        assert!(view.feed_state().borrow().peers.is_empty());

        view.close();
    }

    #[tokio::test(start_paused = true)]
    async fn test_departed_peer_marker_removed() {
        let store = MemoryPresenceStore::new();
        store.write("p1", &visible("p1", 1.0, 1.0)).await.unwrap();
        let (_own_tx, own_rx) = watch::channel(None);

        let (view, animator) = open(&store, own_rx);
        tokio::time::sleep(FRAME * 2).await;
        assert_eq!(lock_animator(&animator).marker_count(), 1);

        let mut ghost = visible("p1", 1.0, 1.0);
        ghost.visible = false;
        ghost.coordinates = None;
        store.write("p1", &ghost).await.unwrap();
        tokio::time::sleep(FRAME * 2).await;
        assert_eq!(lock_animator(&animator).marker_count(), 0);

        drop(view);
        assert_eq!(store.listener_count(), 0);
    }
}
