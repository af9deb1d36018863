//! 附近用户列表
//!
//! 订阅整个用户集合，把每次收到的完整快照过滤成可以显示在地图上的用户。

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

use crate::cache::operations::{PresenceStore, Snapshot, Subscription};
use crate::error::StoreError;
use crate::presence::clock::Clock;
use crate::utils::geo::Coordinates;

/// 过滤后的附近用户，每次快照都会重新生成
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Peer {
    pub id: String,
    pub display_name: Option<String>,
    pub coordinates: Coordinates,
    pub avatar_url: Option<String>,
    pub social_handles: BTreeMap<String, String>,
}

/// 点击用户标记后展示的社交卡片
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SocialCard {
    pub id: String,
    pub name: String,
    pub photo_url: Option<String>,
    pub links: Vec<SocialLink>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SocialLink {
    pub platform: String,
    pub handle: String,
    pub url: Option<String>,
}

fn profile_url(platform: &str, handle: &str) -> Option<String> {
    match platform {
        "instagram" => Some(format!("https://instagram.com/{}", handle)),
        "twitter" => Some(format!("https://twitter.com/{}", handle)),
        _ => None,
    }
}

impl Peer {
    pub fn social_card(&self) -> SocialCard {
        let name = match &self.display_name {
            Some(name) if !name.trim().is_empty() => name.clone(),
            _ => format!("User {}", self.id.chars().take(4).collect::<String>()),
        };

        let links = self
            .social_handles
            .iter()
            .map(|(platform, handle)| SocialLink {
                platform: platform.clone(),
                handle: handle.clone(),
                url: profile_url(platform, handle),
            })
            .collect();

        SocialCard {
            id: self.id.clone(),
            name,
            photo_url: self.avatar_url.clone(),
            links,
        }
    }
}

/// 过滤条件
#[derive(Debug, Clone)]
pub struct FeedFilter {
    pub own_id: String,
    pub freshness_window: Duration,
}

impl FeedFilter {
    pub fn new(own_id: impl Into<String>, freshness_window: Duration) -> Self {
        Self {
            own_id: own_id.into(),
            freshness_window,
        }
    }
}

/// 按顺序过滤：排除自己、没有坐标的、隐身的、过期的
pub fn derive_peers(snapshot: &Snapshot, filter: &FeedFilter, now_millis: i64) -> Vec<Peer> {
    let window = filter.freshness_window.as_millis() as i64;

    let mut peers: Vec<Peer> = snapshot
        .iter()
        .filter(|(id, _)| id.as_str() != filter.own_id)
        .filter_map(|(id, record)| {
            // 隐身用户直接排除，坐标不会离开这里
            let coordinates = record.visible_coordinates()?;
            if now_millis.saturating_sub(record.last_updated) >= window {
                return None;
            }
            Some(Peer {
                id: id.clone(),
                display_name: record.display_name.clone(),
                coordinates,
                avatar_url: record.avatar_url.clone(),
                social_handles: record.social_handles.clone(),
            })
        })
        .collect();

    peers.sort_by(|a, b| a.id.cmp(&b.id));
    peers
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FeedState {
    pub peers: Vec<Peer>,
    /// 收到第一份快照或错误之前为 true
    pub loading: bool,
    pub error: Option<String>,
}

impl FeedState {
    fn loading() -> Self {
        Self {
            loading: true,
            ..Self::default()
        }
    }
}

struct FeedShared {
    filter: FeedFilter,
    clock: Arc<dyn Clock>,
    /// 最近一次成功的快照，用于在没有新快照时重新判断过期
    latest: Mutex<Option<Snapshot>>,
    state: watch::Sender<FeedState>,
}

impl FeedShared {
    fn apply(&self, snapshot: Result<Snapshot, StoreError>) {
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        let next = match snapshot {
            Ok(snapshot) => {
                let peers = derive_peers(&snapshot, &self.filter, self.clock.now_millis());
                *latest = Some(snapshot);
                FeedState {
                    peers,
                    loading: false,
                    error: None,
                }
            }
            Err(e) => {
                tracing::warn!("Presence subscription error: {}", e);
                *latest = None;
                FeedState {
                    peers: Vec::new(),
                    loading: false,
                    error: Some(e.to_string()),
                }
            }
        };
        self.state.send_replace(next);
    }

    fn refresh(&self) {
        let latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(snapshot) = latest.as_ref() else {
            return;
        };
        let peers = derive_peers(snapshot, &self.filter, self.clock.now_millis());
        self.state.send_if_modified(|state| {
            if state.peers == peers {
                return false;
            }
            tracing::debug!("{} peers expired", state.peers.len().saturating_sub(peers.len()));
            state.peers = peers;
            true
        });
    }
}

/// 用最近一次快照重新过滤，让停止更新的用户在没有新快照时也会过期
#[derive(Clone)]
pub struct FeedRefresher(Arc<FeedShared>);

impl FeedRefresher {
    pub fn refresh(&self) {
        self.0.refresh();
    }
}

/// 附近用户订阅，结果通过 watch 通道对外暴露
pub struct PeerFeed {
    shared: Arc<FeedShared>,
    state: watch::Receiver<FeedState>,
    subscription: Subscription,
}

impl PeerFeed {
    pub fn start<S: PresenceStore>(
        store: &S,
        filter: FeedFilter,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(FeedState::loading());
        let shared = Arc::new(FeedShared {
            filter,
            clock,
            latest: Mutex::new(None),
            state: state_tx,
        });

        let handler_shared = shared.clone();
        let subscription = store.subscribe(Arc::new(
            move |snapshot: Result<Snapshot, StoreError>| handler_shared.apply(snapshot),
        ));

        Self {
            shared,
            state: state_rx,
            subscription,
        }
    }

    pub fn state(&self) -> watch::Receiver<FeedState> {
        self.state.clone()
    }

    pub fn peers(&self) -> Vec<Peer> {
        self.state.borrow().peers.clone()
    }

    pub fn refresher(&self) -> FeedRefresher {
        FeedRefresher(self.shared.clone())
    }

    pub fn stop(self) {
        self.subscription.unsubscribe();
    }
}
