//! 位置发布
//!
//! 决定何时把当前用户的在线记录写入共享存储，以及写入什么内容。
//! `PresencePublisher` 只做决策，不做 IO；`PublisherHandle::spawn` 启动的任务
//! 负责接收定位、心跳计时和实际写入。

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::cache::models::presence::{PresenceRecord, Profile};
use crate::cache::operations::PresenceStore;
use crate::config::Config;
use crate::error::{AppError, GeolocationError, StoreError};
use crate::presence::clock::Clock;
use crate::presence::location::{LocationFix, LocationStatus};
use crate::utils::geo::Coordinates;

const COMMAND_BUFFER: usize = 64;

/// 发布策略：移动超过阈值立即发布，另外每个心跳周期强制发布一次
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PublishPolicy {
    pub movement_threshold_meters: f64,
    pub heartbeat: Duration,
}

impl Default for PublishPolicy {
    fn default() -> Self {
        Self {
            movement_threshold_meters: 1.0,
            heartbeat: Duration::from_secs(5),
        }
    }
}

impl PublishPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            movement_threshold_meters: config.movement_threshold_meters,
            heartbeat: config.heartbeat_interval(),
        }
    }
}

/// 发布决策
#[derive(Debug, Clone)]
pub struct PresencePublisher {
    user_id: String,
    policy: PublishPolicy,
    visible: bool,
    profile: Profile,
    latest_fix: Option<LocationFix>,
    last_published: Option<Coordinates>,
    last_updated: Option<i64>,
}

impl PresencePublisher {
    pub fn new(
        user_id: impl Into<String>,
        policy: PublishPolicy,
        profile: Profile,
        visible: bool,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            policy,
            visible,
            profile: profile.normalized(),
            latest_fix: None,
            last_published: None,
            last_updated: None,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn policy(&self) -> PublishPolicy {
        self.policy
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn latest_fix(&self) -> Option<LocationFix> {
        self.latest_fix
    }

    /// 收到新定位：第一次定位或移动超过阈值时发布
    pub fn on_fix(&mut self, fix: LocationFix, now_millis: i64) -> Option<PresenceRecord> {
        let coordinates = fix.coordinates();
        if !coordinates.is_valid() {
            tracing::warn!(
                "Ignoring invalid location fix: {}, {}",
                fix.latitude,
                fix.longitude
            );
            return None;
        }
        self.latest_fix = Some(fix);

        let moved = match self.last_published {
            None => true,
            Some(previous) => {
                previous.distance_to(&coordinates) > self.policy.movement_threshold_meters
            }
        };
        if !moved {
            return None;
        }

        Some(self.build_record(coordinates, now_millis))
    }

    /// 心跳：即使没有移动也用最近一次定位刷新 `lastUpdated`
    pub fn on_heartbeat(&mut self, now_millis: i64) -> Option<PresenceRecord> {
        let fix = self.latest_fix?;
        Some(self.build_record(fix.coordinates(), now_millis))
    }

    /// 切换隐身模式，状态变化且已有定位时立即发布
    pub fn set_visible(&mut self, visible: bool, now_millis: i64) -> Option<PresenceRecord> {
        if self.visible == visible {
            return None;
        }
        self.visible = visible;
        let fix = self.latest_fix?;
        Some(self.build_record(fix.coordinates(), now_millis))
    }

    /// 更新资料，之后每次发布都会带上新资料
    pub fn set_profile(&mut self, profile: Profile, now_millis: i64) -> Option<PresenceRecord> {
        self.profile = profile.normalized();
        let fix = self.latest_fix?;
        Some(self.build_record(fix.coordinates(), now_millis))
    }

    fn build_record(&mut self, coordinates: Coordinates, now_millis: i64) -> PresenceRecord {
        // lastUpdated 对同一发布方严格递增
        let last_updated = match self.last_updated {
            Some(previous) => now_millis.max(previous + 1),
            None => now_millis,
        };
        self.last_updated = Some(last_updated);
        self.last_published = Some(coordinates);

        PresenceRecord {
            id: self.user_id.clone(),
            coordinates: self.visible.then_some(coordinates),
            visible: self.visible,
            last_updated,
            display_name: self.profile.display_name.clone(),
            avatar_url: self.profile.avatar_url.clone(),
            social_handles: self.profile.social_handles.clone(),
        }
    }
}

/// 发布任务的对外状态
#[derive(Debug, Clone, Default, Serialize)]
pub struct PublisherStatus {
    pub location: LocationStatus,
    pub visible: bool,
    pub profile: Profile,
    /// 最近一次写入成功的记录
    pub last_record: Option<PresenceRecord>,
    pub publishes: u64,
    pub failed_publishes: u64,
    pub last_error: Option<String>,
}

#[derive(Debug)]
enum PublisherCommand {
    Fix(LocationFix),
    LocationError(GeolocationError),
    RetryPermission,
    SetVisible(bool),
    SetProfile(Profile),
}

/// 与发布任务通信的句柄
#[derive(Clone)]
pub struct PublisherHandle {
    commands: mpsc::Sender<PublisherCommand>,
    status: watch::Receiver<PublisherStatus>,
    own_position: watch::Receiver<Option<Coordinates>>,
}

/// 发布任务本身，`shutdown` 后停止心跳和写入
pub struct PublisherTask {
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

impl PublisherTask {
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.join.await {
            tracing::error!("Presence publisher task failed: {}", e);
        }
    }
}

impl PublisherHandle {
    pub fn spawn<S: PresenceStore>(
        store: Arc<S>,
        publisher: PresencePublisher,
        clock: Arc<dyn Clock>,
        write_timeout: Duration,
    ) -> (Self, PublisherTask) {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (status_tx, status_rx) = watch::channel(PublisherStatus {
            visible: publisher.visible(),
            profile: publisher.profile().clone(),
            ..PublisherStatus::default()
        });
        let (position_tx, position_rx) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let worker = PublisherWorker {
            store,
            publisher,
            clock,
            write_timeout,
            status: status_tx,
            own_position: position_tx,
        };
        let join = tokio::spawn(worker.run(commands_rx, shutdown_rx));

        (
            Self {
                commands: commands_tx,
                status: status_rx,
                own_position: position_rx,
            },
            PublisherTask {
                shutdown: shutdown_tx,
                join,
            },
        )
    }

    pub async fn report_fix(&self, fix: LocationFix) -> Result<(), AppError> {
        self.send(PublisherCommand::Fix(fix)).await
    }

    pub async fn report_error(&self, error: GeolocationError) -> Result<(), AppError> {
        self.send(PublisherCommand::LocationError(error)).await
    }

    /// 用户重新授权定位后调用
    pub async fn retry_permission(&self) -> Result<(), AppError> {
        self.send(PublisherCommand::RetryPermission).await
    }

    pub async fn set_visible(&self, visible: bool) -> Result<(), AppError> {
        self.send(PublisherCommand::SetVisible(visible)).await
    }

    pub async fn set_profile(&self, profile: Profile) -> Result<(), AppError> {
        self.send(PublisherCommand::SetProfile(profile)).await
    }

    pub fn status(&self) -> PublisherStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<PublisherStatus> {
        self.status.clone()
    }

    /// 自己的最新坐标（不论是否隐身），用于在本地地图上显示自己
    pub fn own_position(&self) -> watch::Receiver<Option<Coordinates>> {
        self.own_position.clone()
    }

    async fn send(&self, command: PublisherCommand) -> Result<(), AppError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| AppError::AgentStopped)
    }
}

struct PublisherWorker<S> {
    store: Arc<S>,
    publisher: PresencePublisher,
    clock: Arc<dyn Clock>,
    write_timeout: Duration,
    status: watch::Sender<PublisherStatus>,
    own_position: watch::Sender<Option<Coordinates>>,
}

impl<S: PresenceStore> PublisherWorker<S> {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<PublisherCommand>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let period = self.publisher.policy().heartbeat;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "Presence publisher started for {} (heartbeat {:?})",
            self.publisher.user_id(),
            period
        );

        loop {
            let record = tokio::select! {
                _ = &mut shutdown => break,
                _ = heartbeat.tick() => {
                    let now = self.clock.now_millis();
                    self.publisher.on_heartbeat(now)
                }
                command = commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
            };

            if let Some(record) = record {
                self.publish(record).await;
            }
        }

        tracing::info!("Presence publisher stopped for {}", self.publisher.user_id());
    }

    fn apply(&mut self, command: PublisherCommand) -> Option<PresenceRecord> {
        let now = self.clock.now_millis();
        match command {
            PublisherCommand::Fix(fix) => {
                let record = self.publisher.on_fix(fix, now);
                if let Some(fix) = self.publisher.latest_fix() {
                    self.own_position.send_replace(Some(fix.coordinates()));
                    self.status.send_modify(|s| s.location = LocationStatus::Granted);
                }
                record
            }
            PublisherCommand::LocationError(error) => {
                tracing::warn!("Location error: {}", error);
                self.status
                    .send_modify(|s| s.location = s.location.after_error(error));
                None
            }
            PublisherCommand::RetryPermission => {
                self.status.send_modify(|s| {
                    if s.location.is_blocking() {
                        s.location = LocationStatus::Pending;
                    }
                });
                None
            }
            PublisherCommand::SetVisible(visible) => {
                let record = self.publisher.set_visible(visible, now);
                self.status.send_modify(|s| s.visible = visible);
                record
            }
            PublisherCommand::SetProfile(profile) => {
                let record = self.publisher.set_profile(profile, now);
                let profile = self.publisher.profile().clone();
                self.status.send_modify(|s| s.profile = profile);
                record
            }
        }
    }

    /// 写入失败只记录，不单独重试，等下一次移动或心跳
    async fn publish(&self, record: PresenceRecord) {
        let result =
            match tokio::time::timeout(self.write_timeout, self.store.write(&record.id, &record))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(StoreError::Timeout),
            };

        match result {
            Ok(()) => {
                tracing::debug!(
                    "Published presence for {} (visible: {}, lastUpdated: {})",
                    record.id,
                    record.visible,
                    record.last_updated
                );
                self.status.send_modify(|s| {
                    s.publishes += 1;
                    s.last_error = None;
                    s.last_record = Some(record);
                });
            }
            Err(e) => {
                tracing::warn!("Failed to publish presence for {}: {}", record.id, e);
                self.status.send_modify(|s| {
                    s.failed_publishes += 1;
                    s.last_error = Some(e.to_string());
                });
            }
        }
    }
}
