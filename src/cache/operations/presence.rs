use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use redis::{AsyncCommands, Client as RedisClient};
use tokio::time::Instant;

use super::{PresenceStore, Snapshot, SnapshotHandler, Subscription};
use crate::cache::keys::user_keys::{
    USERS_CHANNEL, user_id_from_key, user_presence_key, user_presence_pattern,
};
use crate::cache::models::presence::PresenceRecord;
use crate::error::StoreError;

/// 订阅断开后的重连间隔
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReconnectBackoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(30),
        }
    }
}

/// 基于 Redis 的共享存储
///
/// 记录以 JSON 存在 `users/{id}` 下，每次写入后在 `users` 频道广播用户ID。
#[derive(Clone)]
pub struct RedisPresenceStore {
    redis: Arc<RedisClient>,
    ttl_secs: u64,
    backoff: ReconnectBackoff,
}

impl RedisPresenceStore {
    pub fn new(redis: Arc<RedisClient>, ttl_secs: u64) -> Self {
        Self {
            redis,
            ttl_secs,
            backoff: ReconnectBackoff::default(),
        }
    }

    async fn load_snapshot(redis: &RedisClient) -> Result<Snapshot, StoreError> {
        let mut conn = redis.get_multiplexed_async_connection().await?;

        // 模式匹配所有用户记录键
        let keys: Vec<String> = conn.keys(user_presence_pattern()).await?;
        if keys.is_empty() {
            return Ok(Snapshot::new());
        }

        // 一次取回所有值，KEYS 之后过期的键返回 None
        let values: Vec<Option<String>> = conn.mget(&keys).await?;
        Ok(decode_snapshot(keys.into_iter().zip(values).collect()))
    }

    /// 建立一次订阅并持续推送快照，直到连接断开
    async fn follow(redis: &RedisClient, handler: &SnapshotHandler) -> Result<(), StoreError> {
        let mut pubsub = redis.get_async_pubsub().await?;
        pubsub.subscribe(USERS_CHANNEL).await?;

        handler(Self::load_snapshot(redis).await);

        let mut messages = pubsub.on_message();
        while messages.next().await.is_some() {
            handler(Self::load_snapshot(redis).await);
        }

        Err(StoreError::Unavailable("subscription closed".into()))
    }
}

/// 把键值对解析成快照，跳过无法识别的键、已过期的值和损坏的记录
pub(crate) fn decode_snapshot(entries: Vec<(String, Option<String>)>) -> Snapshot {
    let mut snapshot = HashMap::with_capacity(entries.len());

    for (key, value) in entries {
        let Some(user_id) = user_id_from_key(&key) else {
            continue;
        };
        let Some(json) = value else {
            continue;
        };
        match serde_json::from_str::<PresenceRecord>(&json) {
            Ok(record) => {
                snapshot.insert(user_id.to_string(), record);
            }
            Err(e) => {
                tracing::warn!("Skipping malformed presence record {}: {}", key, e);
            }
        }
    }

    snapshot
}

/// 反复执行 `follow`，每次失败都通知订阅者并按退避间隔重连
///
/// 只会在所在任务被取消时结束。
pub(crate) async fn follow_with_retry<F, Fut>(
    mut follow: F,
    handler: SnapshotHandler,
    backoff: ReconnectBackoff,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), StoreError>>,
{
    let mut delay = backoff.initial;
    loop {
        let started = Instant::now();
        let error = match follow().await {
            Ok(()) => StoreError::Unavailable("subscription closed".into()),
            Err(e) => e,
        };
        tracing::warn!("Presence subscription lost: {} (retry in {:?})", error, delay);
        handler(Err(error));

        // 连接稳定运行过一段时间则重新从最短间隔开始
        if started.elapsed() >= backoff.max {
            delay = backoff.initial;
        }
        tokio::time::sleep(delay).await;
        delay = (delay * 2).min(backoff.max);
    }
}

impl PresenceStore for RedisPresenceStore {
    async fn write(&self, user_id: &str, record: &PresenceRecord) -> Result<(), StoreError> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let key = user_presence_key(user_id);
        let json = serde_json::to_string(record)?;

        let _: () = conn.set_ex(&key, json, self.ttl_secs).await?;
        let _: i64 = conn.publish(USERS_CHANNEL, user_id).await?;

        tracing::debug!("Wrote presence record: {}", key);
        Ok(())
    }

    async fn snapshot(&self) -> Result<Snapshot, StoreError> {
        Self::load_snapshot(&self.redis).await
    }

    fn subscribe(&self, handler: SnapshotHandler) -> Subscription {
        let redis = self.redis.clone();
        let follow_handler = handler.clone();
        let follow = move || {
            let redis = redis.clone();
            let handler = follow_handler.clone();
            async move { Self::follow(&redis, &handler).await }
        };

        let task = tokio::spawn(follow_with_retry(follow, handler, self.backoff));
        Subscription::new(move || task.abort())
    }
}
