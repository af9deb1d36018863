use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use zoned::{
    AppState,
    cache::{Profile, RedisPresenceStore},
    config::Config,
    presence::{
        FeedFilter, MarkerAnimator, PresencePublisher, PublishPolicy, PublisherHandle, RadarView,
        SystemClock,
    },
    render::TracingSurface,
    router::create_router,
    utils::verify_token,
};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    #[cfg(debug_assertions)]
    tracing::info!("Running in debug mode with CORS enabled");

    #[cfg(not(debug_assertions))]
    tracing::info!("Running in production mode with CORS disabled");

    // 当前用户身份
    let actor_id = verify_token(&config.actor_token, &config.jwt_secret)
        .expect("Invalid ACTOR_TOKEN")
        .sub;
    tracing::info!("Sharing presence as {}", actor_id);

    // 设置 Redis 客户端
    let redis_client =
        redis::Client::open(config.redis_url.clone()).expect("Failed to create Redis client");
    let store = Arc::new(RedisPresenceStore::new(
        Arc::new(redis_client),
        config.presence_ttl_secs,
    ));

    let clock = Arc::new(SystemClock);
    let profile = Profile {
        display_name: config.display_name.clone(),
        avatar_url: config.avatar_url.clone(),
        ..Profile::default()
    }
    .normalized();

    // 启动发布任务，默认可见
    let (publisher, publisher_task) = PublisherHandle::spawn(
        store.clone(),
        PresencePublisher::new(
            actor_id.clone(),
            PublishPolicy::from_config(&config),
            profile,
            true,
        ),
        clock.clone(),
        config.write_timeout(),
    );

    // 打开雷达视图
    let animator = Arc::new(Mutex::new(MarkerAnimator::new(
        TracingSurface::default(),
        config.animation_speed,
        config.default_radius_feet,
    )));
    let view = RadarView::open(
        store.as_ref(),
        FeedFilter::new(actor_id.clone(), config.freshness_window()),
        clock,
        animator,
        publisher.own_position(),
        config.frame_interval(),
    );

    // 设置应用状态
    let state = AppState {
        config: config.clone(),
        actor_id,
        publisher,
        feed: view.feed_state(),
        animator: view.animator(),
    };

    let app = create_router(state);

    // 启动服务器
    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    // 先关闭视图再停止发布
    view.close();
    publisher_task.shutdown().await;
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
