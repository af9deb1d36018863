use axum::{
    Router,
    routing::{get, post, put},
};

use crate::{
    AppState,
    middleware::{auth_middleware, log_errors},
    routes,
};

/// 本地控制接口，所有路由都只接受当前用户的令牌
pub fn create_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        // 定位
        .route("/location", post(routes::presence::report_location))
        .route("/location/error", post(routes::presence::report_location_error))
        .route("/location/retry", post(routes::presence::retry_location))
        // 在线状态
        .route("/presence/visibility", put(routes::presence::update_visibility))
        .route("/presence/profile", put(routes::presence::update_profile))
        .route("/presence/status", get(routes::presence::get_status))
        // 附近用户
        .route("/peers", get(routes::presence::find_peers))
        .route("/peers/card", get(routes::presence::find_peer_card))
        // 地图
        .route("/map/radius", put(routes::map::update_radius))
        .route("/map/recenter", post(routes::map::recenter))
        .route("/map/markers", get(routes::map::list_markers))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    let router = Router::new()
        .nest(&state.config.api_base_uri, protected_routes)
        .layer(axum::middleware::from_fn(log_errors));

    // 根据编译模式决定是否添加CORS
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(tower_http::cors::CorsLayer::permissive())
    };

    router.with_state(state)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
        response::Response,
    };
    use serde_json::{Value, json};
    use tokio::sync::watch;
    use tower::ServiceExt;

    use super::*;
    use crate::{
        cache::{MemoryPresenceStore, Profile},
        config::Config,
        presence::{
            FeedState, ManualClock, MarkerAnimator, Peer, PresencePublisher, PublishPolicy,
            PublisherHandle, PublisherTask,
        },
        render::TracingSurface,
        utils::{error_codes, geo::Coordinates, test_tokens},
    };

    const ME: &str = "me";

    struct Harness {
        app: Router,
        store: MemoryPresenceStore,
        publisher: PublisherHandle,
        feed: watch::Sender<FeedState>,
        _task: PublisherTask,
    }

    fn harness() -> Harness {
        let config = Config {
            jwt_secret: test_tokens::SECRET.into(),
            ..Config::default()
        };
        let store = MemoryPresenceStore::new();
        let (publisher, task) = PublisherHandle::spawn(
            Arc::new(store.clone()),
            PresencePublisher::new(ME, PublishPolicy::default(), Profile::default(), true),
            Arc::new(ManualClock::new(1_700_000_000_000)),
            Duration::from_secs(1),
        );
        let (feed_tx, feed_rx) = watch::channel(FeedState::default());
        let animator = Arc::new(Mutex::new(MarkerAnimator::new(
            TracingSurface::default(),
            0.08,
            50.0,
        )));

        let state = AppState {
            config,
            actor_id: ME.into(),
            publisher: publisher.clone(),
            feed: feed_rx,
            animator,
        };

        Harness {
            app: create_router(state),
            store,
            publisher,
            feed: feed_tx,
            _task: task,
        }
    }

    fn request(method: &str, uri: &str, body: Option<Value>, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let response: Response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn test_rejects_missing_or_foreign_token() {
        let h = harness();

        let (status, body) = send(&h.app, request("GET", "/api/presence/status", None, None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], error_codes::AUTH_FAILED);

        let other = test_tokens::token_for("someone-else");
        let (status, _) =
            send(&h.app, request("GET", "/api/presence/status", None, Some(&other))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_report_location_publishes() {
        let h = harness();
        let token = test_tokens::token_for(ME);

        let (status, body) = send(
            &h.app,
            request(
                "POST",
                "/api/location",
                Some(json!({ "latitude": 37.7749, "longitude": -122.4194 })),
                Some(&token),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["code"], error_codes::SUCCESS);

        let mut status_rx = h.publisher.subscribe_status();
        status_rx.wait_for(|s| s.publishes == 1).await.unwrap();

        let record = h.store.record(ME).unwrap();
        assert!(record.visible);
        assert_eq!(record.coordinates, Some(Coordinates::new(37.7749, -122.4194)));

        let (_, body) =
            send(&h.app, request("GET", "/api/presence/status", None, Some(&token))).await;
        assert_eq!(body["resp_data"]["location"], "granted");
        assert_eq!(body["resp_data"]["publishes"], 1);
    }

    #[tokio::test]
    async fn test_report_location_rejects_invalid_coordinates() {
        let h = harness();
        let token = test_tokens::token_for(ME);

        let (status, body) = send(
            &h.app,
            request(
                "POST",
                "/api/location",
                Some(json!({ "latitude": 120.0, "longitude": 0.0 })),
                Some(&token),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], error_codes::VALIDATION_ERROR);
        assert_eq!(h.store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_ghost_mode_omits_coordinates() {
        let h = harness();
        let token = test_tokens::token_for(ME);
        let mut status_rx = h.publisher.subscribe_status();

        send(
            &h.app,
            request(
                "POST",
                "/api/location",
                Some(json!({ "latitude": 1.0, "longitude": 2.0 })),
                Some(&token),
            ),
        )
        .await;
        status_rx.wait_for(|s| s.publishes == 1).await.unwrap();

        let (status, _) = send(
            &h.app,
            request(
                "PUT",
                "/api/presence/visibility",
                Some(json!({ "visible": false })),
                Some(&token),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        status_rx.wait_for(|s| s.publishes == 2).await.unwrap();

        let record = h.store.record(ME).unwrap();
        assert!(!record.visible);
        assert_eq!(record.coordinates, None);
    }

    #[tokio::test]
    async fn test_peers_and_card() {
        let h = harness();
        let token = test_tokens::token_for(ME);
        h.feed.send_replace(FeedState {
            peers: vec![Peer {
                id: "peer-1234".into(),
                display_name: Some("Grace".into()),
                coordinates: Coordinates::new(1.0, 1.0),
                avatar_url: None,
                social_handles: BTreeMap::from([("twitter".into(), "grace".into())]),
            }],
            loading: false,
            error: None,
        });

        let (_, body) = send(&h.app, request("GET", "/api/peers", None, Some(&token))).await;
        assert_eq!(body["resp_data"]["peers"][0]["id"], "peer-1234");

        let (status, body) = send(
            &h.app,
            request("GET", "/api/peers/card?user_id=peer-1234", None, Some(&token)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resp_data"]["name"], "Grace");
        assert_eq!(
            body["resp_data"]["links"][0]["url"],
            "https://twitter.com/grace"
        );

        let (status, body) = send(
            &h.app,
            request("GET", "/api/peers/card?user_id=unknown", None, Some(&token)),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], error_codes::NOT_FOUND);

        let (status, _) =
            send(&h.app, request("GET", "/api/peers/card", None, Some(&token))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_radius_is_clamped() {
        let h = harness();
        let token = test_tokens::token_for(ME);

        let (_, body) = send(
            &h.app,
            request("PUT", "/api/map/radius", Some(json!({ "feet": 500.0 })), Some(&token)),
        )
        .await;
        assert_eq!(body["resp_data"]["feet"], 150.0);
        assert_eq!(body["resp_data"]["zoom"], 20.0 - (150.0 * 0.3048 / 15.0_f64).log2());

        let (_, body) = send(
            &h.app,
            request("PUT", "/api/map/radius", Some(json!({ "feet": 1.0 })), Some(&token)),
        )
        .await;
        assert_eq!(body["resp_data"]["feet"], 20.0);
        assert_eq!(body["resp_data"]["zoom"], 20.0);
    }

    #[tokio::test]
    async fn test_recenter_without_position() {
        let h = harness();
        let token = test_tokens::token_for(ME);

        let (status, _) =
            send(&h.app, request("POST", "/api/map/recenter", None, Some(&token))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) =
            send(&h.app, request("GET", "/api/map/markers", None, Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["resp_data"]["markers"], json!([]));
        assert_eq!(body["resp_data"]["radius_feet"], 50.0);
    }
}
