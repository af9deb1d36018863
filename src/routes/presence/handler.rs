use axum::{
    Json,
    extract::{Query, State},
};

use crate::{
    AppState,
    error::AppError,
    presence::{FeedState, PublisherStatus, SocialCard},
    routes::presence::model::{
        AcceptedResponse, LocationErrorRequest, PeerCardQuery, ReportLocationRequest,
        UpdateProfileRequest, UpdateVisibilityRequest,
    },
    utils::{ApiResponse, success_to_api_response},
};

// 上报设备定位
pub async fn report_location(
    State(state): State<AppState>,
    Json(request): Json<ReportLocationRequest>,
) -> Result<Json<ApiResponse<AcceptedResponse>>, AppError> {
    let fix = request.into_fix(chrono::Utc::now().timestamp_millis())?;
    state.publisher.report_fix(fix).await?;
    Ok(success_to_api_response(AcceptedResponse::new()))
}

// 上报定位失败
pub async fn report_location_error(
    State(state): State<AppState>,
    Json(request): Json<LocationErrorRequest>,
) -> Result<Json<ApiResponse<AcceptedResponse>>, AppError> {
    state.publisher.report_error(request.kind.into()).await?;
    Ok(success_to_api_response(AcceptedResponse::new()))
}

// 用户重新授权定位
pub async fn retry_location(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<AcceptedResponse>>, AppError> {
    state.publisher.retry_permission().await?;
    Ok(success_to_api_response(AcceptedResponse::new()))
}

// 切换隐身模式
pub async fn update_visibility(
    State(state): State<AppState>,
    Json(request): Json<UpdateVisibilityRequest>,
) -> Result<Json<ApiResponse<AcceptedResponse>>, AppError> {
    tracing::info!("Visibility change requested: visible={}", request.visible);
    state.publisher.set_visible(request.visible).await?;
    Ok(success_to_api_response(AcceptedResponse::new()))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<AcceptedResponse>>, AppError> {
    let profile = request.into_profile()?;
    state.publisher.set_profile(profile).await?;
    Ok(success_to_api_response(AcceptedResponse::new()))
}

pub async fn get_status(State(state): State<AppState>) -> Json<ApiResponse<PublisherStatus>> {
    success_to_api_response(state.publisher.status())
}

// 获取附近用户
pub async fn find_peers(State(state): State<AppState>) -> Json<ApiResponse<FeedState>> {
    let feed = state.feed.borrow().clone();
    success_to_api_response(feed)
}

// 获取附近用户的社交卡片
pub async fn find_peer_card(
    State(state): State<AppState>,
    Query(query): Query<PeerCardQuery>,
) -> Result<Json<ApiResponse<SocialCard>>, AppError> {
    let user_id = query
        .user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::Validation("missing user_id".into()))?;

    let card = state
        .feed
        .borrow()
        .peers
        .iter()
        .find(|peer| peer.id == user_id)
        .map(|peer| peer.social_card());

    card.map(success_to_api_response)
        .ok_or_else(|| AppError::NotFound(format!("peer {}", user_id)))
}
