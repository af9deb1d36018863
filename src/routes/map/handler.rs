use axum::{Json, extract::State};

use crate::{
    AppState,
    error::AppError,
    presence::lock_animator,
    routes::map::model::{MarkersResponse, RadiusResponse, UpdateRadiusRequest},
    utils::{
        ApiResponse,
        geo::{Coordinates, feet_to_meters},
        success_to_api_response,
    },
};

// 调整共享半径，超出范围的值会被限制
pub async fn update_radius(
    State(state): State<AppState>,
    Json(request): Json<UpdateRadiusRequest>,
) -> Json<ApiResponse<RadiusResponse>> {
    let mut animator = lock_animator(&state.animator);
    let feet = animator.set_radius_feet(request.feet);
    success_to_api_response(RadiusResponse {
        feet,
        meters: feet_to_meters(feet),
        zoom: animator.zoom(),
    })
}

// 地图移回自己的位置
pub async fn recenter(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Coordinates>>, AppError> {
    let at = lock_animator(&state.animator).recenter();
    at.map(success_to_api_response)
        .ok_or_else(|| AppError::NotFound("own position not known yet".into()))
}

pub async fn list_markers(State(state): State<AppState>) -> Json<ApiResponse<MarkersResponse>> {
    let animator = lock_animator(&state.animator);
    success_to_api_response(MarkersResponse {
        radius_feet: animator.radius_feet(),
        zoom: animator.zoom(),
        markers: animator.markers(),
    })
}
