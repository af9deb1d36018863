use serde::{Deserialize, Serialize};

use crate::presence::MarkerView;

#[derive(Debug, Deserialize)]
pub struct UpdateRadiusRequest {
    pub feet: f64,
}

// 限制后的半径和对应的缩放级别
#[derive(Debug, Serialize)]
pub struct RadiusResponse {
    pub feet: f64,
    pub meters: f64,
    pub zoom: f64,
}

#[derive(Debug, Serialize)]
pub struct MarkersResponse {
    pub radius_feet: f64,
    pub zoom: f64,
    pub markers: Vec<MarkerView>,
}
