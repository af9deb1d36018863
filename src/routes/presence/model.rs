use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cache::models::presence::Profile;
use crate::error::{AppError, GeolocationError};
use crate::presence::LocationFix;
use crate::utils::geo::Coordinates;

// 上报定位请求参数
#[derive(Debug, Deserialize)]
pub struct ReportLocationRequest {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
    /// 设备给出的定位时间，缺省用服务器时间
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl ReportLocationRequest {
    pub fn into_fix(self, now_millis: i64) -> Result<LocationFix, AppError> {
        if !Coordinates::new(self.latitude, self.longitude).is_valid() {
            return Err(AppError::Validation(format!(
                "coordinates out of range: {}, {}",
                self.latitude, self.longitude
            )));
        }
        let accuracy = self.accuracy.unwrap_or(0.0);
        if !accuracy.is_finite() || accuracy < 0.0 {
            return Err(AppError::Validation("accuracy must be non-negative".into()));
        }

        Ok(LocationFix {
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy,
            timestamp: self.timestamp.unwrap_or(now_millis),
        })
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationErrorKind {
    PermissionDenied,
    Unavailable,
    Timeout,
}

impl From<LocationErrorKind> for GeolocationError {
    fn from(kind: LocationErrorKind) -> Self {
        match kind {
            LocationErrorKind::PermissionDenied => GeolocationError::PermissionDenied,
            LocationErrorKind::Unavailable => GeolocationError::Unavailable,
            LocationErrorKind::Timeout => GeolocationError::Timeout,
        }
    }
}

// 定位失败请求参数
#[derive(Debug, Deserialize)]
pub struct LocationErrorRequest {
    pub kind: LocationErrorKind,
}

#[derive(Debug, Deserialize)]
pub struct UpdateVisibilityRequest {
    pub visible: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub social_handles: BTreeMap<String, String>,
}

const MAX_DISPLAY_NAME_CHARS: usize = 50;

impl UpdateProfileRequest {
    pub fn into_profile(self) -> Result<Profile, AppError> {
        let profile = Profile {
            display_name: self.display_name,
            avatar_url: self.avatar_url,
            social_handles: self.social_handles,
        }
        .normalized();

        if let Some(name) = &profile.display_name {
            if name.chars().count() > MAX_DISPLAY_NAME_CHARS {
                return Err(AppError::Validation(format!(
                    "display name longer than {} characters",
                    MAX_DISPLAY_NAME_CHARS
                )));
            }
        }
        Ok(profile)
    }
}

#[derive(Debug, Deserialize)]
pub struct PeerCardQuery {
    pub user_id: Option<String>,
}

// 指令已交给发布任务
#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub accepted: bool,
}

impl AcceptedResponse {
    pub fn new() -> Self {
        Self { accepted: true }
    }
}
