use serde::{Deserialize, Serialize};

use crate::error::GeolocationError;
use crate::utils::geo::Coordinates;

/// 设备定位结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    /// 精度（米）
    pub accuracy: f64,
    pub timestamp: i64, // Unix 毫秒时间戳
}

impl LocationFix {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// 定位权限和可用状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationStatus {
    /// 还没有收到任何定位
    #[default]
    Pending,
    Granted,
    /// 需要用户重新授权，不会自动重试
    PermissionDenied,
    /// 暂时拿不到定位，不影响已有数据
    Unavailable,
}

impl LocationStatus {
    /// 收到定位错误后的状态
    pub fn after_error(self, error: GeolocationError) -> Self {
        match error {
            GeolocationError::PermissionDenied => LocationStatus::PermissionDenied,
            // 权限被拒时，超时之类的错误不能解除阻塞状态
            GeolocationError::Unavailable | GeolocationError::Timeout => match self {
                LocationStatus::PermissionDenied => LocationStatus::PermissionDenied,
                _ => LocationStatus::Unavailable,
            },
        }
    }

    pub fn is_blocking(self) -> bool {
        self == LocationStatus::PermissionDenied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        let status = LocationStatus::Granted.after_error(GeolocationError::Timeout);
        assert_eq!(status, LocationStatus::Unavailable);

        let status = status.after_error(GeolocationError::PermissionDenied);
        assert!(status.is_blocking());

        // 已拒绝时不会被其它错误覆盖
        let status = status.after_error(GeolocationError::Unavailable);
        assert_eq!(status, LocationStatus::PermissionDenied);
    }
}
