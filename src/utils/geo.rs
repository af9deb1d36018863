use serde::{Deserialize, Serialize};

/// 地球半径（米）
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// 1英尺对应的米数
pub const METERS_PER_FOOT: f64 = 0.3048;

pub const ZOOM_MIN: f64 = 15.0;
pub const ZOOM_MAX: f64 = 20.0;
const BASE_ZOOM: f64 = 20.0;
const REFERENCE_METERS: f64 = 15.0;

/// 半径滑块的取值范围（英尺）
pub const RADIUS_MIN_FEET: f64 = 20.0;
pub const RADIUS_MAX_FEET: f64 = 150.0;
pub const DEFAULT_RADIUS_FEET: f64 = 50.0;

/// 经纬度坐标
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// 坐标是否落在合法范围内
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    pub fn distance_to(&self, other: &Coordinates) -> f64 {
        haversine_distance(self, other)
    }
}

// 计算球面距离的函数（基于经纬度）
pub fn haversine_distance(a: &Coordinates, b: &Coordinates) -> f64 {
    // 使用Haversine公式计算距离
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let delta_phi = (b.latitude - a.latitude).to_radians();
    let delta_lambda = (b.longitude - a.longitude).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    // 对跖点附近舍入误差可能让 h 略大于 1
    let h = h.min(1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c // 返回距离（米）
}

pub fn feet_to_meters(feet: f64) -> f64 {
    feet * METERS_PER_FOOT
}

/// 将半径限制在滑块范围内，非法输入回退到默认值
pub fn clamp_radius_feet(feet: f64) -> f64 {
    if !feet.is_finite() {
        return DEFAULT_RADIUS_FEET;
    }
    feet.clamp(RADIUS_MIN_FEET, RADIUS_MAX_FEET)
}

/// 根据共享半径计算地图缩放级别，半径越大缩放级别越小
pub fn zoom_from_radius(feet: f64) -> f64 {
    let meters = feet_to_meters(feet);
    (BASE_ZOOM - (meters / REFERENCE_METERS).log2()).clamp(ZOOM_MIN, ZOOM_MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SF: Coordinates = Coordinates {
        latitude: 37.7749,
        longitude: -122.4194,
    };

    #[test]
    fn test_distance_to_self_is_zero() {
        assert_eq!(haversine_distance(&SF, &SF), 0.0);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let points = [
            SF,
            Coordinates::new(40.7128, -74.0060),
            Coordinates::new(-33.8688, 151.2093),
            Coordinates::new(0.0, 179.9999),
            Coordinates::new(0.0, -179.9999),
            Coordinates::new(89.9, 0.0),
        ];
        for a in &points {
            for b in &points {
                let ab = haversine_distance(a, b);
                let ba = haversine_distance(b, a);
                assert!((ab - ba).abs() < 1e-6, "{:?} <-> {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_known_distances() {
        // 纬度相差 0.001 度约 111 米
        let north = Coordinates::new(SF.latitude + 0.001, SF.longitude);
        let d = haversine_distance(&SF, &north);
        assert!((d - 111.19).abs() < 0.1, "got {}", d);

        // 旧金山到纽约约 4129 公里
        let nyc = Coordinates::new(40.7128, -74.0060);
        let d = haversine_distance(&SF, &nyc);
        assert!((d - 4_129_000.0).abs() < 5_000.0, "got {}", d);
    }

    #[test]
    fn test_antimeridian_distance_is_short() {
        let east = Coordinates::new(0.0, 179.9999);
        let west = Coordinates::new(0.0, -179.9999);
        assert!(haversine_distance(&east, &west) < 25.0);
    }

    #[test]
    fn test_antipodal_distance_is_finite() {
        let half_circumference = std::f64::consts::PI * EARTH_RADIUS_METERS;
        for lat in -89..=89 {
            for lng in (-180..180).step_by(3) {
                let a = Coordinates::new(lat as f64 * 0.97, lng as f64 + 0.31);
                let antipode_lng = if a.longitude > 0.0 {
                    a.longitude - 180.0
                } else {
                    a.longitude + 180.0
                };
                let b = Coordinates::new(-a.latitude, antipode_lng);
                let d = a.distance_to(&b);
                assert!(d.is_finite(), "{:?} -> {:?}", a, b);
                assert!((d - half_circumference).abs() < 1.0, "{:?}: {}", a, d);
            }
        }
    }

    #[test]
    fn test_zoom_within_bounds_and_monotonic() {
        let mut previous = f64::INFINITY;
        let mut feet = RADIUS_MIN_FEET;
        while feet <= RADIUS_MAX_FEET {
            let zoom = zoom_from_radius(feet);
            assert!((ZOOM_MIN..=ZOOM_MAX).contains(&zoom), "{} ft -> {}", feet, zoom);
            assert!(zoom <= previous, "zoom increased at {} ft", feet);
            previous = zoom;
            feet += 0.5;
        }
    }

    #[test]
    fn test_zoom_reference_values() {
        // 15 米正好是参考半径
        let feet = 15.0 / METERS_PER_FOOT;
        assert!((zoom_from_radius(feet) - 20.0).abs() < 1e-9);
        // 150 英尺 = 45.72 米，20 - log2(3.048)
        let expected = 20.0 - (45.72f64 / 15.0).log2();
        assert!((zoom_from_radius(150.0) - expected).abs() < 1e-9);
        // 很大的半径被限制在最小缩放级别
        assert_eq!(zoom_from_radius(100_000.0), ZOOM_MIN);
    }

    #[test]
    fn test_clamp_radius() {
        assert_eq!(clamp_radius_feet(5.0), RADIUS_MIN_FEET);
        assert_eq!(clamp_radius_feet(75.0), 75.0);
        assert_eq!(clamp_radius_feet(500.0), RADIUS_MAX_FEET);
        assert_eq!(clamp_radius_feet(f64::NAN), DEFAULT_RADIUS_FEET);
    }

    #[test]
    fn test_coordinate_validation() {
        assert!(SF.is_valid());
        assert!(!Coordinates::new(91.0, 0.0).is_valid());
        assert!(!Coordinates::new(0.0, -181.0).is_valid());
        assert!(!Coordinates::new(f64::NAN, 0.0).is_valid());
    }
}
