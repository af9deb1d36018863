//! 地图渲染接口
//!
//! 地图引擎本身不在本项目内，这里只定义放置标记、画圆和移动视角的能力。

use serde::Serialize;

use crate::utils::geo::Coordinates;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MarkerHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CircleHandle(pub u64);

#[derive(Debug, Clone, PartialEq)]
pub struct MarkerStyle {
    pub fill_color: &'static str,
    pub scale: u8,
    pub z_index: i32,
    pub title: Option<String>,
}

impl MarkerStyle {
    /// 自己的标记
    pub fn own() -> Self {
        Self {
            fill_color: "#ea384c",
            scale: 8,
            z_index: 1000,
            title: None,
        }
    }

    /// 附近用户的标记
    pub fn peer(title: Option<String>) -> Self {
        Self {
            fill_color: "#00FFAA",
            scale: 6,
            z_index: 0,
            title,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CircleStyle {
    pub stroke_color: &'static str,
    pub fill_color: &'static str,
    pub fill_opacity: f32,
    pub z_index: i32,
}

impl CircleStyle {
    /// 共享半径圆
    pub fn radius() -> Self {
        Self {
            stroke_color: "#ea384c",
            fill_color: "#ea384c",
            fill_opacity: 0.1,
            z_index: 500,
        }
    }
}

/// 渲染面
pub trait RenderSurface {
    fn create_marker(&mut self, at: Coordinates, style: &MarkerStyle) -> MarkerHandle;
    fn set_marker_position(&mut self, marker: MarkerHandle, at: Coordinates);
    fn remove_marker(&mut self, marker: MarkerHandle);
    fn create_circle(
        &mut self,
        center: Coordinates,
        radius_meters: f64,
        style: &CircleStyle,
    ) -> CircleHandle;
    fn set_circle_center(&mut self, circle: CircleHandle, center: Coordinates);
    fn set_circle_radius(&mut self, circle: CircleHandle, radius_meters: f64);
    fn remove_circle(&mut self, circle: CircleHandle);
    fn pan_to(&mut self, at: Coordinates);
    fn set_zoom(&mut self, zoom: f64);
}

/// 无界面运行时使用的渲染面，只输出日志
#[derive(Debug, Default)]
pub struct TracingSurface {
    next_handle: u64,
}

impl TracingSurface {
    fn allocate(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

impl RenderSurface for TracingSurface {
    fn create_marker(&mut self, at: Coordinates, style: &MarkerStyle) -> MarkerHandle {
        let handle = MarkerHandle(self.allocate());
        tracing::debug!(
            "Create marker {:?} at ({}, {}) title={:?}",
            handle,
            at.latitude,
            at.longitude,
            style.title
        );
        handle
    }

    fn set_marker_position(&mut self, marker: MarkerHandle, at: Coordinates) {
        tracing::trace!("Move marker {:?} to ({}, {})", marker, at.latitude, at.longitude);
    }

    fn remove_marker(&mut self, marker: MarkerHandle) {
        tracing::debug!("Remove marker {:?}", marker);
    }

    fn create_circle(
        &mut self,
        center: Coordinates,
        radius_meters: f64,
        _style: &CircleStyle,
    ) -> CircleHandle {
        let handle = CircleHandle(self.allocate());
        tracing::debug!(
            "Create circle {:?} at ({}, {}) radius {:.2}m",
            handle,
            center.latitude,
            center.longitude,
            radius_meters
        );
        handle
    }

    fn set_circle_center(&mut self, circle: CircleHandle, center: Coordinates) {
        tracing::trace!(
            "Move circle {:?} to ({}, {})",
            circle,
            center.latitude,
            center.longitude
        );
    }

    fn set_circle_radius(&mut self, circle: CircleHandle, radius_meters: f64) {
        tracing::debug!("Resize circle {:?} to {:.2}m", circle, radius_meters);
    }

    fn remove_circle(&mut self, circle: CircleHandle) {
        tracing::debug!("Remove circle {:?}", circle);
    }

    fn pan_to(&mut self, at: Coordinates) {
        tracing::debug!("Pan to ({}, {})", at.latitude, at.longitude);
    }

    fn set_zoom(&mut self, zoom: f64) {
        tracing::debug!("Set zoom {:.2}", zoom);
    }
}
