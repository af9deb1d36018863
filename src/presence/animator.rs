//! 标记动画
//!
//! 每帧把每个标记向目标位置移动剩余距离的固定比例（指数平滑），
//! 让地图上的移动与后端推送频率无关。

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::presence::feed::Peer;
use crate::render::{CircleHandle, CircleStyle, MarkerHandle, MarkerStyle, RenderSurface};
use crate::utils::geo::{Coordinates, clamp_radius_feet, feet_to_meters, zoom_from_radius};

/// 每帧移动剩余距离的比例
pub const ANIMATION_SPEED: f64 = 0.08;

/// 剩余距离小于该值（度）时直接吸附到目标
pub const SNAP_EPSILON_DEGREES: f64 = 1e-7;

/// 向目标插值一步，不会越过目标
pub fn interpolate(current: Coordinates, target: Coordinates, speed: f64) -> Coordinates {
    let latitude = current.latitude + (target.latitude - current.latitude) * speed;
    let longitude = current.longitude + (target.longitude - current.longitude) * speed;

    if (target.latitude - latitude).abs() < SNAP_EPSILON_DEGREES
        && (target.longitude - longitude).abs() < SNAP_EPSILON_DEGREES
    {
        target
    } else {
        Coordinates::new(latitude, longitude)
    }
}

#[derive(Debug, Clone, Copy)]
struct AnimatedMarker {
    handle: MarkerHandle,
    current: Coordinates,
    target: Coordinates,
}

impl AnimatedMarker {
    /// 返回本帧是否移动了
    fn advance(&mut self, speed: f64) -> bool {
        if self.current == self.target {
            return false;
        }
        self.current = interpolate(self.current, self.target, speed);
        true
    }
}

#[derive(Debug, Clone, Copy)]
struct OwnMarker {
    marker: AnimatedMarker,
    circle: CircleHandle,
}

/// 对外展示的标记状态
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkerView {
    /// 自己的标记为 None
    pub user_id: Option<String>,
    pub current: Coordinates,
    pub target: Coordinates,
}

pub struct MarkerAnimator<R> {
    surface: R,
    speed: f64,
    radius_feet: f64,
    peers: HashMap<String, AnimatedMarker>,
    own: Option<OwnMarker>,
}

impl<R: RenderSurface> MarkerAnimator<R> {
    pub fn new(surface: R, speed: f64, radius_feet: f64) -> Self {
        Self {
            surface,
            speed,
            radius_feet: clamp_radius_feet(radius_feet),
            peers: HashMap::new(),
            own: None,
        }
    }

    pub fn surface(&self) -> &R {
        &self.surface
    }

    pub fn radius_feet(&self) -> f64 {
        self.radius_feet
    }

    pub fn zoom(&self) -> f64 {
        zoom_from_radius(self.radius_feet)
    }

    /// 根据最新的附近用户列表创建、更新或删除标记
    ///
    /// 已有标记只更新目标位置，当前位置继续从原处插值。
    pub fn sync_peers(&mut self, peers: &[Peer]) {
        let mut departed: HashSet<String> = self.peers.keys().cloned().collect();

        for peer in peers {
            departed.remove(&peer.id);
            match self.peers.get_mut(&peer.id) {
                Some(marker) => marker.target = peer.coordinates,
                None => {
                    let style = MarkerStyle::peer(peer.display_name.clone());
                    let handle = self.surface.create_marker(peer.coordinates, &style);
                    self.peers.insert(
                        peer.id.clone(),
                        AnimatedMarker {
                            handle,
                            current: peer.coordinates,
                            target: peer.coordinates,
                        },
                    );
                }
            }
        }

        for id in departed {
            if let Some(marker) = self.peers.remove(&id) {
                self.surface.remove_marker(marker.handle);
            }
        }
    }

    /// 更新自己的目标位置；第一次定位时创建标记和半径圆，并把地图移到这里
    pub fn set_own_target(&mut self, at: Coordinates) {
        if let Some(own) = self.own.as_mut() {
            own.marker.target = at;
            return;
        }

        let handle = self.surface.create_marker(at, &MarkerStyle::own());
        let circle = self.surface.create_circle(
            at,
            feet_to_meters(self.radius_feet),
            &CircleStyle::radius(),
        );
        self.surface.pan_to(at);
        self.surface.set_zoom(self.zoom());

        self.own = Some(OwnMarker {
            marker: AnimatedMarker {
                handle,
                current: at,
                target: at,
            },
            circle,
        });
    }

    pub fn clear_own(&mut self) {
        if let Some(own) = self.own.take() {
            self.surface.remove_marker(own.marker.handle);
            self.surface.remove_circle(own.circle);
        }
    }

    /// 设置共享半径，返回限制后的值
    pub fn set_radius_feet(&mut self, feet: f64) -> f64 {
        self.radius_feet = clamp_radius_feet(feet);
        if let Some(own) = self.own {
            self.surface
                .set_circle_radius(own.circle, feet_to_meters(self.radius_feet));
        }
        self.surface.set_zoom(self.zoom());
        self.radius_feet
    }

    /// 推进一帧
    pub fn tick(&mut self) {
        for marker in self.peers.values_mut() {
            if marker.advance(self.speed) {
                self.surface.set_marker_position(marker.handle, marker.current);
            }
        }

        if let Some(own) = self.own.as_mut() {
            if own.marker.advance(self.speed) {
                self.surface
                    .set_marker_position(own.marker.handle, own.marker.current);
                // 半径圆跟随插值后的位置，而不是原始目标
                self.surface.set_circle_center(own.circle, own.marker.current);
            }
        }
    }

    /// 把地图移回自己当前的位置
    pub fn recenter(&mut self) -> Option<Coordinates> {
        let at = self.own.map(|own| own.marker.current)?;
        self.surface.pan_to(at);
        self.surface.set_zoom(self.zoom());
        Some(at)
    }

    /// 移除所有标记，视图关闭时调用
    pub fn clear(&mut self) {
        for (_, marker) in self.peers.drain() {
            self.surface.remove_marker(marker.handle);
        }
        self.clear_own();
    }

    pub fn peer_position(&self, user_id: &str) -> Option<Coordinates> {
        self.peers.get(user_id).map(|m| m.current)
    }

    pub fn own_position(&self) -> Option<Coordinates> {
        self.own.map(|own| own.marker.current)
    }

    pub fn marker_count(&self) -> usize {
        self.peers.len() + usize::from(self.own.is_some())
    }

    pub fn markers(&self) -> Vec<MarkerView> {
        let mut views: Vec<MarkerView> = self
            .peers
            .iter()
            .map(|(id, m)| MarkerView {
                user_id: Some(id.clone()),
                current: m.current,
                target: m.target,
            })
            .collect();
        views.sort_by(|a, b| a.user_id.cmp(&b.user_id));

        if let Some(own) = self.own {
            views.insert(
                0,
                MarkerView {
                    user_id: None,
                    current: own.marker.current,
                    target: own.marker.target,
                },
            );
        }
        views
    }
}
