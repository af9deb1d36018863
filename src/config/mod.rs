use std::env;
use std::time::Duration;

use crate::utils::geo::{DEFAULT_RADIUS_FEET, clamp_radius_feet};

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    pub redis_url: String,
    pub jwt_secret: String,
    pub actor_token: String,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
    pub movement_threshold_meters: f64,
    pub heartbeat_interval_secs: u64,
    pub freshness_window_secs: u64,
    pub presence_ttl_secs: u64,
    pub write_timeout_ms: u64,
    pub animation_speed: f64,
    pub frame_interval_ms: u64,
    pub default_radius_feet: f64,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1/".into(),
            jwt_secret: String::new(),
            actor_token: String::new(),
            server_host: "127.0.0.1".into(),
            server_port: 3000,
            api_base_uri: "/api".into(),
            movement_threshold_meters: 1.0,
            heartbeat_interval_secs: 5,
            freshness_window_secs: 60,
            presence_ttl_secs: 3600,
            write_timeout_ms: 3000,
            animation_speed: 0.08,
            frame_interval_ms: 16,
            default_radius_feet: DEFAULT_RADIUS_FEET,
            display_name: None,
            avatar_url: None,
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        dotenv::dotenv().ok();

        let defaults = Config::default();
        let animation_speed = parse_or("ANIMATION_SPEED", defaults.animation_speed);

        Ok(Config {
            redis_url: env::var("REDIS_URL")?,
            jwt_secret: env::var("JWT_SECRET")?,
            actor_token: env::var("ACTOR_TOKEN")?,
            server_host: optional("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parse_or("SERVER_PORT", defaults.server_port),
            api_base_uri: optional("API_BASE_URI").unwrap_or(defaults.api_base_uri),
            movement_threshold_meters: parse_or(
                "MOVEMENT_THRESHOLD_METERS",
                defaults.movement_threshold_meters,
            ),
            heartbeat_interval_secs: parse_or("HEARTBEAT_INTERVAL_SECS", 5u64).max(1),
            freshness_window_secs: parse_or("FRESHNESS_WINDOW_SECS", 60u64).max(1),
            presence_ttl_secs: parse_or("PRESENCE_TTL_SECS", defaults.presence_ttl_secs),
            write_timeout_ms: parse_or("WRITE_TIMEOUT_MS", defaults.write_timeout_ms),
            // 插值系数必须在 (0, 1) 之间
            animation_speed: if animation_speed > 0.0 && animation_speed < 1.0 {
                animation_speed
            } else {
                defaults.animation_speed
            },
            frame_interval_ms: parse_or("FRAME_INTERVAL_MS", defaults.frame_interval_ms).max(1),
            default_radius_feet: clamp_radius_feet(parse_or(
                "DEFAULT_RADIUS_FEET",
                defaults.default_radius_feet,
            )),
            display_name: optional("DISPLAY_NAME"),
            avatar_url: optional("AVATAR_URL"),
        })
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.freshness_window_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}
