use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::utils::geo::Coordinates;

/// 用户在线记录，每个用户一条，以用户ID为键
///
/// 每次发布都是整条覆盖，写入方必须带上资料字段，否则资料会丢失。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub id: String,
    /// 隐身模式下不写入该字段
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub last_updated: i64, // Unix 毫秒时间戳
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub social_handles: BTreeMap<String, String>,
}

impl PresenceRecord {
    /// 可以展示在他人地图上的坐标；隐身时即使记录里有坐标也忽略
    pub fn visible_coordinates(&self) -> Option<Coordinates> {
        if !self.visible {
            return None;
        }
        self.coordinates.filter(Coordinates::is_valid)
    }
}

/// 用户可编辑的资料，与位置生命周期无关
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub social_handles: BTreeMap<String, String>,
}

impl Profile {
    /// 去掉空白和账号前的 `@`，丢弃空账号，平台名统一为小写
    pub fn normalized(self) -> Self {
        let non_empty = |s: Option<String>| {
            s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
        };

        let social_handles = self
            .social_handles
            .into_iter()
            .filter_map(|(platform, handle)| {
                let platform = platform.trim().to_lowercase();
                let handle = handle.trim().trim_start_matches('@').trim().to_string();
                if platform.is_empty() || handle.is_empty() {
                    None
                } else {
                    Some((platform, handle))
                }
            })
            .collect();

        Self {
            display_name: non_empty(self.display_name),
            avatar_url: non_empty(self.avatar_url),
            social_handles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(visible: bool, coordinates: Option<Coordinates>) -> PresenceRecord {
        PresenceRecord {
            id: "u1".into(),
            coordinates,
            visible,
            last_updated: 1_000,
            display_name: Some("Ada".into()),
            avatar_url: None,
            social_handles: BTreeMap::from([("instagram".into(), "ada".into())]),
        }
    }

    #[test]
    fn test_ghost_record_omits_coordinates_field() {
        let json = serde_json::to_value(record(false, None)).unwrap();
        assert!(json.get("coordinates").is_none());
        assert_eq!(json["visible"], false);
        assert_eq!(json["lastUpdated"], 1_000);
        assert_eq!(json["socialHandles"]["instagram"], "ada");
    }

    #[test]
    fn test_ghost_coordinates_are_ignored() {
        let r = record(false, Some(Coordinates::new(1.0, 2.0)));
        assert_eq!(r.visible_coordinates(), None);

        let r = record(true, Some(Coordinates::new(1.0, 2.0)));
        assert_eq!(r.visible_coordinates(), Some(Coordinates::new(1.0, 2.0)));
    }

    #[test]
    fn test_missing_fields_default_to_hidden_and_stale() {
        let r: PresenceRecord = serde_json::from_str(r#"{"id":"x"}"#).unwrap();
        assert!(!r.visible);
        assert_eq!(r.last_updated, 0);
        assert!(r.coordinates.is_none());
        assert!(r.social_handles.is_empty());
    }

    #[test]
    fn test_profile_normalization() {
        let profile = Profile {
            display_name: Some("  Ada ".into()),
            avatar_url: Some("".into()),
            social_handles: BTreeMap::from([
                ("Instagram".into(), "@ada_l".into()),
                ("twitter".into(), "  ".into()),
                ("".into(), "orphan".into()),
            ]),
        }
        .normalized();

        assert_eq!(profile.display_name.as_deref(), Some("Ada"));
        assert_eq!(profile.avatar_url, None);
        assert_eq!(profile.social_handles.len(), 1);
        assert_eq!(profile.social_handles["instagram"], "ada_l");
    }
}
