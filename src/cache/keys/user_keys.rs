/// 用户在线记录键前缀
const USER_PRESENCE_PREFIX: &str = "users/";

/// 用户记录变更通知频道
pub const USERS_CHANNEL: &str = "users";

/// 生成用户在线记录键
pub fn user_presence_key(user_id: &str) -> String {
    format!("{}{}", USER_PRESENCE_PREFIX, user_id)
}

/// 匹配所有用户在线记录的模式
pub fn user_presence_pattern() -> String {
    format!("{}*", USER_PRESENCE_PREFIX)
}

/// 从键中取出用户ID
pub fn user_id_from_key(key: &str) -> Option<&str> {
    key.strip_prefix(USER_PRESENCE_PREFIX)
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_roundtrip() {
        let key = user_presence_key("abc123");
        assert_eq!(key, "users/abc123");
        assert_eq!(user_id_from_key(&key), Some("abc123"));
        assert_eq!(user_id_from_key("users/"), None);
        assert_eq!(user_id_from_key("session:1"), None);
    }
}
