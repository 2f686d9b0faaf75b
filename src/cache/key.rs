use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// 计算凭证指纹
///
/// Cache keys must never embed the bearer token itself; the 16-hex
/// fingerprint identifies the principal without leaking the credential.
pub fn principal_fingerprint(token: &str) -> String {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Key for a user's aggregated subscription feed.
pub fn feed_key(token: &str) -> String {
    format!("feed:{}", principal_fingerprint(token))
}

/// Key for a video's caption text. Captions are per-video, not per-user.
pub fn caption_key(video_id: &str) -> String {
    format!("caption:{}", video_id)
}

/// Key for a video's generated summary.
pub fn summary_key(video_id: &str) -> String {
    format!("summary:{}", video_id)
}

/// Key for a video's title/description metadata.
pub fn description_key(video_id: &str) -> String {
    format!("description:{}", video_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_deterministic() {
        assert_eq!(principal_fingerprint("token-a"), principal_fingerprint("token-a"));
        assert_ne!(principal_fingerprint("token-a"), principal_fingerprint("token-b"));
        assert_eq!(principal_fingerprint("token-a").len(), 16);
    }

    #[test]
    fn fingerprint_hides_the_token() {
        assert!(!feed_key("secret-bearer-token").contains("secret"));
    }

    #[test]
    fn distinct_resources_get_distinct_keys() {
        assert_ne!(caption_key("abc"), summary_key("abc"));
        assert_ne!(summary_key("abc"), summary_key("abd"));
        assert_ne!(caption_key("abc"), description_key("abc"));
    }
}
