//! Type-safe cache key builder with versioning

use crate::core::constants::CACHE_KEY_VERSION;

/// Type-safe cache key builder
///
/// All keys are prefixed with a version (e.g., "v1:") to allow
/// invalidating all cached data on schema changes.
pub struct CacheKey;

impl CacheKey {
    /// Cache key for a talk's info
    pub fn talk_info(talk_id: &str) -> String {
        format!("{}:talk:{}", CACHE_KEY_VERSION, talk_id)
    }

    /// Cache key for a talk's owning servicer ID
    pub fn talk_servicer(talk_id: &str) -> String {
        format!("{}:talk:servicer:{}", CACHE_KEY_VERSION, talk_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_talk_keys() {
        assert_eq!(CacheKey::talk_info("t1"), "v1:talk:t1");
        assert_eq!(CacheKey::talk_servicer("t1"), "v1:talk:servicer:t1");
    }
}
