//! Operation Filtering
//!
//! Decides which `custom_json` operation ids belong to the watched podping
//! namespace, and which ones are diagnostic posts.

/// Operation id prefixes watched on the main chain
pub const DEFAULT_WATCHED_IDS: &[&str] = &["pp_", "podping"];

/// Operation id prefixes watched in livetest mode
pub const LIVETEST_WATCHED_IDS: &[&str] = &["podping-livetest", "pplt_"];

/// Operation ids carrying diagnostic messages from podping servers
pub const DEFAULT_DIAGNOSTIC_IDS: &[&str] = &["podping-startup", "pp_startup"];

/// Prefix and allow-list matcher for operation ids
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationFilter {
    watched: Vec<String>,
    diagnostic: Vec<String>,
}

impl Default for OperationFilter {
    fn default() -> Self {
        Self::new(DEFAULT_WATCHED_IDS, DEFAULT_DIAGNOSTIC_IDS)
    }
}

impl OperationFilter {
    /// Create a filter from watched prefixes and diagnostic ids
    pub fn new<W, D>(watched: &[W], diagnostic: &[D]) -> Self
    where
        W: AsRef<str>,
        D: AsRef<str>,
    {
        Self {
            watched: watched.iter().map(|id| id.as_ref().to_string()).collect(),
            diagnostic: diagnostic.iter().map(|id| id.as_ref().to_string()).collect(),
        }
    }

    /// Filter for the livetest namespace, same diagnostic ids
    pub fn livetest() -> Self {
        Self::new(LIVETEST_WATCHED_IDS, DEFAULT_DIAGNOSTIC_IDS)
    }

    /// Check if an operation id starts with any watched prefix
    ///
    /// # Arguments
    /// * `op_id` - The `id` field of a `custom_json` operation
    ///
    /// # Returns
    /// `true` if the id is in the watched namespace, `false` otherwise
    pub fn is_watched(&self, op_id: &str) -> bool {
        self.watched.iter().any(|prefix| op_id.starts_with(prefix.as_str()))
    }

    /// Check if an operation id is one of the diagnostic ids (exact match)
    pub fn is_diagnostic(&self, op_id: &str) -> bool {
        self.diagnostic.iter().any(|id| id == op_id)
    }

    /// The watched prefixes, in configured order
    pub fn watched(&self) -> &[String] {
        &self.watched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==================== is_watched tests ====================

    #[test]
    fn test_watched_pp_prefix() {
        let filter = OperationFilter::default();
        assert!(filter.is_watched("pp_video_update"));
    }

    #[test]
    fn test_watched_podping_prefix() {
        let filter = OperationFilter::default();
        assert!(filter.is_watched("podping"));
        assert!(filter.is_watched("podping_feed_update"));
    }

    #[test]
    fn test_unwatched_id_returns_false() {
        let filter = OperationFilter::default();
        assert!(!filter.is_watched("sm_something"));
        assert!(!filter.is_watched("follow"));
        assert!(!filter.is_watched(""));
    }

    #[test]
    fn test_prefix_must_match_at_start() {
        let filter = OperationFilter::default();
        assert!(!filter.is_watched("xpp_video_update"));
        assert!(!filter.is_watched("not_podping"));
    }

    #[test]
    fn test_every_configured_prefix_matches_its_extensions() {
        let filter = OperationFilter::new(&["aa_", "bb", "c"], &[] as &[&str]);
        for prefix in filter.watched() {
            assert!(filter.is_watched(prefix));
            assert!(filter.is_watched(&format!("{}_suffix", prefix)));
        }
        assert!(!filter.is_watched("zz"));
    }

    #[test]
    fn test_empty_prefix_list_matches_nothing() {
        let filter = OperationFilter::new(&[] as &[&str], &[] as &[&str]);
        assert!(!filter.is_watched("pp_video_update"));
    }

    // ==================== livetest tests ====================

    #[test]
    fn test_livetest_filter_uses_livetest_ids() {
        let filter = OperationFilter::livetest();
        assert!(filter.is_watched("podping-livetest"));
        assert!(filter.is_watched("pplt_podcast_update"));
        assert!(!filter.is_watched("pp_podcast_update"));
    }

    // ==================== is_diagnostic tests ====================

    #[test]
    fn test_diagnostic_exact_match() {
        let filter = OperationFilter::default();
        assert!(filter.is_diagnostic("podping-startup"));
        assert!(filter.is_diagnostic("pp_startup"));
    }

    #[test]
    fn test_diagnostic_is_not_prefix_match() {
        let filter = OperationFilter::default();
        assert!(!filter.is_diagnostic("pp_startup_extra"));
        assert!(!filter.is_diagnostic("pp_"));
    }

    #[test]
    fn test_diagnostic_id_is_also_watched() {
        // pp_startup sits inside the pp_ namespace; the driver handles both paths
        let filter = OperationFilter::default();
        assert!(filter.is_watched("pp_startup"));
        assert!(filter.is_diagnostic("pp_startup"));
    }
}
