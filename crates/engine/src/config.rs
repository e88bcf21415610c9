use std::time::Duration;

/// Tunables for classification, dedup, and dispatch.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Half-width of the duplicate-merge window, seconds (inclusive bounds).
    pub group_window_secs: i64,
    /// Fingerprint time-bucket width; defaults to the grouping window.
    pub fingerprint_bucket_secs: Option<i64>,
    /// Escalate local rule misses to the external classifier.
    pub ai_enabled: bool,
    pub ai_timeout: Duration,
    /// Currency stamped on drafts that do not bind one.
    pub default_currency: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            group_window_secs: 180,
            fingerprint_bucket_secs: None,
            ai_enabled: false,
            ai_timeout: Duration::from_secs(10),
            default_currency: "CNY".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn bucket_secs(&self) -> i64 {
        self.fingerprint_bucket_secs
            .unwrap_or(self.group_window_secs)
    }
}
