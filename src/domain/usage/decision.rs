//! Outcome of a usage check

use serde::Serialize;

/// What the key manager decided about one metered call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UsageDecision {
    /// Key absent or inactive
    Invalid,
    /// Plan ignores limits entirely; nothing is counted
    BypassAllowed,
    /// Quota for this feature is unlimited; nothing is counted
    UnlimitedAllowed,
    QuotaAllowed { current_usage: u64, limit: u64 },
    QuotaExceeded { current_usage: u64, limit: u64 },
}

impl UsageDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(
            self,
            Self::BypassAllowed | Self::UnlimitedAllowed | Self::QuotaAllowed { .. }
        )
    }

    /// Whether a successful call should add to the usage counter
    pub fn counts_usage(&self) -> bool {
        matches!(self, Self::QuotaAllowed { .. })
    }

    /// Label used for metrics and logs
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::BypassAllowed => "bypass",
            Self::UnlimitedAllowed => "unlimited",
            Self::QuotaAllowed { .. } => "allowed",
            Self::QuotaExceeded { .. } => "exceeded",
        }
    }
}
