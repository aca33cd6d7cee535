//! Plan definitions and their quota types

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::feature::Feature;
use crate::domain::DomainError;

/// Integer value that stands for "unlimited" / "never" in serialized plans
pub const UNLIMITED_SENTINEL: i64 = -1;

/// Plan identifier - lowercase alphanumeric plus hyphens/underscores, max 32 characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PlanId(String);

impl PlanId {
    /// Create a new PlanId after validation
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        validate_plan_id(&id)?;
        Ok(Self(id))
    }

    pub fn free() -> Self {
        Self("free".to_string())
    }

    pub fn pro() -> Self {
        Self("pro".to_string())
    }

    pub fn premium() -> Self {
        Self("premium".to_string())
    }

    pub fn god() -> Self {
        Self("god".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PlanId {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PlanId> for String {
    fn from(id: PlanId) -> Self {
        id.0
    }
}

impl std::fmt::Display for PlanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn validate_plan_id(id: &str) -> Result<(), DomainError> {
    if id.is_empty() {
        return Err(DomainError::validation("Plan name cannot be empty"));
    }

    if id.len() > 32 {
        return Err(DomainError::validation(format!(
            "Plan name too long: {} chars (max 32)",
            id.len()
        )));
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(DomainError::validation(
            "Plan name must be lowercase alphanumeric with hyphens/underscores",
        ));
    }

    Ok(())
}

/// Per-feature allowance within one reset period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum Quota {
    Limited(u64),
    /// Never compared against usage
    Unlimited,
}

impl TryFrom<i64> for Quota {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            UNLIMITED_SENTINEL => Ok(Self::Unlimited),
            n if n >= 0 => Ok(Self::Limited(n as u64)),
            n => Err(format!("invalid quota {}: expected >= 0 or -1", n)),
        }
    }
}

impl From<Quota> for i64 {
    fn from(quota: Quota) -> Self {
        match quota {
            Quota::Limited(n) => i64::try_from(n).unwrap_or(i64::MAX),
            Quota::Unlimited => UNLIMITED_SENTINEL,
        }
    }
}

impl std::fmt::Display for Quota {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Limited(n) => write!(f, "{}", n),
            Self::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// How often usage counters are zeroed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum ResetPeriod {
    Days(u32),
    Never,
}

impl ResetPeriod {
    /// True when strictly more than the period has elapsed since `last_reset`
    pub fn is_due(&self, last_reset: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            Self::Days(days) => now.signed_duration_since(last_reset) > Duration::days(i64::from(*days)),
            Self::Never => false,
        }
    }
}

impl Default for ResetPeriod {
    fn default() -> Self {
        Self::Days(30)
    }
}

impl TryFrom<i64> for ResetPeriod {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            UNLIMITED_SENTINEL => Ok(Self::Never),
            n if n >= 0 => u32::try_from(n)
                .map(Self::Days)
                .map_err(|_| format!("reset period {} days is too large", n)),
            n => Err(format!("invalid reset period {}: expected >= 0 or -1", n)),
        }
    }
}

impl From<ResetPeriod> for i64 {
    fn from(period: ResetPeriod) -> Self {
        match period {
            ResetPeriod::Days(days) => i64::from(days),
            ResetPeriod::Never => UNLIMITED_SENTINEL,
        }
    }
}

/// A named bundle of quotas and a reset cadence
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlanDefinition {
    #[serde(default)]
    quotas: BTreeMap<Feature, Quota>,
    #[serde(default)]
    reset_period_days: ResetPeriod,
    #[serde(default)]
    bypass_all_limits: bool,
    #[serde(default)]
    admin_access: bool,
}

impl PlanDefinition {
    pub fn new(reset_period: ResetPeriod) -> Self {
        Self {
            reset_period_days: reset_period,
            ..Default::default()
        }
    }

    pub fn with_quota(mut self, feature: Feature, quota: Quota) -> Self {
        self.quotas.insert(feature, quota);
        self
    }

    /// Apply the same quota to every feature
    pub fn with_all_quotas(mut self, quota: Quota) -> Self {
        for feature in Feature::ALL {
            self.quotas.insert(feature, quota);
        }
        self
    }

    pub fn with_bypass(mut self) -> Self {
        self.bypass_all_limits = true;
        self
    }

    pub fn with_admin_access(mut self) -> Self {
        self.admin_access = true;
        self
    }

    /// Quota for a feature; features missing from the table get no allowance
    pub fn quota(&self, feature: Feature) -> Quota {
        self.quotas
            .get(&feature)
            .copied()
            .unwrap_or(Quota::Limited(0))
    }

    pub fn reset_period(&self) -> ResetPeriod {
        self.reset_period_days
    }

    pub fn bypasses_limits(&self) -> bool {
        self.bypass_all_limits
    }

    pub fn has_admin_access(&self) -> bool {
        self.admin_access
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_id_validation() {
        assert!(PlanId::new("free").is_ok());
        assert!(PlanId::new("team-2024").is_ok());
        assert!(PlanId::new("").is_err());
        assert!(PlanId::new("Pro").is_err());
        assert!(PlanId::new("a".repeat(33)).is_err());
    }

    #[test]
    fn test_quota_sentinel_round_trip() {
        let unlimited: Quota = serde_json::from_str("-1").unwrap();
        assert_eq!(unlimited, Quota::Unlimited);
        assert_eq!(serde_json::to_string(&Quota::Limited(5)).unwrap(), "5");
        assert!(serde_json::from_str::<Quota>("-7").is_err());
    }

    #[test]
    fn test_reset_period_is_due() {
        let now = Utc::now();
        let period = ResetPeriod::Days(30);

        assert!(!period.is_due(now - Duration::days(30), now));
        assert!(period.is_due(now - Duration::days(31), now));
        assert!(!ResetPeriod::Never.is_due(now - Duration::days(10_000), now));
    }

    #[test]
    fn test_missing_quota_is_zero() {
        let plan = PlanDefinition::new(ResetPeriod::Days(30))
            .with_quota(Feature::CodeTranslations, Quota::Limited(10));

        assert_eq!(plan.quota(Feature::CodeTranslations), Quota::Limited(10));
        assert_eq!(plan.quota(Feature::MusicGenerations), Quota::Limited(0));
    }

    #[test]
    fn test_plan_definition_from_json() {
        let plan: PlanDefinition = serde_json::from_str(
            r#"{"quotas": {"lyric_generations": -1}, "reset_period_days": -1, "bypass_all_limits": true}"#,
        )
        .unwrap();

        assert_eq!(plan.quota(Feature::LyricGenerations), Quota::Unlimited);
        assert_eq!(plan.reset_period(), ResetPeriod::Never);
        assert!(plan.bypasses_limits());
        assert!(!plan.has_admin_access());
    }
}
