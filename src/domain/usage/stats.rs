//! Usage report for a single key

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

use crate::domain::plan::{Feature, PlanId, Quota};

/// Current usage of one feature paired with its limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeatureUsage {
    pub used: u64,
    #[serde(serialize_with = "serialize_limit")]
    pub limit: Quota,
}

fn serialize_limit<S: Serializer>(limit: &Quota, serializer: S) -> Result<S::Ok, S::Error> {
    match limit {
        Quota::Limited(n) => serializer.serialize_u64(*n),
        Quota::Unlimited => serializer.serialize_str("unlimited"),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStats {
    pub plan: PlanId,
    pub owner_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub last_reset: DateTime<Utc>,
    pub bypass_all_limits: bool,
    pub admin_access: bool,
    pub usage: BTreeMap<Feature, FeatureUsage>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlimited_renders_as_string() {
        let json = serde_json::to_value(FeatureUsage {
            used: 3,
            limit: Quota::Unlimited,
        })
        .unwrap();

        assert_eq!(json["used"], 3);
        assert_eq!(json["limit"], "unlimited");
    }

    #[test]
    fn test_limited_renders_as_number() {
        let json = serde_json::to_value(FeatureUsage {
            used: 0,
            limit: Quota::Limited(25),
        })
        .unwrap();

        assert_eq!(json["limit"], 25);
    }
}
