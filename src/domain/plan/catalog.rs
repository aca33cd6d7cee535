//! Plan catalogue
//!
//! Immutable mapping from plan name to plan definition, plus the policy
//! applied when a stored key references a plan that is no longer defined.

use std::collections::BTreeMap;

use serde::Deserialize;

use super::entity::{PlanDefinition, PlanId, Quota, ResetPeriod};
use super::feature::Feature;
use crate::domain::DomainError;

/// What to do with a stored key whose plan is missing from the catalogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownPlanPolicy {
    /// Evaluate the key against the catalogue's fallback plan
    #[default]
    Fallback,
    /// Fail every check for the key with `UnknownPlan`
    Reject,
}

/// A plan lookup result after the unknown-plan policy has been applied
#[derive(Debug, Clone, Copy)]
pub struct ResolvedPlan<'a> {
    pub id: &'a PlanId,
    pub definition: &'a PlanDefinition,
    /// Set when the requested plan was unknown and the fallback was used
    pub fell_back: bool,
}

#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: BTreeMap<PlanId, PlanDefinition>,
    policy: UnknownPlanPolicy,
    fallback: PlanId,
}

impl PlanCatalog {
    /// The four built-in plans: free, pro, premium and god
    pub fn builtin() -> Self {
        let free = PlanDefinition::new(ResetPeriod::Days(30))
            .with_quota(Feature::LyricGenerations, Quota::Limited(5))
            .with_quota(Feature::MusicGenerations, Quota::Limited(2))
            .with_quota(Feature::CodeTranslations, Quota::Limited(10))
            .with_quota(Feature::VulnerabilityScans, Quota::Limited(3))
            .with_quota(Feature::CodebeatGenerations, Quota::Limited(2))
            .with_quota(Feature::TextGenerations, Quota::Limited(10));

        let pro = PlanDefinition::new(ResetPeriod::Days(30))
            .with_quota(Feature::LyricGenerations, Quota::Limited(100))
            .with_quota(Feature::MusicGenerations, Quota::Limited(25))
            .with_quota(Feature::CodeTranslations, Quota::Limited(500))
            .with_quota(Feature::VulnerabilityScans, Quota::Limited(50))
            .with_quota(Feature::CodebeatGenerations, Quota::Limited(25))
            .with_quota(Feature::TextGenerations, Quota::Limited(200));

        let premium = PlanDefinition::new(ResetPeriod::Days(30)).with_all_quotas(Quota::Unlimited);

        let god = PlanDefinition::new(ResetPeriod::Never)
            .with_all_quotas(Quota::Unlimited)
            .with_bypass()
            .with_admin_access();

        Self::empty()
            .with_plan(PlanId::free(), free)
            .with_plan(PlanId::pro(), pro)
            .with_plan(PlanId::premium(), premium)
            .with_plan(PlanId::god(), god)
    }

    /// A catalogue with no plans; fallback points at `free`
    pub fn empty() -> Self {
        Self {
            plans: BTreeMap::new(),
            policy: UnknownPlanPolicy::default(),
            fallback: PlanId::free(),
        }
    }

    /// Add or replace a plan
    pub fn with_plan(mut self, id: PlanId, definition: PlanDefinition) -> Self {
        self.plans.insert(id, definition);
        self
    }

    /// Set the unknown-plan policy; the fallback plan must already be defined
    pub fn with_policy(
        mut self,
        policy: UnknownPlanPolicy,
        fallback: PlanId,
    ) -> Result<Self, DomainError> {
        if policy == UnknownPlanPolicy::Fallback && !self.plans.contains_key(&fallback) {
            return Err(DomainError::configuration(format!(
                "Fallback plan '{}' is not defined",
                fallback
            )));
        }

        self.policy = policy;
        self.fallback = fallback;
        Ok(self)
    }

    pub fn policy(&self) -> UnknownPlanPolicy {
        self.policy
    }

    pub fn contains(&self, plan: &PlanId) -> bool {
        self.plans.contains_key(plan)
    }

    pub fn plan_ids(&self) -> impl Iterator<Item = &PlanId> {
        self.plans.keys()
    }

    /// Strict lookup, ignoring the unknown-plan policy
    pub fn get(&self, plan: &PlanId) -> Result<&PlanDefinition, DomainError> {
        self.plans
            .get(plan)
            .ok_or_else(|| DomainError::unknown_plan(plan.as_str()))
    }

    /// Lookup for a plan referenced by a stored key, honouring the policy
    pub fn resolve<'a>(&'a self, plan: &'a PlanId) -> Result<ResolvedPlan<'a>, DomainError> {
        if let Some(definition) = self.plans.get(plan) {
            return Ok(ResolvedPlan {
                id: plan,
                definition,
                fell_back: false,
            });
        }

        match self.policy {
            UnknownPlanPolicy::Reject => Err(DomainError::unknown_plan(plan.as_str())),
            UnknownPlanPolicy::Fallback => {
                let definition = self.get(&self.fallback)?;
                Ok(ResolvedPlan {
                    id: &self.fallback,
                    definition,
                    fell_back: true,
                })
            }
        }
    }

    pub fn quota_for(&self, plan: &PlanId, feature: Feature) -> Result<Quota, DomainError> {
        Ok(self.get(plan)?.quota(feature))
    }

    pub fn reset_period(&self, plan: &PlanId) -> Result<ResetPeriod, DomainError> {
        Ok(self.get(plan)?.reset_period())
    }

    pub fn bypasses_limits(&self, plan: &PlanId) -> Result<bool, DomainError> {
        Ok(self.get(plan)?.bypasses_limits())
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_free_quotas() {
        let catalog = PlanCatalog::builtin();
        let free = PlanId::free();

        assert_eq!(
            catalog.quota_for(&free, Feature::LyricGenerations).unwrap(),
            Quota::Limited(5)
        );
        assert_eq!(
            catalog.quota_for(&free, Feature::CodeTranslations).unwrap(),
            Quota::Limited(10)
        );
        assert_eq!(catalog.reset_period(&free).unwrap(), ResetPeriod::Days(30));
        assert!(!catalog.bypasses_limits(&free).unwrap());
    }

    #[test]
    fn test_builtin_premium_is_unlimited_but_resets() {
        let catalog = PlanCatalog::builtin();
        let premium = PlanId::premium();

        for feature in Feature::ALL {
            assert_eq!(catalog.quota_for(&premium, feature).unwrap(), Quota::Unlimited);
        }
        assert_eq!(catalog.reset_period(&premium).unwrap(), ResetPeriod::Days(30));
    }

    #[test]
    fn test_builtin_god_bypasses_and_never_resets() {
        let catalog = PlanCatalog::builtin();
        let god = PlanId::god();

        assert!(catalog.bypasses_limits(&god).unwrap());
        assert!(catalog.get(&god).unwrap().has_admin_access());
        assert_eq!(catalog.reset_period(&god).unwrap(), ResetPeriod::Never);
    }

    #[test]
    fn test_unknown_plan_strict_lookup() {
        let catalog = PlanCatalog::builtin();
        let enterprise = PlanId::new("enterprise").unwrap();

        assert!(matches!(
            catalog.quota_for(&enterprise, Feature::LyricGenerations),
            Err(DomainError::UnknownPlan { .. })
        ));
    }

    #[test]
    fn test_resolve_falls_back_by_default() {
        let catalog = PlanCatalog::builtin();
        let enterprise = PlanId::new("enterprise").unwrap();

        let resolved = catalog.resolve(&enterprise).unwrap();
        assert!(resolved.fell_back);
        assert_eq!(resolved.id, &PlanId::free());
    }

    #[test]
    fn test_resolve_rejects_under_reject_policy() {
        let catalog = PlanCatalog::builtin()
            .with_policy(UnknownPlanPolicy::Reject, PlanId::free())
            .unwrap();
        let enterprise = PlanId::new("enterprise").unwrap();

        assert!(catalog.resolve(&enterprise).is_err());
        assert!(!catalog.resolve(&PlanId::pro()).unwrap().fell_back);
    }

    #[test]
    fn test_fallback_plan_must_exist() {
        let result = PlanCatalog::empty().with_policy(UnknownPlanPolicy::Fallback, PlanId::free());
        assert!(result.is_err());
    }

    #[test]
    fn test_with_plan_extends_catalog() {
        let team = PlanId::new("team").unwrap();
        let catalog = PlanCatalog::builtin().with_plan(
            team.clone(),
            PlanDefinition::new(ResetPeriod::Days(7)).with_quota(Feature::TextGenerations, Quota::Limited(1000)),
        );

        assert!(catalog.contains(&team));
        assert_eq!(catalog.plan_ids().count(), 5);
    }
}
