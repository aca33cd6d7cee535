//! Key manager
//!
//! Issues, validates and meters API keys on top of a `KeyStore` and a
//! `PlanCatalog`. Writes run under one writer lock, so requests in this
//! process never lose an update. Single-field changes and window resets go
//! through the store's conditional updates, which also hold when several
//! processes share one database.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::api_key::{ApiKey, ApiKeyValue, KeyStore};
use crate::domain::plan::{Feature, PlanCatalog, PlanId, Quota, ResolvedPlan};
use crate::domain::usage::{FeatureUsage, KeyStats, UsageDecision, UsageRecord};
use crate::domain::DomainError;

use super::generator::KeyGenerator;

const MAX_GENERATE_ATTEMPTS: usize = 5;
const GOD_KEY_OWNER: &str = "creator";
const GOD_KEY_DESCRIPTION: &str = "God mode key";

#[derive(Debug)]
pub struct KeyManager {
    store: Arc<dyn KeyStore>,
    catalog: Arc<PlanCatalog>,
    generator: KeyGenerator,
    write_lock: Mutex<()>,
}

impl KeyManager {
    pub fn new(store: Arc<dyn KeyStore>, catalog: Arc<PlanCatalog>) -> Self {
        Self {
            store,
            catalog,
            generator: KeyGenerator::default(),
            write_lock: Mutex::new(()),
        }
    }

    /// Issue a new key on `plan`
    ///
    /// The plan must exist in the catalogue regardless of the unknown-plan
    /// policy. Owner defaults to a generated `user_<id>` placeholder.
    pub async fn generate(
        &self,
        plan: &str,
        owner_id: Option<String>,
        description: Option<String>,
    ) -> Result<ApiKey, DomainError> {
        let plan = self.requested_plan(plan)?;
        let owner_id = owner_id
            .filter(|owner| !owner.trim().is_empty())
            .unwrap_or_else(placeholder_owner);

        let _guard = self.write_lock.lock().await;

        let value = self.unique_value(&plan).await?;
        let mut key = ApiKey::new(value, plan, owner_id);
        if let Some(description) = description {
            key = key.with_description(description);
        }

        let usage = UsageRecord::starting_at(key.created_at());
        self.store.insert(key.clone(), usage).await?;

        info!(
            key = %key.value().redacted(),
            plan = %key.plan(),
            owner_id = %key.owner_id(),
            "Issued API key"
        );

        Ok(key)
    }

    /// Issue a key on the bypass plan
    pub async fn create_god_key(&self) -> Result<ApiKey, DomainError> {
        self.generate(
            PlanId::god().as_str(),
            Some(GOD_KEY_OWNER.to_string()),
            Some(GOD_KEY_DESCRIPTION.to_string()),
        )
        .await
    }

    /// Return the key if it exists and is active, marking it as used
    ///
    /// Unknown and deactivated keys give the same `None`.
    pub async fn validate(&self, value: &str) -> Result<Option<ApiKey>, DomainError> {
        let Some(value) = parse_value(value) else {
            return Ok(None);
        };

        let _guard = self.write_lock.lock().await;

        let key = self.store.touch_key(&value, Utc::now()).await?;
        if key.is_none() {
            debug!(key = %value.redacted(), "Validation failed: unknown or deactivated key");
        }

        Ok(key)
    }

    /// Decide whether one call to `feature` is allowed for this key
    ///
    /// Validates the key first. A due reset is applied and persisted before
    /// the quota comparison.
    pub async fn check_usage(
        &self,
        value: &str,
        feature: Feature,
    ) -> Result<UsageDecision, DomainError> {
        let Some(key) = self.validate(value).await? else {
            return Ok(UsageDecision::Invalid);
        };

        let plan = self.resolve_plan(&key)?;

        if plan.definition.bypasses_limits() {
            return Ok(UsageDecision::BypassAllowed);
        }

        let usage = {
            let _guard = self.write_lock.lock().await;
            let now = Utc::now();

            let stored = self.store.get_usage(key.value()).await?;
            let expected_last_reset = stored.as_ref().map(UsageRecord::last_reset);

            let mut usage = stored.unwrap_or_else(|| {
                warn!(key = %key.value().redacted(), "Usage record missing, recreating");
                UsageRecord::starting_at(now)
            });
            let reset = usage.reset_if_due(plan.definition.reset_period(), now);

            if reset || expected_last_reset.is_none() {
                let replaced = self
                    .store
                    .replace_usage(key.value(), expected_last_reset, usage.clone())
                    .await?;

                if !replaced {
                    debug!(key = %key.value().redacted(), "Usage window changed concurrently, re-reading");
                    usage = self.store.get_usage(key.value()).await?.unwrap_or(usage);
                } else if reset {
                    info!(key = %key.value().redacted(), plan = %plan.id, "Usage window reset");
                }
            }

            usage
        };

        let decision = match plan.definition.quota(feature) {
            Quota::Unlimited => UsageDecision::UnlimitedAllowed,
            Quota::Limited(limit) => {
                let current_usage = usage.count(feature);
                if current_usage < limit {
                    UsageDecision::QuotaAllowed {
                        current_usage,
                        limit,
                    }
                } else {
                    UsageDecision::QuotaExceeded {
                        current_usage,
                        limit,
                    }
                }
            }
        };

        debug!(
            key = %key.value().redacted(),
            feature = %feature,
            outcome = decision.outcome(),
            "Usage checked"
        );

        Ok(decision)
    }

    /// Count one successful call; returns the new counter value
    pub async fn increment(&self, value: &str, feature: Feature) -> Result<u64, DomainError> {
        let value = parse_value(value)
            .ok_or_else(|| DomainError::not_found("API key not found"))?;

        let _guard = self.write_lock.lock().await;
        self.store.increment_usage(&value, feature).await
    }

    /// Deactivate a key; returns whether the key exists
    ///
    /// Deactivating an already inactive key is a no-op that still returns true.
    pub async fn deactivate(&self, value: &str) -> Result<bool, DomainError> {
        let Some(value) = parse_value(value) else {
            return Ok(false);
        };

        let _guard = self.write_lock.lock().await;

        let exists = self.store.deactivate_key(&value).await?;
        if exists {
            info!(key = %value.redacted(), "Deactivated API key");
        }

        Ok(exists)
    }

    /// Move a key to another plan; usage counters carry over
    ///
    /// An unknown target plan is an error and leaves the key untouched. An
    /// unknown key returns false.
    pub async fn upgrade_plan(&self, value: &str, new_plan: &str) -> Result<bool, DomainError> {
        let new_plan = self.requested_plan(new_plan)?;

        let Some(value) = parse_value(value) else {
            return Ok(false);
        };

        let _guard = self.write_lock.lock().await;

        let exists = self.store.set_key_plan(&value, &new_plan).await?;
        if exists {
            info!(key = %value.redacted(), to = %new_plan, "Changed API key plan");
        }

        Ok(exists)
    }

    /// Usage report for an active key; `None` when the key is invalid
    ///
    /// A due reset shows as zeroed counters starting now. It is only
    /// persisted by the next metered call.
    pub async fn stats(&self, value: &str) -> Result<Option<KeyStats>, DomainError> {
        let Some(key) = self.validate(value).await? else {
            return Ok(None);
        };

        let plan = self.resolve_plan(&key)?;
        let mut usage = self
            .store
            .get_usage(key.value())
            .await?
            .unwrap_or_else(|| UsageRecord::starting_at(key.created_at()));
        usage.reset_if_due(plan.definition.reset_period(), Utc::now());

        let per_feature: BTreeMap<Feature, FeatureUsage> = usage
            .counts()
            .map(|(feature, used)| {
                let limit = if plan.definition.bypasses_limits() {
                    Quota::Unlimited
                } else {
                    plan.definition.quota(feature)
                };
                (feature, FeatureUsage { used, limit })
            })
            .collect();

        Ok(Some(KeyStats {
            plan: key.plan().clone(),
            owner_id: key.owner_id().to_string(),
            description: key.description().map(str::to_string),
            created_at: key.created_at(),
            last_used_at: key.last_used_at(),
            last_reset: usage.last_reset(),
            bypass_all_limits: plan.definition.bypasses_limits(),
            admin_access: plan.definition.has_admin_access(),
            usage: per_feature,
        }))
    }

    /// Admin lookup; does not count as use
    pub async fn get(&self, value: &str) -> Result<Option<ApiKey>, DomainError> {
        match parse_value(value) {
            Some(value) => self.store.get_key(&value).await,
            None => Ok(None),
        }
    }

    /// All keys, oldest first
    pub async fn list(&self) -> Result<Vec<ApiKey>, DomainError> {
        let mut keys = self.store.list_keys().await?;
        keys.sort_by_key(|key| key.created_at());
        Ok(keys)
    }

    fn requested_plan(&self, plan: &str) -> Result<PlanId, DomainError> {
        PlanId::new(plan)
            .ok()
            .filter(|id| self.catalog.contains(id))
            .ok_or_else(|| DomainError::unknown_plan(plan))
    }

    fn resolve_plan<'a>(&'a self, key: &'a ApiKey) -> Result<ResolvedPlan<'a>, DomainError> {
        let resolved = self.catalog.resolve(key.plan())?;

        if resolved.fell_back {
            warn!(
                key = %key.value().redacted(),
                plan = %key.plan(),
                fallback = %resolved.id,
                "Key references unknown plan, using fallback"
            );
        }

        Ok(resolved)
    }

    async fn unique_value(&self, plan: &PlanId) -> Result<ApiKeyValue, DomainError> {
        for _ in 0..MAX_GENERATE_ATTEMPTS {
            let value = self.generator.generate(plan)?;
            if !self.store.contains_key(&value).await? {
                return Ok(value);
            }
            warn!("Generated key collided with an existing key, regenerating");
        }

        Err(DomainError::internal(
            "Failed to generate a unique API key",
        ))
    }
}

fn parse_value(value: &str) -> Option<ApiKeyValue> {
    ApiKeyValue::new(value).ok()
}

fn placeholder_owner() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("user_{}", &id[..8])
}
