//! Access gate
//!
//! Request-boundary enforcement for metered features. `admit` decides
//! whether a call may proceed, `settle` counts it once the handler has
//! finished, and `guard` runs both around an async handler.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error};

use crate::domain::api_key::ApiKeyValue;
use crate::domain::plan::Feature;
use crate::domain::usage::UsageDecision;
use crate::domain::DomainError;
use crate::infrastructure::observability::{record_gate_decision, record_settle_failure};

use super::service::KeyManager;

/// Why a call was refused before reaching its handler
#[derive(Debug, Error)]
pub enum GateRejection {
    #[error("API key required")]
    AuthRequired,

    #[error("Invalid or inactive API key")]
    AuthInvalid,

    #[error("Usage limit exceeded for {feature}: {current_usage}/{limit}")]
    RateLimited {
        feature: Feature,
        current_usage: u64,
        limit: u64,
    },

    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Proof that a call was admitted; handed to `settle` afterwards
#[derive(Debug, Clone, PartialEq)]
pub struct Admission {
    pub key: ApiKeyValue,
    pub feature: Feature,
    pub decision: UsageDecision,
}

#[derive(Debug, Clone)]
pub struct AccessGate {
    manager: Arc<KeyManager>,
}

impl AccessGate {
    pub fn new(manager: Arc<KeyManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<KeyManager> {
        &self.manager
    }

    /// Check the presented key against the feature's quota
    pub async fn admit(
        &self,
        key: Option<&str>,
        feature: Feature,
    ) -> Result<Admission, GateRejection> {
        let Some(raw) = key.map(str::trim).filter(|k| !k.is_empty()) else {
            record_gate_decision(feature, "missing");
            return Err(GateRejection::AuthRequired);
        };

        let decision = self.manager.check_usage(raw, feature).await?;
        record_gate_decision(feature, decision.outcome());

        match decision {
            UsageDecision::Invalid => Err(GateRejection::AuthInvalid),
            UsageDecision::QuotaExceeded {
                current_usage,
                limit,
            } => {
                debug!(feature = %feature, current_usage, limit, "Quota exceeded");
                Err(GateRejection::RateLimited {
                    feature,
                    current_usage,
                    limit,
                })
            }
            decision => {
                // check_usage only admits values that parse
                let key = ApiKeyValue::new(raw).map_err(|_| GateRejection::AuthInvalid)?;
                Ok(Admission {
                    key,
                    feature,
                    decision,
                })
            }
        }
    }

    /// Count an admitted call once its handler has finished
    ///
    /// Nothing is counted when the handler failed, or when the decision was
    /// a bypass or an unlimited quota. Returns the new counter value when
    /// one was recorded.
    pub async fn settle(
        &self,
        admission: &Admission,
        handler_succeeded: bool,
    ) -> Result<Option<u64>, DomainError> {
        if !handler_succeeded || !admission.decision.counts_usage() {
            return Ok(None);
        }

        self.manager
            .increment(admission.key.as_str(), admission.feature)
            .await
            .map(Some)
    }

    /// Like `settle`, but a failure is logged and counted instead of returned
    pub async fn settle_logged(&self, admission: &Admission, handler_succeeded: bool) {
        if let Err(e) = self.settle(admission, handler_succeeded).await {
            record_settle_failure(admission.feature);
            error!(
                key = %admission.key.redacted(),
                feature = %admission.feature,
                error = %e,
                "Failed to record usage after successful call"
            );
        }
    }

    /// Run `handler` only if the key is admitted, then settle on its result
    ///
    /// The outer `Result` is the gate's verdict; the inner one is the
    /// handler's own outcome, returned untouched.
    pub async fn guard<F, Fut, T, E>(
        &self,
        key: Option<&str>,
        feature: Feature,
        handler: F,
    ) -> Result<Result<T, E>, GateRejection>
    where
        F: FnOnce(Admission) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = self.admit(key, feature).await?;
        let outcome = handler(admission.clone()).await;
        self.settle_logged(&admission, outcome.is_ok()).await;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::api_key::KeyStore;
    use crate::domain::plan::PlanCatalog;
    use crate::infrastructure::storage::InMemoryKeyStore;

    fn gate() -> (AccessGate, Arc<InMemoryKeyStore>) {
        let store = Arc::new(InMemoryKeyStore::new());
        let manager = KeyManager::new(store.clone(), Arc::new(PlanCatalog::builtin()));
        (AccessGate::new(Arc::new(manager)), store)
    }

    async fn count(store: &InMemoryKeyStore, key: &ApiKeyValue, feature: Feature) -> u64 {
        store.get_usage(key).await.unwrap().unwrap().count(feature)
    }

    #[tokio::test]
    async fn test_missing_key() {
        let (gate, _) = gate();

        assert!(matches!(
            gate.admit(None, Feature::MusicGenerations).await,
            Err(GateRejection::AuthRequired)
        ));
        assert!(matches!(
            gate.admit(Some("  "), Feature::MusicGenerations).await,
            Err(GateRejection::AuthRequired)
        ));
    }

    #[tokio::test]
    async fn test_invalid_key() {
        let (gate, _) = gate();

        let result = gate
            .admit(Some("cs_free_nope"), Feature::MusicGenerations)
            .await;
        assert!(matches!(result, Err(GateRejection::AuthInvalid)));
    }

    #[tokio::test]
    async fn test_guard_counts_successful_calls() {
        let (gate, store) = gate();
        let key = gate.manager().generate("free", None, None).await.unwrap();

        let outcome = gate
            .guard(Some(key.value().as_str()), Feature::MusicGenerations, |_| async {
                Ok::<_, String>("song")
            })
            .await
            .unwrap();

        assert_eq!(outcome, Ok("song"));
        assert_eq!(count(&store, key.value(), Feature::MusicGenerations).await, 1);
    }

    #[tokio::test]
    async fn test_guard_failed_handler_consumes_no_quota() {
        let (gate, store) = gate();
        let key = gate.manager().generate("free", None, None).await.unwrap();

        let outcome = gate
            .guard(Some(key.value().as_str()), Feature::MusicGenerations, |_| async {
                Err::<(), _>("upstream down")
            })
            .await
            .unwrap();

        assert_eq!(outcome, Err("upstream down"));
        assert_eq!(count(&store, key.value(), Feature::MusicGenerations).await, 0);
    }

    #[tokio::test]
    async fn test_guard_rate_limits_after_quota() {
        let (gate, _) = gate();
        let key = gate.manager().generate("free", None, None).await.unwrap();
        let value = key.value().as_str();

        for _ in 0..2 {
            gate.guard(Some(value), Feature::MusicGenerations, |_| async {
                Ok::<_, ()>(())
            })
            .await
            .unwrap()
            .unwrap();
        }

        let mut ran = false;
        let result = gate
            .guard(Some(value), Feature::MusicGenerations, |_| {
                ran = true;
                async { Ok::<_, ()>(()) }
            })
            .await;

        assert!(!ran);
        match result {
            Err(GateRejection::RateLimited {
                current_usage,
                limit,
                ..
            }) => {
                assert_eq!(current_usage, 2);
                assert_eq!(limit, 2);
            }
            other => panic!("expected rate limit, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_bypass_and_unlimited_are_not_counted() {
        let (gate, store) = gate();
        let god = gate.manager().create_god_key().await.unwrap();
        let premium = gate.manager().generate("premium", None, None).await.unwrap();

        for key in [&god, &premium] {
            let admission = gate
                .admit(Some(key.value().as_str()), Feature::CodebeatGenerations)
                .await
                .unwrap();
            assert_eq!(gate.settle(&admission, true).await.unwrap(), None);
            assert_eq!(
                count(&store, key.value(), Feature::CodebeatGenerations).await,
                0
            );
        }
    }

    #[tokio::test]
    async fn test_admission_carries_decision() {
        let (gate, _) = gate();
        let key = gate.manager().generate("pro", None, None).await.unwrap();

        let admission = gate
            .admit(Some(key.value().as_str()), Feature::TextGenerations)
            .await
            .unwrap();

        assert_eq!(admission.feature, Feature::TextGenerations);
        assert_eq!(
            admission.decision,
            UsageDecision::QuotaAllowed {
                current_usage: 0,
                limit: 200
            }
        );
        assert_eq!(gate.settle(&admission, true).await.unwrap(), Some(1));
    }
}
