//! Time-bounded access to the profile store.
//!
//! Each call races a fixed deadline. A timeout is reported as
//! `IdentityError::StoreTimeout`; the in-flight store call is dropped, not
//! retried.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{ProfileStore, StoreFault};
use crate::config::ResolverConfig;
use crate::error::{IdentityError, Result};
use crate::models::ProfileRecord;

/// What `ensure_profile_exists` ended up doing. Failures are already logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The profile was already there
    Present,
    /// Created here, or concurrently by someone else
    Created,
    /// Check or insert failed; nothing was written
    Failed,
}

#[derive(Clone)]
pub struct ProfileGateway {
    store: Arc<dyn ProfileStore>,
    read_timeout: Duration,
    create_timeout: Duration,
    ensure_check_timeout: Duration,
}

impl ProfileGateway {
    pub fn new(store: Arc<dyn ProfileStore>, config: &ResolverConfig) -> Self {
        Self {
            store,
            read_timeout: config.read_timeout(),
            create_timeout: config.create_timeout(),
            ensure_check_timeout: config.ensure_check_timeout(),
        }
    }

    /// Read a profile, `Ok(None)` when the row does not exist.
    pub async fn read_profile(&self, id: &str) -> Result<Option<ProfileRecord>> {
        self.read_profile_within(id, self.read_timeout).await
    }

    pub async fn read_profile_within(
        &self,
        id: &str,
        bound: Duration,
    ) -> Result<Option<ProfileRecord>> {
        let record = bounded(
            "read_profile",
            bound,
            self.store.fetch_profile(id.to_string()),
        )
        .await?;

        match record {
            Ok(record) => {
                tracing::trace!("[gateway] read_profile {} found={}", id, record.is_some());
                Ok(record)
            }
            Err(StoreFault::Conflict) => Err(IdentityError::Store(
                "unexpected uniqueness conflict on read".into(),
            )),
            Err(StoreFault::Backend(message)) => Err(IdentityError::Store(message)),
        }
    }

    /// Insert a profile unless one exists. A uniqueness conflict means the
    /// row was created concurrently and counts as success.
    pub async fn create_profile_if_absent(&self, record: ProfileRecord) -> Result<()> {
        let id = record.id.clone();
        let inserted = bounded(
            "create_profile",
            self.create_timeout,
            self.store.insert_profile(record),
        )
        .await?;

        match inserted {
            Ok(()) => {
                tracing::debug!("[gateway] Created profile {}", id);
                Ok(())
            }
            Err(StoreFault::Conflict) => {
                tracing::debug!("[gateway] Profile {} already exists (created concurrently)", id);
                Ok(())
            }
            Err(StoreFault::Backend(message)) => Err(IdentityError::Store(message)),
        }
    }

    /// Best-effort repair of a missing profile. Never fails; every failure
    /// is logged and reported as `EnsureOutcome::Failed`.
    pub async fn ensure_profile_exists(&self, id: &str, email: &str) -> EnsureOutcome {
        tracing::debug!("[ensure] Ensuring profile exists for {}", id);

        match self.read_profile_within(id, self.ensure_check_timeout).await {
            Ok(Some(_)) => {
                tracing::debug!("[ensure] Profile {} already exists", id);
                EnsureOutcome::Present
            }
            Ok(None) => {
                let record = ProfileRecord::placeholder(id, email);
                match self.create_profile_if_absent(record).await {
                    Ok(()) => {
                        tracing::info!("[ensure] Profile {} created", id);
                        EnsureOutcome::Created
                    }
                    Err(e) => {
                        tracing::warn!("[ensure] Failed to create profile {}: {}", id, e);
                        EnsureOutcome::Failed
                    }
                }
            }
            Err(e) => {
                tracing::warn!(
                    "[ensure] Profile check for {} failed, skipping creation: {}",
                    id,
                    e
                );
                EnsureOutcome::Failed
            }
        }
    }
}

async fn bounded<T>(
    operation: &'static str,
    bound: Duration,
    call: impl Future<Output = T>,
) -> Result<T> {
    let started = Instant::now();
    match tokio::time::timeout(bound, call).await {
        Ok(value) => {
            tracing::trace!(
                "[gateway] {} completed in {}ms",
                operation,
                started.elapsed().as_millis()
            );
            Ok(value)
        }
        Err(_) => {
            tracing::warn!(
                "[gateway] {} timed out after {}ms",
                operation,
                bound.as_millis()
            );
            Err(IdentityError::StoreTimeout {
                operation,
                after_ms: u64::try_from(bound.as_millis()).unwrap_or(u64::MAX),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryProfileStore;

    fn gateway(store: Arc<MemoryProfileStore>) -> ProfileGateway {
        ProfileGateway::new(store, &ResolverConfig::default())
    }

    #[tokio::test]
    async fn test_read_missing_is_none() {
        let store = Arc::new(MemoryProfileStore::new());
        let result = gateway(store).read_profile("nobody").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_read_existing() {
        let store = Arc::new(MemoryProfileStore::new());
        store.put(ProfileRecord::placeholder("u1", "sam@x.com"));

        let record = gateway(store).read_profile("u1").await.unwrap().unwrap();
        assert_eq!(record.full_name, "sam");
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_times_out() {
        let store = Arc::new(MemoryProfileStore::new());
        store.set_latency(Duration::from_secs(10));

        let err = gateway(store).read_profile("u1").await.unwrap_err();
        assert!(matches!(
            err,
            IdentityError::StoreTimeout {
                operation: "read_profile",
                after_ms: 3000
            }
        ));
    }

    #[tokio::test]
    async fn test_backend_error_surfaces() {
        let store = Arc::new(MemoryProfileStore::new());
        store.set_offline(true);

        let err = gateway(store).read_profile("u1").await.unwrap_err();
        assert!(matches!(err, IdentityError::Store(_)));
    }

    #[tokio::test]
    async fn test_create_conflict_is_success() {
        let store = Arc::new(MemoryProfileStore::new());
        store.put(ProfileRecord::placeholder("u1", "sam@x.com"));

        let gw = gateway(store.clone());
        gw.create_profile_if_absent(ProfileRecord::placeholder("u1", "other@x.com"))
            .await
            .unwrap();

        // first writer wins
        assert_eq!(store.get("u1").unwrap().email, "sam@x.com");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_ensure_creates_missing_profile() {
        let store = Arc::new(MemoryProfileStore::new());
        let outcome = gateway(store.clone())
            .ensure_profile_exists("u1", "sam@x.com")
            .await;
        assert_eq!(outcome, EnsureOutcome::Created);

        let record = store.get("u1").unwrap();
        assert_eq!(record.full_name, "sam");
        assert_eq!(record.role, crate::models::Role::Buyer);
    }

    #[tokio::test]
    async fn test_ensure_existing_profile() {
        let store = Arc::new(MemoryProfileStore::new());
        store.put(ProfileRecord::placeholder("u1", "sam@x.com"));
        let outcome = gateway(store.clone())
            .ensure_profile_exists("u1", "sam@x.com")
            .await;
        assert_eq!(outcome, EnsureOutcome::Present);
        assert_eq!(store.insert_count(), 0);
    }

    #[tokio::test]
    async fn test_ensure_concurrent_creates_one_record() {
        let store = Arc::new(MemoryProfileStore::new());
        store.hold_reads();
        let gw = gateway(store.clone());

        let first = tokio::spawn({
            let gw = gw.clone();
            async move { gw.ensure_profile_exists("u1", "sam@x.com").await }
        });
        let second = tokio::spawn({
            let gw = gw.clone();
            async move { gw.ensure_profile_exists("u1", "sam@x.com").await }
        });

        // both checks see "absent" before either insert runs
        store.wait_for_pending_reads(2).await;
        store.release_reads();

        assert_eq!(first.await.unwrap(), EnsureOutcome::Created);
        assert_eq!(second.await.unwrap(), EnsureOutcome::Created);
        assert_eq!(store.len(), 1);
        assert_eq!(store.insert_count(), 2);
    }

    #[tokio::test]
    async fn test_ensure_swallows_offline_store() {
        let store = Arc::new(MemoryProfileStore::new());
        store.set_offline(true);
        let outcome = gateway(store.clone())
            .ensure_profile_exists("u1", "sam@x.com")
            .await;
        assert_eq!(outcome, EnsureOutcome::Failed);
        assert!(store.is_empty());
    }
}
