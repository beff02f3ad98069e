use crate::error::StoreError;
use crate::model::CompanyProfile;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_CACHE_CAPACITY: u64 = 1_000;
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

#[async_trait]
pub trait OrganizationStore: Send + Sync {
    async fn company_profile(
        &self,
        organization_id: &str,
    ) -> Result<Option<CompanyProfile>, StoreError>;

    async fn company_logo(&self, organization_id: &str) -> Result<Option<String>, StoreError>;

    /// Must not cost a profile read. `None` when the store keeps no stamp.
    async fn last_modified(
        &self,
        _organization_id: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(None)
    }
}

#[async_trait]
impl<S: OrganizationStore + ?Sized> OrganizationStore for Arc<S> {
    async fn company_profile(
        &self,
        organization_id: &str,
    ) -> Result<Option<CompanyProfile>, StoreError> {
        (**self).company_profile(organization_id).await
    }

    async fn company_logo(&self, organization_id: &str) -> Result<Option<String>, StoreError> {
        (**self).company_logo(organization_id).await
    }

    async fn last_modified(
        &self,
        organization_id: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        (**self).last_modified(organization_id).await
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrganizationRecord {
    #[serde(default)]
    pub profile: Option<CompanyProfile>,
    #[serde(default)]
    pub logo: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    organizations: HashMap<String, OrganizationRecord>,
}

#[derive(Debug, Deserialize)]
struct MemoryStoreFile {
    #[serde(default)]
    organizations: HashMap<String, OrganizationRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_organization(
        mut self,
        organization_id: impl Into<String>,
        profile: Option<CompanyProfile>,
        logo: Option<String>,
    ) -> Self {
        self.insert(organization_id, OrganizationRecord { profile, logo });
        self
    }

    pub fn insert(&mut self, organization_id: impl Into<String>, record: OrganizationRecord) {
        self.organizations.insert(organization_id.into(), record);
    }

    pub fn from_records(organizations: HashMap<String, OrganizationRecord>) -> Self {
        Self { organizations }
    }

    /// `{ "organizations": { "<id>": { "profile": {..}, "logo": ".." } } }`, JSON or JSON5.
    pub fn from_json(contents: &str) -> anyhow::Result<Self> {
        let parsed: MemoryStoreFile = match serde_json::from_str(contents) {
            Ok(parsed) => parsed,
            Err(_) => json5::from_str(contents)?,
        };
        Ok(Self::from_records(parsed.organizations))
    }

    fn record(&self, organization_id: &str) -> Result<&OrganizationRecord, StoreError> {
        self.organizations
            .get(organization_id)
            .ok_or_else(|| StoreError::NotFound(organization_id.to_string()))
    }
}

#[async_trait]
impl OrganizationStore for MemoryStore {
    async fn company_profile(
        &self,
        organization_id: &str,
    ) -> Result<Option<CompanyProfile>, StoreError> {
        Ok(self.record(organization_id)?.profile.clone())
    }

    async fn company_logo(&self, organization_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.record(organization_id)?.logo.clone())
    }

    async fn last_modified(
        &self,
        organization_id: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self
            .record(organization_id)?
            .profile
            .as_ref()
            .and_then(|profile| profile.updated_at))
    }
}

#[derive(Debug, Clone)]
struct CachedProfile {
    stamp: Option<DateTime<Utc>>,
    profile: Option<CompanyProfile>,
}

/// Caches company profiles per organization. An entry is dropped when the
/// store reports a different `last_modified` stamp, when its time-to-live
/// runs out, on `invalidate`, or when the capacity is exceeded. Logos are
/// never cached.
pub struct CachedStore<S> {
    inner: S,
    profiles: Cache<String, CachedProfile>,
}

impl<S: OrganizationStore> CachedStore<S> {
    pub fn new(inner: S) -> Self {
        Self::with_limits(inner, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL)
    }

    pub fn with_limits(inner: S, max_capacity: u64, time_to_live: Duration) -> Self {
        let profiles = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(time_to_live)
            .build();
        Self { inner, profiles }
    }

    pub async fn invalidate(&self, organization_id: &str) {
        self.profiles.invalidate(organization_id).await;
    }

    pub fn clear(&self) {
        self.profiles.invalidate_all();
    }

    pub async fn cached_len(&self) -> u64 {
        self.profiles.run_pending_tasks().await;
        self.profiles.entry_count()
    }
}

#[async_trait]
impl<S: OrganizationStore> OrganizationStore for CachedStore<S> {
    async fn company_profile(
        &self,
        organization_id: &str,
    ) -> Result<Option<CompanyProfile>, StoreError> {
        let stamp = self.inner.last_modified(organization_id).await?;
        if let Some(entry) = self.profiles.get(organization_id).await {
            // stampless stores rely on the time-to-live alone
            if stamp.is_none() || entry.stamp == stamp {
                tracing::debug!(organization_id, "company profile served from cache");
                return Ok(entry.profile);
            }
        }

        let profile = self.inner.company_profile(organization_id).await?;
        self.profiles
            .insert(
                organization_id.to_string(),
                CachedProfile {
                    stamp,
                    profile: profile.clone(),
                },
            )
            .await;
        Ok(profile)
    }

    async fn company_logo(&self, organization_id: &str) -> Result<Option<String>, StoreError> {
        self.inner.company_logo(organization_id).await
    }

    async fn last_modified(
        &self,
        organization_id: &str,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.inner.last_modified(organization_id).await
    }
}
