//! Client-side view of a website's jobs.
//!
//! Dashboards poll `GET /api/jobs` every [`POLL_INTERVAL`] while any job is
//! queued or processing, and merge each listing into a [`JobCache`] keyed by
//! job id. The cache never mutates jobs on its own; the server listing is
//! always authoritative.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::Client;
use uuid::Uuid;

use crate::llm::provider::error_from_response;
use crate::models::JobView;
use crate::types::AppResult;

pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// What a reconcile changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheChanges {
    pub added: Vec<Uuid>,
    pub updated: Vec<Uuid>,
    pub removed: Vec<Uuid>,
}

impl CacheChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct JobCache {
    jobs: HashMap<Uuid, JobView>,
}

impl JobCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a full server listing: insert new jobs, replace changed ones,
    /// drop jobs the server no longer lists.
    pub fn reconcile(&mut self, snapshot: Vec<JobView>) -> CacheChanges {
        let mut changes = CacheChanges::default();
        let mut seen = HashMap::with_capacity(snapshot.len());

        for job in snapshot {
            match self.jobs.get(&job.id) {
                None => changes.added.push(job.id),
                Some(existing) if *existing != job => changes.updated.push(job.id),
                Some(_) => {}
            }
            seen.insert(job.id, job);
        }

        changes.removed = self
            .jobs
            .keys()
            .filter(|id| !seen.contains_key(id))
            .copied()
            .collect();

        self.jobs = seen;
        changes
    }

    /// Whether polling should continue.
    pub fn has_active(&self) -> bool {
        self.jobs.values().any(|job| job.status.is_active())
    }

    pub fn get(&self, job_id: Uuid) -> Option<&JobView> {
        self.jobs.get(&job_id)
    }

    /// Newest first, matching the server's ordering.
    pub fn jobs(&self) -> Vec<&JobView> {
        let mut jobs: Vec<&JobView> = self.jobs.values().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Read-only HTTP client for the jobs API.
pub struct JobsClient {
    client: Client,
    base_url: String,
}

impl JobsClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn list(&self, website_id: Uuid) -> AppResult<Vec<JobView>> {
        let response = self
            .client
            .get(format!("{}/api/jobs", self.base_url))
            .query(&[("websiteId", website_id.to_string())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response("Jobs", response).await);
        }
        Ok(response.json().await?)
    }

    /// Fetch once and merge into `cache`.
    pub async fn refresh(&self, website_id: Uuid, cache: &mut JobCache) -> AppResult<CacheChanges> {
        let snapshot = self.list(website_id).await?;
        Ok(cache.reconcile(snapshot))
    }
}
