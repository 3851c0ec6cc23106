use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::BoxStream;

use crate::{
    error::StoreError,
    model::{
        job::{AttachmentKind, Job, JobStatus, NewJob},
        member::{Counters, Member},
        site::{Site, SiteRef},
    },
};

pub mod memory;
pub mod mysql;

pub use memory::MemoryStore;
pub use mysql::MySqlStore;

/// Optional member/client restriction applied to report queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobFilter {
    pub member_id: Option<u64>,
    pub client_id: Option<u64>,
}

impl JobFilter {
    pub fn member(member_id: u64) -> Self {
        Self {
            member_id: Some(member_id),
            client_id: None,
        }
    }

    pub fn client(client_id: u64) -> Self {
        Self {
            member_id: None,
            client_id: Some(client_id),
        }
    }

    pub fn matches(&self, assigned_to: u64, client_id: u64) -> bool {
        self.member_id.is_none_or(|m| m == assigned_to)
            && self.client_id.is_none_or(|c| c == client_id)
    }
}

/// Slim projection of a job used by the time-series reports.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct JobStamp {
    pub id: u64,
    pub assigned_to: u64,
    pub client_id: u64,
    pub status: String,
    pub start_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub punch_in_time: Option<DateTime<Utc>>,
}

/// A completed job as seen by the dashboard summary.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedJob {
    pub id: u64,
    pub assigned_to: u64,
    pub client_id: u64,
    pub site_ids: Vec<u64>,
    pub punch_out_time: DateTime<Utc>,
    pub duration_minutes: i64,
}

/// Persistence seam for the attendance engine and the reports.
///
/// Every mutating method is a conditional write: it returns `false` (or
/// `None`) when the precondition no longer holds, so racing callers cannot
/// both succeed.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_job(&self, job: NewJob, now: DateTime<Utc>) -> Result<Job, StoreError>;

    async fn find_job(&self, id: u64) -> Result<Option<Job>, StoreError>;

    /// Sets the punch-in and moves the job to `active`, only if no punch-in is
    /// recorded and the job is still `pending`.
    async fn record_punch_in(
        &self,
        id: u64,
        at: DateTime<Utc>,
        images: &[String],
    ) -> Result<bool, StoreError>;

    /// Sets the punch-out and duration, only if a punch-in exists and no
    /// punch-out does. Moves the job to `complete` when `complete` is set.
    async fn record_punch_out(
        &self,
        id: u64,
        at: DateTime<Utc>,
        images: &[String],
        duration_minutes: i64,
        complete: bool,
    ) -> Result<bool, StoreError>;

    /// Compare-and-set on the job status.
    async fn transition_status(
        &self,
        id: u64,
        from: JobStatus,
        to: JobStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn update_notes(&self, id: u64, notes: &str, at: DateTime<Utc>)
    -> Result<bool, StoreError>;

    async fn append_after_photos(
        &self,
        id: u64,
        images: &[String],
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Removes one reference. `false` when the job or the reference is absent.
    async fn remove_attachment(
        &self,
        id: u64,
        kind: AttachmentKind,
        reference: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Adds `hours` and one completed job to the member, at most once per job.
    /// `None` means this job was already credited.
    async fn credit_member(
        &self,
        job_id: u64,
        member_id: u64,
        hours: f64,
    ) -> Result<Option<Counters>, StoreError>;

    /// Client-side twin of [`JobStore::credit_member`].
    async fn credit_client(
        &self,
        job_id: u64,
        client_id: u64,
        hours: f64,
    ) -> Result<Option<Counters>, StoreError>;

    async fn member_counters(&self, member_id: u64) -> Result<Option<Counters>, StoreError>;

    async fn client_counters(&self, client_id: u64) -> Result<Option<Counters>, StoreError>;

    async fn client_exists(&self, client_id: u64) -> Result<bool, StoreError>;

    async fn find_member(&self, member_id: u64) -> Result<Option<Member>, StoreError>;

    /// Returns the ids in `site_ids` that have no site record.
    async fn missing_sites(&self, site_ids: &[u64]) -> Result<Vec<u64>, StoreError>;

    async fn jobs_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filter: JobFilter,
    ) -> Result<Vec<JobStamp>, StoreError>;

    async fn jobs_started_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        filter: JobFilter,
    ) -> Result<Vec<JobStamp>, StoreError>;

    async fn jobs_punched_in_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<JobStamp>, StoreError>;

    async fn status_counts(&self, filter: JobFilter) -> Result<Vec<(JobStatus, u64)>, StoreError>;

    /// Jobs in `complete` whose punch-out falls inside `[start, end]`.
    async fn completed_jobs_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filter: JobFilter,
    ) -> Result<Vec<CompletedJob>, StoreError>;

    async fn active_punched_in_jobs(&self) -> Result<Vec<Job>, StoreError>;

    async fn sites_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        client_id: Option<u64>,
    ) -> Result<Vec<Site>, StoreError>;

    async fn site_count(&self, client_id: Option<u64>) -> Result<u64, StoreError>;

    async fn site_refs(&self, site_ids: &[u64]) -> Result<Vec<SiteRef>, StoreError>;

    async fn member_names(&self, member_ids: &[u64]) -> Result<HashMap<u64, String>, StoreError>;

    fn stream_members(&self) -> BoxStream<'_, Result<Member, StoreError>>;
}
