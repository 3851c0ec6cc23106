use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;

use super::{CompletedJob, JobFilter, JobStamp, JobStore};
use crate::{
    error::StoreError,
    model::{
        client::Client,
        job::{Attendance, AttachmentKind, Job, JobStatus, NewJob},
        member::{Counters, Member},
        site::{Site, SiteRef},
    },
};

/// Reference records for a memory store. Members, clients and sites are
/// owned elsewhere, so a local run starts from a fixture file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Seed {
    pub members: Vec<SeedMember>,
    pub clients: Vec<SeedClient>,
    pub sites: Vec<SeedSite>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedMember {
    pub id: u64,
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedClient {
    pub id: u64,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedSite {
    pub id: u64,
    pub site_name: String,
    pub client_id: Option<u64>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Seed {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

#[derive(Default)]
struct State {
    next_job_id: u64,
    jobs: BTreeMap<u64, Job>,
    member_credited: HashSet<u64>,
    client_credited: HashSet<u64>,
    members: BTreeMap<u64, Member>,
    clients: BTreeMap<u64, Client>,
    sites: BTreeMap<u64, Site>,
}

/// In-process store. A single lock around all records gives every
/// conditional write the same atomicity the SQL backend gets from `UPDATE ... WHERE`.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_member(&self, id: u64, first_name: &str, last_name: &str) {
        self.state().members.insert(
            id,
            Member {
                id,
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                total_working_hours: 0.0,
                completed_jobs_count: 0,
            },
        );
    }

    pub fn add_client(&self, id: u64, display_name: &str) {
        self.state().clients.insert(
            id,
            Client {
                id,
                display_name: display_name.to_string(),
                working_hours: 0.0,
                completed_jobs_count: 0,
            },
        );
    }

    pub fn add_site(&self, id: u64, site_name: &str, client_id: Option<u64>, created_at: DateTime<Utc>) {
        self.state().sites.insert(
            id,
            Site {
                id,
                site_name: site_name.to_string(),
                client_id,
                created_at,
            },
        );
    }

    /// Inserts every seeded record. Sites without `createdAt` are stamped `now`.
    pub fn load_seed(&self, seed: Seed, now: DateTime<Utc>) {
        for member in seed.members {
            self.add_member(member.id, &member.first_name, &member.last_name);
        }
        for client in seed.clients {
            self.add_client(client.id, &client.display_name);
        }
        for site in seed.sites {
            self.add_site(
                site.id,
                &site.site_name,
                site.client_id,
                site.created_at.unwrap_or(now),
            );
        }
    }

    pub fn member(&self, id: u64) -> Option<Member> {
        self.state().members.get(&id).cloned()
    }

    #[cfg(test)]
    pub fn client(&self, id: u64) -> Option<Client> {
        self.state().clients.get(&id).cloned()
    }

    /// Overwrites a stored job wholesale. Used to stage fixtures.
    #[cfg(test)]
    pub fn put_job(&self, job: Job) {
        let mut state = self.state();
        state.next_job_id = state.next_job_id.max(job.id);
        state.jobs.insert(job.id, job);
    }

    fn stamp(job: &Job) -> JobStamp {
        JobStamp {
            id: job.id,
            assigned_to: job.assigned_to,
            client_id: job.client_id,
            status: job.status.to_string(),
            start_date: job.start_date,
            created_at: job.created_at,
            punch_in_time: job.attendance.punch_in.time,
        }
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, job: NewJob, now: DateTime<Utc>) -> Result<Job, StoreError> {
        let mut state = self.state();
        state.next_job_id += 1;
        let id = state.next_job_id;

        let job = Job {
            id,
            assigned_to: job.assigned_to,
            client_id: job.client_id,
            site_ids: job.site_ids,
            notes: job.notes,
            status: JobStatus::Pending,
            start_date: job.start_date,
            end_date: job.end_date,
            start_time: job.start_time,
            end_time: job.end_time,
            attendance: Attendance::default(),
            before_photo: Vec::new(),
            after_photo: Vec::new(),
            devices_used: job.devices_used,
            latitude: job.latitude,
            longitude: job.longitude,
            created_at: now,
            updated_at: now,
        };
        state.jobs.insert(id, job.clone());
        Ok(job)
    }

    async fn find_job(&self, id: u64) -> Result<Option<Job>, StoreError> {
        Ok(self.state().jobs.get(&id).cloned())
    }

    async fn record_punch_in(
        &self,
        id: u64,
        at: DateTime<Utc>,
        images: &[String],
    ) -> Result<bool, StoreError> {
        let mut state = self.state();
        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(false);
        };
        if job.attendance.is_punched_in() || job.status != JobStatus::Pending {
            return Ok(false);
        }

        job.attendance.punch_in.time = Some(at);
        job.attendance.punch_in.images = images.to_vec();
        job.status = JobStatus::Active;
        job.updated_at = at;
        Ok(true)
    }

    async fn record_punch_out(
        &self,
        id: u64,
        at: DateTime<Utc>,
        images: &[String],
        duration_minutes: i64,
        complete: bool,
    ) -> Result<bool, StoreError> {
        let mut state = self.state();
        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(false);
        };
        if !job.attendance.is_punched_in() || job.attendance.is_punched_out() {
            return Ok(false);
        }

        job.attendance.punch_out.time = Some(at);
        job.attendance.punch_out.images = images.to_vec();
        job.attendance.duration = Some(duration_minutes);
        if complete {
            job.status = JobStatus::Complete;
        }
        job.updated_at = at;
        Ok(true)
    }

    async fn transition_status(
        &self,
        id: u64,
        from: JobStatus,
        to: JobStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state();
        match state.jobs.get_mut(&id) {
            Some(job) if job.status == from => {
                job.status = to;
                job.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_notes(
        &self,
        id: u64,
        notes: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state();
        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(false);
        };
        job.notes = Some(notes.to_string());
        job.updated_at = at;
        Ok(true)
    }

    async fn append_after_photos(
        &self,
        id: u64,
        images: &[String],
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state();
        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(false);
        };
        job.after_photo.extend_from_slice(images);
        job.updated_at = at;
        Ok(true)
    }

    async fn remove_attachment(
        &self,
        id: u64,
        kind: AttachmentKind,
        reference: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state();
        let Some(job) = state.jobs.get_mut(&id) else {
            return Ok(false);
        };
        let photos = match kind {
            AttachmentKind::Before => &mut job.before_photo,
            AttachmentKind::After => &mut job.after_photo,
        };
        let Some(position) = photos.iter().position(|p| p == reference) else {
            return Ok(false);
        };
        photos.remove(position);
        job.updated_at = at;
        Ok(true)
    }

    async fn credit_member(
        &self,
        job_id: u64,
        member_id: u64,
        hours: f64,
    ) -> Result<Option<Counters>, StoreError> {
        let mut state = self.state();
        if state.member_credited.contains(&job_id) {
            return Ok(None);
        }
        let member = state
            .members
            .get_mut(&member_id)
            .ok_or(StoreError::MissingRow("member", member_id))?;
        member.total_working_hours += hours;
        member.completed_jobs_count += 1;
        let counters = Counters {
            hours: member.total_working_hours,
            completed_jobs: member.completed_jobs_count,
        };
        state.member_credited.insert(job_id);
        Ok(Some(counters))
    }

    async fn credit_client(
        &self,
        job_id: u64,
        client_id: u64,
        hours: f64,
    ) -> Result<Option<Counters>, StoreError> {
        let mut state = self.state();
        if state.client_credited.contains(&job_id) {
            return Ok(None);
        }
        let client = state
            .clients
            .get_mut(&client_id)
            .ok_or(StoreError::MissingRow("client", client_id))?;
        client.working_hours += hours;
        client.completed_jobs_count += 1;
        let counters = Counters {
            hours: client.working_hours,
            completed_jobs: client.completed_jobs_count,
        };
        state.client_credited.insert(job_id);
        Ok(Some(counters))
    }

    async fn member_counters(&self, member_id: u64) -> Result<Option<Counters>, StoreError> {
        Ok(self.state().members.get(&member_id).map(|m| Counters {
            hours: m.total_working_hours,
            completed_jobs: m.completed_jobs_count,
        }))
    }

    async fn client_counters(&self, client_id: u64) -> Result<Option<Counters>, StoreError> {
        Ok(self.state().clients.get(&client_id).map(|c| Counters {
            hours: c.working_hours,
            completed_jobs: c.completed_jobs_count,
        }))
    }

    async fn client_exists(&self, client_id: u64) -> Result<bool, StoreError> {
        Ok(self.state().clients.contains_key(&client_id))
    }

    async fn find_member(&self, member_id: u64) -> Result<Option<Member>, StoreError> {
        Ok(self.member(member_id))
    }

    async fn missing_sites(&self, site_ids: &[u64]) -> Result<Vec<u64>, StoreError> {
        let state = self.state();
        Ok(site_ids
            .iter()
            .copied()
            .filter(|id| !state.sites.contains_key(id))
            .collect())
    }

    async fn jobs_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filter: JobFilter,
    ) -> Result<Vec<JobStamp>, StoreError> {
        Ok(self
            .state()
            .jobs
            .values()
            .filter(|j| j.created_at >= start && j.created_at <= end)
            .filter(|j| filter.matches(j.assigned_to, j.client_id))
            .map(Self::stamp)
            .collect())
    }

    async fn jobs_started_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        filter: JobFilter,
    ) -> Result<Vec<JobStamp>, StoreError> {
        Ok(self
            .state()
            .jobs
            .values()
            .filter(|j| j.start_date >= start && j.start_date <= end)
            .filter(|j| filter.matches(j.assigned_to, j.client_id))
            .map(Self::stamp)
            .collect())
    }

    async fn jobs_punched_in_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<JobStamp>, StoreError> {
        Ok(self
            .state()
            .jobs
            .values()
            .filter(|j| {
                j.attendance
                    .punch_in
                    .time
                    .is_some_and(|t| t >= start && t <= end)
            })
            .map(Self::stamp)
            .collect())
    }

    async fn status_counts(&self, filter: JobFilter) -> Result<Vec<(JobStatus, u64)>, StoreError> {
        let mut counts: HashMap<JobStatus, u64> = HashMap::new();
        for job in self.state().jobs.values() {
            if filter.matches(job.assigned_to, job.client_id) {
                *counts.entry(job.status).or_default() += 1;
            }
        }
        Ok(counts.into_iter().collect())
    }

    async fn completed_jobs_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filter: JobFilter,
    ) -> Result<Vec<CompletedJob>, StoreError> {
        Ok(self
            .state()
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Complete)
            .filter(|j| filter.matches(j.assigned_to, j.client_id))
            .filter_map(|j| {
                let punch_out_time = j.attendance.punch_out.time?;
                let duration_minutes = j.attendance.duration?;
                (punch_out_time >= start && punch_out_time <= end).then(|| CompletedJob {
                    id: j.id,
                    assigned_to: j.assigned_to,
                    client_id: j.client_id,
                    site_ids: j.site_ids.clone(),
                    punch_out_time,
                    duration_minutes,
                })
            })
            .collect())
    }

    async fn active_punched_in_jobs(&self) -> Result<Vec<Job>, StoreError> {
        let mut jobs: Vec<Job> = self
            .state()
            .jobs
            .values()
            .filter(|j| j.attendance.is_punched_in() && !j.attendance.is_punched_out())
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.attendance.punch_in.time.cmp(&a.attendance.punch_in.time));
        Ok(jobs)
    }

    async fn sites_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        client_id: Option<u64>,
    ) -> Result<Vec<Site>, StoreError> {
        Ok(self
            .state()
            .sites
            .values()
            .filter(|s| s.created_at >= start && s.created_at <= end)
            .filter(|s| client_id.is_none() || s.client_id == client_id)
            .cloned()
            .collect())
    }

    async fn site_count(&self, client_id: Option<u64>) -> Result<u64, StoreError> {
        Ok(self
            .state()
            .sites
            .values()
            .filter(|s| client_id.is_none() || s.client_id == client_id)
            .count() as u64)
    }

    async fn site_refs(&self, site_ids: &[u64]) -> Result<Vec<SiteRef>, StoreError> {
        let state = self.state();
        Ok(site_ids
            .iter()
            .filter_map(|id| state.sites.get(id))
            .map(|s| SiteRef {
                id: s.id,
                site_name: s.site_name.clone(),
            })
            .collect())
    }

    async fn member_names(&self, member_ids: &[u64]) -> Result<HashMap<u64, String>, StoreError> {
        let state = self.state();
        Ok(member_ids
            .iter()
            .filter_map(|id| state.members.get(id))
            .map(|m| (m.id, m.display_name()))
            .collect())
    }

    fn stream_members(&self) -> BoxStream<'_, Result<Member, StoreError>> {
        let members: Vec<Member> = self.state().members.values().cloned().collect();
        stream::iter(members.into_iter().map(Ok)).boxed()
    }
}
