//! Job lifecycle, attendance and counter reconciliation.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::{
    error::EngineError,
    model::job::{AttachmentKind, Job, NewJob},
    store::JobStore,
};

pub mod attendance;
pub mod lifecycle;
pub mod reconcile;

/// Whether punch-out moves a job straight to `complete`.
///
/// When disabled, punch-out only records the attendance window and the job is
/// completed by an explicit status change, which then runs reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttendancePolicy {
    pub punch_out_completes: bool,
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self {
            punch_out_completes: true,
        }
    }
}

/// Job creation payload. Everything is optional at the wire level so missing
/// fields surface as a `ValidationError` rather than a parse failure.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobDraft {
    #[schema(example = 10)]
    pub assigned_to: Option<u64>,
    #[schema(example = json!([1, 2]))]
    #[serde(default)]
    pub site_ids: Vec<u64>,
    #[schema(example = 20)]
    pub client_id: Option<u64>,
    #[schema(example = "Replace filters on level 2")]
    pub notes: Option<String>,
    #[schema(example = "2026-01-01", format = "date", value_type = Option<String>)]
    pub start_date: Option<NaiveDate>,
    #[schema(example = "2026-01-01", format = "date", value_type = Option<String>)]
    pub end_date: Option<NaiveDate>,
    #[schema(example = "09:00")]
    pub start_time: Option<String>,
    #[schema(example = "17:00")]
    pub end_time: Option<String>,
    pub devices_used: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, EngineError> {
    value.ok_or_else(|| EngineError::ValidationError(format!("{} is required", field)))
}

fn required_text(value: Option<String>, field: &str) -> Result<String, EngineError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(EngineError::ValidationError(format!("{} is required", field))),
    }
}

impl JobDraft {
    /// Checks presence and shape. Reference existence is checked by the engine.
    pub fn validate(self) -> Result<NewJob, EngineError> {
        let assigned_to = required(self.assigned_to, "assignedTo")?;
        let client_id = required(self.client_id, "clientId")?;

        let mut site_ids = Vec::with_capacity(self.site_ids.len());
        for id in self.site_ids {
            if !site_ids.contains(&id) {
                site_ids.push(id);
            }
        }
        if site_ids.is_empty() {
            return Err(EngineError::ValidationError(
                "at least one site is required".to_string(),
            ));
        }

        let start_date = required(self.start_date, "startDate")?;
        let end_date = required(self.end_date, "endDate")?;
        if start_date > end_date {
            return Err(EngineError::ValidationError(
                "startDate cannot be after endDate".to_string(),
            ));
        }

        Ok(NewJob {
            assigned_to,
            client_id,
            site_ids,
            notes: self.notes,
            start_date,
            end_date,
            start_time: required_text(self.start_time, "startTime")?,
            end_time: required_text(self.end_time, "endTime")?,
            devices_used: self.devices_used,
            latitude: self.latitude,
            longitude: self.longitude,
        })
    }
}

/// Entry point for every job mutation. Cheap to clone.
#[derive(Clone)]
pub struct JobEngine {
    store: Arc<dyn JobStore>,
    policy: AttendancePolicy,
}

impl JobEngine {
    pub fn new(store: Arc<dyn JobStore>, policy: AttendancePolicy) -> Self {
        Self { store, policy }
    }

    pub(crate) async fn load_job(&self, job_id: u64) -> Result<Job, EngineError> {
        self.store
            .find_job(job_id)
            .await?
            .ok_or_else(|| EngineError::job_not_found(job_id))
    }

    #[instrument(name = "create_job", skip(self, draft, now))]
    pub async fn create_job(&self, draft: JobDraft, now: DateTime<Utc>) -> Result<Job, EngineError> {
        let new_job = draft.validate()?;

        if self.store.find_member(new_job.assigned_to).await?.is_none() {
            return Err(EngineError::NotFound {
                entity: "member",
                id: new_job.assigned_to,
            });
        }
        if !self.store.client_exists(new_job.client_id).await? {
            return Err(EngineError::NotFound {
                entity: "client",
                id: new_job.client_id,
            });
        }
        if let Some(&site_id) = self.store.missing_sites(&new_job.site_ids).await?.first() {
            return Err(EngineError::NotFound {
                entity: "site",
                id: site_id,
            });
        }

        let job = self.store.insert_job(new_job, now).await?;
        info!(
            job_id = job.id,
            member_id = job.assigned_to,
            client_id = job.client_id,
            "Job created"
        );
        Ok(job)
    }

    pub async fn get_job(&self, job_id: u64) -> Result<Job, EngineError> {
        self.load_job(job_id).await
    }

    pub async fn update_notes(
        &self,
        job_id: u64,
        notes: &str,
        now: DateTime<Utc>,
    ) -> Result<Job, EngineError> {
        if !self.store.update_notes(job_id, notes, now).await? {
            return Err(EngineError::job_not_found(job_id));
        }
        self.load_job(job_id).await
    }

    pub async fn add_after_attachments(
        &self,
        job_id: u64,
        images: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<Job, EngineError> {
        if images.is_empty() {
            return Err(EngineError::ValidationError(
                "no images provided".to_string(),
            ));
        }
        if !self.store.append_after_photos(job_id, &images, now).await? {
            return Err(EngineError::job_not_found(job_id));
        }
        self.load_job(job_id).await
    }

    pub async fn remove_attachment(
        &self,
        job_id: u64,
        kind: AttachmentKind,
        reference: &str,
        now: DateTime<Utc>,
    ) -> Result<Job, EngineError> {
        if !self
            .store
            .remove_attachment(job_id, kind, reference, now)
            .await?
        {
            // Distinguish a missing job from a missing reference.
            self.load_job(job_id).await?;
            return Err(EngineError::NotFound {
                entity: "attachment on job",
                id: job_id,
            });
        }
        self.load_job(job_id).await
    }

    /// Jobs with a punch-in and no punch-out, latest punch-in first.
    pub async fn active_jobs(&self) -> Result<Vec<Job>, EngineError> {
        Ok(self.store.active_punched_in_jobs().await?)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{
        model::job::{Attendance, JobStatus},
        store::MemoryStore,
    };

    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap()
    }

    pub fn draft() -> JobDraft {
        JobDraft {
            assigned_to: Some(10),
            site_ids: vec![1],
            client_id: Some(20),
            notes: Some("Inspect pumps".into()),
            start_date: NaiveDate::from_ymd_opt(2026, 3, 10),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 10),
            start_time: Some("09:00".into()),
            end_time: Some("17:00".into()),
            ..Default::default()
        }
    }

    pub fn fixture_job(id: u64) -> Job {
        Job {
            id,
            assigned_to: 10,
            client_id: 20,
            site_ids: vec![1],
            notes: None,
            status: JobStatus::Pending,
            start_date: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
            start_time: "09:00".into(),
            end_time: "17:00".into(),
            attendance: Attendance::default(),
            before_photo: vec![],
            after_photo: vec![],
            devices_used: None,
            latitude: None,
            longitude: None,
            created_at: t0(),
            updated_at: t0(),
        }
    }

    pub fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.add_member(10, "Asha", "Rao");
        store.add_member(11, "Ben", "Okafor");
        store.add_client(20, "Northwind Facilities");
        store.add_client(21, "Harbor Labs");
        store.add_site(1, "North Plant", Some(20), t0());
        store.add_site(2, "Dock 4", Some(21), t0());
        store
    }

    /// Engine over a seeded memory store with one pending job.
    pub async fn engine_with_job(policy: AttendancePolicy) -> (JobEngine, Arc<MemoryStore>, u64) {
        let store = seeded_store();
        let engine = JobEngine::new(store.clone(), policy);
        let job = engine.create_job(draft(), t0()).await.unwrap();
        (engine, store, job.id)
    }

    #[actix_web::test]
    async fn created_jobs_start_pending() {
        let (engine, _store, job_id) = engine_with_job(AttendancePolicy::default()).await;
        let job = engine.get_job(job_id).await.unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.attendance.punch_in.time.is_none());
        assert_eq!(job.attendance.duration, None);
    }

    #[actix_web::test]
    async fn missing_fields_fail_validation() {
        let (engine, _store, _) = engine_with_job(AttendancePolicy::default()).await;

        let no_member = JobDraft {
            assigned_to: None,
            ..draft()
        };
        assert!(matches!(
            engine.create_job(no_member, t0()).await,
            Err(EngineError::ValidationError(msg)) if msg.contains("assignedTo")
        ));

        let no_sites = JobDraft {
            site_ids: vec![],
            ..draft()
        };
        assert!(matches!(
            engine.create_job(no_sites, t0()).await,
            Err(EngineError::ValidationError(_))
        ));

        let blank_time = JobDraft {
            end_time: Some("  ".into()),
            ..draft()
        };
        assert!(matches!(
            engine.create_job(blank_time, t0()).await,
            Err(EngineError::ValidationError(_))
        ));
    }

    #[actix_web::test]
    async fn unknown_references_are_not_found() {
        let (engine, _store, _) = engine_with_job(AttendancePolicy::default()).await;
        let bad_site = JobDraft {
            site_ids: vec![1, 77],
            ..draft()
        };
        assert!(matches!(
            engine.create_job(bad_site, t0()).await,
            Err(EngineError::NotFound { entity: "site", id: 77 })
        ));

        let bad_client = JobDraft {
            client_id: Some(404),
            ..draft()
        };
        assert!(matches!(
            engine.create_job(bad_client, t0()).await,
            Err(EngineError::NotFound { entity: "client", .. })
        ));
    }

    #[actix_web::test]
    async fn attachments_are_appended_and_removed() {
        let (engine, _store, job_id) = engine_with_job(AttendancePolicy::default()).await;

        let job = engine
            .add_after_attachments(job_id, vec!["a.jpg".into(), "b.jpg".into()], t0())
            .await
            .unwrap();
        assert_eq!(job.after_photo, vec!["a.jpg", "b.jpg"]);

        let job = engine
            .remove_attachment(job_id, AttachmentKind::After, "a.jpg", t0())
            .await
            .unwrap();
        assert_eq!(job.after_photo, vec!["b.jpg"]);

        let missing = engine
            .remove_attachment(job_id, AttachmentKind::Before, "b.jpg", t0())
            .await;
        assert!(matches!(missing, Err(EngineError::NotFound { .. })));
    }

    #[actix_web::test]
    async fn status_change_is_idempotent_and_checked() {
        let (engine, _store, job_id) = engine_with_job(AttendancePolicy::default()).await;

        let same = engine.change_status(job_id, "pending", t0()).await.unwrap();
        assert_eq!(same, engine.get_job(job_id).await.unwrap());

        assert!(matches!(
            engine.change_status(job_id, "archived", t0()).await,
            Err(EngineError::InvalidStatus(_))
        ));

        let approved = engine.change_status(job_id, "approved", t0()).await.unwrap();
        assert_eq!(approved.status, JobStatus::Approved);

        assert!(matches!(
            engine.punch_in(job_id, vec![], t0()).await,
            Err(EngineError::InvalidTransition { .. })
        ));
    }

    #[actix_web::test]
    async fn active_jobs_lists_open_attendance() {
        let (engine, _store, job_id) = engine_with_job(AttendancePolicy::default()).await;
        assert!(engine.active_jobs().await.unwrap().is_empty());

        engine.punch_in(job_id, vec![], t0()).await.unwrap();
        let active = engine.active_jobs().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, job_id);
    }
}
