use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use super::{
    JobEngine,
    lifecycle::{check_punch_in, check_punch_out},
};
use crate::{
    error::EngineError,
    model::{
        job::{JobStatus, display_hours, minutes_to_hours},
        member::Counters,
    },
};

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PunchInReceipt {
    pub job_id: u64,
    pub status: JobStatus,
    #[schema(value_type = String, format = "date-time")]
    pub punch_in_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PunchOutReceipt {
    pub job_id: u64,
    pub status: JobStatus,
    pub duration_minutes: i64,
    /// Rounded to two decimals for display.
    pub duration_hours: f64,
    /// Absent when punch-out did not complete the job.
    pub member_counters: Option<Counters>,
    pub client_counters: Option<Counters>,
}

/// Whole minutes from `punch_in` to `punch_out`, floored.
pub fn duration_minutes(punch_in: DateTime<Utc>, punch_out: DateTime<Utc>) -> i64 {
    (punch_out - punch_in).num_milliseconds().div_euclid(60_000)
}

impl JobEngine {
    #[instrument(name = "punch_in", skip(self, images, now), fields(images = images.len()))]
    pub async fn punch_in(
        &self,
        job_id: u64,
        images: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<PunchInReceipt, EngineError> {
        let job = self.load_job(job_id).await?;
        check_punch_in(&job)?;

        if !self.store.record_punch_in(job_id, now, &images).await? {
            // Someone else got there first; the fresh record explains why.
            let current = self.load_job(job_id).await?;
            check_punch_in(&current)?;
            warn!(job_id, "Punch-in write rejected without a visible cause");
            return Err(EngineError::AlreadyPunchedIn(job_id));
        }

        info!(job_id, member_id = job.assigned_to, "Punched in");
        Ok(PunchInReceipt {
            job_id,
            status: JobStatus::Active,
            punch_in_time: now,
        })
    }

    #[instrument(name = "punch_out", skip(self, images, now), fields(images = images.len()))]
    pub async fn punch_out(
        &self,
        job_id: u64,
        images: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<PunchOutReceipt, EngineError> {
        let job = self.load_job(job_id).await?;
        check_punch_out(&job)?;

        let punched_in_at = job
            .attendance
            .punch_in
            .time
            .ok_or(EngineError::NotPunchedIn(job_id))?;
        let minutes = duration_minutes(punched_in_at, now);
        if minutes <= 0 {
            return Err(EngineError::InvalidDuration {
                job_id,
                minutes,
            });
        }

        let completes = self.policy.punch_out_completes;
        if !self
            .store
            .record_punch_out(job_id, now, &images, minutes, completes)
            .await?
        {
            let current = self.load_job(job_id).await?;
            check_punch_out(&current)?;
            warn!(job_id, "Punch-out write rejected without a visible cause");
            return Err(EngineError::JobAlreadyComplete(job_id));
        }

        info!(job_id, minutes, completes, "Punched out");

        let job = self.load_job(job_id).await?;
        let (member_counters, client_counters) = if completes {
            let reconciled = self.reconcile_completed(&job).await?;
            (Some(reconciled.member), Some(reconciled.client))
        } else {
            (None, None)
        };

        Ok(PunchOutReceipt {
            job_id,
            status: job.status,
            duration_minutes: minutes,
            duration_hours: display_hours(minutes_to_hours(minutes)),
            member_counters,
            client_counters,
        })
    }
}
