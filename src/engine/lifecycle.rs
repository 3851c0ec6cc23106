use std::str::FromStr;

use chrono::{DateTime, Utc};
use tracing::{info, instrument};

use super::JobEngine;
use crate::{
    error::EngineError,
    model::job::{Job, JobStatus},
};

/// Outcome of validating a requested status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Requested status equals the current one.
    NoOp,
    Apply { from: JobStatus, to: JobStatus },
}

impl Transition {
    pub fn completes(&self) -> bool {
        matches!(
            self,
            Transition::Apply {
                to: JobStatus::Complete,
                ..
            }
        )
    }
}

pub fn parse_status(raw: &str) -> Result<JobStatus, EngineError> {
    JobStatus::from_str(raw.trim()).map_err(|_| EngineError::InvalidStatus(raw.to_string()))
}

/// Legal explicit status changes.
///
/// `active` is only entered through punch-in. `complete` is entered through
/// punch-out, or here when punch-out was recorded without forcing completion.
pub fn check_transition(job: &Job, to: JobStatus) -> Result<Transition, EngineError> {
    let from = job.status;
    if from == to {
        return Ok(Transition::NoOp);
    }

    let allowed = match (from, to) {
        (JobStatus::Pending, JobStatus::Approved | JobStatus::Rejected) => true,
        (JobStatus::Active, JobStatus::Complete) => job.attendance.is_punched_out(),
        _ => false,
    };

    if allowed {
        Ok(Transition::Apply { from, to })
    } else {
        Err(EngineError::InvalidTransition {
            job_id: job.id,
            from,
            to,
        })
    }
}

/// Preconditions for punch-in, checked in order of precedence.
pub fn check_punch_in(job: &Job) -> Result<(), EngineError> {
    if job.status == JobStatus::Complete {
        return Err(EngineError::JobAlreadyComplete(job.id));
    }
    if job.attendance.is_punched_in() {
        return Err(EngineError::AlreadyPunchedIn(job.id));
    }
    if job.status != JobStatus::Pending {
        return Err(EngineError::InvalidTransition {
            job_id: job.id,
            from: job.status,
            to: JobStatus::Active,
        });
    }
    Ok(())
}

/// Preconditions for punch-out.
pub fn check_punch_out(job: &Job) -> Result<(), EngineError> {
    if !job.attendance.is_punched_in() {
        return Err(EngineError::NotPunchedIn(job.id));
    }
    if job.attendance.is_punched_out() {
        return Err(match job.status {
            JobStatus::Complete => EngineError::JobAlreadyComplete(job.id),
            from => EngineError::InvalidTransition {
                job_id: job.id,
                from,
                to: JobStatus::Complete,
            },
        });
    }
    Ok(())
}

impl JobEngine {
    /// Explicit status change. Re-sending the current status returns the job
    /// untouched.
    #[instrument(name = "change_job_status", skip(self, now))]
    pub async fn change_status(
        &self,
        job_id: u64,
        raw_status: &str,
        now: DateTime<Utc>,
    ) -> Result<Job, EngineError> {
        let to = parse_status(raw_status)?;
        let job = self.load_job(job_id).await?;

        let transition = check_transition(&job, to)?;
        let Transition::Apply { from, to } = transition else {
            return Ok(job);
        };

        if !self.store.transition_status(job_id, from, to, now).await? {
            // Lost a race; report against whatever the job is now.
            let current = self.load_job(job_id).await?;
            check_transition(&current, to)?;
            return Ok(current);
        }
        info!(job_id, %from, %to, "Job status changed");

        let job = self.load_job(job_id).await?;
        if transition.completes() {
            self.reconcile_completed(&job).await?;
        }
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::tests::{fixture_job, t0};

    #[test]
    fn unknown_status_is_rejected() {
        assert!(matches!(
            parse_status("finished"),
            Err(EngineError::InvalidStatus(s)) if s == "finished"
        ));
        assert_eq!(parse_status(" approved ").unwrap(), JobStatus::Approved);
    }

    #[test]
    fn side_states_only_reachable_from_pending() {
        let mut job = fixture_job(1);
        assert!(check_transition(&job, JobStatus::Approved).is_ok());
        assert!(check_transition(&job, JobStatus::Rejected).is_ok());
        assert!(check_transition(&job, JobStatus::Active).is_err());
        assert!(check_transition(&job, JobStatus::Complete).is_err());

        job.status = JobStatus::Active;
        job.attendance.punch_in.time = Some(t0());
        assert!(matches!(
            check_transition(&job, JobStatus::Approved),
            Err(EngineError::InvalidTransition { .. })
        ));

        job.status = JobStatus::Approved;
        assert!(check_transition(&job, JobStatus::Pending).is_err());
    }

    #[test]
    fn same_status_is_a_noop() {
        let job = fixture_job(1);
        assert_eq!(
            check_transition(&job, JobStatus::Pending).unwrap(),
            Transition::NoOp
        );
    }

    #[test]
    fn completing_by_status_needs_a_punch_out() {
        let mut job = fixture_job(1);
        job.status = JobStatus::Active;
        job.attendance.punch_in.time = Some(t0());
        assert!(check_transition(&job, JobStatus::Complete).is_err());

        job.attendance.punch_out.time = Some(t0() + chrono::Duration::minutes(30));
        job.attendance.duration = Some(30);
        assert!(check_transition(&job, JobStatus::Complete)
            .unwrap()
            .completes());
    }

    #[test]
    fn punch_in_precedence() {
        let mut job = fixture_job(1);
        assert!(check_punch_in(&job).is_ok());

        job.status = JobStatus::Rejected;
        assert!(matches!(
            check_punch_in(&job),
            Err(EngineError::InvalidTransition { .. })
        ));

        job.status = JobStatus::Complete;
        job.attendance.punch_in.time = Some(t0());
        assert!(matches!(
            check_punch_in(&job),
            Err(EngineError::JobAlreadyComplete(1))
        ));
    }
}
