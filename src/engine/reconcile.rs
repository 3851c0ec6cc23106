use serde::Serialize;
use tracing::{error, info, instrument};
use utoipa::ToSchema;

use super::JobEngine;
use crate::{
    error::{CounterSide, EngineError, StoreError},
    model::{
        job::{Job, JobStatus},
        member::Counters,
    },
};

/// Counters after a job's contribution has been applied.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    pub job_id: u64,
    pub member: Counters,
    pub client: Counters,
    /// False when an earlier run already credited that side.
    pub member_credited: bool,
    pub client_credited: bool,
}

impl JobEngine {
    /// Propagates a completed job into its member and client counters.
    ///
    /// The two sides are independent: each is applied at most once per job and
    /// a failure on one does not stop the other. The job stays `complete`
    /// either way.
    #[instrument(name = "reconcile", skip(self, job), fields(job_id = job.id))]
    pub(crate) async fn reconcile_completed(&self, job: &Job) -> Result<Reconciliation, EngineError> {
        let hours = job.attendance.hours().ok_or(EngineError::NotPunchedIn(job.id))?;

        let member = settle_side(
            self.store.credit_member(job.id, job.assigned_to, hours).await,
            || self.store.member_counters(job.assigned_to),
            "member",
            job.assigned_to,
        )
        .await;
        let client = settle_side(
            self.store.credit_client(job.id, job.client_id, hours).await,
            || self.store.client_counters(job.client_id),
            "client",
            job.client_id,
        )
        .await;

        let (side, reason) = match (member, client) {
            (Ok((member, member_credited)), Ok((client, client_credited))) => {
                info!(
                    hours,
                    member_credited, client_credited, "Counters reconciled"
                );
                return Ok(Reconciliation {
                    job_id: job.id,
                    member,
                    client,
                    member_credited,
                    client_credited,
                });
            }
            (Err(m), Err(c)) => (CounterSide::Both, format!("{}; {}", m, c)),
            (Err(m), Ok(_)) => (CounterSide::Member, m.to_string()),
            (Ok(_), Err(c)) => (CounterSide::Client, c.to_string()),
        };

        error!(job_id = job.id, %side, %reason, "Counter reconciliation failed; retry with reconcile");
        Err(EngineError::CounterUpdateFailure {
            job_id: job.id,
            side,
            reason,
        })
    }

    /// Retries reconciliation for a job that is already `complete`.
    #[instrument(name = "reconcile_job", skip(self))]
    pub async fn reconcile_job(&self, job_id: u64) -> Result<Reconciliation, EngineError> {
        let job = self.load_job(job_id).await?;
        if job.status != JobStatus::Complete {
            return Err(EngineError::InvalidTransition {
                job_id,
                from: job.status,
                to: JobStatus::Complete,
            });
        }
        self.reconcile_completed(&job).await
    }
}

/// Turns a credit attempt into the side's current counters. An already
/// credited side reports its stored counters instead.
async fn settle_side<F, Fut>(
    credited: Result<Option<Counters>, StoreError>,
    current: F,
    entity: &'static str,
    id: u64,
) -> Result<(Counters, bool), StoreError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<Option<Counters>, StoreError>>,
{
    match credited? {
        Some(counters) => Ok((counters, true)),
        None => current()
            .await?
            .map(|counters| (counters, false))
            .ok_or(StoreError::MissingRow(entity, id)),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::engine::{
        AttendancePolicy,
        tests::{draft, engine_with_job, t0},
    };

    #[actix_web::test]
    async fn retry_is_idempotent() {
        let (engine, store, job_id) = engine_with_job(AttendancePolicy::default()).await;
        engine.punch_in(job_id, vec![], t0()).await.unwrap();
        engine
            .punch_out(job_id, vec![], t0() + Duration::minutes(90))
            .await
            .unwrap();

        let retried = engine.reconcile_job(job_id).await.unwrap();
        assert!(!retried.member_credited);
        assert!(!retried.client_credited);
        assert_eq!(retried.member.hours, 1.5);
        assert_eq!(store.member(10).unwrap().completed_jobs_count, 1);
    }

    #[actix_web::test]
    async fn reconcile_rejects_unfinished_jobs() {
        let (engine, _store, job_id) = engine_with_job(AttendancePolicy::default()).await;
        let result = engine.reconcile_job(job_id).await;
        assert!(matches!(result, Err(EngineError::InvalidTransition { .. })));
    }

    #[actix_web::test]
    async fn missing_client_is_reported_but_job_stays_complete() {
        let (engine, store, _) = engine_with_job(AttendancePolicy::default()).await;
        let job = engine.create_job(draft(), t0()).await.unwrap();

        // The client disappears between creation and completion.
        let mut orphan = job.clone();
        orphan.client_id = 99;
        store.put_job(orphan);

        engine.punch_in(job.id, vec![], t0()).await.unwrap();
        let result = engine
            .punch_out(job.id, vec![], t0() + Duration::minutes(30))
            .await;
        assert!(matches!(
            result,
            Err(EngineError::CounterUpdateFailure {
                side: CounterSide::Client,
                ..
            })
        ));

        let stored = engine.get_job(job.id).await.unwrap();
        assert_eq!(stored.status, JobStatus::Complete);
        assert_eq!(store.member(10).unwrap().total_working_hours, 0.5);

        // The member side is not credited twice on retry.
        let retry = engine.reconcile_job(job.id).await;
        assert!(retry.is_err());
        assert_eq!(store.member(10).unwrap().completed_jobs_count, 1);
    }
}
