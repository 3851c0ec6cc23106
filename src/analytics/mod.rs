//! Time-bucketed reports over jobs and sites.
//!
//! Every report takes the reference instant `now` explicitly. Calendar dates
//! are derived in the configured reporting offset before bucketing.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

use crate::{error::EngineError, store::JobStore, utils::member_names::MemberNames};

pub mod bucket;
pub mod graph;
pub mod overview;
pub mod summary;

pub use bucket::Granularity;

const MAX_REPORT_DAYS: u32 = 366;

#[derive(Clone)]
pub struct Analytics {
    store: Arc<dyn JobStore>,
    names: MemberNames,
    offset: FixedOffset,
}

impl Analytics {
    pub fn new(store: Arc<dyn JobStore>, names: MemberNames, offset: FixedOffset) -> Self {
        Self {
            store,
            names,
            offset,
        }
    }

    fn local(&self, ts: DateTime<Utc>) -> NaiveDate {
        bucket::local_date(ts, self.offset)
    }
}

fn check_days(days: u32) -> Result<u32, EngineError> {
    if days == 0 || days > MAX_REPORT_DAYS {
        return Err(EngineError::ValidationError(format!(
            "days must be between 1 and {}",
            MAX_REPORT_DAYS
        )));
    }
    Ok(days)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration as StdDuration;

    use chrono::{DateTime, Duration, FixedOffset, Utc};

    use super::*;
    use crate::{
        engine::tests::{fixture_job, seeded_store},
        model::job::{Job, JobStatus},
        store::MemoryStore,
    };

    pub fn analytics_over(store: Arc<MemoryStore>) -> Analytics {
        let names = MemberNames::new(store.clone(), StdDuration::from_secs(60));
        let utc = FixedOffset::east_opt(0).unwrap();
        Analytics::new(store, names, utc)
    }

    pub fn seeded_analytics() -> (Analytics, Arc<MemoryStore>) {
        let store = seeded_store();
        (analytics_over(store.clone()), store)
    }

    /// A job created at `created_at`, still pending.
    pub fn created_job(id: u64, member_id: u64, created_at: DateTime<Utc>) -> Job {
        let mut job = fixture_job(id);
        job.assigned_to = member_id;
        job.created_at = created_at;
        job.updated_at = created_at;
        job
    }

    /// A job completed at `punch_out` after `minutes` of work.
    pub fn completed_job(id: u64, member_id: u64, punch_out: DateTime<Utc>, minutes: i64) -> Job {
        let punch_in = punch_out - Duration::minutes(minutes);
        let mut job = created_job(id, member_id, punch_in - Duration::hours(1));
        job.status = JobStatus::Complete;
        job.attendance.punch_in.time = Some(punch_in);
        job.attendance.punch_out.time = Some(punch_out);
        job.attendance.duration = Some(minutes);
        job
    }

    #[test]
    fn report_days_are_bounded() {
        assert!(check_days(0).is_err());
        assert!(check_days(367).is_err());
        assert_eq!(check_days(30).unwrap(), 30);
    }
}
