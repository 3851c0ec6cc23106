use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;
use utoipa::ToSchema;

use super::{
    Analytics,
    bucket::{Window, growth_percent},
    check_days,
};
use crate::{
    error::EngineError,
    model::job::{JobStatus, display_hours, minutes_to_hours},
    store::JobFilter,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobsOverview {
    pub days: u32,
    pub total_jobs: u64,
    pub pending: u64,
    pub active: u64,
    pub complete: u64,
    pub approved: u64,
    pub rejected: u64,
    pub this_period: u64,
    pub previous_period: u64,
    pub growth_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SitesOverview {
    pub days: u32,
    pub total_sites: u64,
    pub this_period: u64,
    pub previous_period: u64,
    pub growth_percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeamOverview {
    pub active_members_today: u64,
    pub punch_ins_today: u64,
    pub hours_today: f64,
    /// Jobs created in the last `days` days.
    pub activity_this_period: u64,
}

impl Analytics {
    /// Status totals plus period-over-period growth by job start date.
    #[instrument(name = "jobs_overview", skip(self, now))]
    pub async fn jobs_overview(
        &self,
        days: u32,
        client_id: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<JobsOverview, EngineError> {
        let current = Window::trailing_days(check_days(days)?, self.local(now));
        let previous = current.previous();
        let filter = JobFilter {
            member_id: None,
            client_id,
        };

        let mut overview = JobsOverview {
            days,
            ..Default::default()
        };
        for (status, count) in self.store.status_counts(filter).await? {
            overview.total_jobs += count;
            match status {
                JobStatus::Pending => overview.pending += count,
                JobStatus::Active => overview.active += count,
                JobStatus::Complete => overview.complete += count,
                JobStatus::Approved => overview.approved += count,
                JobStatus::Rejected => overview.rejected += count,
            }
        }

        let jobs = self
            .store
            .jobs_started_between(previous.start, current.end, filter)
            .await?;
        overview.this_period = jobs
            .iter()
            .filter(|j| current.contains(j.start_date))
            .count() as u64;
        overview.previous_period = jobs
            .iter()
            .filter(|j| previous.contains(j.start_date))
            .count() as u64;
        overview.growth_percent = growth_percent(overview.this_period, overview.previous_period);
        Ok(overview)
    }

    /// Site totals plus period-over-period growth by creation date.
    #[instrument(name = "sites_overview", skip(self, now))]
    pub async fn sites_overview(
        &self,
        days: u32,
        client_id: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<SitesOverview, EngineError> {
        let current = Window::trailing_days(check_days(days)?, self.local(now));
        let previous = current.previous();
        let (start, _) = previous.utc_bounds(self.offset);
        let (_, end) = current.utc_bounds(self.offset);

        let total_sites = self.store.site_count(client_id).await?;
        let sites = self
            .store
            .sites_created_between(start, end, client_id)
            .await?;

        let mut this_period = 0;
        let mut previous_period = 0;
        for site in &sites {
            let date = self.local(site.created_at);
            if current.contains(date) {
                this_period += 1;
            } else if previous.contains(date) {
                previous_period += 1;
            }
        }

        Ok(SitesOverview {
            days,
            total_sites,
            this_period,
            previous_period,
            growth_percent: growth_percent(this_period, previous_period),
        })
    }

    /// Today's attendance activity plus jobs created over the last `days` days.
    #[instrument(name = "team_overview", skip(self, now))]
    pub async fn team_overview(
        &self,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<TeamOverview, EngineError> {
        let today = self.local(now);
        let (day_start, day_end) = Window::trailing_days(1, today).utc_bounds(self.offset);
        let (period_start, period_end) =
            Window::trailing_days(check_days(days)?, today).utc_bounds(self.offset);

        let punched_in = self
            .store
            .jobs_punched_in_between(day_start, day_end)
            .await?;
        let active_members: HashSet<u64> = punched_in.iter().map(|j| j.assigned_to).collect();

        let completed_minutes: i64 = self
            .store
            .completed_jobs_between(day_start, day_end, JobFilter::default())
            .await?
            .iter()
            .map(|j| j.duration_minutes)
            .sum();

        let activity = self
            .store
            .jobs_created_between(period_start, period_end, JobFilter::default())
            .await?;

        Ok(TeamOverview {
            active_members_today: active_members.len() as u64,
            punch_ins_today: punched_in.len() as u64,
            hours_today: display_hours(minutes_to_hours(completed_minutes)),
            activity_this_period: activity.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};

    use super::*;
    use crate::{
        analytics::tests::{completed_job, created_job, seeded_analytics},
        engine::tests::t0,
    };

    #[actix_web::test]
    async fn jobs_overview_counts_statuses_and_growth() {
        let (analytics, store) = seeded_analytics();
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();

        // Three jobs starting in the last 7 days, two in the 7 before.
        for (id, back) in [(1, 0), (2, 3), (3, 6), (4, 7), (5, 13)] {
            let mut job = created_job(id, 10, t0());
            job.start_date = today - Duration::days(back);
            store.put_job(job);
        }
        let mut done = completed_job(6, 10, t0(), 45);
        done.start_date = today - Duration::days(30);
        store.put_job(done);

        let overview = analytics.jobs_overview(7, None, t0()).await.unwrap();
        assert_eq!(overview.total_jobs, 6);
        assert_eq!(overview.pending, 5);
        assert_eq!(overview.complete, 1);
        assert_eq!(overview.this_period, 3);
        assert_eq!(overview.previous_period, 2);
        assert_eq!(overview.growth_percent, 50.0);

        let other_client = analytics.jobs_overview(7, Some(21), t0()).await.unwrap();
        assert_eq!(other_client.total_jobs, 0);
        assert_eq!(other_client.growth_percent, 0.0);
    }

    #[actix_web::test]
    async fn sites_overview_without_history_has_zero_growth() {
        let (analytics, store) = seeded_analytics();
        store.add_site(3, "Annex", Some(20), t0() - Duration::days(40));

        let overview = analytics.sites_overview(30, None, t0()).await.unwrap();
        assert_eq!(overview.total_sites, 3);
        assert_eq!(overview.this_period, 2);
        assert_eq!(overview.previous_period, 1);
        assert_eq!(overview.growth_percent, 100.0);

        let client = analytics.sites_overview(30, Some(21), t0()).await.unwrap();
        assert_eq!(client.total_sites, 1);
        assert_eq!(client.previous_period, 0);
        assert_eq!(client.growth_percent, 0.0);
    }

    #[actix_web::test]
    async fn team_overview_reports_today() {
        let (analytics, store) = seeded_analytics();
        store.put_job(completed_job(1, 10, t0() + Duration::hours(2), 90));
        let mut active = created_job(2, 11, t0() - Duration::days(2));
        active.status = JobStatus::Active;
        active.attendance.punch_in.time = Some(t0());
        store.put_job(active);
        store.put_job(completed_job(3, 10, t0() - Duration::days(1), 60));

        let overview = analytics.team_overview(7, t0()).await.unwrap();
        assert_eq!(overview.punch_ins_today, 2);
        assert_eq!(overview.active_members_today, 2);
        assert_eq!(overview.hours_today, 1.5);
        assert_eq!(overview.activity_this_period, 3);
    }
}
