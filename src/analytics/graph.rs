use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::{Display, EnumString};
use tracing::instrument;
use utoipa::ToSchema;

use super::{
    Analytics,
    bucket::{Granularity, Window, fill, fill_graph},
    check_days,
};
use crate::{error::EngineError, store::JobFilter};

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobGraphPoint {
    pub bucket_key: String,
    pub total_jobs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobGraph {
    pub filter: Granularity,
    pub member_id: Option<u64>,
    pub data: Vec<JobGraphPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SiteGraphPoint {
    pub bucket_key: String,
    pub total_sites: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TeamActivity {
    pub member_id: u64,
    pub member_name: String,
    pub total_jobs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SeriesEntity {
    Jobs,
    Sites,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DailyPoint {
    /// `YYYY-MM-DD`
    pub date: String,
    pub count: u64,
}

impl Analytics {
    /// Jobs created per bucket over the rolling window for `granularity`.
    #[instrument(name = "job_graph", skip(self, now))]
    pub async fn job_graph(
        &self,
        granularity: Granularity,
        member_id: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<JobGraph, EngineError> {
        let window = Window::graph(granularity, self.local(now));
        let (start, end) = window.utc_bounds(self.offset);
        let filter = JobFilter {
            member_id,
            client_id: None,
        };
        let jobs = self.store.jobs_created_between(start, end, filter).await?;

        let created = jobs.iter().map(|j| self.local(j.created_at));
        let data = fill_graph(granularity, &window, created)
            .into_iter()
            .map(|b| JobGraphPoint {
                bucket_key: b.bucket_key,
                total_jobs: b.count,
            })
            .collect();

        Ok(JobGraph {
            filter: granularity,
            member_id,
            data,
        })
    }

    /// Sites created per bucket, same windows as the job graph.
    #[instrument(name = "site_graph", skip(self, now))]
    pub async fn site_graph(
        &self,
        granularity: Granularity,
        now: DateTime<Utc>,
    ) -> Result<Vec<SiteGraphPoint>, EngineError> {
        let window = Window::graph(granularity, self.local(now));
        let (start, end) = window.utc_bounds(self.offset);
        let sites = self.store.sites_created_between(start, end, None).await?;

        Ok(
            fill_graph(granularity, &window, sites.iter().map(|s| self.local(s.created_at)))
                .into_iter()
                .map(|b| SiteGraphPoint {
                    bucket_key: b.bucket_key,
                    total_sites: b.count,
                })
                .collect(),
        )
    }

    /// Jobs per assignee over the graph window, busiest first.
    #[instrument(name = "team_activity", skip(self, now))]
    pub async fn team_activity(
        &self,
        granularity: Granularity,
        now: DateTime<Utc>,
    ) -> Result<Vec<TeamActivity>, EngineError> {
        let window = Window::graph(granularity, self.local(now));
        let (start, end) = window.utc_bounds(self.offset);
        let jobs = self
            .store
            .jobs_created_between(start, end, JobFilter::default())
            .await?;

        let mut per_member: HashMap<u64, u64> = HashMap::new();
        for job in &jobs {
            *per_member.entry(job.assigned_to).or_default() += 1;
        }
        let ids: Vec<u64> = per_member.keys().copied().collect();
        let names = self.names.resolve(&ids).await?;

        let mut activity: Vec<TeamActivity> = per_member
            .into_iter()
            .map(|(member_id, total_jobs)| TeamActivity {
                member_id,
                member_name: names.get(&member_id).cloned().unwrap_or_default(),
                total_jobs,
            })
            .collect();
        activity.sort_by(|a, b| {
            b.total_jobs
                .cmp(&a.total_jobs)
                .then_with(|| a.member_name.cmp(&b.member_name))
                .then_with(|| a.member_id.cmp(&b.member_id))
        });
        Ok(activity)
    }

    /// Rolling `days`-day series by calendar date, zero-filled.
    #[instrument(name = "daily_series", skip(self, now))]
    pub async fn daily_series(
        &self,
        entity: SeriesEntity,
        days: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<DailyPoint>, EngineError> {
        let window = Window::trailing_days(check_days(days)?, self.local(now));
        let (start, end) = window.utc_bounds(self.offset);

        let dates: Vec<_> = match entity {
            SeriesEntity::Jobs => self
                .store
                .jobs_created_between(start, end, JobFilter::default())
                .await?
                .iter()
                .map(|j| (self.local(j.created_at), 0.0))
                .collect(),
            SeriesEntity::Sites => self
                .store
                .sites_created_between(start, end, None)
                .await?
                .iter()
                .map(|s| (self.local(s.created_at), 0.0))
                .collect(),
        };

        Ok(fill(&window, dates)
            .into_iter()
            .map(|b| DailyPoint {
                date: b.bucket_key,
                count: b.count,
            })
            .collect())
    }
}
