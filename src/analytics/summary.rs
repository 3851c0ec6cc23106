use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, instrument};
use utoipa::ToSchema;

use super::{
    Analytics,
    bucket::{Bucket, Granularity, Window, fill},
};
use crate::{
    error::EngineError,
    model::{
        job::{display_hours, minutes_to_hours},
        site::SiteRef,
    },
    store::JobFilter,
};

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SummaryTotals {
    pub total_hours: f64,
    pub total_completed_jobs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MemberRef {
    pub id: u64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub period: Granularity,
    #[schema(value_type = String, format = "date")]
    pub range_start: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub range_end: NaiveDate,
    pub summary: SummaryTotals,
    pub breakdown: Vec<Bucket>,
    pub sites: Vec<SiteRef>,
    /// Empty when the summary is scoped to a single member.
    pub members: Vec<MemberRef>,
}

impl Analytics {
    /// Completed work whose punch-out falls in the calendar period containing
    /// `now`.
    #[instrument(name = "dashboard_summary", skip(self, now))]
    pub async fn dashboard_summary(
        &self,
        period: Granularity,
        filter: JobFilter,
        now: DateTime<Utc>,
    ) -> Result<DashboardSummary, EngineError> {
        let window = Window::period(period, self.local(now));
        let (start, end) = window.utc_bounds(self.offset);
        let jobs = self.store.completed_jobs_between(start, end, filter).await?;
        debug!(matched = jobs.len(), "Completed jobs in period");

        let mut breakdown = fill(
            &window,
            jobs.iter().map(|j| {
                (
                    self.local(j.punch_out_time),
                    minutes_to_hours(j.duration_minutes),
                )
            }),
        );
        for bucket in &mut breakdown {
            bucket.hours = display_hours(bucket.hours);
        }

        let total_minutes: i64 = jobs.iter().map(|j| j.duration_minutes).sum();
        let summary = SummaryTotals {
            total_hours: display_hours(minutes_to_hours(total_minutes)),
            total_completed_jobs: jobs.len() as u64,
        };

        let site_ids: Vec<u64> = jobs
            .iter()
            .flat_map(|j| j.site_ids.iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let sites = self.store.site_refs(&site_ids).await?;

        let members = if filter.member_id.is_none() {
            let ids: Vec<u64> = jobs
                .iter()
                .map(|j| j.assigned_to)
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let names = self.names.resolve(&ids).await?;
            let mut members: Vec<MemberRef> = ids
                .into_iter()
                .map(|id| MemberRef {
                    id,
                    name: names.get(&id).cloned().unwrap_or_default(),
                })
                .collect();
            members.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
            members
        } else {
            Vec::new()
        };

        Ok(DashboardSummary {
            period,
            range_start: window.start,
            range_end: window.end,
            summary,
            breakdown,
            sites,
            members,
        })
    }
}
