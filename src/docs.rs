use crate::analytics::{
    bucket::Bucket,
    graph::{DailyPoint, JobGraph, JobGraphPoint, SeriesEntity, SiteGraphPoint, TeamActivity},
    overview::{JobsOverview, SitesOverview, TeamOverview},
    summary::{DashboardSummary, MemberRef, SummaryTotals},
    Granularity,
};
use crate::api::analytics::{GraphQuery, OverviewQuery, SummaryQuery};
use crate::api::job::{AttachmentQuery, ImagesPayload, NotesPayload, StatusPayload};
use crate::engine::{
    JobDraft,
    attendance::{PunchInReceipt, PunchOutReceipt},
    reconcile::Reconciliation,
};
use crate::model::{
    job::{Attendance, AttachmentKind, Job, JobStatus, PunchRecord},
    member::Counters,
    site::SiteRef,
};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Field Operations API",
        version = "1.0.0",
        description = r#"
## Field Service Job Tracking

Schedules field jobs, records attendance against them and aggregates the
resulting labour into member/client counters and dashboards.

### Key Features
- **Jobs**
  - Create jobs for a member, client and one or more sites
  - Approve/reject pending jobs, keep notes and after-work photos
- **Attendance**
  - Punch-in/punch-out with photo references; punch-out completes the job and
    credits the member's and client's hours exactly once
- **Analytics**
  - Zero-filled job/site graphs by day, ISO week, month or year
  - Team activity ranking, dashboard summaries and growth overviews

### Security
Every endpoint expects a **JWT Bearer** access token. Admins see everything;
members act on their own jobs; clients see their own jobs and reports.

### Errors
Errors are JSON: `{"error": "<Kind>", "message": "..."}`.
"#,
    ),
    paths(
        crate::api::job::create_job,
        crate::api::job::get_job,
        crate::api::job::active_jobs,
        crate::api::job::change_status,
        crate::api::job::update_notes,
        crate::api::job::add_attachments,
        crate::api::job::remove_attachment,

        crate::api::job::punch_in,
        crate::api::job::punch_out,
        crate::api::job::reconcile,

        crate::api::analytics::job_graph,
        crate::api::analytics::site_graph,
        crate::api::analytics::team_activity,
        crate::api::analytics::dashboard_summary,
        crate::api::analytics::jobs_overview,
        crate::api::analytics::sites_overview,
        crate::api::analytics::team_overview,
        crate::api::analytics::daily_series
    ),
    components(
        schemas(
            Job,
            JobStatus,
            JobDraft,
            Attendance,
            PunchRecord,
            AttachmentKind,
            AttachmentQuery,
            ImagesPayload,
            NotesPayload,
            StatusPayload,
            PunchInReceipt,
            PunchOutReceipt,
            Reconciliation,
            Counters,
            SiteRef,
            Granularity,
            SeriesEntity,
            Bucket,
            JobGraph,
            JobGraphPoint,
            SiteGraphPoint,
            TeamActivity,
            DailyPoint,
            SummaryTotals,
            MemberRef,
            DashboardSummary,
            JobsOverview,
            SitesOverview,
            TeamOverview,
            GraphQuery,
            SummaryQuery,
            OverviewQuery
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Job", description = "Job management APIs"),
        (name = "Attendance", description = "Punch-in/punch-out and counter reconciliation"),
        (name = "Analytics", description = "Graphs, dashboards and overviews"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}
