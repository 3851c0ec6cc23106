use crate::{
    analytics::{Analytics, Granularity, graph::SeriesEntity},
    auth::auth::AuthUser,
    error::EngineError,
    model::role::Role,
    store::JobFilter,
};
use actix_web::{HttpResponse, Responder, web};
use chrono::Utc;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GraphQuery {
    /// `day`, `week`, `month` (default) or `year`
    #[schema(example = "week")]
    pub filter: Option<Granularity>,
    /// Restrict to one member's jobs
    pub member_id: Option<u64>,
}

#[derive(Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SummaryQuery {
    /// `day`, `week`, `month` (default) or `year`
    #[schema(example = "month")]
    pub period: Option<Granularity>,
    pub member_id: Option<u64>,
    pub client_id: Option<u64>,
}

#[derive(Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OverviewQuery {
    /// Length of the comparison period, default 30
    #[schema(example = 30)]
    pub days: Option<u32>,
    pub client_id: Option<u64>,
}

const DEFAULT_DAYS: u32 = 30;

fn client_scope(auth: &AuthUser, requested: Option<u64>) -> Result<Option<u64>, EngineError> {
    match auth.role {
        Role::Admin => Ok(requested),
        Role::Client => Ok(auth.scope(JobFilter::default())?.client_id),
        Role::Member => Err(EngineError::forbidden("Admin/Client only")),
    }
}

#[utoipa::path(
    get,
    path = "/api/analytics/jobs/graph",
    params(GraphQuery),
    responses(
        (status = 200, description = "Jobs created per bucket, zero-filled", body = crate::analytics::graph::JobGraph),
        (status = 400, description = "Unknown filter"),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Analytics"
)]
pub async fn job_graph(
    auth: AuthUser,
    analytics: web::Data<Analytics>,
    query: web::Query<GraphQuery>,
) -> actix_web::Result<impl Responder> {
    let filter = auth.scope(JobFilter {
        member_id: query.member_id,
        client_id: None,
    })?;
    if filter.client_id.is_some() {
        // Client contacts see their own dashboard summary, not the team graph.
        return Err(EngineError::forbidden("Admin/Member only").into());
    }

    let graph = analytics
        .job_graph(query.filter.unwrap_or_default(), filter.member_id, Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(graph))
}

#[utoipa::path(
    get,
    path = "/api/analytics/sites/graph",
    params(GraphQuery),
    responses(
        (status = 200, description = "Sites created per bucket, zero-filled", body = [crate::analytics::graph::SiteGraphPoint]),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Analytics"
)]
pub async fn site_graph(
    auth: AuthUser,
    analytics: web::Data<Analytics>,
    query: web::Query<GraphQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let points = analytics
        .site_graph(query.filter.unwrap_or_default(), Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(points))
}

#[utoipa::path(
    get,
    path = "/api/analytics/team/activity",
    params(GraphQuery),
    responses(
        (status = 200, description = "Jobs per member, busiest first", body = [crate::analytics::graph::TeamActivity]),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Analytics"
)]
pub async fn team_activity(
    auth: AuthUser,
    analytics: web::Data<Analytics>,
    query: web::Query<GraphQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let activity = analytics
        .team_activity(query.filter.unwrap_or_default(), Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(activity))
}

#[utoipa::path(
    get,
    path = "/api/analytics/dashboard",
    params(SummaryQuery),
    responses(
        (status = 200, description = "Completed work in the current period", body = crate::analytics::summary::DashboardSummary),
        (status = 401, description = "Unauthorized")
    ),
    security(("bearer_auth" = [])),
    tag = "Analytics"
)]
pub async fn dashboard_summary(
    auth: AuthUser,
    analytics: web::Data<Analytics>,
    query: web::Query<SummaryQuery>,
) -> actix_web::Result<impl Responder> {
    let filter = auth.scope(JobFilter {
        member_id: query.member_id,
        client_id: query.client_id,
    })?;
    let summary = analytics
        .dashboard_summary(query.period.unwrap_or_default(), filter, Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(summary))
}

#[utoipa::path(
    get,
    path = "/api/analytics/jobs/overview",
    params(OverviewQuery),
    responses(
        (status = 200, description = "Status totals and growth", body = crate::analytics::overview::JobsOverview),
        (status = 400, description = "days out of range"),
        (status = 403, description = "Admin/Client only")
    ),
    security(("bearer_auth" = [])),
    tag = "Analytics"
)]
pub async fn jobs_overview(
    auth: AuthUser,
    analytics: web::Data<Analytics>,
    query: web::Query<OverviewQuery>,
) -> actix_web::Result<impl Responder> {
    let client_id = client_scope(&auth, query.client_id)?;
    let overview = analytics
        .jobs_overview(query.days.unwrap_or(DEFAULT_DAYS), client_id, Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(overview))
}

#[utoipa::path(
    get,
    path = "/api/analytics/sites/overview",
    params(OverviewQuery),
    responses(
        (status = 200, description = "Site totals and growth", body = crate::analytics::overview::SitesOverview),
        (status = 400, description = "days out of range"),
        (status = 403, description = "Admin/Client only")
    ),
    security(("bearer_auth" = [])),
    tag = "Analytics"
)]
pub async fn sites_overview(
    auth: AuthUser,
    analytics: web::Data<Analytics>,
    query: web::Query<OverviewQuery>,
) -> actix_web::Result<impl Responder> {
    let client_id = client_scope(&auth, query.client_id)?;
    let overview = analytics
        .sites_overview(query.days.unwrap_or(DEFAULT_DAYS), client_id, Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(overview))
}

#[utoipa::path(
    get,
    path = "/api/analytics/team/overview",
    params(OverviewQuery),
    responses(
        (status = 200, description = "Today's attendance activity", body = crate::analytics::overview::TeamOverview),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Analytics"
)]
pub async fn team_overview(
    auth: AuthUser,
    analytics: web::Data<Analytics>,
    query: web::Query<OverviewQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let overview = analytics
        .team_overview(query.days.unwrap_or(DEFAULT_DAYS), Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(overview))
}

#[utoipa::path(
    get,
    path = "/api/analytics/series/{entity}",
    params(
        ("entity" = SeriesEntity, Path, description = "`jobs` or `sites`"),
        OverviewQuery
    ),
    responses(
        (status = 200, description = "One point per calendar day", body = [crate::analytics::graph::DailyPoint]),
        (status = 403, description = "Admin only")
    ),
    security(("bearer_auth" = [])),
    tag = "Analytics"
)]
pub async fn daily_series(
    auth: AuthUser,
    analytics: web::Data<Analytics>,
    path: web::Path<String>,
    query: web::Query<OverviewQuery>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let entity: SeriesEntity = path
        .parse()
        .map_err(|_| EngineError::UnknownSeries(path.into_inner()))?;
    let series = analytics
        .daily_series(
            entity,
            query.days.unwrap_or(DEFAULT_DAYS),
            Utc::now(),
        )
        .await?;
    Ok(HttpResponse::Ok().json(series))
}
