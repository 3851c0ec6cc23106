use crate::{
    auth::auth::AuthUser,
    engine::{JobDraft, JobEngine},
    model::job::AttachmentKind,
};
use actix_web::{HttpResponse, Responder, web};
use chrono::Utc;
use serde::Deserialize;
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};

#[derive(Deserialize, ToSchema)]
pub struct ImagesPayload {
    /// Stored image references, e.g. `/uploads/jobs/42/in-1.jpg`
    #[schema(example = json!(["/uploads/jobs/42/in-1.jpg"]))]
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct StatusPayload {
    #[schema(example = "approved")]
    pub status: String,
}

#[derive(Deserialize, ToSchema)]
pub struct NotesPayload {
    #[schema(example = "Gate code changed to 4471")]
    pub notes: String,
}

#[derive(Deserialize, IntoParams, ToSchema)]
pub struct AttachmentQuery {
    /// `before` or `after`
    pub kind: AttachmentKind,
    /// The reference to remove
    pub reference: String,
}

/* =========================
Create job
========================= */
#[utoipa::path(
    post,
    path = "/api/jobs",
    request_body(content = JobDraft, content_type = "application/json"),
    responses(
        (status = 201, description = "Job created", body = crate::model::job::Job),
        (status = 400, description = "Missing or malformed fields", body = Object, example = json!({
            "error": "ValidationError",
            "message": "clientId is required"
        })),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Unknown member, client or site")
    ),
    security(("bearer_auth" = [])),
    tag = "Job"
)]
#[instrument(skip_all, fields(user_id = auth.user_id, username = %auth.username))]
pub async fn create_job(
    auth: AuthUser,
    engine: web::Data<JobEngine>,
    payload: web::Json<JobDraft>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let job = engine.create_job(payload.into_inner(), Utc::now()).await?;
    Ok(HttpResponse::Created().json(job))
}

#[utoipa::path(
    get,
    path = "/api/jobs/{id}",
    params(("id" = u64, Path, description = "Job id")),
    responses(
        (status = 200, description = "Job", body = crate::model::job::Job),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Job not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Job"
)]
pub async fn get_job(
    auth: AuthUser,
    engine: web::Data<JobEngine>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    let job = engine.get_job(path.into_inner()).await?;
    auth.require_visible(&job)?;
    Ok(HttpResponse::Ok().json(job))
}

/// Jobs currently punched in and not yet punched out.
#[utoipa::path(
    get,
    path = "/api/jobs/active",
    responses(
        (status = 200, description = "Active jobs", body = [crate::model::job::Job]),
        (status = 403, description = "Forbidden")
    ),
    security(("bearer_auth" = [])),
    tag = "Job"
)]
pub async fn active_jobs(
    auth: AuthUser,
    engine: web::Data<JobEngine>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    Ok(HttpResponse::Ok().json(engine.active_jobs().await?))
}

#[utoipa::path(
    put,
    path = "/api/jobs/{id}/status",
    params(("id" = u64, Path, description = "Job id")),
    request_body(content = StatusPayload, content_type = "application/json"),
    responses(
        (status = 200, description = "Job after the change", body = crate::model::job::Job),
        (status = 400, description = "Unknown status"),
        (status = 404, description = "Job not found"),
        (status = 409, description = "Transition not allowed")
    ),
    security(("bearer_auth" = [])),
    tag = "Job"
)]
#[instrument(skip_all, fields(user_id = auth.user_id, username = %auth.username))]
pub async fn change_status(
    auth: AuthUser,
    engine: web::Data<JobEngine>,
    path: web::Path<u64>,
    payload: web::Json<StatusPayload>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    let job = engine
        .change_status(path.into_inner(), &payload.status, Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(job))
}

/* =========================
Attendance
========================= */
#[utoipa::path(
    post,
    path = "/api/jobs/{id}/punch-in",
    params(("id" = u64, Path, description = "Job id")),
    request_body(content = ImagesPayload, content_type = "application/json"),
    responses(
        (status = 200, description = "Punched in", body = crate::engine::attendance::PunchInReceipt),
        (status = 403, description = "Not assigned to this job"),
        (status = 404, description = "Job not found"),
        (status = 409, description = "Already punched in or job complete", body = Object, example = json!({
            "error": "AlreadyPunchedIn",
            "message": "job 42 already has a punch-in"
        }))
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
#[instrument(skip_all, fields(user_id = auth.user_id, username = %auth.username))]
pub async fn punch_in(
    auth: AuthUser,
    engine: web::Data<JobEngine>,
    path: web::Path<u64>,
    payload: web::Json<ImagesPayload>,
) -> actix_web::Result<impl Responder> {
    let job_id = path.into_inner();
    auth.require_assignee(&engine.get_job(job_id).await?)?;

    let receipt = engine
        .punch_in(job_id, payload.into_inner().images, Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(receipt))
}

#[utoipa::path(
    post,
    path = "/api/jobs/{id}/punch-out",
    params(("id" = u64, Path, description = "Job id")),
    request_body(content = ImagesPayload, content_type = "application/json"),
    responses(
        (status = 200, description = "Punched out", body = crate::engine::attendance::PunchOutReceipt),
        (status = 403, description = "Not assigned to this job"),
        (status = 404, description = "Job not found"),
        (status = 409, description = "Not punched in, or the duration would be under a minute"),
        (status = 500, description = "Job completed but counters were not updated")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
#[instrument(skip_all, fields(user_id = auth.user_id, username = %auth.username))]
pub async fn punch_out(
    auth: AuthUser,
    engine: web::Data<JobEngine>,
    path: web::Path<u64>,
    payload: web::Json<ImagesPayload>,
) -> actix_web::Result<impl Responder> {
    let job_id = path.into_inner();
    auth.require_assignee(&engine.get_job(job_id).await?)?;

    let receipt = engine
        .punch_out(job_id, payload.into_inner().images, Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(receipt))
}

/// Re-applies counter reconciliation for a completed job.
#[utoipa::path(
    post,
    path = "/api/jobs/{id}/reconcile",
    params(("id" = u64, Path, description = "Job id")),
    responses(
        (status = 200, description = "Counters after reconciliation", body = crate::engine::reconcile::Reconciliation),
        (status = 404, description = "Job not found"),
        (status = 409, description = "Job is not complete"),
        (status = 500, description = "Counters could not be updated")
    ),
    security(("bearer_auth" = [])),
    tag = "Attendance"
)]
#[instrument(skip_all, fields(user_id = auth.user_id, username = %auth.username))]
pub async fn reconcile(
    auth: AuthUser,
    engine: web::Data<JobEngine>,
    path: web::Path<u64>,
) -> actix_web::Result<impl Responder> {
    auth.require_admin()?;
    Ok(HttpResponse::Ok().json(engine.reconcile_job(path.into_inner()).await?))
}

/* =========================
Notes and attachments
========================= */
#[utoipa::path(
    put,
    path = "/api/jobs/{id}/notes",
    params(("id" = u64, Path, description = "Job id")),
    request_body(content = NotesPayload, content_type = "application/json"),
    responses(
        (status = 200, description = "Updated job", body = crate::model::job::Job),
        (status = 404, description = "Job not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Job"
)]
#[instrument(skip_all, fields(user_id = auth.user_id, username = %auth.username))]
pub async fn update_notes(
    auth: AuthUser,
    engine: web::Data<JobEngine>,
    path: web::Path<u64>,
    payload: web::Json<NotesPayload>,
) -> actix_web::Result<impl Responder> {
    let job_id = path.into_inner();
    auth.require_assignee(&engine.get_job(job_id).await?)?;
    let job = engine
        .update_notes(job_id, &payload.notes, Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(job))
}

#[utoipa::path(
    post,
    path = "/api/jobs/{id}/attachments",
    params(("id" = u64, Path, description = "Job id")),
    request_body(content = ImagesPayload, content_type = "application/json"),
    responses(
        (status = 200, description = "Updated job", body = crate::model::job::Job),
        (status = 400, description = "No images provided"),
        (status = 404, description = "Job not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Job"
)]
#[instrument(skip_all, fields(user_id = auth.user_id, username = %auth.username))]
pub async fn add_attachments(
    auth: AuthUser,
    engine: web::Data<JobEngine>,
    path: web::Path<u64>,
    payload: web::Json<ImagesPayload>,
) -> actix_web::Result<impl Responder> {
    let job_id = path.into_inner();
    auth.require_assignee(&engine.get_job(job_id).await?)?;
    let job = engine
        .add_after_attachments(job_id, payload.into_inner().images, Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(job))
}

#[utoipa::path(
    delete,
    path = "/api/jobs/{id}/attachments",
    params(("id" = u64, Path, description = "Job id"), AttachmentQuery),
    responses(
        (status = 200, description = "Updated job", body = crate::model::job::Job),
        (status = 404, description = "Job or attachment not found")
    ),
    security(("bearer_auth" = [])),
    tag = "Job"
)]
#[instrument(skip_all, fields(user_id = auth.user_id, username = %auth.username))]
pub async fn remove_attachment(
    auth: AuthUser,
    engine: web::Data<JobEngine>,
    path: web::Path<u64>,
    query: web::Query<AttachmentQuery>,
) -> actix_web::Result<impl Responder> {
    let job_id = path.into_inner();
    auth.require_assignee(&engine.get_job(job_id).await?)?;
    let job = engine
        .remove_attachment(job_id, query.kind, &query.reference, Utc::now())
        .await?;
    Ok(HttpResponse::Ok().json(job))
}
