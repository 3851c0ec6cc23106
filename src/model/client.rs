use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A company or individual that commissions jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: u64,
    /// Company name, or "first last" for individual clients.
    pub display_name: String,
    pub working_hours: f64,
    pub completed_jobs_count: u64,
}
