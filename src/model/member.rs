use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const UNKNOWN_MEMBER: &str = "Unknown Member";

/// A field worker. Profile fields are owned elsewhere; the counters are only
/// ever moved by counter reconciliation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
    pub total_working_hours: f64,
    pub completed_jobs_count: u64,
}

impl Member {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Aggregate labour counters carried by members and clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Counters {
    pub hours: f64,
    pub completed_jobs: u64,
}
