use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

/// Lifecycle state of a job.
///
/// `pending -> active -> complete` is driven by attendance; `approved` and
/// `rejected` are terminal side-states reachable from `pending` only.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Active,
    Complete,
    Approved,
    Rejected,
}

/// Which photo list an attachment belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AttachmentKind {
    Before,
    After,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PunchRecord {
    #[schema(value_type = Option<String>, format = "date-time")]
    pub time: Option<DateTime<Utc>>,
    pub images: Vec<String>,
}

/// Attendance sub-record embedded in every job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Attendance {
    pub punch_in: PunchRecord,
    pub punch_out: PunchRecord,
    /// Whole minutes between punch-in and punch-out. Derived, never client supplied.
    pub duration: Option<i64>,
}

impl Attendance {
    pub fn is_punched_in(&self) -> bool {
        self.punch_in.time.is_some()
    }

    pub fn is_punched_out(&self) -> bool {
        self.punch_out.time.is_some()
    }

    /// Hours contributed to member/client counters. Unrounded.
    pub fn hours(&self) -> Option<f64> {
        self.duration.map(minutes_to_hours)
    }
}

pub fn minutes_to_hours(minutes: i64) -> f64 {
    minutes as f64 / 60.0
}

/// Rounds hours for presentation only; stored counters keep full precision.
pub fn display_hours(hours: f64) -> f64 {
    (hours * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: u64,
    pub assigned_to: u64,
    pub client_id: u64,
    pub site_ids: Vec<u64>,
    pub notes: Option<String>,
    pub status: JobStatus,
    #[schema(value_type = String, format = "date")]
    pub start_date: NaiveDate,
    #[schema(value_type = String, format = "date")]
    pub end_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub attendance: Attendance,
    pub before_photo: Vec<String>,
    pub after_photo: Vec<String>,
    pub devices_used: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    #[schema(value_type = String, format = "date-time")]
    pub created_at: DateTime<Utc>,
    #[schema(value_type = String, format = "date-time")]
    pub updated_at: DateTime<Utc>,
}

/// Validated input for job creation.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub assigned_to: u64,
    pub client_id: u64,
    pub site_ids: Vec<u64>,
    pub notes: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub devices_used: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_parses_only_known_values() {
        assert_eq!(JobStatus::from_str("complete").unwrap(), JobStatus::Complete);
        assert_eq!(JobStatus::Approved.to_string(), "approved");
        assert!(JobStatus::from_str("done").is_err());
        assert!(JobStatus::from_str("Pending").is_err());
    }

    #[test]
    fn hours_are_not_rounded_until_display() {
        let attendance = Attendance {
            duration: Some(100),
            ..Default::default()
        };
        let hours = attendance.hours().unwrap();
        assert!((hours - 1.666_666).abs() < 1e-5);
        assert_eq!(display_hours(hours), 1.67);
    }
}
