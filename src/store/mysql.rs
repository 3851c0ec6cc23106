use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{BoxStream, StreamExt};
use sqlx::{FromRow, MySqlPool, types::Json};
use tracing::debug;

use super::{CompletedJob, JobFilter, JobStamp, JobStore};
use crate::{
    error::StoreError,
    model::{
        job::{Attendance, AttachmentKind, Job, JobStatus, NewJob, PunchRecord},
        member::{Counters, Member},
        site::{Site, SiteRef},
    },
};

// Helper enum for typed SQLx binding
enum FilterValue {
    U64(u64),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
}

/// Appends `assigned_to` / `client_id` conditions for a report filter.
fn push_filter(where_sql: &mut String, args: &mut Vec<FilterValue>, filter: JobFilter) {
    if let Some(member_id) = filter.member_id {
        where_sql.push_str(" AND assigned_to = ?");
        args.push(FilterValue::U64(member_id));
    }
    if let Some(client_id) = filter.client_id {
        where_sql.push_str(" AND client_id = ?");
        args.push(FilterValue::U64(client_id));
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[derive(FromRow)]
struct JobRow {
    id: u64,
    assigned_to: u64,
    client_id: u64,
    notes: Option<String>,
    status: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    start_time: String,
    end_time: String,
    punch_in_time: Option<DateTime<Utc>>,
    punch_in_images: Json<Vec<String>>,
    punch_out_time: Option<DateTime<Utc>>,
    punch_out_images: Json<Vec<String>>,
    duration_minutes: Option<i64>,
    before_photos: Json<Vec<String>>,
    after_photos: Json<Vec<String>>,
    devices_used: Option<String>,
    latitude: Option<String>,
    longitude: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl JobRow {
    fn into_job(self, site_ids: Vec<u64>) -> Result<Job, StoreError> {
        let status = JobStatus::from_str(&self.status).map_err(|_| {
            StoreError::Corrupt(format!("job {} has status '{}'", self.id, self.status))
        })?;

        Ok(Job {
            id: self.id,
            assigned_to: self.assigned_to,
            client_id: self.client_id,
            site_ids,
            notes: self.notes,
            status,
            start_date: self.start_date,
            end_date: self.end_date,
            start_time: self.start_time,
            end_time: self.end_time,
            attendance: Attendance {
                punch_in: PunchRecord {
                    time: self.punch_in_time,
                    images: self.punch_in_images.0,
                },
                punch_out: PunchRecord {
                    time: self.punch_out_time,
                    images: self.punch_out_images.0,
                },
                duration: self.duration_minutes,
            },
            before_photo: self.before_photos.0,
            after_photo: self.after_photos.0,
            devices_used: self.devices_used,
            latitude: self.latitude,
            longitude: self.longitude,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const JOB_COLUMNS: &str = r#"
    id, assigned_to, client_id, notes, status, start_date, end_date, start_time, end_time,
    punch_in_time, punch_in_images, punch_out_time, punch_out_images, duration_minutes,
    before_photos, after_photos, devices_used, latitude, longitude, created_at, updated_at
"#;

const STAMP_COLUMNS: &str =
    "id, assigned_to, client_id, status, start_date, created_at, punch_in_time";

/// `JobStore` backed by MySQL through a shared `MySqlPool`.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn site_ids_for(&self, job_ids: &[u64]) -> Result<HashMap<u64, Vec<u64>>, StoreError> {
        let mut by_job: HashMap<u64, Vec<u64>> = HashMap::new();
        if job_ids.is_empty() {
            return Ok(by_job);
        }

        let sql = format!(
            "SELECT job_id, site_id FROM job_sites WHERE job_id IN ({}) ORDER BY job_id, position",
            placeholders(job_ids.len())
        );
        let mut query = sqlx::query_as::<_, (u64, u64)>(&sql);
        for id in job_ids {
            query = query.bind(*id);
        }

        for (job_id, site_id) in query.fetch_all(&self.pool).await? {
            by_job.entry(job_id).or_default().push(site_id);
        }
        Ok(by_job)
    }

    async fn load_jobs(&self, where_sql: &str, args: Vec<FilterValue>) -> Result<Vec<Job>, StoreError> {
        let sql = format!("SELECT {} FROM jobs WHERE 1=1{}", JOB_COLUMNS, where_sql);
        let mut query = sqlx::query_as::<_, JobRow>(&sql);
        for arg in args {
            query = match arg {
                FilterValue::U64(v) => query.bind(v),
                FilterValue::DateTime(v) => query.bind(v),
                FilterValue::Date(v) => query.bind(v),
            };
        }

        let rows = query.fetch_all(&self.pool).await?;
        let ids: Vec<u64> = rows.iter().map(|r| r.id).collect();
        let mut sites = self.site_ids_for(&ids).await?;

        rows.into_iter()
            .map(|row| {
                let site_ids = sites.remove(&row.id).unwrap_or_default();
                row.into_job(site_ids)
            })
            .collect()
    }

    async fn load_stamps(&self, where_sql: &str, args: Vec<FilterValue>) -> Result<Vec<JobStamp>, StoreError> {
        let sql = format!("SELECT {} FROM jobs WHERE 1=1{}", STAMP_COLUMNS, where_sql);
        debug!(sql = %sql, "Fetching job stamps");

        let mut query = sqlx::query_as::<_, JobStamp>(&sql);
        for arg in args {
            query = match arg {
                FilterValue::U64(v) => query.bind(v),
                FilterValue::DateTime(v) => query.bind(v),
                FilterValue::Date(v) => query.bind(v),
            };
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    /// Flips one of the per-job credited markers and applies the increment in
    /// the same transaction, so a retry never counts a job twice.
    async fn credit(
        &self,
        job_id: u64,
        marker: &'static str,
        table: &'static str,
        hours_column: &'static str,
        owner_id: u64,
        hours: f64,
    ) -> Result<Option<Counters>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query(&format!(
            "UPDATE jobs SET {marker} = TRUE WHERE id = ? AND {marker} = FALSE"
        ))
        .bind(job_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if claimed == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        let updated = sqlx::query(&format!(
            "UPDATE {table}
             SET {hours_column} = {hours_column} + ?, completed_jobs_count = completed_jobs_count + 1
             WHERE id = ?"
        ))
        .bind(hours)
        .bind(owner_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            tx.rollback().await?;
            return Err(StoreError::MissingRow(table.trim_end_matches('s'), owner_id));
        }

        let counters = sqlx::query_as::<_, Counters>(&format!(
            "SELECT {hours_column} AS hours, completed_jobs_count AS completed_jobs FROM {table} WHERE id = ?"
        ))
        .bind(owner_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(counters))
    }
}

#[async_trait]
impl JobStore for MySqlStore {
    async fn insert_job(&self, job: NewJob, now: DateTime<Utc>) -> Result<Job, StoreError> {
        let mut tx = self.pool.begin().await?;

        let id = sqlx::query(
            r#"
            INSERT INTO jobs
                (assigned_to, client_id, notes, status, start_date, end_date, start_time, end_time,
                 devices_used, latitude, longitude, created_at, updated_at)
            VALUES (?, ?, ?, 'pending', ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.assigned_to)
        .bind(job.client_id)
        .bind(&job.notes)
        .bind(job.start_date)
        .bind(job.end_date)
        .bind(&job.start_time)
        .bind(&job.end_time)
        .bind(&job.devices_used)
        .bind(&job.latitude)
        .bind(&job.longitude)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?
        .last_insert_id();

        for (position, site_id) in job.site_ids.iter().enumerate() {
            sqlx::query("INSERT INTO job_sites (job_id, site_id, position) VALUES (?, ?, ?)")
                .bind(id)
                .bind(*site_id)
                .bind(position as u32)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        self.find_job(id)
            .await?
            .ok_or(StoreError::MissingRow("job", id))
    }

    async fn find_job(&self, id: u64) -> Result<Option<Job>, StoreError> {
        let jobs = self
            .load_jobs(" AND id = ?", vec![FilterValue::U64(id)])
            .await?;
        Ok(jobs.into_iter().next())
    }

    async fn record_punch_in(
        &self,
        id: u64,
        at: DateTime<Utc>,
        images: &[String],
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET punch_in_time = ?, punch_in_images = ?, status = 'active', updated_at = ?
            WHERE id = ?
            AND punch_in_time IS NULL
            AND status = 'pending'
            "#,
        )
        .bind(at)
        .bind(Json(images))
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_punch_out(
        &self,
        id: u64,
        at: DateTime<Utc>,
        images: &[String],
        duration_minutes: i64,
        complete: bool,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET punch_out_time = ?,
                punch_out_images = ?,
                duration_minutes = ?,
                status = IF(?, 'complete', status),
                updated_at = ?
            WHERE id = ?
            AND punch_in_time IS NOT NULL
            AND punch_out_time IS NULL
            "#,
        )
        .bind(at)
        .bind(Json(images))
        .bind(duration_minutes)
        .bind(complete)
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn transition_status(
        &self,
        id: u64,
        from: JobStatus,
        to: JobStatus,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE jobs SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
            .bind(to.as_ref())
            .bind(at)
            .bind(id)
            .bind(from.as_ref())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_notes(
        &self,
        id: u64,
        notes: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE jobs SET notes = ?, updated_at = ? WHERE id = ?")
            .bind(notes)
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn append_after_photos(
        &self,
        id: u64,
        images: &[String],
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_scalar::<_, Json<Vec<String>>>(
            "SELECT after_photos FROM jobs WHERE id = ? FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(Json(mut photos)) = current else {
            tx.rollback().await?;
            return Ok(false);
        };
        photos.extend_from_slice(images);

        sqlx::query("UPDATE jobs SET after_photos = ?, updated_at = ? WHERE id = ?")
            .bind(Json(&photos))
            .bind(at)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn remove_attachment(
        &self,
        id: u64,
        kind: AttachmentKind,
        reference: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let column = match kind {
            AttachmentKind::Before => "before_photos",
            AttachmentKind::After => "after_photos",
        };

        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_scalar::<_, Json<Vec<String>>>(&format!(
            "SELECT {column} FROM jobs WHERE id = ? FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(Json(mut photos)) = current else {
            tx.rollback().await?;
            return Ok(false);
        };
        let Some(position) = photos.iter().position(|p| p == reference) else {
            tx.rollback().await?;
            return Ok(false);
        };
        photos.remove(position);

        sqlx::query(&format!(
            "UPDATE jobs SET {column} = ?, updated_at = ? WHERE id = ?"
        ))
        .bind(Json(&photos))
        .bind(at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn credit_member(
        &self,
        job_id: u64,
        member_id: u64,
        hours: f64,
    ) -> Result<Option<Counters>, StoreError> {
        self.credit(
            job_id,
            "member_credited",
            "members",
            "total_working_hours",
            member_id,
            hours,
        )
        .await
    }

    async fn credit_client(
        &self,
        job_id: u64,
        client_id: u64,
        hours: f64,
    ) -> Result<Option<Counters>, StoreError> {
        self.credit(
            job_id,
            "client_credited",
            "clients",
            "working_hours",
            client_id,
            hours,
        )
        .await
    }

    async fn member_counters(&self, member_id: u64) -> Result<Option<Counters>, StoreError> {
        Ok(sqlx::query_as::<_, Counters>(
            r#"
            SELECT total_working_hours AS hours, completed_jobs_count AS completed_jobs
            FROM members
            WHERE id = ?
            "#,
        )
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn client_counters(&self, client_id: u64) -> Result<Option<Counters>, StoreError> {
        Ok(sqlx::query_as::<_, Counters>(
            r#"
            SELECT working_hours AS hours, completed_jobs_count AS completed_jobs
            FROM clients
            WHERE id = ?
            "#,
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn client_exists(&self, client_id: u64) -> Result<bool, StoreError> {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT EXISTS(SELECT 1 FROM clients WHERE id = ? LIMIT 1)",
        )
        .bind(client_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(found == 1)
    }

    async fn find_member(&self, member_id: u64) -> Result<Option<Member>, StoreError> {
        Ok(sqlx::query_as::<_, Member>(
            r#"
            SELECT id, first_name, last_name, total_working_hours, completed_jobs_count
            FROM members
            WHERE id = ?
            "#,
        )
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn missing_sites(&self, site_ids: &[u64]) -> Result<Vec<u64>, StoreError> {
        if site_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id FROM sites WHERE id IN ({})",
            placeholders(site_ids.len())
        );
        let mut query = sqlx::query_scalar::<_, u64>(&sql);
        for id in site_ids {
            query = query.bind(*id);
        }
        let found = query.fetch_all(&self.pool).await?;

        Ok(site_ids
            .iter()
            .copied()
            .filter(|id| !found.contains(id))
            .collect())
    }

    async fn jobs_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filter: JobFilter,
    ) -> Result<Vec<JobStamp>, StoreError> {
        let mut where_sql = String::from(" AND created_at >= ? AND created_at <= ?");
        let mut args = vec![FilterValue::DateTime(start), FilterValue::DateTime(end)];
        push_filter(&mut where_sql, &mut args, filter);
        self.load_stamps(&where_sql, args).await
    }

    async fn jobs_started_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        filter: JobFilter,
    ) -> Result<Vec<JobStamp>, StoreError> {
        let mut where_sql = String::from(" AND start_date >= ? AND start_date <= ?");
        let mut args = vec![FilterValue::Date(start), FilterValue::Date(end)];
        push_filter(&mut where_sql, &mut args, filter);
        self.load_stamps(&where_sql, args).await
    }

    async fn jobs_punched_in_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<JobStamp>, StoreError> {
        self.load_stamps(
            " AND punch_in_time >= ? AND punch_in_time <= ?",
            vec![FilterValue::DateTime(start), FilterValue::DateTime(end)],
        )
        .await
    }

    async fn status_counts(&self, filter: JobFilter) -> Result<Vec<(JobStatus, u64)>, StoreError> {
        let mut where_sql = String::new();
        let mut args = Vec::new();
        push_filter(&mut where_sql, &mut args, filter);

        let sql = format!(
            "SELECT status, CAST(COUNT(*) AS UNSIGNED) FROM jobs WHERE 1=1{} GROUP BY status",
            where_sql
        );
        let mut query = sqlx::query_as::<_, (String, u64)>(&sql);
        for arg in args {
            if let FilterValue::U64(v) = arg {
                query = query.bind(v);
            }
        }

        query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|(status, count)| {
                JobStatus::from_str(&status)
                    .map(|s| (s, count))
                    .map_err(|_| StoreError::Corrupt(format!("unknown job status '{}'", status)))
            })
            .collect()
    }

    async fn completed_jobs_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        filter: JobFilter,
    ) -> Result<Vec<CompletedJob>, StoreError> {
        let mut where_sql = String::from(
            " AND status = 'complete' AND duration_minutes IS NOT NULL \
             AND punch_out_time >= ? AND punch_out_time <= ?",
        );
        let mut args = vec![FilterValue::DateTime(start), FilterValue::DateTime(end)];
        push_filter(&mut where_sql, &mut args, filter);

        let sql = format!(
            "SELECT id, assigned_to, client_id, punch_out_time, duration_minutes FROM jobs WHERE 1=1{}",
            where_sql
        );
        let mut query = sqlx::query_as::<_, (u64, u64, u64, DateTime<Utc>, i64)>(&sql);
        for arg in args {
            query = match arg {
                FilterValue::U64(v) => query.bind(v),
                FilterValue::DateTime(v) => query.bind(v),
                FilterValue::Date(v) => query.bind(v),
            };
        }

        let rows = query.fetch_all(&self.pool).await?;
        let ids: Vec<u64> = rows.iter().map(|r| r.0).collect();
        let mut sites = self.site_ids_for(&ids).await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, assigned_to, client_id, punch_out_time, duration_minutes)| CompletedJob {
                    id,
                    assigned_to,
                    client_id,
                    site_ids: sites.remove(&id).unwrap_or_default(),
                    punch_out_time,
                    duration_minutes,
                },
            )
            .collect())
    }

    async fn active_punched_in_jobs(&self) -> Result<Vec<Job>, StoreError> {
        self.load_jobs(
            " AND punch_in_time IS NOT NULL AND punch_out_time IS NULL ORDER BY punch_in_time DESC",
            Vec::new(),
        )
        .await
    }

    async fn sites_created_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        client_id: Option<u64>,
    ) -> Result<Vec<Site>, StoreError> {
        let mut sql = String::from(
            "SELECT id, site_name, client_id, created_at FROM sites WHERE created_at >= ? AND created_at <= ?",
        );
        if client_id.is_some() {
            sql.push_str(" AND client_id = ?");
        }

        let mut query = sqlx::query_as::<_, Site>(&sql).bind(start).bind(end);
        if let Some(client_id) = client_id {
            query = query.bind(client_id);
        }
        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn site_count(&self, client_id: Option<u64>) -> Result<u64, StoreError> {
        let count = match client_id {
            Some(client_id) => {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sites WHERE client_id = ?")
                    .bind(client_id)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM sites")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count.max(0) as u64)
    }

    async fn site_refs(&self, site_ids: &[u64]) -> Result<Vec<SiteRef>, StoreError> {
        if site_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT id, site_name FROM sites WHERE id IN ({}) ORDER BY id",
            placeholders(site_ids.len())
        );
        let mut query = sqlx::query_as::<_, (u64, String)>(&sql);
        for id in site_ids {
            query = query.bind(*id);
        }

        Ok(query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|(id, site_name)| SiteRef { id, site_name })
            .collect())
    }

    async fn member_names(&self, member_ids: &[u64]) -> Result<HashMap<u64, String>, StoreError> {
        if member_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let sql = format!(
            "SELECT id, first_name, last_name, total_working_hours, completed_jobs_count \
             FROM members WHERE id IN ({})",
            placeholders(member_ids.len())
        );
        let mut query = sqlx::query_as::<_, Member>(&sql);
        for id in member_ids {
            query = query.bind(*id);
        }

        Ok(query
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|m| (m.id, m.display_name()))
            .collect())
    }

    fn stream_members(&self) -> BoxStream<'_, Result<Member, StoreError>> {
        sqlx::query_as::<_, Member>(
            "SELECT id, first_name, last_name, total_working_hours, completed_jobs_count FROM members",
        )
        .fetch(&self.pool)
        .map(|row| row.map_err(StoreError::from))
        .boxed()
    }
}
