use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use utoipa::ToSchema;

/// Requested bucket width for a report.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
    #[default]
    Month,
    Year,
}

/// How a calendar date is turned into a bucket label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `2026-03-10`
    Date,
    /// `2026-W11`
    IsoWeek,
    /// `2026-03`
    Month,
    /// `Mon` .. `Sun`
    Weekday,
    /// `1` .. `31`
    DayOfMonth,
}

impl Layout {
    pub fn key(&self, date: NaiveDate) -> String {
        match self {
            Layout::Date => date.format("%Y-%m-%d").to_string(),
            Layout::IsoWeek => {
                let week = date.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            Layout::Month => date.format("%Y-%m").to_string(),
            Layout::Weekday => date.format("%a").to_string(),
            Layout::DayOfMonth => date.day().to_string(),
        }
    }
}

/// Label for `date` at the given granularity, as used by the job/site graphs.
pub fn bucket_key(date: NaiveDate, granularity: Granularity) -> String {
    graph_layout(granularity).key(date)
}

pub fn graph_layout(granularity: Granularity) -> Layout {
    match granularity {
        Granularity::Day => Layout::Date,
        Granularity::Week | Granularity::Month => Layout::IsoWeek,
        Granularity::Year => Layout::Month,
    }
}

/// Calendar date of `ts` in the reporting timezone.
pub fn local_date(ts: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    ts.with_timezone(&offset).date_naive()
}

/// UTC instant of local midnight at the start of `date`.
pub fn local_midnight(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN) - Duration::seconds(offset.local_minus_utc() as i64);
    Utc.from_utc_datetime(&naive)
}

fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

fn last_day_of_month(date: NaiveDate) -> NaiveDate {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .map(|first| first - Duration::days(1))
        .unwrap_or(date)
}

fn first_of_year(date: NaiveDate) -> NaiveDate {
    date.with_ordinal(1).unwrap_or(date)
}

fn last_of_year(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), 12, 31).unwrap_or(date)
}

/// An inclusive range of local calendar dates and how to label them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub layout: Layout,
}

impl Window {
    pub fn new(start: NaiveDate, end: NaiveDate, layout: Layout) -> Self {
        Self { start, end, layout }
    }

    /// Rolling graph window ending today:
    /// day = 7 days, week = 8 ISO weeks, month = 28 days by ISO week,
    /// year = the current calendar year by month.
    pub fn graph(granularity: Granularity, today: NaiveDate) -> Self {
        let layout = graph_layout(granularity);
        match granularity {
            Granularity::Day => Self::new(today - Duration::days(6), today, layout),
            Granularity::Week => Self::new(monday_of(today) - Duration::weeks(7), today, layout),
            Granularity::Month => Self::new(today - Duration::days(27), today, layout),
            Granularity::Year => Self::new(first_of_year(today), last_of_year(today), layout),
        }
    }

    /// Calendar period containing today, laid out for the dashboard:
    /// day = today, week = Mon..Sun slots, month = one slot per day,
    /// year = one slot per month.
    pub fn period(granularity: Granularity, today: NaiveDate) -> Self {
        match granularity {
            Granularity::Day => Self::new(today, today, Layout::Date),
            Granularity::Week => {
                let monday = monday_of(today);
                Self::new(monday, monday + Duration::days(6), Layout::Weekday)
            }
            Granularity::Month => Self::new(
                today.with_day(1).unwrap_or(today),
                last_day_of_month(today),
                Layout::DayOfMonth,
            ),
            Granularity::Year => {
                Self::new(first_of_year(today), last_of_year(today), Layout::Month)
            }
        }
    }

    /// The last `days` days ending today, one bucket per date.
    pub fn trailing_days(days: u32, today: NaiveDate) -> Self {
        let days = days.max(1) as i64;
        Self::new(today - Duration::days(days - 1), today, Layout::Date)
    }

    /// Same-length window immediately before this one.
    pub fn previous(&self) -> Self {
        let len = (self.end - self.start).num_days() + 1;
        Self::new(
            self.start - Duration::days(len),
            self.start - Duration::days(1),
            self.layout,
        )
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    /// Ordered bucket labels covering the window, one per distinct label.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = Vec::new();
        let mut day = self.start;
        while day <= self.end {
            let key = self.layout.key(day);
            if keys.last() != Some(&key) {
                keys.push(key);
            }
            day += Duration::days(1);
        }
        keys
    }

    /// UTC bounds `[start, end]` of the window in the reporting timezone.
    pub fn utc_bounds(&self, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
        let start = local_midnight(self.start, offset);
        let end = local_midnight(self.end + Duration::days(1), offset) - Duration::milliseconds(1);
        (start, end)
    }
}

/// One computed aggregation bucket. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub bucket_key: String,
    pub count: u64,
    pub hours: f64,
}

/// Counts and sums `(date, hours)` samples into the window's buckets.
/// Every bucket is present; empty ones report zero. Samples outside the
/// window are ignored.
pub fn fill<I>(window: &Window, samples: I) -> Vec<Bucket>
where
    I: IntoIterator<Item = (NaiveDate, f64)>,
{
    fill_with(window, samples, |date| window.layout.key(date))
}

/// Zero-filled counts for a rolling graph window, each date labelled by
/// [`bucket_key`].
pub fn fill_graph<I>(granularity: Granularity, window: &Window, dates: I) -> Vec<Bucket>
where
    I: IntoIterator<Item = NaiveDate>,
{
    fill_with(
        window,
        dates.into_iter().map(|date| (date, 0.0)),
        |date| bucket_key(date, granularity),
    )
}

fn fill_with<I, K>(window: &Window, samples: I, key: K) -> Vec<Bucket>
where
    I: IntoIterator<Item = (NaiveDate, f64)>,
    K: Fn(NaiveDate) -> String,
{
    let mut buckets: Vec<Bucket> = window
        .keys()
        .into_iter()
        .map(|bucket_key| Bucket {
            bucket_key,
            count: 0,
            hours: 0.0,
        })
        .collect();
    let index: HashMap<String, usize> = buckets
        .iter()
        .enumerate()
        .map(|(i, b)| (b.bucket_key.clone(), i))
        .collect();

    for (date, hours) in samples {
        if !window.contains(date) {
            continue;
        }
        if let Some(&i) = index.get(&key(date)) {
            buckets[i].count += 1;
            buckets[i].hours += hours;
        }
    }
    buckets
}

/// Period-over-period growth, rounded to one decimal. Zero when there is no
/// previous activity to compare against.
pub fn growth_percent(this_period: u64, previous_period: u64) -> f64 {
    if previous_period == 0 {
        return 0.0;
    }
    let growth = (this_period as f64 - previous_period as f64) / previous_period as f64 * 100.0;
    (growth * 10.0).round() / 10.0
}
