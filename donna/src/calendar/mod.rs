use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error_recovery::ErrorRecovery;
use crate::errors::{DonnaError, DonnaResult};

pub mod auth;
pub mod day;
pub mod freebusy;
pub mod google;

pub use freebusy::{free_periods, Interval};
pub use google::GoogleCalendarService;

/// Calendar operations used by the CLI
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Events overlapping `range`, expanded and ordered by start time
    async fn list_events(&self, calendar_id: &str, range: &Interval, max_results: u32) -> DonnaResult<Vec<CalendarEvent>>;

    async fn get_event(&self, calendar_id: &str, event_id: &str) -> DonnaResult<CalendarEvent>;

    /// Create an event and return it as stored by the provider
    async fn insert_event(&self, calendar_id: &str, event: &CalendarEvent) -> DonnaResult<CalendarEvent>;

    /// Busy intervals per calendar id within `range`
    async fn query_free_busy(&self, calendar_ids: &[String], range: &Interval) -> DonnaResult<HashMap<String, Vec<Interval>>>;
}

/// Subset of the Google Calendar event resource
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub start: EventTime,
    #[serde(default)]
    pub end: EventTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Either a timed instant (`dateTime`) or an all-day `date`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventTime {
    pub fn timed(date_time: impl Into<String>, time_zone: Option<String>) -> Self {
        Self {
            date_time: Some(date_time.into()),
            date: None,
            time_zone,
        }
    }

    /// `dateTime`, falling back to the all-day `date`
    pub fn display_value(&self) -> Option<&str> {
        self.date_time.as_deref().or(self.date.as_deref())
    }

    fn validate(&self, field: &str) -> DonnaResult<Option<NaiveDateTime>> {
        if let Some(tz) = &self.time_zone {
            tz.parse::<chrono_tz::Tz>()
                .map_err(|_| DonnaError::validation(format!("{}.timeZone", field), format!("unknown time zone '{}'", tz)))?;
        }

        match (&self.date_time, &self.date) {
            (Some(date_time), _) => parse_event_instant(date_time).map(Some).ok_or_else(|| {
                DonnaError::validation(format!("{}.dateTime", field), format!("'{}' is not an ISO-8601 date-time", date_time))
            }),
            (None, Some(date)) => day::parse_day(date)
                .map(|d| d.and_hms_opt(0, 0, 0))
                .map_err(|_| DonnaError::validation(format!("{}.date", field), format!("'{}' is not a YYYY-MM-DD date", date))),
            (None, None) => Err(DonnaError::validation(field, "needs either dateTime or date")),
        }
    }
}

impl CalendarEvent {
    /// Check an event before sending it to the provider
    pub fn validate(&self) -> DonnaResult<()> {
        if self.summary.as_deref().map_or(true, |s| s.trim().is_empty()) {
            return Err(DonnaError::validation("summary", "must not be empty"));
        }

        let start = self.start.validate("start")?;
        let end = self.end.validate("end")?;
        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(DonnaError::validation("end", "must not be before start"));
            }
        }

        debug!("Event '{}' passed validation", self.summary.as_deref().unwrap_or_default());
        Ok(())
    }
}

/// RFC 3339 (compared in UTC) or a floating `YYYY-MM-DDTHH:MM:SS` local time
fn parse_event_instant(value: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.naive_utc())
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S").ok())
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M").ok())
}

/// Insert `event`, retrying transient failures without creating duplicates.
///
/// The event gets a client-side id before the first attempt, so every retry
/// posts the same id. A 409 on a retry means an earlier attempt was stored
/// even though its response was lost; the stored event is fetched instead.
pub async fn insert_event_with_retry(
    provider: &dyn CalendarProvider,
    calendar_id: &str,
    mut event: CalendarEvent,
    max_attempts: usize,
    base_delay: Duration,
) -> DonnaResult<CalendarEvent> {
    // Lowercase hex is valid base32hex, the alphabet Google accepts for ids
    let event_id = event
        .id
        .get_or_insert_with(|| Uuid::new_v4().simple().to_string())
        .clone();
    let attempts = AtomicUsize::new(0);

    ErrorRecovery::retry_with_backoff(
        || async {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            match provider.insert_event(calendar_id, &event).await {
                Err(e) if attempt > 1 && e.is_conflict() => {
                    info!("Event {} was stored by an earlier attempt, fetching it", event_id);
                    provider.get_event(calendar_id, &event_id).await
                }
                other => other,
            }
        },
        max_attempts,
        base_delay,
        "insert event",
    )
    .await
}

/// Free periods of `date` for one calendar.
///
/// Busy periods are sorted by start before computing the complement.
pub async fn availability(
    provider: &dyn CalendarProvider,
    calendar_id: &str,
    date: NaiveDate,
    tz: chrono_tz::Tz,
) -> DonnaResult<(Interval, Vec<Interval>)> {
    let span = day::day_span(date, tz)?;

    let mut busy_by_calendar = provider.query_free_busy(&[calendar_id.to_string()], &span).await?;
    let mut busy = busy_by_calendar
        .remove(calendar_id)
        .ok_or_else(|| DonnaError::not_found(format!("free/busy for calendar {}", calendar_id)))?;
    busy.sort_by_key(|b| b.start);

    debug!("{} busy periods on {} for {}", busy.len(), date, calendar_id);
    Ok((span, free_periods(&span, &busy)))
}
