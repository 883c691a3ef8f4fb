use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

use super::auth::TokenProvider;
use super::{CalendarEvent, CalendarProvider, Interval};
use crate::errors::{DonnaError, DonnaResult};
use crate::http_utils::{check_response, parse_json_response};

const SERVICE: &str = "Google Calendar";

#[derive(Debug, Deserialize)]
struct GoogleEventsResponse {
    items: Option<Vec<CalendarEvent>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FreeBusyRequest<'a> {
    time_min: String,
    time_max: String,
    items: Vec<FreeBusyItem<'a>>,
}

#[derive(Debug, Serialize)]
struct FreeBusyItem<'a> {
    id: &'a str,
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: HashMap<String, FreeBusyCalendar>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<Interval>,
    #[serde(default)]
    errors: Vec<FreeBusyError>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyError {
    reason: String,
}

/// Google Calendar v3 REST client
pub struct GoogleCalendarService {
    base_url: String,
    tokens: Box<dyn TokenProvider>,
    http_client: reqwest::Client,
}

impl GoogleCalendarService {
    pub fn new(base_url: impl Into<String>, tokens: Box<dyn TokenProvider>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
            http_client: reqwest::Client::new(),
        }
    }

    fn calendar_url(&self, calendar_id: &str, suffix: &str) -> String {
        format!("{}/calendars/{}{}", self.base_url, urlencoding::encode(calendar_id), suffix)
    }
}

fn rfc3339(instant: chrono::DateTime<chrono::Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[async_trait]
impl CalendarProvider for GoogleCalendarService {
    async fn list_events(&self, calendar_id: &str, range: &Interval, max_results: u32) -> DonnaResult<Vec<CalendarEvent>> {
        let access_token = self.tokens.access_token().await?;
        debug!("Fetching events from calendar: {}", calendar_id);

        let response = self
            .http_client
            .get(self.calendar_url(calendar_id, "/events"))
            .bearer_auth(access_token)
            .query(&[
                ("timeMin", rfc3339(range.start)),
                ("timeMax", rfc3339(range.end)),
                ("maxResults", max_results.to_string()),
                ("singleEvents", "true".to_string()),
                ("orderBy", "startTime".to_string()),
            ])
            .send()
            .await?;

        let response = check_response(response, SERVICE).await?;
        let events: GoogleEventsResponse = parse_json_response(response, "Google Calendar events response").await?;
        let events = events.items.unwrap_or_default();

        info!("Fetched {} events from calendar {}", events.len(), calendar_id);
        Ok(events)
    }

    async fn get_event(&self, calendar_id: &str, event_id: &str) -> DonnaResult<CalendarEvent> {
        let access_token = self.tokens.access_token().await?;
        let url = self.calendar_url(calendar_id, &format!("/events/{}", urlencoding::encode(event_id)));

        let response = self.http_client.get(url).bearer_auth(access_token).send().await?;

        let response = check_response(response, SERVICE).await?;
        parse_json_response(response, "Google Calendar event").await
    }

    async fn insert_event(&self, calendar_id: &str, event: &CalendarEvent) -> DonnaResult<CalendarEvent> {
        let access_token = self.tokens.access_token().await?;

        let response = self
            .http_client
            .post(self.calendar_url(calendar_id, "/events"))
            .bearer_auth(access_token)
            .json(event)
            .send()
            .await?;

        let response = check_response(response, SERVICE).await?;
        let created: CalendarEvent = parse_json_response(response, "Google Calendar created event").await?;
        info!("Created event {:?} in calendar {}", created.id, calendar_id);
        Ok(created)
    }

    async fn query_free_busy(&self, calendar_ids: &[String], range: &Interval) -> DonnaResult<HashMap<String, Vec<Interval>>> {
        let access_token = self.tokens.access_token().await?;
        let body = FreeBusyRequest {
            time_min: rfc3339(range.start),
            time_max: rfc3339(range.end),
            items: calendar_ids.iter().map(|id| FreeBusyItem { id: id.as_str() }).collect(),
        };

        let response = self
            .http_client
            .post(format!("{}/freeBusy", self.base_url))
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await?;

        let response = check_response(response, SERVICE).await?;
        let result: FreeBusyResponse = parse_json_response(response, "Google Calendar free/busy response").await?;

        let mut busy_by_calendar = HashMap::new();
        for (calendar_id, calendar) in result.calendars {
            if let Some(error) = calendar.errors.first() {
                return Err(match error.reason.as_str() {
                    "notFound" => DonnaError::not_found(format!("calendar {}", calendar_id)),
                    "internalError" | "backendError" => DonnaError::TransientNetwork {
                        message: format!("free/busy for {} failed: {}", calendar_id, error.reason),
                    },
                    other => DonnaError::Api {
                        service: SERVICE.to_string(),
                        status: 200,
                        message: format!("free/busy for {} failed: {}", calendar_id, other),
                    },
                });
            }
            debug!("Calendar {} has {} busy periods", calendar_id, calendar.busy.len());
            busy_by_calendar.insert(calendar_id, calendar.busy);
        }

        Ok(busy_by_calendar)
    }
}
