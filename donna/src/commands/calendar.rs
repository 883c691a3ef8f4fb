use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::path::PathBuf;
use tracing::info;

use super::{explain, Command, CommandContext, RETRY_BASE_DELAY};
use crate::calendar::day::{day_span, parse_day};
use crate::calendar::{availability, insert_event_with_retry, CalendarEvent, CalendarProvider, EventTime, Interval};
use crate::errors::DonnaError;

const SERVICE: &str = "google";

/// Command to list upcoming events (next 24 hours, or one given day)
pub struct ListEventsCommand {
    pub date: Option<String>,
}

/// Command to create an event from flags or a JSON file
#[derive(Default)]
pub struct CreateEventCommand {
    pub summary: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub time_zone: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub from_file: Option<PathBuf>,
}

/// Command to show a single event
pub struct GetEventCommand {
    pub event_id: String,
}

/// Command to print the free periods of a day
pub struct AvailabilityCommand {
    pub date: String,
}

#[async_trait]
impl Command for ListEventsCommand {
    async fn execute(&mut self, context: &CommandContext) -> Result<()> {
        let range = match &self.date {
            Some(date) => day_span(parse_day(date)?, context.config.get_timezone()?)?,
            None => {
                let now = Utc::now();
                Interval::new(now, now + Duration::days(1))
            }
        };
        let gc = &context.config.google_calendar;
        info!("Listing events in {} from {} to {}", gc.calendar_id, range.start, range.end);

        let service = context.calendar_service().await?;
        let events = context
            .with_retry("list events", || service.list_events(&gc.calendar_id, &range, gc.max_results))
            .await
            .map_err(|e| explain(e, SERVICE))?;

        println!("{}", context.formatter()?.format_events(&events));
        Ok(())
    }
}

impl CreateEventCommand {
    /// Assemble the event, filling in the configured timezone where none was given
    pub async fn build_event(&self, default_time_zone: &str) -> Result<CalendarEvent> {
        let mut event = match &self.from_file {
            Some(path) => {
                let content = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| DonnaError::file_system("read", path, e))?;
                serde_json::from_str::<CalendarEvent>(&content)
                    .map_err(DonnaError::from)
                    .with_context(|| format!("Invalid event JSON in {}", path.display()))?
            }
            None => {
                let summary = self.summary.clone().ok_or_else(|| DonnaError::validation("summary", "--summary is required"))?;
                let start = self.start.clone().ok_or_else(|| DonnaError::validation("start", "--start is required"))?;
                let end = self.end.clone().ok_or_else(|| DonnaError::validation("end", "--end is required"))?;

                CalendarEvent {
                    summary: Some(summary),
                    location: self.location.clone(),
                    description: self.description.clone(),
                    start: EventTime::timed(start, self.time_zone.clone()),
                    end: EventTime::timed(end, self.time_zone.clone()),
                    ..Default::default()
                }
            }
        };

        for time in [&mut event.start, &mut event.end] {
            if time.date_time.is_some() && time.time_zone.is_none() {
                time.time_zone = Some(default_time_zone.to_string());
            }
        }

        event.validate()?;
        Ok(event)
    }
}

#[async_trait]
impl Command for CreateEventCommand {
    async fn execute(&mut self, context: &CommandContext) -> Result<()> {
        let event = self.build_event(&context.config.general.timezone).await?;
        let calendar_id = &context.config.google_calendar.calendar_id;
        info!("Creating event in {}", calendar_id);

        let service = context.calendar_service().await?;
        let created = insert_event_with_retry(
            &service,
            calendar_id,
            event,
            context.config.google_calendar.max_retries,
            RETRY_BASE_DELAY,
        )
        .await
        .map_err(|e| explain(e, SERVICE))?;

        match (&created.html_link, &created.id) {
            (Some(link), _) => println!("Event created: {}", link),
            (None, Some(id)) => println!("Event created: {}", id),
            (None, None) => println!("Event created"),
        }
        Ok(())
    }
}

#[async_trait]
impl Command for GetEventCommand {
    async fn execute(&mut self, context: &CommandContext) -> Result<()> {
        let calendar_id = &context.config.google_calendar.calendar_id;

        let service = context.calendar_service().await?;
        let event = context
            .with_retry("get event", || service.get_event(calendar_id, &self.event_id))
            .await
            .map_err(|e| explain(e, SERVICE))?;

        println!("{}", context.formatter()?.format_event(&event));
        Ok(())
    }
}

#[async_trait]
impl Command for AvailabilityCommand {
    async fn execute(&mut self, context: &CommandContext) -> Result<()> {
        let date = parse_day(&self.date)?;
        let tz = context.config.get_timezone()?;
        let calendar_id = &context.config.google_calendar.calendar_id;

        let service = context.calendar_service().await?;
        let (_, free) = context
            .with_retry("query free/busy", || availability(&service, calendar_id, date, tz))
            .await
            .map_err(|e| explain(e, SERVICE))?;

        info!("{} free periods on {}", free.len(), date);
        println!("{}", context.formatter()?.format_free_periods(&free));
        Ok(())
    }
}
