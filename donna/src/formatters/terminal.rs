use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::calendar::{CalendarEvent, Interval};
use crate::chat::{Role, Transcript};

/// Human-readable endpoint, e.g. `March 16, 2024 10:00:00 AM`
pub const PERIOD_FORMAT: &str = "%B %d, %Y %I:%M:%S %p";

/// Plain terminal output for calendar and chat results
pub struct TerminalFormatter {
    timezone: Tz,
}

impl TerminalFormatter {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    pub fn format_instant(&self, instant: DateTime<Utc>) -> String {
        instant.with_timezone(&self.timezone).format(PERIOD_FORMAT).to_string()
    }

    pub fn format_period(&self, period: &Interval) -> String {
        format!("{} to {}", self.format_instant(period.start), self.format_instant(period.end))
    }

    pub fn format_free_periods(&self, free: &[Interval]) -> String {
        if free.is_empty() {
            return "Looks like the day is fully booked!".to_string();
        }

        let mut output = String::from("Free times:");
        for period in free {
            output.push('\n');
            output.push_str(&self.format_period(period));
        }
        output
    }

    /// One `start summary` line per event
    pub fn format_events(&self, events: &[CalendarEvent]) -> String {
        if events.is_empty() {
            return "No upcoming events found.".to_string();
        }

        events
            .iter()
            .map(|event| {
                format!(
                    "{} {}",
                    event.start.display_value().unwrap_or("(no start)"),
                    event.summary.as_deref().unwrap_or("(no title)")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Multi-line detail view of a single event
    pub fn format_event(&self, event: &CalendarEvent) -> String {
        let mut lines = vec![format!("📅 {}", event.summary.as_deref().unwrap_or("(no title)"))];
        lines.push(format!("   Start: {}", event.start.display_value().unwrap_or("-")));
        lines.push(format!("   End:   {}", event.end.display_value().unwrap_or("-")));
        if let Some(location) = &event.location {
            lines.push(format!("   Where: {}", location));
        }
        if let Some(description) = &event.description {
            lines.push(format!("   Notes: {}", description));
        }
        if let Some(link) = &event.html_link {
            lines.push(format!("   Link:  {}", link));
        }
        lines.join("\n")
    }
}

/// Replay a chat history, one `[speaker] text` line per message
pub fn format_transcript(transcript: &Transcript) -> String {
    if transcript.is_empty() {
        return "(no messages yet)".to_string();
    }

    transcript
        .messages()
        .iter()
        .map(|message| {
            let speaker = match message.role {
                Role::User => "you",
                Role::Assistant => "assistant",
            };
            format!("[{}] {}", speaker, message.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::EventTime;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 16, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_free_period_lines() {
        let formatter = TerminalFormatter::new(chrono_tz::UTC);
        let free = vec![Interval::new(at(0), at(10)), Interval::new(at(14), at(23))];

        assert_eq!(
            formatter.format_free_periods(&free),
            "Free times:\n\
             March 16, 2024 12:00:00 AM to March 16, 2024 10:00:00 AM\n\
             March 16, 2024 02:00:00 PM to March 16, 2024 11:00:00 PM"
        );
        assert_eq!(formatter.format_free_periods(&[]), "Looks like the day is fully booked!");
    }

    #[test]
    fn test_periods_shown_in_configured_timezone() {
        let formatter = TerminalFormatter::new(chrono_tz::Europe::Bucharest);
        assert_eq!(formatter.format_instant(at(8)), "March 16, 2024 10:00:00 AM");
    }

    #[test]
    fn test_event_lines() {
        let formatter = TerminalFormatter::new(chrono_tz::UTC);
        let events = vec![
            CalendarEvent {
                summary: Some("Standup".to_string()),
                start: EventTime::timed("2024-03-16T09:00:00Z", None),
                ..Default::default()
            },
            CalendarEvent {
                summary: Some("Holiday".to_string()),
                start: EventTime {
                    date: Some("2024-03-16".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
        ];

        assert_eq!(formatter.format_events(&events), "2024-03-16T09:00:00Z Standup\n2024-03-16 Holiday");
        assert_eq!(formatter.format_events(&[]), "No upcoming events found.");
    }

    #[test]
    fn test_event_details_skip_missing_fields() {
        let formatter = TerminalFormatter::new(chrono_tz::UTC);
        let event = CalendarEvent {
            summary: Some("Dentist".to_string()),
            location: Some("Main St 4".to_string()),
            start: EventTime::timed("2024-03-16T09:00:00Z", None),
            end: EventTime::timed("2024-03-16T10:00:00Z", None),
            ..Default::default()
        };

        let details = formatter.format_event(&event);
        assert!(details.starts_with("📅 Dentist"));
        assert!(details.contains("Where: Main St 4"));
        assert!(!details.contains("Notes:"));
        assert!(!details.contains("Link:"));
    }

    #[test]
    fn test_transcript_replay() {
        let mut transcript = Transcript::new();
        assert_eq!(format_transcript(&transcript), "(no messages yet)");

        transcript.push(crate::chat::Message::user("hi"));
        transcript.push(crate::chat::Message::assistant("hello!"));
        assert_eq!(format_transcript(&transcript), "[you] hi\n[assistant] hello!");
    }
}
