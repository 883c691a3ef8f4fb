//! Free period computation: the complement of a day's busy intervals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Half-open time range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn duration(&self) -> chrono::Duration {
        self.end - self.start
    }

    /// Intersection with `span`, `None` when they do not overlap
    pub fn clip_to(&self, span: &Interval) -> Option<Interval> {
        let clipped = Interval {
            start: self.start.max(span.start),
            end: self.end.min(span.end),
        };
        (!clipped.is_empty()).then_some(clipped)
    }
}

/// Free intervals of `day` not covered by any of `busy`.
///
/// `busy` must be sorted by start. Overlapping entries are tolerated; entries
/// reaching outside `day` are clipped to it first.
pub fn free_periods(day: &Interval, busy: &[Interval]) -> Vec<Interval> {
    let mut free = Vec::new();
    let mut cursor = day.start;

    for period in busy.iter().filter_map(|b| b.clip_to(day)) {
        if cursor < period.start {
            free.push(Interval::new(cursor, period.start));
        }
        cursor = cursor.max(period.end);
    }

    if cursor < day.end {
        free.push(Interval::new(cursor, day.end));
    }

    free
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn day() -> Interval {
        let start = Utc.with_ymd_and_hms(2024, 3, 16, 0, 0, 0).unwrap();
        Interval::new(start, start + Duration::hours(24))
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 16, hour, minute, 0).unwrap()
    }

    fn span(start: DateTime<Utc>, end: DateTime<Utc>) -> Interval {
        Interval::new(start, end)
    }

    #[test]
    fn test_empty_busy_set_is_one_free_day() {
        assert_eq!(free_periods(&day(), &[]), vec![day()]);
    }

    #[test]
    fn test_fully_booked_day() {
        assert!(free_periods(&day(), &[day()]).is_empty());
    }

    #[test]
    fn test_two_meetings() {
        let busy = [span(at(10, 0), at(11, 0)), span(at(13, 0), at(14, 0))];

        let free = free_periods(&day(), &busy);

        assert_eq!(
            free,
            vec![
                span(day().start, at(10, 0)),
                span(at(11, 0), at(13, 0)),
                span(at(14, 0), day().end),
            ]
        );
    }

    #[test]
    fn test_free_and_busy_tile_the_day() {
        let busy = [
            span(at(0, 0), at(0, 30)),
            span(at(8, 15), at(9, 0)),
            span(at(9, 0), at(9, 45)),
            span(at(17, 30), at(23, 59)),
        ];

        let mut pieces = free_periods(&day(), &busy);
        pieces.extend_from_slice(&busy);
        pieces.sort_by_key(|p| p.start);

        assert_eq!(pieces.first().unwrap().start, day().start);
        assert_eq!(pieces.last().unwrap().end, day().end);
        for pair in pieces.windows(2) {
            assert_eq!(pair[0].end, pair[1].start, "gap or overlap at {}", pair[0].end);
        }
        let total = pieces.iter().fold(Duration::zero(), |acc, p| acc + p.duration());
        assert_eq!(total, Duration::hours(24));
    }

    #[test]
    fn test_busy_across_midnight_is_clipped() {
        let late = span(at(22, 0), day().end + Duration::hours(2));
        let early = span(day().start - Duration::hours(1), at(6, 0));

        let free = free_periods(&day(), &[early, late]);

        assert_eq!(free, vec![span(at(6, 0), at(22, 0))]);
    }

    #[test]
    fn test_busy_outside_day_is_ignored() {
        let yesterday = span(day().start - Duration::hours(5), day().start - Duration::hours(4));
        let tomorrow = span(day().end, day().end + Duration::hours(1));

        assert_eq!(free_periods(&day(), &[yesterday, tomorrow]), vec![day()]);
    }

    #[test]
    fn test_overlapping_sorted_busy() {
        let busy = [span(at(9, 0), at(12, 0)), span(at(10, 0), at(11, 0)), span(at(11, 30), at(13, 0))];

        let free = free_periods(&day(), &busy);

        assert_eq!(free, vec![span(day().start, at(9, 0)), span(at(13, 0), day().end)]);
    }
}
