//! Minimal iCalendar event extraction: one `FeedEvent` per `VEVENT` with
//! a parseable date range and UID.

use std::io::BufReader;

use anyhow::{Context, Result};
use chrono::NaiveDate;

/// One raw calendar event; classification happens in the feed mapper.
#[derive(Debug, Clone)]
pub struct FeedEvent {
    pub uid: String,
    pub start: NaiveDate,
    /// Exclusive end date, which for stay calendars is the checkout day.
    pub end: NaiveDate,
    pub summary: Option<String>,
    pub cancelled: bool,
}

/// Parse the text of an ICS feed. Events missing UID or dates are skipped
/// and counted by the caller via the size difference.
pub fn parse_feed_events(content: &str) -> Result<Vec<FeedEvent>> {
    let reader = ical::IcalParser::new(BufReader::new(content.as_bytes()));
    let mut events = Vec::new();

    for calendar in reader {
        let calendar = calendar.context("malformed calendar")?;
        for event in calendar.events {
            let mut uid = None;
            let mut start = None;
            let mut end = None;
            let mut summary = None;
            let mut status = None;
            for property in &event.properties {
                let value = property.value.as_deref();
                match property.name.as_str() {
                    "UID" => uid = value.map(str::to_string),
                    "DTSTART" => start = value.and_then(parse_ics_date),
                    "DTEND" => end = value.and_then(parse_ics_date),
                    "SUMMARY" => summary = value.map(str::to_string),
                    "STATUS" => status = value.map(str::to_uppercase),
                    _ => {}
                }
            }
            let (Some(uid), Some(start)) = (uid, start) else {
                continue;
            };
            events.push(FeedEvent {
                uid,
                start,
                end: end.unwrap_or(start),
                summary,
                cancelled: status.as_deref() == Some("CANCELLED"),
            });
        }
    }
    Ok(events)
}

/// `YYYYMMDD` or `YYYYMMDDTHHMMSS[Z]`; only the date part matters here.
fn parse_ics_date(raw: &str) -> Option<NaiveDate> {
    let digits: &str = raw.get(..8)?;
    NaiveDate::parse_from_str(digits, "%Y%m%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
BEGIN:VEVENT\r\n\
UID:abc123@example.com\r\n\
DTSTART;VALUE=DATE:20250801\r\n\
DTEND;VALUE=DATE:20250805\r\n\
SUMMARY:Reserved\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:def456@example.com\r\n\
DTSTART:20250910T160000Z\r\n\
DTEND:20250912T160000Z\r\n\
SUMMARY:Blocked - Owner Stay\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:ghi789@example.com\r\n\
DTSTART;VALUE=DATE:20250920\r\n\
DTEND;VALUE=DATE:20250922\r\n\
STATUS:CANCELLED\r\n\
SUMMARY:Reserved\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    #[test]
    fn parses_date_and_datetime_values() {
        let events = parse_feed_events(FEED).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].uid, "abc123@example.com");
        assert_eq!(events[0].start, "2025-08-01".parse().unwrap());
        assert_eq!(events[0].end, "2025-08-05".parse().unwrap());
        assert_eq!(events[1].start, "2025-09-10".parse().unwrap());
        assert!(events[2].cancelled);
    }

    #[test]
    fn missing_dtend_falls_back_to_start() {
        let feed = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:x@y\r\nDTSTART;VALUE=DATE:20250801\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let events = parse_feed_events(feed).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start, events[0].end);
    }

    #[test]
    fn event_without_uid_is_skipped() {
        let feed = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nDTSTART;VALUE=DATE:20250801\r\nEND:VEVENT\r\nEND:VCALENDAR\r\n";
        let events = parse_feed_events(feed).unwrap();
        assert!(events.is_empty());
    }
}
