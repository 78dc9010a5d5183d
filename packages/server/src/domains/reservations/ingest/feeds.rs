//! Calendar-feed ingest: bounded-concurrency fetch of many per-property
//! feeds, each isolated in failure and timeout.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use recordstore::Record;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::common::types::{BlockType, EntryType, EventSource, ServiceType};
use crate::config::Config;
use crate::domains::reservations::ingest::ics::{FeedEvent, parse_feed_events};
use crate::domains::reservations::models::event::{EventAction, ReservationEvent};

pub const FEEDS_TABLE: &str = "Feeds";

/// Field names in the Feeds table.
pub mod fields {
    pub const FEED_URL: &str = "Feed URL";
    pub const PROPERTY: &str = "Property";
    pub const ACTIVE: &str = "Active";
}

/// One configured feed.
#[derive(Debug, Clone)]
pub struct Feed {
    pub url: String,
    pub property_id: String,
}

/// Active feeds with a property link.
pub fn load_feeds(records: &[Record]) -> Vec<Feed> {
    records
        .iter()
        .filter(|r| r.bool_field(fields::ACTIVE))
        .filter_map(|r| {
            Some(Feed {
                url: r.str_field(fields::FEED_URL)?.to_string(),
                property_id: r.linked_id(fields::PROPERTY)?.to_string(),
            })
        })
        .collect()
}

#[derive(Debug, Default, Clone)]
pub struct FeedIngestStats {
    pub feeds_attempted: usize,
    pub feeds_succeeded: usize,
    pub feeds_failed: usize,
    pub events_seen: usize,
    pub events_dropped: usize,
    pub events_produced: usize,
}

/// Result of fetching one feed: the normalized events, or the error that
/// took the feed out of this run (never the whole batch).
pub struct FeedFetch {
    pub feed: Feed,
    pub outcome: Result<Vec<ReservationEvent>>,
}

/// Fetch every feed under the concurrency bound. Each fetch carries its
/// own timeout; a stalled feed releases its slot without affecting others.
pub async fn fetch_all(
    http: &reqwest::Client,
    feeds: Vec<Feed>,
    config: &Config,
    now: DateTime<Utc>,
) -> (Vec<FeedFetch>, FeedIngestStats) {
    let mut stats = FeedIngestStats {
        feeds_attempted: feeds.len(),
        ..Default::default()
    };
    let semaphore = Arc::new(Semaphore::new(config.feed_concurrency.max(1)));
    let timeout = Duration::from_secs(config.feed_timeout_seconds);
    let today = now.with_timezone(&config.business_timezone).date_naive();
    let (window_start, window_end) = config.event_window(today);

    let tasks = feeds.into_iter().map(|feed| {
        let semaphore = Arc::clone(&semaphore);
        let http = http.clone();
        async move {
            let _permit = semaphore.acquire().await;
            let outcome = fetch_one(&http, &feed, timeout).await;
            FeedFetch { feed, outcome }
        }
    });

    let mut fetches: Vec<FeedFetch> = join_all(tasks).await;

    for fetch in &mut fetches {
        match &mut fetch.outcome {
            Ok(raw_events) => {
                stats.feeds_succeeded += 1;
                let before = raw_events.len();
                raw_events.retain(|e| {
                    e.check_in >= window_start && e.check_in <= window_end
                });
                stats.events_seen += before;
                stats.events_dropped += before - raw_events.len();
                stats.events_produced += raw_events.len();
            }
            Err(e) => {
                stats.feeds_failed += 1;
                warn!(feed_url = %fetch.feed.url, error = %e, "feed fetch failed");
            }
        }
    }

    info!(
        attempted = stats.feeds_attempted,
        succeeded = stats.feeds_succeeded,
        failed = stats.feeds_failed,
        events = stats.events_produced,
        dropped = stats.events_dropped,
        "feed fetch complete"
    );
    (fetches, stats)
}

async fn fetch_one(
    http: &reqwest::Client,
    feed: &Feed,
    timeout: Duration,
) -> Result<Vec<ReservationEvent>> {
    let body = tokio::time::timeout(timeout, async {
        let resp = http
            .get(&feed.url)
            .send()
            .await
            .context("feed request failed")?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("feed returned {status}");
        }
        resp.text().await.context("feed body unreadable")
    })
    .await
    .map_err(|_| anyhow::anyhow!("feed fetch timed out"))??;

    let raw = parse_feed_events(&body)?;
    Ok(raw
        .into_iter()
        .filter(|e| !e.cancelled)
        .map(|e| normalize(e, feed))
        .collect())
}

/// Map a raw calendar event onto the shared event schema, inferring
/// blocks from summary keywords.
fn normalize(raw: FeedEvent, feed: &Feed) -> ReservationEvent {
    let summary = raw.summary.as_deref().unwrap_or("").to_lowercase();
    let block_type = if summary.contains("owner") {
        Some(BlockType::OwnerStay)
    } else if summary.contains("maintenance") {
        Some(BlockType::Maintenance)
    } else if summary.contains("block")
        || summary.contains("unavailable")
        || summary.contains("not available")
    {
        Some(BlockType::Other)
    } else {
        None
    };
    let (entry_type, service_type) = match block_type {
        Some(BlockType::Maintenance) => (EntryType::Block, ServiceType::NeedsReview),
        Some(_) => (EntryType::Block, ServiceType::Turnover),
        None => (EntryType::Reservation, ServiceType::Turnover),
    };

    ReservationEvent {
        source: EventSource::CalendarFeed,
        action: EventAction::Upsert,
        uid: raw.uid,
        feed_url: feed.url.clone(),
        property_id: feed.property_id.clone(),
        check_in: raw.start,
        check_out: raw.end,
        entry_type,
        block_type,
        service_type,
        supplier_info: None,
        same_day_override: None,
    }
}

/// Stay boundaries for tests and callers that build events by hand.
pub fn window_contains(config: &Config, today: NaiveDate, date: NaiveDate) -> bool {
    let (start, end) = config.event_window(today);
    date >= start && date <= end
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn load_feeds_filters_inactive_and_unlinked() {
        let records: Vec<Record> = vec![
            serde_json::from_value(json!({
                "id": "recF1",
                "fields": {"Feed URL": "https://a.ics", "Property": ["recP1"], "Active": true}
            }))
            .unwrap(),
            serde_json::from_value(json!({
                "id": "recF2",
                "fields": {"Feed URL": "https://b.ics", "Property": ["recP2"], "Active": false}
            }))
            .unwrap(),
            serde_json::from_value(json!({
                "id": "recF3",
                "fields": {"Feed URL": "https://c.ics", "Active": true}
            }))
            .unwrap(),
        ];
        let feeds = load_feeds(&records);
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].url, "https://a.ics");
        assert_eq!(feeds[0].property_id, "recP1");
    }

    fn feed() -> Feed {
        Feed {
            url: "https://feeds.example/p1.ics".to_string(),
            property_id: "recP1".to_string(),
        }
    }

    fn raw(summary: &str) -> FeedEvent {
        FeedEvent {
            uid: "u@x".to_string(),
            start: "2025-08-01".parse().unwrap(),
            end: "2025-08-05".parse().unwrap(),
            summary: Some(summary.to_string()),
            cancelled: false,
        }
    }

    #[test]
    fn reservation_by_default() {
        let event = normalize(raw("Reserved - John Smith"), &feed());
        assert_eq!(event.entry_type, EntryType::Reservation);
        assert_eq!(event.block_type, None);
    }

    #[test]
    fn owner_block_detected() {
        let event = normalize(raw("Blocked: Owner stay"), &feed());
        assert_eq!(event.entry_type, EntryType::Block);
        assert_eq!(event.block_type, Some(BlockType::OwnerStay));
    }

    #[test]
    fn maintenance_block_needs_review() {
        let event = normalize(raw("Maintenance - pool repair"), &feed());
        assert_eq!(event.entry_type, EntryType::Block);
        assert_eq!(event.service_type, ServiceType::NeedsReview);
    }
}
