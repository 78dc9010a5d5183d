//! Shared fixtures for integration tests.

#![allow(dead_code)]

use automation_core::common::types::{EntryType, EventSource, ServiceType};
use automation_core::config::Config;
use automation_core::domains::reservations::models::event::{EventAction, ReservationEvent};
use automation_core::domains::reservations::models::reservation::RESERVATIONS_TABLE;
use automation_core::kernel::testing::InMemoryGateway;
use chrono::NaiveDate;
use recordstore::Fields;
use serde_json::{Value, json};

pub fn test_config() -> Config {
    Config::for_tests(std::env::temp_dir().join("automation-tests"))
}

pub fn test_config_in(root: &std::path::Path) -> Config {
    Config::for_tests(root.to_path_buf())
}

pub fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

/// Builder for a seeded reservation record.
pub struct SeedReservation {
    pub uid: String,
    pub feed_url: String,
    pub property_id: String,
    pub check_in: String,
    pub check_out: String,
    pub status: String,
    pub entry_type: String,
    pub service_type: String,
    pub extra: Vec<(&'static str, Value)>,
}

impl SeedReservation {
    pub fn new(uid: &str) -> Self {
        Self {
            uid: uid.to_string(),
            feed_url: "https://feeds.example/p1.ics".to_string(),
            property_id: "recP1".to_string(),
            check_in: "2025-08-01".to_string(),
            check_out: "2025-08-05".to_string(),
            status: "New".to_string(),
            entry_type: "Reservation".to_string(),
            service_type: "Turnover".to_string(),
            extra: Vec::new(),
        }
    }

    pub fn feed(mut self, feed_url: &str) -> Self {
        self.feed_url = feed_url.to_string();
        self
    }

    pub fn property(mut self, property_id: &str) -> Self {
        self.property_id = property_id.to_string();
        self
    }

    pub fn dates(mut self, check_in: &str, check_out: &str) -> Self {
        self.check_in = check_in.to_string();
        self.check_out = check_out.to_string();
        self
    }

    pub fn status(mut self, status: &str) -> Self {
        self.status = status.to_string();
        self
    }

    pub fn block(mut self, block_type: &str) -> Self {
        self.entry_type = "Block".to_string();
        self.extra.push(("Block Type", json!(block_type)));
        self
    }

    pub fn with(mut self, field: &'static str, value: Value) -> Self {
        self.extra.push((field, value));
        self
    }

    pub fn fields(&self) -> Fields {
        let mut f = Fields::new();
        f.insert("UID".into(), json!(self.uid));
        f.insert("Feed URL".into(), json!(self.feed_url));
        f.insert("Property".into(), json!([self.property_id]));
        f.insert("Check-in Date".into(), json!(self.check_in));
        f.insert("Check-out Date".into(), json!(self.check_out));
        f.insert("Entry Type".into(), json!(self.entry_type));
        f.insert("Service Type".into(), json!(self.service_type));
        f.insert("Status".into(), json!(self.status));
        f.insert("Last Updated".into(), json!("2025-07-01T00:00:00Z"));
        for (name, value) in &self.extra {
            f.insert((*name).to_string(), value.clone());
        }
        f
    }

    pub async fn seed(&self, store: &InMemoryGateway) -> String {
        store.seed(RESERVATIONS_TABLE, self.fields()).await
    }
}

/// A calendar-feed upsert event.
pub fn feed_event(uid: &str, property: &str, check_in: &str, check_out: &str) -> ReservationEvent {
    ReservationEvent {
        source: EventSource::CalendarFeed,
        action: EventAction::Upsert,
        uid: uid.to_string(),
        feed_url: "https://feeds.example/p1.ics".to_string(),
        property_id: property.to_string(),
        check_in: date(check_in),
        check_out: date(check_out),
        entry_type: EntryType::Reservation,
        block_type: None,
        service_type: ServiceType::Turnover,
        supplier_info: None,
        same_day_override: None,
    }
}

/// Seed a property record the resolver and projector can use.
pub async fn seed_property(store: &InMemoryGateway, name: &str, listing: i64) -> String {
    let mut f = Fields::new();
    f.insert("Property Name".into(), json!(name));
    f.insert("Listing Number".into(), json!(listing));
    f.insert("Owner Name".into(), json!("Pat Owner"));
    f.insert("Customer ID".into(), json!("cus_1"));
    f.insert("Address ID".into(), json!("adr_1"));
    f.insert("Turnover Job Template ID".into(), json!("tmpl_turnover"));
    store.seed("Properties", f).await
}
