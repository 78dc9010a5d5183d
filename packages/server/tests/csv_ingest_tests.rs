//! Supplier CSV ingest: detection, normalization, resolution, archiving.

mod common;

use automation_core::domains::reservations::ingest::csv::{
    CsvIngestStats, Supplier, detect_supplier, ingest_csv_directory, parse_csv,
};
use automation_core::domains::reservations::models::property::PropertyResolver;
use automation_core::domains::reservations::models::reservation::RESERVATIONS_TABLE;
use automation_core::domains::reservations::reconciler::Reconciler;
use automation_core::domains::reservations::session::SessionTracker;
use automation_core::kernel::testing::InMemoryGateway;
use chrono::{Duration, NaiveDate, Utc};
use common::{seed_property, test_config_in};

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn fmt(date: NaiveDate, pattern: &str) -> String {
    date.format(pattern).to_string()
}

async fn resolver(store: &InMemoryGateway) -> PropertyResolver {
    PropertyResolver::from_records(&store.all("Properties").await)
}

#[test]
fn supplier_detection_rules() {
    let itrip_headers = vec!["Property Name".to_string(), "Guest Name".to_string()];
    let evolve_headers = vec!["Property".to_string(), "Guest Name".to_string()];

    assert_eq!(
        detect_supplier("reservations.csv", &itrip_headers),
        Supplier::Itrip
    );
    assert_eq!(
        detect_supplier("reservations.csv", &evolve_headers),
        Supplier::Evolve
    );
    assert_eq!(
        detect_supplier("owners_tab2.csv", &evolve_headers),
        Supplier::EvolveTab2
    );
    // Filename suffix wins even with iTrip-looking headers.
    assert_eq!(
        detect_supplier("owners_tab2.csv", &itrip_headers),
        Supplier::EvolveTab2
    );
}

#[tokio::test]
async fn itrip_rows_normalize() {
    let store = InMemoryGateway::new();
    seed_property(&store, "Desert Rose", 12345).await;
    let resolver = resolver(&store).await;
    let config = test_config_in(std::path::Path::new("/tmp/unused"));

    let check_in = today() + Duration::days(10);
    let check_out = today() + Duration::days(15);
    let content = format!(
        "Property Name,Guest Name,Checkin,Checkout,Same Day?,Contractor Info\n\
         Desert Rose,John Smith,{},{},Yes,hot tub service\n\
         Unknown Villa,Jane Doe,{},{},No,\n",
        fmt(check_in, "%m/%d/%Y"),
        fmt(check_out, "%m/%d/%Y"),
        fmt(check_in, "%m/%d/%Y"),
        fmt(check_out, "%m/%d/%Y"),
    );

    let mut stats = CsvIngestStats::default();
    let events = parse_csv("itrip.csv", &content, &resolver, &config, today(), &mut stats).unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(stats.rows_unmatched_property, 1);
    let event = &events[0];
    assert!(event.uid.starts_with("itrip_desert_rose_"));
    assert!(event.uid.ends_with("_smith"));
    assert_eq!(event.feed_url, "csv_itrip");
    assert_eq!(event.supplier_info.as_deref(), Some("hot tub service"));
    assert_eq!(event.same_day_override, Some(true));
}

#[tokio::test]
async fn maintenance_rows_become_review_blocks() {
    let store = InMemoryGateway::new();
    seed_property(&store, "Desert Rose", 12345).await;
    let resolver = resolver(&store).await;
    let config = test_config_in(std::path::Path::new("/tmp/unused"));

    let check_in = today() + Duration::days(5);
    let check_out = today() + Duration::days(6);
    let content = format!(
        "Property Name,Guest Name,Checkin,Checkout,Same Day?,Contractor Info\n\
         Desert Rose,Maintenance Visit,{},{},,\n",
        fmt(check_in, "%m/%d/%Y"),
        fmt(check_out, "%m/%d/%Y"),
    );

    let mut stats = CsvIngestStats::default();
    let events = parse_csv("itrip.csv", &content, &resolver, &config, today(), &mut stats).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].entry_type,
        automation_core::common::types::EntryType::Block
    );
    assert_eq!(
        events[0].service_type,
        automation_core::common::types::ServiceType::NeedsReview
    );
}

#[tokio::test]
async fn window_boundaries_drop_rows() {
    let store = InMemoryGateway::new();
    seed_property(&store, "Desert Rose", 12345).await;
    let resolver = resolver(&store).await;
    let config = test_config_in(std::path::Path::new("/tmp/unused"));

    let (window_start, _) = config.event_window(today());
    let too_old = window_start - Duration::days(1);
    let at_edge = window_start;
    let content = format!(
        "Property Name,Guest Name,Checkin,Checkout,Same Day?,Contractor Info\n\
         Desert Rose,Old Guest,{},{},,\n\
         Desert Rose,Edge Guest,{},{},,\n",
        fmt(too_old, "%m/%d/%Y"),
        fmt(too_old + Duration::days(3), "%m/%d/%Y"),
        fmt(at_edge, "%m/%d/%Y"),
        fmt(at_edge + Duration::days(3), "%m/%d/%Y"),
    );

    let mut stats = CsvIngestStats::default();
    let events = parse_csv("itrip.csv", &content, &resolver, &config, today(), &mut stats).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(stats.rows_outside_window, 1);
    assert!(events[0].uid.contains("edge_guest") || events[0].uid.ends_with("_guest"));
}

#[tokio::test]
async fn evolve_rows_resolve_by_listing_number() {
    let store = InMemoryGateway::new();
    seed_property(&store, "Cozy Cabin", 12345).await;
    let resolver = resolver(&store).await;
    let config = test_config_in(std::path::Path::new("/tmp/unused"));

    let check_in = today() + Duration::days(10);
    let check_out = today() + Duration::days(12);
    let content = format!(
        "Property,Guest Name,Check-In,Check-Out,Status\n\
         #12345 Cozy Cabin,Alice Brown,{},{},booked\n\
         #99999 Elsewhere,Bob Gray,{},{},booked\n",
        fmt(check_in, "%Y-%m-%d"),
        fmt(check_out, "%Y-%m-%d"),
        fmt(check_in, "%Y-%m-%d"),
        fmt(check_out, "%Y-%m-%d"),
    );

    let mut stats = CsvIngestStats::default();
    let events =
        parse_csv("evolve.csv", &content, &resolver, &config, today(), &mut stats).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(stats.rows_unmatched_property, 1);
    assert!(events[0].uid.starts_with("evolve_"));
    assert!(events[0].uid.ends_with("_brown"));
}

#[tokio::test]
async fn tab2_owner_blocks_and_cancellations() {
    let store = InMemoryGateway::new();
    // seed_property sets Owner Name = "Pat Owner".
    seed_property(&store, "Cozy Cabin", 12345).await;
    let resolver = resolver(&store).await;
    let config = test_config_in(std::path::Path::new("/tmp/unused"));

    let check_in = today() + Duration::days(20);
    let check_out = today() + Duration::days(24);
    let content = format!(
        "Property,Guest Name,Check-In,Check-Out,Status\n\
         #12345 Cozy Cabin,pat owner,{ci},{co},booked\n\
         #12345 Cozy Cabin,Somebody Else,{ci},{co},booked\n\
         #12345 Cozy Cabin,Pat Owner,{ci2},{co2},cancelled\n",
        ci = fmt(check_in, "%Y-%m-%d"),
        co = fmt(check_out, "%Y-%m-%d"),
        ci2 = fmt(check_in + Duration::days(10), "%Y-%m-%d"),
        co2 = fmt(check_out + Duration::days(10), "%Y-%m-%d"),
    );

    let mut stats = CsvIngestStats::default();
    let events =
        parse_csv("owners_tab2.csv", &content, &resolver, &config, today(), &mut stats).unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(stats.rows_skipped, 1);

    use automation_core::common::types::{BlockType, EntryType};
    use automation_core::domains::reservations::models::event::EventAction;
    assert_eq!(events[0].action, EventAction::Upsert);
    assert_eq!(events[0].entry_type, EntryType::Block);
    assert_eq!(events[0].block_type, Some(BlockType::OwnerStay));
    assert!(events[0].uid.ends_with("_block"));
    assert_eq!(events[1].action, EventAction::Remove);
}

#[tokio::test]
async fn processed_files_are_archived() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config_in(dir.path());
    let store = InMemoryGateway::new();
    seed_property(&store, "Desert Rose", 12345).await;
    let resolver = resolver(&store).await;
    let reconciler = Reconciler::new(&store, &config);

    let inbox = config.csv_process_dir();
    std::fs::create_dir_all(&inbox).unwrap();
    let check_in = today() + Duration::days(10);
    let check_out = today() + Duration::days(15);
    std::fs::write(
        inbox.join("itrip.csv"),
        format!(
            "Property Name,Guest Name,Checkin,Checkout,Same Day?,Contractor Info\n\
             Desert Rose,John Smith,{},{},,\n",
            fmt(check_in, "%m/%d/%Y"),
            fmt(check_out, "%m/%d/%Y"),
        ),
    )
    .unwrap();

    let mut session = SessionTracker::new();
    let stats = ingest_csv_directory(&config, &resolver, &reconciler, &mut session, Utc::now())
        .await
        .unwrap();

    assert_eq!(stats.files_processed, 1);
    assert_eq!(stats.created, 1);
    assert_eq!(store.all(RESERVATIONS_TABLE).await.len(), 1);

    // Inbox emptied, archive holds the timestamped copy.
    assert!(std::fs::read_dir(&inbox).unwrap().next().is_none());
    let archived: Vec<_> = std::fs::read_dir(config.csv_done_dir())
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(archived.len(), 1);
    let name = archived[0].file_name().to_string_lossy().to_string();
    assert!(name.ends_with("_itrip.csv"));
}
