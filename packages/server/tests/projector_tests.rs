//! Job projection and sync verification against the mock field service.

mod common;

use automation_core::domains::reservations::models::property::PropertyResolver;
use automation_core::domains::reservations::models::reservation::{
    RESERVATIONS_TABLE, Reservation,
};
use automation_core::domains::reservations::projector::Projector;
use automation_core::kernel::testing::{InMemoryGateway, MockFieldService};
use chrono::{DateTime, Utc};
use common::{SeedReservation, seed_property, test_config};
use fieldservice::LineItem;
use serde_json::json;

fn utc(s: &str) -> DateTime<Utc> {
    chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
        .unwrap()
        .and_utc()
}

async fn resolver(store: &InMemoryGateway) -> PropertyResolver {
    PropertyResolver::from_records(&store.all("Properties").await)
}

async fn only_record(store: &InMemoryGateway) -> Reservation {
    let records = store.all(RESERVATIONS_TABLE).await;
    assert_eq!(records.len(), 1);
    Reservation::new(records[0].clone())
}

async fn seed_template(api: &MockFieldService) {
    api.seed_job(
        MockFieldService::job("tmpl_turnover", "unscheduled", None),
        vec![
            LineItem {
                id: Some("li_1".into()),
                name: "Turnover Service".into(),
                unit_price: Some(12000),
                quantity: Some(1.0),
                kind: Some("labor".into()),
                description: None,
            },
            LineItem {
                id: Some("li_2".into()),
                name: "Laundry".into(),
                unit_price: Some(2500),
                quantity: Some(1.0),
                kind: Some("labor".into()),
                description: None,
            },
        ],
    )
    .await;
}

#[tokio::test]
async fn creates_job_from_template() {
    let store = InMemoryGateway::new();
    let api = MockFieldService::new();
    let config = test_config();
    seed_template(&api).await;

    let property_id = seed_property(&store, "Desert Rose", 12345).await;
    SeedReservation::new("abc@x")
        .property(&property_id)
        .dates("2025-09-05", "2025-09-10")
        .with("Final Service Time", json!("2025-09-10T17:15:00Z"))
        .seed(&store)
        .await;

    let projector = Projector::new(&store, &api, &config);
    let stats = projector
        .project_jobs(&resolver(&store).await, Utc::now())
        .await
        .unwrap();
    assert_eq!(stats.jobs_created, 1);

    // Request carried the final service time and a one-hour window.
    let created = api.created.lock().await;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].customer_id, "cus_1");
    assert_eq!(created[0].address_id, "adr_1");
    assert_eq!(created[0].assigned_employee_ids, vec!["emp_test".to_string()]);
    assert_eq!(created[0].schedule.scheduled_start, utc("2025-09-10 17:15"));
    assert_eq!(created[0].schedule.scheduled_end, utc("2025-09-10 18:15"));
    assert_eq!(created[0].schedule.arrival_window, 0);
    assert_eq!(created[0].job_fields.job_type_id, "jt_turnover");
    drop(created);

    // Template line items cloned with the first renamed.
    let items = api.line_items.lock().await.get("job_1").cloned().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].name, "Turnover STR Next Guest Unknown");
    assert_eq!(items[1].name, "Laundry");

    let record = only_record(&store).await;
    assert_eq!(record.job_id(), Some("job_1"));
    assert_eq!(record.appointment_id(), Some("appt_job_1"));
    assert_eq!(record.record.str_field("Job Status"), Some("Scheduled"));
    assert_eq!(record.record.str_field("Sync Status"), Some("Synced"));
    assert_eq!(
        record.record.str_field("Service Line Description"),
        Some("Turnover STR Next Guest Unknown")
    );
}

#[tokio::test]
async fn record_with_job_is_not_projected_again() {
    let store = InMemoryGateway::new();
    let api = MockFieldService::new();
    let config = test_config();

    let property_id = seed_property(&store, "Desert Rose", 12345).await;
    SeedReservation::new("abc@x")
        .property(&property_id)
        .with("Final Service Time", json!("2025-09-10T17:15:00Z"))
        .with("Service Job ID", json!("job_9"))
        .seed(&store)
        .await;

    let projector = Projector::new(&store, &api, &config);
    let stats = projector
        .project_jobs(&resolver(&store).await, Utc::now())
        .await
        .unwrap();
    assert_eq!(stats.examined, 0);
    assert!(api.created.lock().await.is_empty());
}

#[tokio::test]
async fn blocks_are_never_projected() {
    let store = InMemoryGateway::new();
    let api = MockFieldService::new();
    let config = test_config();

    let property_id = seed_property(&store, "Desert Rose", 12345).await;
    SeedReservation::new("block@x")
        .property(&property_id)
        .block("Owner Stay")
        .with("Final Service Time", json!("2025-09-10T17:15:00Z"))
        .seed(&store)
        .await;

    let projector = Projector::new(&store, &api, &config);
    let stats = projector
        .project_jobs(&resolver(&store).await, Utc::now())
        .await
        .unwrap();
    assert_eq!(stats.examined, 0);
}

// S3: owner arrival shapes the service line.
#[tokio::test]
async fn owner_arrival_service_line() {
    let store = InMemoryGateway::new();
    let api = MockFieldService::new();
    let config = test_config();
    seed_template(&api).await;

    let property_id = seed_property(&store, "Desert Rose", 12345).await;
    SeedReservation::new("r1@x")
        .property(&property_id)
        .dates("2025-09-05", "2025-09-10")
        .with("Final Service Time", json!("2025-09-10T17:15:00Z"))
        .with("Owner Arriving", json!(true))
        .seed(&store)
        .await;
    SeedReservation::new("b1@x")
        .property(&property_id)
        .dates("2025-09-10", "2025-09-14")
        .block("Owner Stay")
        .seed(&store)
        .await;

    let projector = Projector::new(&store, &api, &config);
    projector
        .project_jobs(&resolver(&store).await, Utc::now())
        .await
        .unwrap();

    let records = store.all(RESERVATIONS_TABLE).await;
    let r1 = records
        .iter()
        .find(|r| r.str_field("UID") == Some("r1@x"))
        .unwrap();
    assert_eq!(
        r1.str_field("Service Line Description"),
        Some("OWNER ARRIVING Turnover STR September 10")
    );
}

// S5: a 30-minute divergence reports Wrong Time with both times named.
#[tokio::test]
async fn sync_divergence_wrong_time() {
    let store = InMemoryGateway::new();
    let api = MockFieldService::new();
    let config = test_config();

    // 10:15 vs 10:45 America/Phoenix.
    api.seed_job(
        MockFieldService::job("job_1", "scheduled", Some(utc("2025-09-10 17:45"))),
        vec![],
    )
    .await;
    SeedReservation::new("abc@x")
        .with("Final Service Time", json!("2025-09-10T17:15:00Z"))
        .with("Service Job ID", json!("job_1"))
        .seed(&store)
        .await;

    let projector = Projector::new(&store, &api, &config);
    let now = utc("2025-09-01 21:00");
    let stats = projector.verify_sync(now).await.unwrap();
    assert_eq!(stats.wrong_time, 1);

    let record = only_record(&store).await;
    assert_eq!(record.record.str_field("Sync Status"), Some("Wrong Time"));
    assert_eq!(
        record.scheduled_service_time(),
        Some(utc("2025-09-10 17:45"))
    );
    let details = record
        .record
        .str_field("Schedule Sync Details")
        .expect("details written on divergence");
    assert!(details.contains("09/10 10:15"));
    assert!(details.contains("09/10 10:45"));
    assert!(details.contains("09/01 14:00"));
}

#[tokio::test]
async fn sync_divergence_wrong_date() {
    let store = InMemoryGateway::new();
    let api = MockFieldService::new();
    let config = test_config();

    api.seed_job(
        MockFieldService::job("job_1", "scheduled", Some(utc("2025-09-11 17:15"))),
        vec![],
    )
    .await;
    SeedReservation::new("abc@x")
        .with("Final Service Time", json!("2025-09-10T17:15:00Z"))
        .with("Service Job ID", json!("job_1"))
        .seed(&store)
        .await;

    let projector = Projector::new(&store, &api, &config);
    let stats = projector.verify_sync(Utc::now()).await.unwrap();
    assert_eq!(stats.wrong_date, 1);
    let record = only_record(&store).await;
    assert_eq!(record.record.str_field("Sync Status"), Some("Wrong Date"));
}

#[tokio::test]
async fn synced_state_keeps_previous_diagnostic() {
    let store = InMemoryGateway::new();
    let api = MockFieldService::new();
    let config = test_config();

    api.seed_job(
        MockFieldService::job("job_1", "scheduled", Some(utc("2025-09-10 17:15"))),
        vec![],
    )
    .await;
    SeedReservation::new("abc@x")
        .with("Final Service Time", json!("2025-09-10T17:15:00Z"))
        .with("Service Job ID", json!("job_1"))
        .with("Sync Status", json!("Wrong Time"))
        .with("Schedule Sync Details", json!("previous diagnostic"))
        .seed(&store)
        .await;

    let projector = Projector::new(&store, &api, &config);
    let stats = projector.verify_sync(Utc::now()).await.unwrap();
    assert_eq!(stats.synced, 1);

    let record = only_record(&store).await;
    assert_eq!(record.record.str_field("Sync Status"), Some("Synced"));
    assert_eq!(
        record.record.str_field("Schedule Sync Details"),
        Some("previous diagnostic")
    );
}

#[tokio::test]
async fn missing_job_reports_not_created() {
    let store = InMemoryGateway::new();
    let api = MockFieldService::new();
    let config = test_config();

    SeedReservation::new("abc@x")
        .with("Final Service Time", json!("2025-09-10T17:15:00Z"))
        .seed(&store)
        .await;

    let projector = Projector::new(&store, &api, &config);
    let stats = projector.verify_sync(Utc::now()).await.unwrap();
    assert_eq!(stats.not_created, 1);
    let record = only_record(&store).await;
    assert_eq!(record.record.str_field("Sync Status"), Some("Not Created"));
}

#[tokio::test]
async fn service_line_update_preserves_manual_notes() {
    let store = InMemoryGateway::new();
    let api = MockFieldService::new();
    let config = test_config();

    api.seed_job(
        MockFieldService::job("job_1", "scheduled", Some(utc("2025-09-10 17:15"))),
        vec![LineItem {
            id: Some("li_1".into()),
            name: "gate code 4411 | Turnover STR Next Guest Unknown".into(),
            ..Default::default()
        }],
    )
    .await;

    let property_id = seed_property(&store, "Desert Rose", 12345).await;
    SeedReservation::new("r1@x")
        .property(&property_id)
        .dates("2025-09-05", "2025-09-10")
        .with("Final Service Time", json!("2025-09-10T17:15:00Z"))
        .with("Service Job ID", json!("job_1"))
        .with(
            "Service Line Description",
            json!("Turnover STR Next Guest Unknown"),
        )
        .seed(&store)
        .await;
    // A next guest appears, changing the derived description.
    SeedReservation::new("r2@x")
        .property(&property_id)
        .dates("2025-09-14", "2025-09-18")
        .seed(&store)
        .await;

    let projector = Projector::new(&store, &api, &config);
    let stats = projector.reconcile_service_lines().await.unwrap();
    assert_eq!(stats.descriptions_updated, 1);
    assert_eq!(stats.line_items_updated, 1);

    let items = api.line_items.lock().await.get("job_1").cloned().unwrap();
    assert_eq!(
        items[0].name,
        "gate code 4411 | Turnover STR Next Guest September 14"
    );
}

#[tokio::test]
async fn old_job_link_is_never_touched() {
    let store = InMemoryGateway::new();
    let api = MockFieldService::new();
    let config = test_config();

    SeedReservation::new("r1@x")
        .dates("2025-09-05", "2025-09-10")
        .with("Final Service Time", json!("2025-09-10T17:15:00Z"))
        .with("Service Job ID", json!("old_job_1"))
        .seed(&store)
        .await;

    let projector = Projector::new(&store, &api, &config);
    let stats = projector.reconcile_service_lines().await.unwrap();
    assert_eq!(stats.line_items_updated, 0);
}
