use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use leasebot::db::Database;
use leasebot::error::FunnelError;
use leasebot::models::{
    Direction, InterestStatus, LeadStatus, MessageStatus, NewMessage, NewProperty, PropertyStatus, SessionId,
};
use leasebot::repository::{LeadStore, MessageStore, PropertyCatalog};
use tempfile::TempDir;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap()
}

fn open_db() -> (TempDir, Database) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let db_url = format!("sqlite://{}", temp_dir.path().join("test.db").display());
    let db = Database::new(&db_url).expect("Failed to create database");
    (temp_dir, db)
}

fn new_property(address: &str, status: PropertyStatus) -> NewProperty {
    NewProperty {
        address: address.to_string(),
        city: "Springfield".to_string(),
        state: "IL".to_string(),
        zip_code: "62701".to_string(),
        num_bedrooms: 2,
        num_bathrooms: 1,
        sqft: Some(900),
        rent_price: 1450,
        status,
        calendly_link: None,
    }
}

#[test]
fn test_database_creation_and_initialization() {
    let temp_dir = TempDir::new().unwrap();
    let db_url = format!("sqlite://{}", temp_dir.path().join("nested/dir/test.db").display());

    let db = Database::new(&db_url).expect("Failed to create database");
    let _conn = db.get_connection().expect("Failed to get database connection");

    // Migrations are safe to run again on an existing file
    Database::new(&db_url).expect("Failed to reopen database");
}

#[tokio::test]
async fn test_create_lead_is_idempotent_per_phone() {
    let (_dir, db) = open_db();

    let first = db.create_lead("+15551234567", t0()).await.unwrap();
    let second = db.create_lead("+15551234567", t0()).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.status, LeadStatus::New);
    assert_eq!(db.find_by_phone("+15551234567").await.unwrap(), Some(first.clone()));
    assert_eq!(db.get_lead(first.id).await.unwrap(), Some(first));
    assert_eq!(db.find_by_phone("+15550000000").await.unwrap(), None);
}

#[tokio::test]
async fn test_profile_round_trip() {
    let (_dir, db) = open_db();
    let mut lead = db.create_lead("+15551234567", t0()).await.unwrap();

    lead.name = Some("Jane Doe".to_string());
    lead.email = Some("jane@example.com".to_string());
    lead.income = Some(4200);
    lead.has_pets = Some(true);
    lead.rented_before = Some(false);
    lead.move_in_date = NaiveDate::from_ymd_opt(2026, 12, 1);
    lead.uncertain_interest = true;
    lead.id_document_ref = Some("uploads/jane.jpg".to_string());
    lead.scheduled_showing_at = Some(t0() + Duration::days(3));
    lead.updated_at = t0() + Duration::seconds(30);
    db.save_profile(&lead).await.unwrap();

    let stored = db.get_lead(lead.id).await.unwrap().unwrap();
    assert_eq!(stored, lead);
}

#[tokio::test]
async fn test_save_profile_does_not_write_status() {
    let (_dir, db) = open_db();
    let mut lead = db.create_lead("+15551234567", t0()).await.unwrap();

    db.set_status(lead.id, LeadStatus::IdVerified, t0()).await.unwrap();

    // A stale in-memory status must not overwrite the stored one
    lead.name = Some("Jane".to_string());
    db.save_profile(&lead).await.unwrap();

    let stored = db.get_lead(lead.id).await.unwrap().unwrap();
    assert_eq!(stored.status, LeadStatus::IdVerified);
    assert_eq!(stored.name.as_deref(), Some("Jane"));
}

#[tokio::test]
async fn test_missing_lead_updates_fail() {
    let (_dir, db) = open_db();
    assert!(db.set_status(999, LeadStatus::IdVerified, t0()).await.is_err());
}

#[test]
fn test_unknown_status_rejected_by_schema() {
    let temp_dir = TempDir::new().unwrap();
    let db_url = format!("sqlite://{}", temp_dir.path().join("test.db").display());
    let db = Database::new(&db_url).unwrap();
    let conn = db.get_connection().unwrap();

    let result = conn.execute(
        "INSERT INTO leads (phone, status, created_at, updated_at) VALUES ('+15551234567', 'qualified', 'x', 'x')",
        [],
    );
    assert!(result.is_err());
}

#[tokio::test]
async fn test_interests_are_unique_and_schedulable() {
    let (_dir, db) = open_db();
    let lead = db.create_lead("+15551234567", t0()).await.unwrap();
    let property = db
        .add_property(new_property("123 Main St", PropertyStatus::Available))
        .await
        .unwrap();

    assert!(db.attach_interest(lead.id, property.id, t0()).await.unwrap());
    assert!(!db.attach_interest(lead.id, property.id, t0()).await.unwrap());

    let interests = db.interests_for_lead(lead.id).await.unwrap();
    assert_eq!(interests.len(), 1);
    assert_eq!(interests[0].status, InterestStatus::Interested);
    assert!(!interests[0].scheduled_showing);

    db.mark_interests_scheduled(lead.id).await.unwrap();
    let interests = db.interests_for_lead(lead.id).await.unwrap();
    assert_eq!(interests[0].status, InterestStatus::Scheduled);
    assert!(interests[0].scheduled_showing);
}

#[tokio::test]
async fn test_message_queries() {
    let (_dir, db) = open_db();
    let lead = db.create_lead("+15551234567", t0()).await.unwrap();
    let session = SessionId::new();
    let other_session = SessionId::new();

    db.append_message(NewMessage::incoming(&lead, "hi", session, t0()))
        .await
        .unwrap();
    db.append_message(NewMessage::incoming(&lead, "is 123 Main open?", session, t0() + Duration::seconds(3)))
        .await
        .unwrap();
    let reply = db
        .append_message(NewMessage::ai_reply(
            &lead,
            "It is! What's your name?",
            session,
            MessageStatus::Sent,
            t0() + Duration::seconds(9),
        ))
        .await
        .unwrap();
    db.append_message(NewMessage::incoming(&lead, "later", other_session, t0() + Duration::minutes(5)))
        .await
        .unwrap();

    let in_session = db.session_messages(session).await.unwrap();
    let contents: Vec<&str> = in_session.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["hi", "is 123 Main open?", "It is! What's your name?"]);

    let latest = db.latest_message(lead.id).await.unwrap().unwrap();
    assert_eq!(latest.content, "later");
    assert_eq!(latest.session_id, other_session);

    assert_eq!(
        db.latest_incoming_at(lead.id).await.unwrap(),
        Some(t0() + Duration::minutes(5))
    );

    let ai = db.latest_ai_message(lead.id).await.unwrap().unwrap();
    assert_eq!(ai, reply);
    assert_eq!(ai.direction, Direction::Outgoing);
    assert!(ai.is_ai_generated);

    let recent = db.recent_messages(lead.id, 2).await.unwrap();
    let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["later", "It is! What's your name?"]);
}

#[tokio::test]
async fn test_latest_incoming_ignores_outgoing() {
    let (_dir, db) = open_db();
    let lead = db.create_lead("+15551234567", t0()).await.unwrap();
    assert_eq!(db.latest_incoming_at(lead.id).await.unwrap(), None);

    let session = SessionId::new();
    db.append_message(NewMessage::incoming(&lead, "hi", session, t0()))
        .await
        .unwrap();
    db.append_message(NewMessage::ai_reply(
        &lead,
        "hello",
        session,
        MessageStatus::Sent,
        t0() + Duration::seconds(6),
    ))
    .await
    .unwrap();

    assert_eq!(db.latest_incoming_at(lead.id).await.unwrap(), Some(t0()));
}

#[tokio::test]
async fn test_address_fragment_lookup() {
    let (_dir, db) = open_db();
    let main = db
        .add_property(new_property("123 Main St", PropertyStatus::Available))
        .await
        .unwrap();
    db.add_property(new_property("77 Oak Avenue", PropertyStatus::Occupied))
        .await
        .unwrap();

    // Stored address inside the mention
    let found = db
        .find_by_address_fragment("the place at 123 main st, springfield")
        .await
        .unwrap();
    assert_eq!(found.map(|p| p.id), Some(main.id));

    // Mention inside the stored address
    let found = db.find_by_address_fragment("OAK AVE").await.unwrap();
    assert_eq!(found.map(|p| p.address), Some("77 Oak Avenue".to_string()));

    assert_eq!(db.find_by_address_fragment("   ").await.unwrap(), None);
    assert_eq!(db.find_by_address_fragment("9 Elm Rd").await.unwrap(), None);
}

#[tokio::test]
async fn test_catalog_listing() {
    let (_dir, db) = open_db();
    for (address, status) in [
        ("1 First St", PropertyStatus::Available),
        ("2 Second St", PropertyStatus::Occupied),
        ("3 Third St", PropertyStatus::Available),
        ("4 Fourth St", PropertyStatus::Maintenance),
        ("5 Fifth St", PropertyStatus::Available),
    ] {
        db.add_property(new_property(address, status)).await.unwrap();
    }

    assert_eq!(db.list_properties().await.unwrap().len(), 5);

    let available = db.available_properties(2).await.unwrap();
    let addresses: Vec<&str> = available.iter().map(|p| p.address.as_str()).collect();
    assert_eq!(addresses, vec!["1 First St", "3 Third St"]);

    let first = &available[0];
    assert_eq!(db.get_property(first.id).await.unwrap().as_ref(), Some(first));
    assert_eq!(db.get_property(999).await.unwrap(), None);
}

#[tokio::test]
async fn test_stored_address_must_appear_as_whole_words() {
    let (_dir, db) = open_db();
    let oak = db
        .add_property(new_property("12 Oak St", PropertyStatus::Available))
        .await
        .unwrap();

    // "12 Oak St" sits inside "112 Oak St" but names a different house
    assert_eq!(db.find_by_address_fragment("112 Oak St").await.unwrap(), None);

    let found = db.find_by_address_fragment("is 12 Oak St. still open?").await.unwrap();
    assert_eq!(found.map(|p| p.id), Some(oak.id));
}

#[tokio::test]
async fn test_create_lead_requires_normalised_phone() {
    let (_dir, db) = open_db();

    assert!(matches!(
        db.create_lead("555-123-4567", t0()).await,
        Err(FunnelError::InvalidPhone(_))
    ));
    assert_eq!(db.find_by_phone("555-123-4567").await.unwrap(), None);
}

#[tokio::test]
async fn test_pooled_connections_enforce_foreign_keys() {
    let (_dir, db) = open_db();
    let lead = db.create_lead("+15551234567", t0()).await.unwrap();

    assert!(db.attach_interest(lead.id, 999, t0()).await.is_err());
    assert!(db.interests_for_lead(lead.id).await.unwrap().is_empty());
}
