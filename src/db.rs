use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::config::DatabaseConfig;
use crate::error::{FunnelError, Result};
use crate::models::{
    Direction, InterestStatus, Lead, LeadStatus, Message, MessageStatus, NewMessage, NewProperty, Property,
    PropertyInterest, PropertyStatus, SessionId,
};
use crate::repository::{LeadStore, MessageStore, PropertyCatalog};
use crate::schema::{leads, messages, properties, property_interests};
use crate::validation::InputValidator;

// Type alias for the database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

// Enum columns are stored by name
macro_rules! text_column {
    ($($ty:ty),* $(,)?) => {$(
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: FunnelError| FromSqlError::Other(Box::new(e)))
            }
        }
    )*};
}

text_column!(LeadStatus, Direction, MessageStatus, InterestStatus, PropertyStatus);

impl ToSql for SessionId {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for SessionId {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e: FunnelError| FromSqlError::Other(Box::new(e)))
    }
}

/// Database manager for handling connections and operations
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) the database at `database_url` with default pool settings
    pub fn new(database_url: &str) -> Result<Self> {
        Self::with_pool_size(database_url, 10, Duration::from_secs(30))
    }

    /// Open the database described by the configuration
    pub fn from_config(config: &DatabaseConfig) -> Result<Self> {
        Self::with_pool_size(
            &config.url,
            config.max_connections,
            Duration::from_secs(config.connection_timeout_secs),
        )
    }

    fn with_pool_size(database_url: &str, max_connections: u32, timeout: Duration) -> Result<Self> {
        let path = Self::path_from_url(database_url);

        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let pool = Pool::builder()
            .max_size(max_connections)
            .connection_timeout(timeout)
            .build(SqliteConnectionManager::file(&path).with_init(|conn| {
                conn.busy_timeout(Duration::from_secs(5))?;
                conn.execute_batch("PRAGMA foreign_keys = ON;")
            }))?;

        // Run migrations
        let conn = pool.get()?;
        Self::run_migrations(&conn)?;

        tracing::debug!(path = %path.display(), "Database ready");
        Ok(Self { pool })
    }

    /// "sqlite://data/x.db", "sqlite:data/x.db" and plain paths all name a file
    fn path_from_url(database_url: &str) -> PathBuf {
        let trimmed = database_url
            .strip_prefix("sqlite://")
            .or_else(|| database_url.strip_prefix("sqlite:"))
            .unwrap_or(database_url);
        Path::new(trimmed).to_path_buf()
    }

    /// Run database migrations
    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(include_str!("../migrations/2026-10-01-000000_create_tables/up.sql"))?;
        Ok(())
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// Run a closure against a pooled connection on the blocking thread pool
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await?
    }

    /// List a new property in the catalog
    pub async fn add_property(&self, new_property: NewProperty) -> Result<Property> {
        let now = Utc::now();
        self.run(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}, {}, {}, {}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                    properties::TABLE,
                    properties::ADDRESS,
                    properties::CITY,
                    properties::STATE,
                    properties::ZIP_CODE,
                    properties::NUM_BEDROOMS,
                    properties::NUM_BATHROOMS,
                    properties::SQFT,
                    properties::RENT_PRICE,
                    properties::STATUS,
                    properties::CALENDLY_LINK,
                    properties::CREATED_AT
                ),
                params![
                    new_property.address,
                    new_property.city,
                    new_property.state,
                    new_property.zip_code,
                    new_property.num_bedrooms,
                    new_property.num_bathrooms,
                    new_property.sqft,
                    new_property.rent_price,
                    new_property.status,
                    new_property.calendly_link,
                    now
                ],
            )?;

            Ok(Property {
                id: conn.last_insert_rowid(),
                address: new_property.address,
                city: new_property.city,
                state: new_property.state,
                zip_code: new_property.zip_code,
                num_bedrooms: new_property.num_bedrooms,
                num_bathrooms: new_property.num_bathrooms,
                sqft: new_property.sqft,
                rent_price: new_property.rent_price,
                status: new_property.status,
                calendly_link: new_property.calendly_link,
                created_at: now,
            })
        })
        .await
    }

    fn select_lead_by(conn: &Connection, column: &str, value: &dyn ToSql) -> Result<Option<Lead>> {
        let lead = conn
            .query_row(
                &format!("SELECT {} FROM {} WHERE {} = ?1", leads::COLUMNS, leads::TABLE, column),
                [value],
                map_lead,
            )
            .optional()?;
        Ok(lead)
    }

    fn select_messages(conn: &Connection, sql: &str, args: &[&dyn ToSql]) -> Result<Vec<Message>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, map_message)?;

        let mut results = Vec::new();
        for message in rows {
            results.push(message?);
        }
        Ok(results)
    }

    fn select_properties(conn: &Connection, sql: &str, args: &[&dyn ToSql]) -> Result<Vec<Property>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(args, map_property)?;

        let mut results = Vec::new();
        for property in rows {
            results.push(property?);
        }
        Ok(results)
    }
}

/// Map a database row to a Lead
fn map_lead(row: &Row) -> rusqlite::Result<Lead> {
    Ok(Lead {
        id: row.get(leads::ID)?,
        phone: row.get(leads::PHONE)?,
        name: row.get(leads::NAME)?,
        email: row.get(leads::EMAIL)?,
        income: row.get(leads::INCOME)?,
        has_pets: row.get(leads::HAS_PETS)?,
        rented_before: row.get(leads::RENTED_BEFORE)?,
        move_in_date: row.get(leads::MOVE_IN_DATE)?,
        status: row.get(leads::STATUS)?,
        uncertain_interest: row.get(leads::UNCERTAIN_INTEREST)?,
        id_verified: row.get(leads::ID_VERIFIED)?,
        id_document_ref: row.get(leads::ID_DOCUMENT_REF)?,
        scheduled_showing_at: row.get(leads::SCHEDULED_SHOWING_AT)?,
        created_at: row.get(leads::CREATED_AT)?,
        updated_at: row.get(leads::UPDATED_AT)?,
        last_contact_at: row.get(leads::LAST_CONTACT_AT)?,
    })
}

/// Map a database row to a Message
fn map_message(row: &Row) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(messages::ID)?,
        lead_id: row.get(messages::LEAD_ID)?,
        phone: row.get(messages::PHONE)?,
        content: row.get(messages::CONTENT)?,
        direction: row.get(messages::DIRECTION)?,
        session_id: row.get(messages::SESSION_ID)?,
        is_ai_generated: row.get(messages::IS_AI_GENERATED)?,
        status: row.get(messages::STATUS)?,
        sent_at: row.get(messages::SENT_AT)?,
    })
}

/// Map a database row to a Property
fn map_property(row: &Row) -> rusqlite::Result<Property> {
    Ok(Property {
        id: row.get(properties::ID)?,
        address: row.get(properties::ADDRESS)?,
        city: row.get(properties::CITY)?,
        state: row.get(properties::STATE)?,
        zip_code: row.get(properties::ZIP_CODE)?,
        num_bedrooms: row.get(properties::NUM_BEDROOMS)?,
        num_bathrooms: row.get(properties::NUM_BATHROOMS)?,
        sqft: row.get(properties::SQFT)?,
        rent_price: row.get(properties::RENT_PRICE)?,
        status: row.get(properties::STATUS)?,
        calendly_link: row.get(properties::CALENDLY_LINK)?,
        created_at: row.get(properties::CREATED_AT)?,
    })
}

/// Map a database row to a PropertyInterest
fn map_interest(row: &Row) -> rusqlite::Result<PropertyInterest> {
    Ok(PropertyInterest {
        id: row.get(property_interests::ID)?,
        lead_id: row.get(property_interests::LEAD_ID)?,
        property_id: row.get(property_interests::PROPERTY_ID)?,
        status: row.get(property_interests::STATUS)?,
        scheduled_showing: row.get(property_interests::SCHEDULED_SHOWING)?,
        application_submitted: row.get(property_interests::APPLICATION_SUBMITTED)?,
        created_at: row.get(property_interests::CREATED_AT)?,
    })
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl LeadStore for Database {
    async fn find_by_phone(&self, phone: &str) -> Result<Option<Lead>> {
        let phone = phone.to_string();
        self.run(move |conn| Self::select_lead_by(conn, leads::PHONE, &phone)).await
    }

    async fn get_lead(&self, lead_id: i64) -> Result<Option<Lead>> {
        self.run(move |conn| Self::select_lead_by(conn, leads::ID, &lead_id)).await
    }

    async fn create_lead(&self, phone: &str, now: DateTime<Utc>) -> Result<Lead> {
        InputValidator::validate_phone(phone).map_err(|e| FunnelError::InvalidPhone(e.to_string()))?;
        let phone = phone.to_string();
        self.run(move |conn| {
            // A concurrent first contact may have inserted the row already
            conn.execute(
                &format!(
                    "INSERT INTO {} ({}, {}, {}, {}) VALUES (?1, ?2, ?3, ?3) ON CONFLICT({}) DO NOTHING",
                    leads::TABLE,
                    leads::PHONE,
                    leads::STATUS,
                    leads::CREATED_AT,
                    leads::UPDATED_AT,
                    leads::PHONE
                ),
                params![phone, LeadStatus::New, now],
            )?;

            Self::select_lead_by(conn, leads::PHONE, &phone)?
                .ok_or_else(|| FunnelError::LeadNotFound(phone.clone()))
        })
        .await
    }

    async fn save_profile(&self, lead: &Lead) -> Result<()> {
        let lead = lead.clone();
        self.run(move |conn| {
            let updated = conn.execute(
                &format!(
                    "UPDATE {} SET {} = ?1, {} = ?2, {} = ?3, {} = ?4, {} = ?5, {} = ?6, {} = ?7, \
                     {} = ?8, {} = ?9, {} = ?10, {} = ?11 WHERE {} = ?12",
                    leads::TABLE,
                    leads::NAME,
                    leads::EMAIL,
                    leads::INCOME,
                    leads::HAS_PETS,
                    leads::RENTED_BEFORE,
                    leads::MOVE_IN_DATE,
                    leads::UNCERTAIN_INTEREST,
                    leads::ID_VERIFIED,
                    leads::ID_DOCUMENT_REF,
                    leads::SCHEDULED_SHOWING_AT,
                    leads::UPDATED_AT,
                    leads::ID
                ),
                params![
                    lead.name,
                    lead.email,
                    lead.income,
                    lead.has_pets,
                    lead.rented_before,
                    lead.move_in_date,
                    lead.uncertain_interest,
                    lead.id_verified,
                    lead.id_document_ref,
                    lead.scheduled_showing_at,
                    lead.updated_at,
                    lead.id
                ],
            )?;

            if updated == 0 {
                return Err(FunnelError::LeadNotFound(lead.id.to_string()));
            }
            Ok(())
        })
        .await
    }

    async fn set_status(&self, lead_id: i64, status: LeadStatus, now: DateTime<Utc>) -> Result<()> {
        self.run(move |conn| {
            let updated = conn.execute(
                &format!(
                    "UPDATE {} SET {} = ?1, {} = ?2 WHERE {} = ?3",
                    leads::TABLE,
                    leads::STATUS,
                    leads::UPDATED_AT,
                    leads::ID
                ),
                params![status, now, lead_id],
            )?;

            if updated == 0 {
                return Err(FunnelError::LeadNotFound(lead_id.to_string()));
            }
            Ok(())
        })
        .await
    }

    async fn touch_contact(&self, lead_id: i64, now: DateTime<Utc>) -> Result<()> {
        self.run(move |conn| {
            conn.execute(
                &format!(
                    "UPDATE {} SET {} = ?1 WHERE {} = ?2",
                    leads::TABLE,
                    leads::LAST_CONTACT_AT,
                    leads::ID
                ),
                params![now, lead_id],
            )?;
            Ok(())
        })
        .await
    }

    async fn interests_for_lead(&self, lead_id: i64) -> Result<Vec<PropertyInterest>> {
        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM {} WHERE {} = ?1 ORDER BY {}, {}",
                property_interests::COLUMNS,
                property_interests::TABLE,
                property_interests::LEAD_ID,
                property_interests::CREATED_AT,
                property_interests::ID
            ))?;
            let rows = stmt.query_map(params![lead_id], map_interest)?;

            let mut results = Vec::new();
            for interest in rows {
                results.push(interest?);
            }
            Ok(results)
        })
        .await
    }

    async fn attach_interest(&self, lead_id: i64, property_id: i64, now: DateTime<Utc>) -> Result<bool> {
        self.run(move |conn| {
            let inserted = conn.execute(
                &format!(
                    "INSERT OR IGNORE INTO {} ({}, {}, {}, {}, {}, {}) VALUES (?1, ?2, ?3, 0, 0, ?4)",
                    property_interests::TABLE,
                    property_interests::LEAD_ID,
                    property_interests::PROPERTY_ID,
                    property_interests::STATUS,
                    property_interests::SCHEDULED_SHOWING,
                    property_interests::APPLICATION_SUBMITTED,
                    property_interests::CREATED_AT
                ),
                params![lead_id, property_id, InterestStatus::Interested, now],
            )?;
            Ok(inserted == 1)
        })
        .await
    }

    async fn mark_interests_scheduled(&self, lead_id: i64) -> Result<()> {
        self.run(move |conn| {
            conn.execute(
                &format!(
                    "UPDATE {} SET {} = ?1, {} = 1 WHERE {} = ?2 AND {} IN (?3, ?1)",
                    property_interests::TABLE,
                    property_interests::STATUS,
                    property_interests::SCHEDULED_SHOWING,
                    property_interests::LEAD_ID,
                    property_interests::STATUS
                ),
                params![InterestStatus::Scheduled, lead_id, InterestStatus::Interested],
            )?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl MessageStore for Database {
    async fn append_message(&self, message: NewMessage) -> Result<Message> {
        self.run(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}, {}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    messages::TABLE,
                    messages::LEAD_ID,
                    messages::PHONE,
                    messages::CONTENT,
                    messages::DIRECTION,
                    messages::SESSION_ID,
                    messages::IS_AI_GENERATED,
                    messages::STATUS,
                    messages::SENT_AT
                ),
                params![
                    message.lead_id,
                    message.phone,
                    message.content,
                    message.direction,
                    message.session_id,
                    message.is_ai_generated,
                    message.status,
                    message.sent_at
                ],
            )?;

            Ok(Message {
                id: conn.last_insert_rowid(),
                lead_id: message.lead_id,
                phone: message.phone,
                content: message.content,
                direction: message.direction,
                session_id: message.session_id,
                is_ai_generated: message.is_ai_generated,
                status: message.status,
                sent_at: message.sent_at,
            })
        })
        .await
    }

    async fn latest_message(&self, lead_id: i64) -> Result<Option<Message>> {
        self.run(move |conn| {
            let sql = format!(
                "SELECT {} FROM {} WHERE {} = ?1 ORDER BY {} DESC, {} DESC LIMIT 1",
                messages::COLUMNS,
                messages::TABLE,
                messages::LEAD_ID,
                messages::SENT_AT,
                messages::ID
            );
            Ok(Self::select_messages(conn, &sql, &[&lead_id])?.into_iter().next())
        })
        .await
    }

    async fn latest_incoming_at(&self, lead_id: i64) -> Result<Option<DateTime<Utc>>> {
        self.run(move |conn| {
            let latest = conn.query_row(
                &format!(
                    "SELECT MAX({}) FROM {} WHERE {} = ?1 AND {} = ?2",
                    messages::SENT_AT,
                    messages::TABLE,
                    messages::LEAD_ID,
                    messages::DIRECTION
                ),
                params![lead_id, Direction::Incoming],
                |row| row.get::<_, Option<DateTime<Utc>>>(0),
            )?;
            Ok(latest)
        })
        .await
    }

    async fn latest_ai_message(&self, lead_id: i64) -> Result<Option<Message>> {
        self.run(move |conn| {
            let sql = format!(
                "SELECT {} FROM {} WHERE {} = ?1 AND {} = 1 ORDER BY {} DESC, {} DESC LIMIT 1",
                messages::COLUMNS,
                messages::TABLE,
                messages::LEAD_ID,
                messages::IS_AI_GENERATED,
                messages::SENT_AT,
                messages::ID
            );
            Ok(Self::select_messages(conn, &sql, &[&lead_id])?.into_iter().next())
        })
        .await
    }

    async fn recent_messages(&self, lead_id: i64, limit: usize) -> Result<Vec<Message>> {
        self.run(move |conn| {
            let sql = format!(
                "SELECT {} FROM {} WHERE {} = ?1 ORDER BY {} DESC, {} DESC LIMIT ?2",
                messages::COLUMNS,
                messages::TABLE,
                messages::LEAD_ID,
                messages::SENT_AT,
                messages::ID
            );
            Self::select_messages(conn, &sql, &[&lead_id, &sql_limit(limit)])
        })
        .await
    }

    async fn session_messages(&self, session_id: SessionId) -> Result<Vec<Message>> {
        self.run(move |conn| {
            let sql = format!(
                "SELECT {} FROM {} WHERE {} = ?1 ORDER BY {} ASC, {} ASC",
                messages::COLUMNS,
                messages::TABLE,
                messages::SESSION_ID,
                messages::SENT_AT,
                messages::ID
            );
            Self::select_messages(conn, &sql, &[&session_id])
        })
        .await
    }
}

/// Whether `needle` occurs in `haystack` with no alphanumeric character on either side
fn contains_whole_words(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }

    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

#[async_trait]
impl PropertyCatalog for Database {
    async fn get_property(&self, property_id: i64) -> Result<Option<Property>> {
        self.run(move |conn| {
            let sql = format!(
                "SELECT {} FROM {} WHERE {} = ?1",
                properties::COLUMNS,
                properties::TABLE,
                properties::ID
            );
            Ok(Self::select_properties(conn, &sql, &[&property_id])?.into_iter().next())
        })
        .await
    }

    async fn find_by_address_fragment(&self, fragment: &str) -> Result<Option<Property>> {
        let fragment = fragment.trim().to_lowercase();
        if fragment.is_empty() {
            return Ok(None);
        }

        self.run(move |conn| {
            let sql = format!(
                "SELECT {cols} FROM {table} \
                 WHERE instr(lower({addr}), ?1) > 0 OR instr(?1, lower({addr})) > 0 \
                 ORDER BY {id}",
                cols = properties::COLUMNS,
                table = properties::TABLE,
                addr = properties::ADDRESS,
                id = properties::ID
            );
            let candidates = Self::select_properties(conn, &sql, &[&fragment])?;

            // A stored address inside the mention must stand as whole words
            Ok(candidates.into_iter().find(|property| {
                let address = property.address.to_lowercase();
                address.contains(&fragment) || contains_whole_words(&fragment, &address)
            }))
        })
        .await
    }

    async fn list_properties(&self) -> Result<Vec<Property>> {
        self.run(|conn| {
            let sql = format!(
                "SELECT {} FROM {} ORDER BY {}",
                properties::COLUMNS,
                properties::TABLE,
                properties::ID
            );
            Self::select_properties(conn, &sql, &[])
        })
        .await
    }

    async fn available_properties(&self, limit: usize) -> Result<Vec<Property>> {
        self.run(move |conn| {
            let sql = format!(
                "SELECT {} FROM {} WHERE {} = ?1 ORDER BY {} LIMIT ?2",
                properties::COLUMNS,
                properties::TABLE,
                properties::STATUS,
                properties::ID
            );
            Self::select_properties(conn, &sql, &[&PropertyStatus::Available, &sql_limit(limit)])
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_from_url_strips_scheme() {
        assert_eq!(Database::path_from_url("sqlite://data/a.db"), PathBuf::from("data/a.db"));
        assert_eq!(Database::path_from_url("sqlite:data/a.db"), PathBuf::from("data/a.db"));
        assert_eq!(Database::path_from_url("/tmp/a.db"), PathBuf::from("/tmp/a.db"));
    }

    #[test]
    fn test_contains_whole_words() {
        assert!(contains_whole_words("the place at 123 main st, springfield", "123 main st"));
        assert!(contains_whole_words("12 oak st", "12 oak st"));
        assert!(!contains_whole_words("112 oak st", "12 oak st"));
        assert!(!contains_whole_words("12 oak street", "12 oak st"));
        assert!(!contains_whole_words("anything", ""));
    }
}
