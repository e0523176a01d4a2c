//! Storage seams the funnel talks to.
//!
//! The funnel never touches SQL; it only sees these traits. [`crate::db::Database`]
//! implements all three on SQLite.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Lead, LeadStatus, Message, NewMessage, Property, PropertyInterest, SessionId};

/// Lead records and their property interests
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Lead owning this E.164 phone number
    async fn find_by_phone(&self, phone: &str) -> Result<Option<Lead>>;

    /// Lead by primary key
    async fn get_lead(&self, lead_id: i64) -> Result<Option<Lead>>;

    /// Insert a blank `new` lead for this phone number
    async fn create_lead(&self, phone: &str, now: DateTime<Utc>) -> Result<Lead>;

    /// Persist every profile field of `lead`. Status is written only through
    /// [`LeadStore::set_status`].
    async fn save_profile(&self, lead: &Lead) -> Result<()>;

    /// Persist a new funnel status
    async fn set_status(&self, lead_id: i64, status: LeadStatus, now: DateTime<Utc>) -> Result<()>;

    /// Record inbound contact
    async fn touch_contact(&self, lead_id: i64, now: DateTime<Utc>) -> Result<()>;

    /// Property interests of a lead, oldest first
    async fn interests_for_lead(&self, lead_id: i64) -> Result<Vec<PropertyInterest>>;

    /// Create the (lead, property) association unless it exists.
    /// Returns whether a new row was created.
    async fn attach_interest(&self, lead_id: i64, property_id: i64, now: DateTime<Utc>) -> Result<bool>;

    /// Flag every active interest of a lead as having a booked showing
    async fn mark_interests_scheduled(&self, lead_id: i64) -> Result<()>;
}

/// Append-only conversation log
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a message
    async fn append_message(&self, message: NewMessage) -> Result<Message>;

    /// Most recent message of any direction for a lead
    async fn latest_message(&self, lead_id: i64) -> Result<Option<Message>>;

    /// Timestamp of the most recent inbound message for a lead
    async fn latest_incoming_at(&self, lead_id: i64) -> Result<Option<DateTime<Utc>>>;

    /// Most recent AI-written message for a lead
    async fn latest_ai_message(&self, lead_id: i64) -> Result<Option<Message>>;

    /// Up to `limit` messages for a lead, newest first
    async fn recent_messages(&self, lead_id: i64, limit: usize) -> Result<Vec<Message>>;

    /// Every message of a session, oldest first
    async fn session_messages(&self, session_id: SessionId) -> Result<Vec<Message>>;
}

/// Read access to the property catalog
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PropertyCatalog: Send + Sync {
    /// Property by primary key
    async fn get_property(&self, property_id: i64) -> Result<Option<Property>>;

    /// First property whose address contains `fragment`, or is contained in
    /// it, ignoring case
    async fn find_by_address_fragment(&self, fragment: &str) -> Result<Option<Property>>;

    /// The whole catalog
    async fn list_properties(&self) -> Result<Vec<Property>>;

    /// Up to `limit` properties open for showings
    async fn available_properties(&self, limit: usize) -> Result<Vec<Property>>;
}
