//! Data models for leads, messages and the property catalog
//!
//! This module contains the records the funnel reads and writes. Enum-like
//! columns (lead status, message direction, ...) are closed Rust enums that
//! round-trip through their snake_case names.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FunnelError;

/// Stage of a lead in the leasing funnel.
///
/// Declaration order is funnel order; `Ord` follows it, so "moving forward"
/// means comparing with `>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// First contact, nothing known yet
    New,
    /// Tenant gave their name and is talking about a showing
    InterestedInShowing,
    /// A property is identified; identity verification was requested
    IdVerificationRequested,
    /// Identity document received or verified
    IdVerified,
    /// A showing is on the calendar
    ShowingScheduled,
    /// The tenant toured the property
    ShowingCompleted,
    /// Application link sent
    ApplicationSent,
    /// Application submitted by the tenant
    ApplicationReceived,
    /// Background and credit screening running
    ScreeningInProgress,
    /// Screening passed
    Approved,
    /// Screening failed or the lead was turned down
    Rejected,
    /// Lease document sent
    LeaseSent,
    /// Lease signed
    LeaseSigned,
    /// Waiting for deposit or first payment
    PaymentPending,
    /// Tenant moved in
    MovedIn,
    /// Lead went cold or was closed by hand
    Inactive,
}

impl LeadStatus {
    /// Every status in funnel order.
    pub const ALL: [Self; 16] = [
        Self::New,
        Self::InterestedInShowing,
        Self::IdVerificationRequested,
        Self::IdVerified,
        Self::ShowingScheduled,
        Self::ShowingCompleted,
        Self::ApplicationSent,
        Self::ApplicationReceived,
        Self::ScreeningInProgress,
        Self::Approved,
        Self::Rejected,
        Self::LeaseSent,
        Self::LeaseSigned,
        Self::PaymentPending,
        Self::MovedIn,
        Self::Inactive,
    ];

    /// The stored name of this status
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::InterestedInShowing => "interested_in_showing",
            Self::IdVerificationRequested => "id_verification_requested",
            Self::IdVerified => "id_verified",
            Self::ShowingScheduled => "showing_scheduled",
            Self::ShowingCompleted => "showing_completed",
            Self::ApplicationSent => "application_sent",
            Self::ApplicationReceived => "application_received",
            Self::ScreeningInProgress => "screening_in_progress",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::LeaseSent => "lease_sent",
            Self::LeaseSigned => "lease_signed",
            Self::PaymentPending => "payment_pending",
            Self::MovedIn => "moved_in",
            Self::Inactive => "inactive",
        }
    }

    /// No automatic advancement is defined out of these.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::MovedIn | Self::Inactive)
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = FunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| FunnelError::InvalidStatus(s.to_string()))
    }
}

/// Whether a message came from the tenant or went out to them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Tenant to us
    Incoming,
    /// Us to tenant
    Outgoing,
}

impl Direction {
    /// The stored name of this direction
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Incoming => "incoming",
            Self::Outgoing => "outgoing",
        }
    }
}

impl FromStr for Direction {
    type Err = FunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incoming" => Ok(Self::Incoming),
            "outgoing" => Ok(Self::Outgoing),
            other => Err(FunnelError::Other(format!("unknown message direction: {other}"))),
        }
    }
}

/// Delivery state of a logged message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    /// Inbound message stored
    Received,
    /// Outbound message accepted by the SMS provider
    Sent,
    /// Outbound message the provider refused
    Failed,
}

impl MessageStatus {
    /// The stored name of this status
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for MessageStatus {
    type Err = FunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(Self::Received),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            other => Err(FunnelError::Other(format!("unknown message status: {other}"))),
        }
    }
}

/// Sub-status of a lead's interest in one property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterestStatus {
    /// Lead asked about the property
    Interested,
    /// A showing is booked for this property
    Scheduled,
    /// Lead applied for this property
    Applied,
    /// Lead dropped this property
    NotInterested,
}

impl InterestStatus {
    /// The stored name of this status
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Interested => "interested",
            Self::Scheduled => "scheduled",
            Self::Applied => "applied",
            Self::NotInterested => "not_interested",
        }
    }
}

impl FromStr for InterestStatus {
    type Err = FunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interested" => Ok(Self::Interested),
            "scheduled" => Ok(Self::Scheduled),
            "applied" => Ok(Self::Applied),
            "not_interested" => Ok(Self::NotInterested),
            other => Err(FunnelError::Other(format!("unknown interest status: {other}"))),
        }
    }
}

/// Availability of a catalog property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyStatus {
    /// Open for showings
    Available,
    /// Leased
    Occupied,
    /// Temporarily off the market
    Maintenance,
}

impl PropertyStatus {
    /// The stored name of this status
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Occupied => "occupied",
            Self::Maintenance => "maintenance",
        }
    }
}

impl FromStr for PropertyStatus {
    type Err = FunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(Self::Available),
            "occupied" => Ok(Self::Occupied),
            "maintenance" => Ok(Self::Maintenance),
            other => Err(FunnelError::Other(format!("unknown property status: {other}"))),
        }
    }
}

/// Identifier grouping a burst of messages into one conversational turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Mint a fresh random session id
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = FunnelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| FunnelError::Other(format!("invalid session id {s}: {e}")))
    }
}

/// A prospective tenant tracked through the funnel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    /// Database primary key
    pub id: i64,
    /// E.164 phone number, unique per lead
    pub phone: String,
    /// Tenant's name
    pub name: Option<String>,
    /// Tenant's email address
    pub email: Option<String>,
    /// Monthly income
    pub income: Option<i64>,
    /// Whether the tenant has pets (unknown until stated)
    pub has_pets: Option<bool>,
    /// Whether the tenant has rented before (unknown until stated)
    pub rented_before: Option<bool>,
    /// Expected move-in date
    pub move_in_date: Option<NaiveDate>,
    /// Current funnel stage
    pub status: LeadStatus,
    /// Tenant named a property we could not match to the catalog
    pub uncertain_interest: bool,
    /// Identity explicitly verified
    pub id_verified: bool,
    /// Reference to an uploaded identity document
    pub id_document_ref: Option<String>,
    /// Start of the booked showing
    pub scheduled_showing_at: Option<DateTime<Utc>>,
    /// Row creation time
    pub created_at: DateTime<Utc>,
    /// Last profile or status change
    pub updated_at: DateTime<Utc>,
    /// Last inbound contact
    pub last_contact_at: Option<DateTime<Utc>>,
}

impl Lead {
    /// A blank lead in the `new` stage
    #[must_use]
    pub fn new(id: i64, phone: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            phone: phone.into(),
            name: None,
            email: None,
            income: None,
            has_pets: None,
            rented_before: None,
            move_in_date: None,
            status: LeadStatus::New,
            uncertain_interest: false,
            id_verified: false,
            id_document_ref: None,
            scheduled_showing_at: None,
            created_at: now,
            updated_at: now,
            last_contact_at: None,
        }
    }

    /// Name to address the tenant by, if a real one is known
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty() && !is_placeholder_name(name))
    }
}

/// Names that mean "no name"
pub const NAME_PLACEHOLDERS: [&str; 5] = ["unknown", "n/a", "na", "null", "none"];

/// Whether `name` is one of [`NAME_PLACEHOLDERS`], ignoring case and surrounding space
#[must_use]
pub fn is_placeholder_name(name: &str) -> bool {
    let name = name.trim();
    NAME_PLACEHOLDERS.iter().any(|p| name.eq_ignore_ascii_case(p))
}

/// A lead's interest in a specific catalog property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyInterest {
    /// Database primary key
    pub id: i64,
    /// Interested lead
    pub lead_id: i64,
    /// Property of interest
    pub property_id: i64,
    /// Sub-status of this interest
    pub status: InterestStatus,
    /// A showing has been booked
    pub scheduled_showing: bool,
    /// An application was submitted
    pub application_submitted: bool,
    /// When the interest was recorded
    pub created_at: DateTime<Utc>,
}

/// A rentable property in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Database primary key
    pub id: i64,
    /// Street address, e.g. "123 Main St"
    pub address: String,
    /// City
    pub city: String,
    /// State code
    pub state: String,
    /// ZIP code
    pub zip_code: String,
    /// Bedroom count
    pub num_bedrooms: i64,
    /// Bathroom count
    pub num_bathrooms: i64,
    /// Square footage, when known
    pub sqft: Option<i64>,
    /// Monthly rent
    pub rent_price: i64,
    /// Availability
    pub status: PropertyStatus,
    /// Scheduling link for showings
    pub calendly_link: Option<String>,
    /// When the property was listed
    pub created_at: DateTime<Utc>,
}

impl Property {
    /// "123 Main St, Springfield, IL 62701"
    #[must_use]
    pub fn full_address(&self) -> String {
        format!("{}, {}, {} {}", self.address, self.city, self.state, self.zip_code)
    }
}

/// Data for listing a new property
#[derive(Debug, Clone)]
pub struct NewProperty {
    /// Street address
    pub address: String,
    /// City
    pub city: String,
    /// State code
    pub state: String,
    /// ZIP code
    pub zip_code: String,
    /// Bedroom count
    pub num_bedrooms: i64,
    /// Bathroom count
    pub num_bathrooms: i64,
    /// Square footage
    pub sqft: Option<i64>,
    /// Monthly rent
    pub rent_price: i64,
    /// Availability
    pub status: PropertyStatus,
    /// Scheduling link for showings
    pub calendly_link: Option<String>,
}

/// An immutable entry in the conversation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Database primary key
    pub id: i64,
    /// Lead the message belongs to
    pub lead_id: i64,
    /// Tenant phone number
    pub phone: String,
    /// Message text
    pub content: String,
    /// Incoming or outgoing
    pub direction: Direction,
    /// Burst this message belongs to
    pub session_id: SessionId,
    /// Written by the AI backend
    pub is_ai_generated: bool,
    /// Delivery state
    pub status: MessageStatus,
    /// When the message was received or sent
    pub sent_at: DateTime<Utc>,
}

/// Data for appending a message to the log
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Lead the message belongs to
    pub lead_id: i64,
    /// Tenant phone number
    pub phone: String,
    /// Message text
    pub content: String,
    /// Incoming or outgoing
    pub direction: Direction,
    /// Burst this message belongs to
    pub session_id: SessionId,
    /// Written by the AI backend
    pub is_ai_generated: bool,
    /// Delivery state
    pub status: MessageStatus,
    /// When the message was received or sent
    pub sent_at: DateTime<Utc>,
}

impl NewMessage {
    /// An inbound tenant text
    #[must_use]
    pub fn incoming(
        lead: &Lead,
        content: impl Into<String>,
        session_id: SessionId,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            lead_id: lead.id,
            phone: lead.phone.clone(),
            content: content.into(),
            direction: Direction::Incoming,
            session_id,
            is_ai_generated: false,
            status: MessageStatus::Received,
            sent_at,
        }
    }

    /// An outbound AI-written reply
    #[must_use]
    pub fn ai_reply(
        lead: &Lead,
        content: impl Into<String>,
        session_id: SessionId,
        status: MessageStatus,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            lead_id: lead.id,
            phone: lead.phone.clone(),
            content: content.into(),
            direction: Direction::Outgoing,
            session_id,
            is_ai_generated: true,
            status,
            sent_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_its_name() {
        for status in LeadStatus::ALL {
            assert_eq!(status.as_str().parse::<LeadStatus>().ok(), Some(status));
        }
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        assert!(matches!(
            "qualified".parse::<LeadStatus>(),
            Err(FunnelError::InvalidStatus(_))
        ));
    }

    #[test]
    fn test_status_order_follows_funnel() {
        assert!(LeadStatus::New < LeadStatus::InterestedInShowing);
        assert!(LeadStatus::IdVerified < LeadStatus::ShowingScheduled);
        assert!(LeadStatus::Rejected > LeadStatus::ShowingScheduled);
        assert!(LeadStatus::Inactive.is_terminal());
    }

    #[test]
    fn test_display_name_ignores_placeholder() {
        let mut lead = Lead::new(1, "+15551234567", Utc::now());
        assert_eq!(lead.display_name(), None);
        lead.name = Some("Unknown".to_string());
        assert_eq!(lead.display_name(), None);
        lead.name = Some(" N/A ".to_string());
        assert_eq!(lead.display_name(), None);
        lead.name = Some(" Jane Doe ".to_string());
        assert_eq!(lead.display_name(), Some("Jane Doe"));
    }
}
