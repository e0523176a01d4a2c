//! Database schema definitions
//!
//! Table and column names used with rusqlite. The DDL lives in `migrations/`.

/// Leads table schema
pub mod leads {
    /// Table name
    pub const TABLE: &str = "leads";
    /// Primary key column
    pub const ID: &str = "id";
    /// E.164 phone column (unique)
    pub const PHONE: &str = "phone";
    /// Tenant name column
    pub const NAME: &str = "name";
    /// Email column
    pub const EMAIL: &str = "email";
    /// Monthly income column
    pub const INCOME: &str = "income";
    /// Pet ownership column (nullable boolean)
    pub const HAS_PETS: &str = "has_pets";
    /// Rental history column (nullable boolean)
    pub const RENTED_BEFORE: &str = "rented_before";
    /// Move-in date column
    pub const MOVE_IN_DATE: &str = "move_in_date";
    /// Funnel status column
    pub const STATUS: &str = "status";
    /// Unmatched property mention flag column
    pub const UNCERTAIN_INTEREST: &str = "uncertain_interest";
    /// Explicit identity verification flag column
    pub const ID_VERIFIED: &str = "id_verified";
    /// Identity document reference column
    pub const ID_DOCUMENT_REF: &str = "id_document_ref";
    /// Booked showing start column
    pub const SCHEDULED_SHOWING_AT: &str = "scheduled_showing_at";
    /// Creation timestamp column
    pub const CREATED_AT: &str = "created_at";
    /// Last update timestamp column
    pub const UPDATED_AT: &str = "updated_at";
    /// Last inbound contact column
    pub const LAST_CONTACT_AT: &str = "last_contact_at";

    /// Every column, in select order
    pub const COLUMNS: &str = "id, phone, name, email, income, has_pets, rented_before, move_in_date, \
        status, uncertain_interest, id_verified, id_document_ref, scheduled_showing_at, \
        created_at, updated_at, last_contact_at";
}

/// Messages table schema
pub mod messages {
    /// Table name
    pub const TABLE: &str = "messages";
    /// Primary key column
    pub const ID: &str = "id";
    /// Owning lead column
    pub const LEAD_ID: &str = "lead_id";
    /// Tenant phone column
    pub const PHONE: &str = "phone";
    /// Message text column
    pub const CONTENT: &str = "content";
    /// Direction column
    pub const DIRECTION: &str = "direction";
    /// Session column
    pub const SESSION_ID: &str = "session_id";
    /// AI authorship flag column
    pub const IS_AI_GENERATED: &str = "is_ai_generated";
    /// Delivery status column
    pub const STATUS: &str = "status";
    /// Timestamp column
    pub const SENT_AT: &str = "sent_at";

    /// Every column, in select order
    pub const COLUMNS: &str = "id, lead_id, phone, content, direction, session_id, is_ai_generated, status, sent_at";
}

/// Properties table schema
pub mod properties {
    /// Table name
    pub const TABLE: &str = "properties";
    /// Primary key column
    pub const ID: &str = "id";
    /// Street address column
    pub const ADDRESS: &str = "address";
    /// City column
    pub const CITY: &str = "city";
    /// State column
    pub const STATE: &str = "state";
    /// ZIP column
    pub const ZIP_CODE: &str = "zip_code";
    /// Bedrooms column
    pub const NUM_BEDROOMS: &str = "num_bedrooms";
    /// Bathrooms column
    pub const NUM_BATHROOMS: &str = "num_bathrooms";
    /// Square footage column
    pub const SQFT: &str = "sqft";
    /// Monthly rent column
    pub const RENT_PRICE: &str = "rent_price";
    /// Availability column
    pub const STATUS: &str = "status";
    /// Scheduling link column
    pub const CALENDLY_LINK: &str = "calendly_link";
    /// Listing timestamp column
    pub const CREATED_AT: &str = "created_at";

    /// Every column, in select order
    pub const COLUMNS: &str = "id, address, city, state, zip_code, num_bedrooms, num_bathrooms, sqft, \
        rent_price, status, calendly_link, created_at";
}

/// Property interests table schema
pub mod property_interests {
    /// Table name
    pub const TABLE: &str = "property_interests";
    /// Primary key column
    pub const ID: &str = "id";
    /// Lead column
    pub const LEAD_ID: &str = "lead_id";
    /// Property column
    pub const PROPERTY_ID: &str = "property_id";
    /// Interest sub-status column
    pub const STATUS: &str = "status";
    /// Showing booked column
    pub const SCHEDULED_SHOWING: &str = "scheduled_showing";
    /// Application submitted column
    pub const APPLICATION_SUBMITTED: &str = "application_submitted";
    /// Creation timestamp column
    pub const CREATED_AT: &str = "created_at";

    /// Every column, in select order
    pub const COLUMNS: &str =
        "id, lead_id, property_id, status, scheduled_showing, application_submitted, created_at";
}
