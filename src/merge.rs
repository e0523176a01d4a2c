//! Lead merge policy.
//!
//! A declarative table says, per lead field, how a raw extracted value is
//! validated and when it may overwrite what the lead already holds. One generic
//! function applies the table.

use chrono::NaiveDate;

use crate::extractor::{RawExtraction, RawValue};
use crate::models::{self, Lead};
use crate::validation::InputValidator;

/// A scalar lead field the extractor may fill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeadField {
    Name,
    Email,
    Income,
    HasPets,
    RentedBefore,
    MoveInDate,
}

impl LeadField {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Email => "email",
            Self::Income => "income",
            Self::HasPets => "has_pets",
            Self::RentedBefore => "rented_before",
            Self::MoveInDate => "move_in_date",
        }
    }

    fn occupancy(self, lead: &Lead) -> Occupancy {
        let filled = match self {
            Self::Name => lead.display_name().is_some(),
            Self::Email => lead.email.as_deref().is_some_and(|e| !e.trim().is_empty()),
            Self::Income => match lead.income {
                None => return Occupancy::Empty,
                Some(0) => return Occupancy::Zero,
                Some(_) => true,
            },
            Self::HasPets => lead.has_pets.is_some(),
            Self::RentedBefore => lead.rented_before.is_some(),
            Self::MoveInDate => lead.move_in_date.is_some(),
        };

        if filled {
            Occupancy::Filled
        } else {
            Occupancy::Empty
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Occupancy {
    Empty,
    Zero,
    Filled,
}

/// When an extracted value may replace the current one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overwrite {
    /// Only while the field is unset
    WhenEmpty,
    /// While the field is unset or holds zero
    WhenEmptyOrZero,
}

impl Overwrite {
    const fn allows(self, occupancy: Occupancy) -> bool {
        match self {
            Self::WhenEmpty => matches!(occupancy, Occupancy::Empty),
            Self::WhenEmptyOrZero => !matches!(occupancy, Occupancy::Filled),
        }
    }
}

/// A validated value ready to be written to a lead
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Amount(i64),
    Flag(bool),
    Date(NaiveDate),
}

/// How one field is validated and merged
#[derive(Debug, Clone, Copy)]
pub struct FieldPolicy {
    pub field: LeadField,
    pub overwrite: Overwrite,
    pub validate: fn(&RawExtraction) -> Option<FieldValue>,
}

/// The merge policy, one row per field
pub const MERGE_POLICY: [FieldPolicy; 6] = [
    FieldPolicy {
        field: LeadField::Name,
        overwrite: Overwrite::WhenEmpty,
        validate: validate_name,
    },
    FieldPolicy {
        field: LeadField::Email,
        overwrite: Overwrite::WhenEmpty,
        validate: validate_email,
    },
    FieldPolicy {
        field: LeadField::Income,
        overwrite: Overwrite::WhenEmptyOrZero,
        validate: validate_income,
    },
    FieldPolicy {
        field: LeadField::HasPets,
        overwrite: Overwrite::WhenEmpty,
        validate: validate_has_pets,
    },
    FieldPolicy {
        field: LeadField::RentedBefore,
        overwrite: Overwrite::WhenEmpty,
        validate: validate_rented_before,
    },
    FieldPolicy {
        field: LeadField::MoveInDate,
        overwrite: Overwrite::WhenEmpty,
        validate: validate_move_in_date,
    },
];

fn validate_name(raw: &RawExtraction) -> Option<FieldValue> {
    let name = raw.name.as_ref()?.as_text()?;
    (!models::is_placeholder_name(name) && name.chars().count() <= 100).then(|| FieldValue::Text(name.to_string()))
}

fn validate_email(raw: &RawExtraction) -> Option<FieldValue> {
    let email = raw.email.as_ref()?.as_text()?;
    if InputValidator::is_valid_email(email) {
        Some(FieldValue::Text(email.to_string()))
    } else {
        tracing::debug!(email, "Dropping invalid email");
        None
    }
}

fn validate_income(raw: &RawExtraction) -> Option<FieldValue> {
    let amount = match raw.income.as_ref()? {
        RawValue::Number(n) if n.is_finite() && *n >= 0.0 && *n < 1e12 => {
            #[allow(clippy::cast_possible_truncation)]
            Some(n.round() as i64)
        }
        RawValue::Text(text) => InputValidator::parse_money(text),
        _ => None,
    };
    amount.map(FieldValue::Amount)
}

fn validate_move_in_date(raw: &RawExtraction) -> Option<FieldValue> {
    let value = raw.move_in_date.as_ref()?.as_text()?;
    match InputValidator::parse_date(value) {
        Ok(date) => Some(FieldValue::Date(date)),
        Err(e) => {
            tracing::warn!(error = %e, "Dropping move-in date");
            None
        }
    }
}

fn validate_has_pets(raw: &RawExtraction) -> Option<FieldValue> {
    flag(raw.has_pets.as_ref())
}

fn validate_rented_before(raw: &RawExtraction) -> Option<FieldValue> {
    flag(raw.rented_before.as_ref())
}

fn flag(value: Option<&RawValue>) -> Option<FieldValue> {
    let parsed = match value? {
        RawValue::Flag(b) => Some(*b),
        RawValue::Number(n) if n.abs() < f64::EPSILON => Some(false),
        RawValue::Number(n) if (n - 1.0).abs() < f64::EPSILON => Some(true),
        RawValue::Text(text) => InputValidator::parse_flag(text),
        _ => None,
    };
    parsed.map(FieldValue::Flag)
}

/// Write `value` into `field`. Returns whether the lead changed.
fn assign(lead: &mut Lead, field: LeadField, value: FieldValue) -> bool {
    match (field, value) {
        (LeadField::Name, FieldValue::Text(name)) => replace(&mut lead.name, name),
        (LeadField::Email, FieldValue::Text(email)) => replace(&mut lead.email, email),
        (LeadField::Income, FieldValue::Amount(amount)) => replace(&mut lead.income, amount),
        (LeadField::HasPets, FieldValue::Flag(flag)) => replace(&mut lead.has_pets, flag),
        (LeadField::RentedBefore, FieldValue::Flag(flag)) => replace(&mut lead.rented_before, flag),
        (LeadField::MoveInDate, FieldValue::Date(date)) => replace(&mut lead.move_in_date, date),
        (field, value) => {
            tracing::error!(field = field.as_str(), ?value, "Merge policy produced a value of the wrong kind");
            false
        }
    }
}

fn replace<T: PartialEq>(slot: &mut Option<T>, value: T) -> bool {
    if slot.as_ref() == Some(&value) {
        return false;
    }
    *slot = Some(value);
    true
}

/// Apply an extraction to a lead under [`MERGE_POLICY`].
///
/// Returns whether any field changed. `property_address` is not merged here;
/// it goes to [`crate::matching`].
pub fn merge(lead: &mut Lead, extracted: &RawExtraction) -> bool {
    let mut changed = false;

    for policy in &MERGE_POLICY {
        if !policy.overwrite.allows(policy.field.occupancy(lead)) {
            continue;
        }

        let Some(value) = (policy.validate)(extracted) else {
            continue;
        };

        if assign(lead, policy.field, value) {
            tracing::debug!(lead_id = lead.id, field = policy.field.as_str(), "Merged extracted field");
            changed = true;
        }
    }

    changed
}
