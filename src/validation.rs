use std::sync::OnceLock;

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use regex::Regex;

/// Longest SMS body we accept (ten concatenated segments)
pub const MAX_MESSAGE_LENGTH: usize = 1600;

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+$")
            .unwrap_or_else(|e| unreachable!("email pattern is a valid regex: {e}"))
    })
}

fn money_regex() -> &'static Regex {
    static MONEY: OnceLock<Regex> = OnceLock::new();
    MONEY.get_or_init(|| {
        Regex::new(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*(?:(k|thousand)\b)?")
            .unwrap_or_else(|e| unreachable!("money pattern is a valid regex: {e}"))
    })
}

/// Validation utilities for input sanitization and edge case handling
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Normalise a US phone number to `+1XXXXXXXXXX`.
    ///
    /// Ten digits get a `+1` prefix, eleven digits starting with `1` get a
    /// `+`. Anything else is rejected.
    pub fn normalize_phone(phone: &str) -> Result<String> {
        let digits: String = phone.chars().filter(char::is_ascii_digit).collect();

        match digits.len() {
            10 => Ok(format!("+1{digits}")),
            11 if digits.starts_with('1') => Ok(format!("+{digits}")),
            0 => Err(anyhow!("Phone number cannot be empty")),
            n => Err(anyhow!("Phone number must have 10 digits, or 11 starting with 1 (got {n})")),
        }
    }

    /// Validate an already-normalised phone number
    pub fn validate_phone(phone: &str) -> Result<()> {
        let well_formed = phone.len() == 12
            && phone.starts_with("+1")
            && phone[1..].chars().all(|c| c.is_ascii_digit());

        if well_formed {
            Ok(())
        } else {
            Err(anyhow!("Phone number must look like +1XXXXXXXXXX: {phone}"))
        }
    }

    /// Basic syntactic email check.
    #[must_use]
    pub fn is_valid_email(email: &str) -> bool {
        let email = email.trim();
        !email.is_empty() && email.len() <= 254 && email_regex().is_match(email)
    }

    /// Parse a strict `YYYY-MM-DD` date
    pub fn parse_date(value: &str) -> Result<NaiveDate> {
        NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
            .map_err(|e| anyhow!("Invalid date '{value}', expected YYYY-MM-DD: {e}"))
    }

    /// Read a monthly amount out of free text: "3000", "$3,000", "3k", "3.5k/month".
    #[must_use]
    pub fn parse_money(text: &str) -> Option<i64> {
        let captures = money_regex().captures(text)?;
        let number: f64 = captures.get(1)?.as_str().replace(',', "").parse().ok()?;
        let scaled = if captures.get(2).is_some() {
            number * 1000.0
        } else {
            number
        };

        if scaled.is_finite() && scaled >= 0.0 && scaled < 1e12 {
            #[allow(clippy::cast_possible_truncation)]
            Some(scaled.round() as i64)
        } else {
            None
        }
    }

    /// Coerce a truthy/falsy word to a boolean
    #[must_use]
    pub fn parse_flag(text: &str) -> Option<bool> {
        match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" | "yeah" | "yep" => Some(true),
            "false" | "no" | "n" | "0" | "none" | "nope" => Some(false),
            _ => None,
        }
    }

    /// Validate an inbound message body after sanitising it
    pub fn validate_message_body(body: &str) -> Result<String> {
        let cleaned = Self::sanitize_text(body);

        if cleaned.is_empty() {
            return Err(anyhow!("Message body cannot be empty"));
        }

        if cleaned.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(anyhow!(
                "Message body too long (max {MAX_MESSAGE_LENGTH} characters)"
            ));
        }

        Ok(cleaned)
    }

    /// Sanitize text input
    #[must_use]
    pub fn sanitize_text(text: &str) -> String {
        text.chars()
            .filter(|c| !c.is_control() || *c == '\n' || *c == '\t' || *c == '\r')
            .collect::<String>()
            .trim()
            .to_string()
    }

    /// Validate database URL
    pub fn validate_database_url(url: &str) -> Result<()> {
        if url.trim().is_empty() {
            return Err(anyhow!("Database URL cannot be empty"));
        }

        if !url.starts_with("sqlite:") {
            return Err(anyhow!("Only SQLite databases are supported"));
        }

        if url.len() > 1000 {
            return Err(anyhow!("Database URL too long"));
        }

        Ok(())
    }
}
