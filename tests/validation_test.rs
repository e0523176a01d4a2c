//! Tests for input validation and coercion helpers

use chrono::NaiveDate;
use leasebot::validation::{InputValidator, MAX_MESSAGE_LENGTH};

#[test]
fn test_normalize_ten_digit_phone() {
    assert_eq!(InputValidator::normalize_phone("555-123-4567").unwrap(), "+15551234567");
    assert_eq!(InputValidator::normalize_phone("(555) 123 4567").unwrap(), "+15551234567");
}

#[test]
fn test_normalize_eleven_digit_phone() {
    assert_eq!(InputValidator::normalize_phone("+1 555 123 4567").unwrap(), "+15551234567");
    assert_eq!(InputValidator::normalize_phone("15551234567").unwrap(), "+15551234567");
}

#[test]
fn test_normalize_rejects_bad_phones() {
    assert!(InputValidator::normalize_phone("").is_err());
    assert!(InputValidator::normalize_phone("12345").is_err());
    assert!(InputValidator::normalize_phone("25551234567").is_err());
    assert!(InputValidator::normalize_phone("+44 20 7946 0958 12").is_err());
}

#[test]
fn test_validate_phone() {
    assert!(InputValidator::validate_phone("+15551234567").is_ok());
    assert!(InputValidator::validate_phone("5551234567").is_err());
    assert!(InputValidator::validate_phone("+1555123456a").is_err());
}

#[test]
fn test_email_validation() {
    assert!(InputValidator::is_valid_email("jane.doe+rent@example.com"));
    assert!(InputValidator::is_valid_email("  jane@example.co.uk "));
    assert!(!InputValidator::is_valid_email(""));
    assert!(!InputValidator::is_valid_email("jane@"));
    assert!(!InputValidator::is_valid_email("jane at example.com"));
}

#[test]
fn test_parse_date_is_strict() {
    assert_eq!(
        InputValidator::parse_date("2026-03-15").unwrap(),
        NaiveDate::from_ymd_opt(2026, 3, 15).unwrap()
    );
    assert!(InputValidator::parse_date("03/15/2026").is_err());
    assert!(InputValidator::parse_date("2026-02-30").is_err());
    assert!(InputValidator::parse_date("next month").is_err());
}

#[test]
fn test_parse_money() {
    assert_eq!(InputValidator::parse_money("3000"), Some(3000));
    assert_eq!(InputValidator::parse_money("$3,000"), Some(3000));
    assert_eq!(InputValidator::parse_money("3k"), Some(3000));
    assert_eq!(InputValidator::parse_money("3.5k/month"), Some(3500));
    assert_eq!(InputValidator::parse_money("about 4 thousand a month"), Some(4000));
    assert_eq!(InputValidator::parse_money("a lot"), None);
}

#[test]
fn test_parse_flag() {
    assert_eq!(InputValidator::parse_flag("Yes"), Some(true));
    assert_eq!(InputValidator::parse_flag("y"), Some(true));
    assert_eq!(InputValidator::parse_flag("1"), Some(true));
    assert_eq!(InputValidator::parse_flag("no"), Some(false));
    assert_eq!(InputValidator::parse_flag("FALSE"), Some(false));
    assert_eq!(InputValidator::parse_flag("maybe"), None);
}

#[test]
fn test_message_body_is_sanitized() {
    assert_eq!(
        InputValidator::validate_message_body("  hello\u{0007} there \n").unwrap(),
        "hello there"
    );
}

#[test]
fn test_message_body_bounds() {
    assert!(InputValidator::validate_message_body("").is_err());
    assert!(InputValidator::validate_message_body(" \u{0000} ").is_err());

    let longest = "a".repeat(MAX_MESSAGE_LENGTH);
    assert!(InputValidator::validate_message_body(&longest).is_ok());

    let too_long = "a".repeat(MAX_MESSAGE_LENGTH + 1);
    assert!(InputValidator::validate_message_body(&too_long).is_err());
}

#[test]
fn test_database_url_validation() {
    assert!(InputValidator::validate_database_url("sqlite:data/leasebot.db").is_ok());
    assert!(InputValidator::validate_database_url("sqlite://tmp/leasebot.db").is_ok());
    assert!(InputValidator::validate_database_url("").is_err());
    assert!(InputValidator::validate_database_url("mysql://localhost").is_err());
}
