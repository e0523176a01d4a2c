//! Leasebot - SMS Leasing Funnel
//!
//! A Rust library that runs an SMS leasing assistant: inbound tenant texts are
//! coalesced into conversational turns, mined for facts by an AI backend, and
//! used to move a lead through a fixed leasing funnel while a reply goes back
//! over SMS.
//!
//! # Features
//!
//! - Burst coalescing and session grouping of rapid-fire texts
//! - AI fact extraction with a strict fill-only-if-empty merge policy
//! - Substring and fuzzy matching of property mentions to the catalog
//! - Deterministic, forward-only lead status engine
//! - Status-aware reply composition with a static fallback
//! - SQLite persistence with connection pooling

/// Chat-completions backend
pub mod ai;
/// Time source
pub mod clock;
/// Reply composition
pub mod composer;
/// Configuration management
pub mod config;
/// Database operations and connection pooling
pub mod db;
/// Error types
pub mod error;
/// AI fact extraction
pub mod extractor;
/// Logging setup and utilities
pub mod logging;
/// Property address matching
pub mod matching;
/// Lead merge policy
pub mod merge;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Storage traits
pub mod repository;
/// Database schema definitions
pub mod schema;
/// Funnel orchestration
pub mod service;
/// Session assignment and burst coalescing
pub mod session;
/// Lead status engine
pub mod status;
/// Outbound SMS delivery
pub mod transport;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use db::Database;
pub use error::{FunnelError, Result};
pub use models::{Lead, LeadStatus, Message, Property};
pub use service::{FunnelService, InboundOutcome};
