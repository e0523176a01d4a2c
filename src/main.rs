use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing::info;

use leasebot::ai::OpenAiBackend;
use leasebot::clock::SystemClock;
use leasebot::config::AppConfig;
use leasebot::logging::init_logging;
use leasebot::metrics::MetricsCollector;
use leasebot::models::{NewProperty, PropertyStatus};
use leasebot::repository::{LeadStore, MessageStore};
use leasebot::transport::{LogTransport, SmsTransport, TwilioTransport};
use leasebot::validation::InputValidator;
use leasebot::{Database, FunnelService};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process one inbound SMS and send the reply
    Inbound {
        /// Sender phone number
        #[arg(short, long)]
        from: String,

        /// Message text
        #[arg(short, long)]
        body: String,
    },
    /// Add a property to the catalog
    AddProperty {
        /// Street address
        #[arg(long)]
        address: String,

        #[arg(long)]
        city: String,

        #[arg(long)]
        state: String,

        #[arg(long)]
        zip: String,

        #[arg(long)]
        bedrooms: i64,

        #[arg(long)]
        bathrooms: i64,

        /// Monthly rent
        #[arg(long)]
        rent: i64,

        #[arg(long)]
        sqft: Option<i64>,

        /// Scheduling link for showings
        #[arg(long)]
        calendly_link: Option<String>,
    },
    /// Record an uploaded identity document for a lead
    VerifyId {
        /// Lead phone number
        #[arg(short, long)]
        phone: String,

        /// Where the document is stored
        #[arg(short, long)]
        document_ref: String,
    },
    /// Record a booked showing
    ShowingScheduled {
        /// Lead phone number
        #[arg(short, long)]
        phone: String,

        /// Showing start, RFC 3339
        #[arg(short, long)]
        start_time: String,
    },
    /// Print a lead with its interests and recent messages
    ShowLead {
        /// Lead phone number
        #[arg(short, long)]
        phone: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging; the guard flushes the file writer on exit
    let _guard = init_logging(
        Some(&config.get_log_level()),
        config.logging.file_path.as_deref().map(Path::new),
        config.logging.format == "json",
    )?;
    MetricsCollector::default().describe();
    info!("Starting leasebot");

    // Parse command line arguments
    let cli = Cli::parse();

    // Initialize database with configuration
    let db = Database::from_config(&config.database).context("Failed to open database")?;

    match cli.command {
        Commands::Inbound { from, body } => {
            let service = build_service(&config, db)?;
            let outcome = service.handle_inbound(&from, &body).await?;
            println!("{}", serde_json::to_string_pretty(&outcome_json(&outcome))?);
        }
        Commands::AddProperty {
            address,
            city,
            state,
            zip,
            bedrooms,
            bathrooms,
            rent,
            sqft,
            calendly_link,
        } => {
            let property = db
                .add_property(NewProperty {
                    address,
                    city,
                    state,
                    zip_code: zip,
                    num_bedrooms: bedrooms,
                    num_bathrooms: bathrooms,
                    sqft,
                    rent_price: rent,
                    status: PropertyStatus::Available,
                    calendly_link,
                })
                .await?;
            info!(property_id = property.id, "Property added");
            println!("{}", serde_json::to_string_pretty(&property)?);
        }
        Commands::VerifyId { phone, document_ref } => {
            let lead = find_lead(&db, &phone).await?;
            let service = build_service(&config, db)?;
            let changed = service.record_id_document(lead.id, &document_ref).await?;
            println!("{}", json!({ "lead_id": lead.id, "status_changed": changed }));
        }
        Commands::ShowingScheduled { phone, start_time } => {
            let start_time = DateTime::parse_from_rfc3339(&start_time)
                .with_context(|| format!("Invalid start time: {start_time}"))?
                .with_timezone(&Utc);
            let service = build_service(&config, db)?;
            let lead = service.record_showing_scheduled(&phone, start_time).await?;
            println!("{}", serde_json::to_string_pretty(&lead)?);
        }
        Commands::ShowLead { phone } => {
            let lead = find_lead(&db, &phone).await?;
            let interests = db.interests_for_lead(lead.id).await?;
            let mut messages = db.recent_messages(lead.id, config.funnel.history_limit).await?;
            messages.reverse();

            let summary = json!({
                "lead": lead,
                "interests": interests,
                "messages": messages,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

fn build_service(config: &AppConfig, db: Database) -> Result<FunnelService> {
    let backend = Arc::new(OpenAiBackend::from_config(&config.ai)?);

    let transport: Arc<dyn SmsTransport> = match config.sms.provider.as_str() {
        "twilio" => Arc::new(TwilioTransport::from_config(&config.sms)?),
        _ => Arc::new(LogTransport),
    };

    Ok(FunnelService::with_database(
        db,
        backend,
        transport,
        Arc::new(SystemClock),
        config,
    ))
}

async fn find_lead(db: &Database, phone: &str) -> Result<leasebot::Lead> {
    let phone = InputValidator::normalize_phone(phone)?;
    db.find_by_phone(&phone)
        .await?
        .with_context(|| format!("No lead with phone {phone}"))
}

fn outcome_json(outcome: &leasebot::InboundOutcome) -> serde_json::Value {
    match outcome {
        leasebot::InboundOutcome::Deferred { lead_id, session_id } => json!({
            "outcome": "deferred",
            "lead_id": lead_id,
            "session_id": session_id,
        }),
        leasebot::InboundOutcome::Replied {
            lead_id,
            session_id,
            reply,
            status,
            delivered,
        } => json!({
            "outcome": "replied",
            "lead_id": lead_id,
            "session_id": session_id,
            "reply": reply,
            "status": status,
            "delivered": delivered,
        }),
    }
}
