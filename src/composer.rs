//! Reply generation.
//!
//! Every reply is steered by a [`MissingInfo`] directive: the one thing the
//! funnel wants from the tenant next, derived from the lead's status and the
//! facts still missing. The AI backend phrases the reply around the directive
//! and the FAQ; when it fails, the directive's own text is sent instead.

use std::sync::Arc;

use crate::ai::{ChatMessage, CompletionBackend};
use crate::models::{Direction, Lead, LeadStatus, Message, Property};
use crate::status::{self, RequiredField};

/// Questions tenants ask most, with the answers the assistant may give
const KNOWLEDGE_BASE: &str = "\
- What is the rent? Rent varies by property. Ask which one they are interested in.
- Are utilities included? Some leases include utilities, others do not.
- What is the pet policy? Some properties allow pets with restrictions. Ask whether they have a pet.
- What's the lease term? Most leases are 12 months; other options may be available.
- Is parking included? It varies by property: some have assigned spots, others street parking.
- How much is the security deposit? Typically one month's rent, but it varies by property.
- What's the move-in process? Once approved: sign the lease, pay the deposit, pick a move-in date.
- Do you accept Section 8? Some properties do. Offer to check availability.";

const RESPONSE_RULES: &str = "\
1. Answer the tenant's questions first, using the FAQ.
2. Do not start with \"Hi\" or \"Hello\" unless the tenant greeted you first.
3. Never repeat something you already said earlier in the conversation.
4. Keep it short and natural, like a person texting. No formal or robotic phrasing.
5. Never offer to schedule a showing directly: identity verification comes first.
6. Work the follow-up below into your reply.";

const NAME_PROMPT: &str = "Hey! What's your name? 😊";
const PROPERTY_PROMPT: &str = "Which property are you interested in? Feel free to text me the address.";
const EMAIL_PROMPT: &str =
    "Sounds good! Can you share your best email? We'll send you a secure link to verify your ID before scheduling.";
const ID_UPLOAD_PROMPT: &str =
    "Just checking in, did you get a chance to upload your ID? Let me know if you need the link again.";
const GENERIC_PROMPT: &str = "Thanks for your message! We'll get back to you shortly.";

/// How many catalog properties to offer when a mention could not be matched
pub const SUGGESTED_PROPERTIES: usize = 3;

/// What the funnel knows about a lead beyond the lead row itself
#[derive(Debug, Clone, Default)]
pub struct LeadContext {
    /// Number of properties the lead is interested in
    pub interest_count: usize,
    /// The property the lead most recently showed interest in
    pub property: Option<Property>,
    /// Open properties to suggest when the lead's mention was not recognised
    pub available: Vec<Property>,
}

/// The next thing to ask the tenant for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingInfo {
    /// The missing fact, if the lead is still within the automatic stages
    pub field: Option<RequiredField>,
    /// Ready-to-send wording; also the fallback reply
    pub prompt: String,
}

impl MissingInfo {
    /// Build the directive for a lead
    #[must_use]
    pub fn for_lead(lead: &Lead, context: &LeadContext, default_scheduling_link: &str) -> Self {
        let field = status::missing_field(lead, context.interest_count);

        let prompt = match field {
            Some(RequiredField::Name) => NAME_PROMPT.to_string(),
            Some(RequiredField::PropertyInterest) => property_prompt(lead, context),
            Some(RequiredField::Email | RequiredField::IdVerified) => {
                if RequiredField::Email.is_satisfied(lead, context.interest_count) {
                    ID_UPLOAD_PROMPT.to_string()
                } else {
                    EMAIL_PROMPT.to_string()
                }
            }
            Some(RequiredField::ShowingDate) => {
                let link = context
                    .property
                    .as_ref()
                    .and_then(|p| p.calendly_link.as_deref())
                    .filter(|link| !link.trim().is_empty())
                    .unwrap_or(default_scheduling_link);
                format!("You're all set! Ready to book a showing? Here's my calendar link: {link}")
            }
            None => next_step_line(lead.status).to_string(),
        };

        Self { field, prompt }
    }
}

fn property_prompt(lead: &Lead, context: &LeadContext) -> String {
    if !lead.uncertain_interest {
        return PROPERTY_PROMPT.to_string();
    }

    if context.available.is_empty() {
        return "I couldn't find that address in our listings. Could you double-check it for me?".to_string();
    }

    let options = context
        .available
        .iter()
        .take(SUGGESTED_PROPERTIES)
        .map(Property::full_address)
        .collect::<Vec<_>>()
        .join("; ");
    format!("I couldn't find that address. Did you mean one of these? {options}")
}

/// Fixed next-step lines for stages the rule table does not drive
const fn next_step_line(status: LeadStatus) -> &'static str {
    match status {
        LeadStatus::ShowingScheduled => {
            "Looking forward to your showing! Let me know if any questions come up before then."
        }
        LeadStatus::ShowingCompleted => {
            "Hope you enjoyed the tour! Would you like the application link to move forward?"
        }
        LeadStatus::ApplicationSent => "Just a reminder to complete your application when you get a chance!",
        LeadStatus::ApplicationReceived => "Thanks for applying! We're reviewing your info and will update you soon.",
        LeadStatus::ScreeningInProgress => {
            "Your application is being screened. Hang tight, we'll update you shortly."
        }
        LeadStatus::Approved => "Congrats! You've been approved. We'll send over the lease shortly.",
        LeadStatus::LeaseSent => "Let me know if you have any questions about the lease. We're here to help!",
        LeadStatus::LeaseSigned => {
            "Awesome! The next step is completing your payment. We'll send you the link shortly."
        }
        LeadStatus::PaymentPending => "Reminder to complete your payment to secure the property!",
        LeadStatus::MovedIn => "Welcome home! Let us know if you need anything.",
        LeadStatus::Inactive => "Hey, just checking in! Are you still interested in moving forward?",
        LeadStatus::New
        | LeadStatus::InterestedInShowing
        | LeadStatus::IdVerificationRequested
        | LeadStatus::IdVerified
        | LeadStatus::Rejected => GENERIC_PROMPT,
    }
}

/// Where a reply came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    /// Written by the AI backend
    Ai,
    /// The directive's static text
    Fallback,
}

impl ReplySource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Fallback => "fallback",
        }
    }
}

/// A reply ready to send
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub source: ReplySource,
}

fn property_block(property: &Property) -> String {
    let mut block = format!(
        "Property of interest: {}\n{} bed / {} bath, ${}/month, currently {}",
        property.full_address(),
        property.num_bedrooms,
        property.num_bathrooms,
        property.rent_price,
        property.status.as_str()
    );
    if let Some(sqft) = property.sqft {
        block.push_str(&format!(", {sqft} sqft"));
    }
    block
}

/// Build the full prompt: system directive, then history oldest first
#[must_use]
pub fn build_prompt(history: &[Message], missing: &MissingInfo, context: Option<&LeadContext>) -> Vec<ChatMessage> {
    let mut system = format!(
        "You are a friendly, professional leasing assistant texting with a prospective tenant.\n\n\
         FAQ:\n{KNOWLEDGE_BASE}\n\nRules:\n{RESPONSE_RULES}"
    );

    if let Some(property) = context.and_then(|c| c.property.as_ref()) {
        system.push_str("\n\n");
        system.push_str(&property_block(property));
    }

    system.push_str("\n\nFollow-up: ");
    system.push_str(&missing.prompt);

    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessage::system(system));
    messages.extend(history.iter().map(|message| {
        if message.direction == Direction::Incoming {
            ChatMessage::user(message.content.clone())
        } else {
            ChatMessage::assistant(message.content.clone())
        }
    }));
    messages
}

/// Writes replies through the AI backend
#[derive(Clone)]
pub struct ResponseComposer {
    backend: Arc<dyn CompletionBackend>,
    max_tokens: u32,
}

impl ResponseComposer {
    pub fn new(backend: Arc<dyn CompletionBackend>, max_tokens: u32) -> Self {
        Self { backend, max_tokens }
    }

    /// Compose a reply. `history` is oldest first. Never fails: backend errors
    /// and empty completions fall back to the directive text.
    pub async fn compose(&self, history: &[Message], missing: &MissingInfo, context: Option<&LeadContext>) -> Reply {
        let prompt = build_prompt(history, missing, context);

        match self.backend.complete(&prompt, self.max_tokens).await {
            Ok(text) if !text.trim().is_empty() => Reply {
                text: text.trim().to_string(),
                source: ReplySource::Ai,
            },
            Ok(_) => {
                tracing::warn!("Empty reply from AI backend, using fallback");
                fallback(missing)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Reply generation failed, using fallback");
                fallback(missing)
            }
        }
    }
}

fn fallback(missing: &MissingInfo) -> Reply {
    Reply {
        text: missing.prompt.clone(),
        source: ReplySource::Fallback,
    }
}
