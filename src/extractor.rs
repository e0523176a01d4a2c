//! AI fact extraction.
//!
//! The backend is asked for a flat JSON object holding only facts the tenant
//! stated outright. Whatever comes back is parsed leniently into a
//! [`RawExtraction`]; deciding which values are usable is left to
//! [`crate::merge`].

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::ai::{ChatMessage, CompletionBackend};
use crate::clock::Clock;
use crate::models::{LeadStatus, Message};

/// A scalar as the model wrote it
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    /// `true` / `false`
    Flag(bool),
    /// Any JSON number
    Number(f64),
    /// Any JSON string
    Text(String),
    /// Arrays and objects; never usable
    Other(Value),
}

impl RawValue {
    /// Trimmed text, if this is a non-blank string
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text.trim()).filter(|t| !t.is_empty()),
            _ => None,
        }
    }

    fn is_blank(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }
}

/// Facts extracted from one conversational turn. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawExtraction {
    pub name: Option<RawValue>,
    pub move_in_date: Option<RawValue>,
    pub income: Option<RawValue>,
    pub has_pets: Option<RawValue>,
    pub rented_before: Option<RawValue>,
    #[serde(alias = "property_interest")]
    pub property_address: Option<RawValue>,
    pub email: Option<RawValue>,
}

impl RawExtraction {
    /// Nothing usable was returned
    #[must_use]
    pub fn is_empty(&self) -> bool {
        [
            &self.name,
            &self.move_in_date,
            &self.income,
            &self.has_pets,
            &self.rented_before,
            &self.property_address,
            &self.email,
        ]
        .into_iter()
        .all(|field| field.as_ref().map_or(true, RawValue::is_blank))
    }

    /// The property the tenant named, if any
    #[must_use]
    pub fn property_address(&self) -> Option<&str> {
        self.property_address.as_ref().and_then(RawValue::as_text)
    }
}

/// Remove a surrounding markdown code fence (```` ```json ... ``` ````)
#[must_use]
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string, e.g. "json"
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse a completion into an extraction. Malformed or empty output yields `None`.
#[must_use]
pub fn parse_response(completion: &str) -> Option<RawExtraction> {
    let body = strip_code_fences(completion);
    if body.is_empty() {
        return None;
    }

    match serde_json::from_str::<RawExtraction>(body) {
        Ok(extraction) if extraction.is_empty() => None,
        Ok(extraction) => Some(extraction),
        Err(e) => {
            tracing::warn!(error = %e, response = body, "Extraction response is not a JSON object");
            None
        }
    }
}

/// Build the extraction prompt
#[must_use]
pub fn build_prompt(
    conversation_text: &str,
    current_status: LeadStatus,
    latest_ai_message: Option<&str>,
    today: chrono::NaiveDate,
) -> Vec<ChatMessage> {
    let instructions = format!(
        "You extract facts a prospective tenant stated explicitly in an SMS conversation.\n\
         \n\
         Today's date: {today}\n\
         Current lead status: {current_status}\n\
         \n\
         Return ONLY a flat JSON object with these keys:\n\
         - name: the tenant's full name\n\
         - move_in_date: expected move-in date as YYYY-MM-DD; resolve relative dates (\"in 2 months\") against today's date\n\
         - income: monthly income as a number; a stated monthly budget counts as income\n\
         - has_pets: true/false\n\
         - rented_before: true/false, whether they have rented before\n\
         - property_address: the full or partial address of the property they ask about\n\
         - email: the tenant's email address\n\
         \n\
         Rules:\n\
         1. Extract only what the tenant explicitly said. Do not guess or infer.\n\
         2. Omit any key that was not stated, or set it to null.\n\
         3. Short answers like \"yes\" or \"no\" refer to the assistant's last question.\n\
         4. No explanations, no markdown, JSON only."
    );

    let mut conversation = String::new();
    if let Some(question) = latest_ai_message {
        conversation.push_str("Assistant's last message: ");
        conversation.push_str(question);
        conversation.push_str("\n\n");
    }
    conversation.push_str("Tenant messages:\n");
    conversation.push_str(conversation_text);

    vec![ChatMessage::system(instructions), ChatMessage::user(conversation)]
}

/// Turns conversation text into a [`RawExtraction`] through the AI backend
#[derive(Clone)]
pub struct FactExtractor {
    backend: Arc<dyn CompletionBackend>,
    clock: Arc<dyn Clock>,
    max_tokens: u32,
}

impl FactExtractor {
    pub fn new(backend: Arc<dyn CompletionBackend>, clock: Arc<dyn Clock>, max_tokens: u32) -> Self {
        Self {
            backend,
            clock,
            max_tokens,
        }
    }

    /// Extract explicitly stated facts. Backend failures, empty completions and
    /// malformed JSON all yield `None`.
    pub async fn extract(
        &self,
        conversation_text: &str,
        current_status: LeadStatus,
        latest_ai_message: Option<&str>,
    ) -> Option<RawExtraction> {
        if conversation_text.trim().is_empty() {
            return None;
        }

        let prompt = build_prompt(
            conversation_text,
            current_status,
            latest_ai_message,
            self.clock.now().date_naive(),
        );

        let completion = match self.backend.complete(&prompt, self.max_tokens).await {
            Ok(completion) => completion,
            Err(e) => {
                tracing::warn!(error = %e, "Extraction request failed");
                return None;
            }
        };

        tracing::debug!(response = %completion, "Extraction response");
        parse_response(&completion)
    }

    /// Extract from the tenant's side of a session transcript
    pub async fn extract_from_session(
        &self,
        session: &[Message],
        current_status: LeadStatus,
        latest_ai_message: Option<&str>,
    ) -> Option<RawExtraction> {
        let transcript = session
            .iter()
            .filter(|m| m.direction == crate::models::Direction::Incoming)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n");

        self.extract(&transcript, current_status, latest_ai_message).await
    }
}
