use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::OwnedMutexGuard;

use crate::ai::CompletionBackend;
use crate::clock::Clock;
use crate::composer::{LeadContext, MissingInfo, ResponseComposer, SUGGESTED_PROPERTIES};
use crate::config::{AppConfig, FunnelConfig};
use crate::db::Database;
use crate::error::{FunnelError, Result};
use crate::extractor::FactExtractor;
use crate::logging::OperationTimer;
use crate::matching::PropertyMatcher;
use crate::merge;
use crate::metrics::MetricsCollector;
use crate::models::{Lead, LeadStatus, MessageStatus, NewMessage, SessionId};
use crate::repository::{LeadStore, MessageStore, PropertyCatalog};
use crate::session::{get_or_create_session, BurstCoalescer};
use crate::status::StatusEngine;
use crate::transport::SmsTransport;
use crate::validation::InputValidator;

/// Sent after a showing is booked through the scheduling link
pub const SHOWING_CONFIRMATION: &str = "Just saw you scheduled, let me know if you need anything else!";

/// What happened to one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// A newer message from the same tenant arrived; its handler replies
    Deferred { lead_id: i64, session_id: SessionId },
    /// The turn was processed and a reply produced
    Replied {
        lead_id: i64,
        session_id: SessionId,
        reply: String,
        status: LeadStatus,
        /// Whether the SMS provider accepted the reply
        delivered: bool,
    },
}

/// One async mutex per lead, created on first use and dropped once unused
#[derive(Debug, Default)]
pub struct LeadLocks {
    locks: Mutex<HashMap<i64, Arc<tokio::sync::Mutex<()>>>>,
}

impl LeadLocks {
    /// Wait for exclusive access to `lead_id`
    pub async fn acquire(&self, lead_id: i64) -> LeadGuard<'_> {
        let lock = self.lock_for(lead_id);
        LeadGuard {
            locks: self,
            lead_id,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of leads with a live lock entry
    #[must_use]
    pub fn len(&self) -> usize {
        self.map().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_for(&self, lead_id: i64) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.map().entry(lead_id).or_default())
    }

    /// Forget the lead's mutex when the map holds the last reference
    fn release(&self, lead_id: i64) {
        let mut locks = self.map();
        if locks.get(&lead_id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&lead_id);
        }
    }

    fn map(&self) -> MutexGuard<'_, HashMap<i64, Arc<tokio::sync::Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive access to one lead; the registry entry is cleaned up on drop
pub struct LeadGuard<'a> {
    locks: &'a LeadLocks,
    lead_id: i64,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for LeadGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(self.lead_id);
    }
}

/// Runs the leasing funnel for inbound SMS
pub struct FunnelService {
    leads: Arc<dyn LeadStore>,
    messages: Arc<dyn MessageStore>,
    catalog: Arc<dyn PropertyCatalog>,
    transport: Arc<dyn SmsTransport>,
    clock: Arc<dyn Clock>,
    coalescer: BurstCoalescer,
    extractor: FactExtractor,
    matcher: PropertyMatcher,
    status: StatusEngine,
    composer: ResponseComposer,
    funnel: FunnelConfig,
    locks: LeadLocks,
    metrics: MetricsCollector,
}

impl FunnelService {
    pub fn new(
        leads: Arc<dyn LeadStore>,
        messages: Arc<dyn MessageStore>,
        catalog: Arc<dyn PropertyCatalog>,
        backend: Arc<dyn CompletionBackend>,
        transport: Arc<dyn SmsTransport>,
        clock: Arc<dyn Clock>,
        config: &AppConfig,
    ) -> Self {
        Self {
            coalescer: BurstCoalescer::new(Arc::clone(&messages), Arc::clone(&clock)),
            extractor: FactExtractor::new(Arc::clone(&backend), Arc::clone(&clock), config.ai.extraction_max_tokens),
            matcher: PropertyMatcher::new(
                Arc::clone(&leads),
                Arc::clone(&catalog),
                config.funnel.fuzzy_match_threshold,
            ),
            status: StatusEngine::new(Arc::clone(&leads), Arc::clone(&clock)),
            composer: ResponseComposer::new(backend, config.ai.reply_max_tokens),
            leads,
            messages,
            catalog,
            transport,
            clock,
            funnel: config.funnel.clone(),
            locks: LeadLocks::default(),
            metrics: MetricsCollector::default(),
        }
    }

    /// Wire the service to one SQLite database for all three stores
    pub fn with_database(
        db: Database,
        backend: Arc<dyn CompletionBackend>,
        transport: Arc<dyn SmsTransport>,
        clock: Arc<dyn Clock>,
        config: &AppConfig,
    ) -> Self {
        let db = Arc::new(db);
        Self::new(db.clone(), db.clone(), db, backend, transport, clock, config)
    }

    /// Process one inbound SMS end to end
    pub async fn handle_inbound(&self, from: &str, body: &str) -> Result<InboundOutcome> {
        let timer = OperationTimer::new("handle_inbound");

        let phone = InputValidator::normalize_phone(from).map_err(|e| FunnelError::InvalidPhone(e.to_string()))?;
        let body =
            InputValidator::validate_message_body(body).map_err(|e| FunnelError::InvalidMessage(e.to_string()))?;

        let now = self.clock.now();
        let lead = self.find_or_create_lead(&phone, now).await?;
        self.leads.touch_contact(lead.id, now).await?;

        let session_id = get_or_create_session(
            self.messages.as_ref(),
            self.clock.as_ref(),
            lead.id,
            Duration::from_secs(self.funnel.session_window_secs),
        )
        .await;
        self.messages
            .append_message(NewMessage::incoming(&lead, body, session_id, now))
            .await?;
        self.metrics.record_inbound();
        tracing::info!(lead_id = lead.id, %session_id, "Inbound message stored");

        if self
            .coalescer
            .should_defer(lead.id, Duration::from_secs(self.funnel.cooldown_secs))
            .await
        {
            self.metrics.record_deferred();
            return Ok(InboundOutcome::Deferred {
                lead_id: lead.id,
                session_id,
            });
        }

        let _guard = self.locks.acquire(lead.id).await;

        // The lead may have changed while we waited out the burst
        let mut lead = self.refresh(lead.id).await?;
        if let Err(e) = self.enrich(&mut lead, session_id).await {
            tracing::warn!(lead_id = lead.id, %session_id, error = %e, "Enrichment failed, replying without it");
            if let Ok(stored) = self.refresh(lead.id).await {
                lead = stored;
            }
        }

        let (reply, delivered) = self.reply(&lead, session_id).await?;
        self.metrics.record_turn(timer.finish());

        Ok(InboundOutcome::Replied {
            lead_id: lead.id,
            session_id,
            reply,
            status: lead.status,
            delivered,
        })
    }

    /// A showing was booked through the scheduling link
    pub async fn record_showing_scheduled(&self, phone: &str, start_time: DateTime<Utc>) -> Result<Lead> {
        let phone = InputValidator::normalize_phone(phone).map_err(|e| FunnelError::InvalidPhone(e.to_string()))?;
        let lead = self
            .leads
            .find_by_phone(&phone)
            .await?
            .ok_or_else(|| FunnelError::LeadNotFound(phone.clone()))?;

        let _guard = self.locks.acquire(lead.id).await;
        let mut lead = self.refresh(lead.id).await?;

        lead.scheduled_showing_at = Some(start_time);
        lead.updated_at = self.clock.now();
        self.leads.save_profile(&lead).await?;
        self.leads.mark_interests_scheduled(lead.id).await?;
        tracing::info!(lead_id = lead.id, %start_time, "Showing scheduled");
        self.advance(&mut lead).await?;

        let session_id = get_or_create_session(
            self.messages.as_ref(),
            self.clock.as_ref(),
            lead.id,
            Duration::from_secs(self.funnel.session_window_secs),
        )
        .await;
        self.deliver(&lead, SHOWING_CONFIRMATION, session_id).await?;

        Ok(lead)
    }

    /// An identity document was uploaded for the lead. Returns whether the status changed.
    pub async fn record_id_document(&self, lead_id: i64, document_ref: &str) -> Result<bool> {
        let document_ref = document_ref.trim();
        if document_ref.is_empty() {
            return Err(FunnelError::Other("document reference cannot be empty".to_string()));
        }

        let _guard = self.locks.acquire(lead_id).await;
        let mut lead = self.refresh(lead_id).await?;

        lead.id_document_ref = Some(document_ref.to_string());
        lead.updated_at = self.clock.now();
        self.leads.save_profile(&lead).await?;
        tracing::info!(lead_id, "Identity document recorded");

        self.advance(&mut lead).await
    }

    /// Explicitly mark the lead as interested in a property.
    /// Returns whether a new interest was created.
    pub async fn attach_property(&self, lead_id: i64, property_id: i64) -> Result<bool> {
        let _guard = self.locks.acquire(lead_id).await;
        let mut lead = self.refresh(lead_id).await?;

        if self.catalog.get_property(property_id).await?.is_none() {
            return Err(FunnelError::PropertyNotFound(property_id));
        }

        let now = self.clock.now();
        let attached = self.leads.attach_interest(lead_id, property_id, now).await?;
        if lead.uncertain_interest {
            lead.uncertain_interest = false;
            lead.updated_at = now;
            self.leads.save_profile(&lead).await?;
        }

        self.advance(&mut lead).await?;
        Ok(attached)
    }

    async fn find_or_create_lead(&self, phone: &str, now: DateTime<Utc>) -> Result<Lead> {
        if let Some(lead) = self.leads.find_by_phone(phone).await? {
            return Ok(lead);
        }

        let lead = self.leads.create_lead(phone, now).await?;
        tracing::info!(lead_id = lead.id, "New lead created");
        Ok(lead)
    }

    async fn refresh(&self, lead_id: i64) -> Result<Lead> {
        self.leads
            .get_lead(lead_id)
            .await?
            .ok_or_else(|| FunnelError::LeadNotFound(lead_id.to_string()))
    }

    async fn advance(&self, lead: &mut Lead) -> Result<bool> {
        let changed = self.status.advance(lead).await?;
        if changed {
            self.metrics.record_transition(lead.status);
        }
        Ok(changed)
    }

    /// Extract facts from the session and fold them into the lead
    async fn enrich(&self, lead: &mut Lead, session_id: SessionId) -> Result<()> {
        let session = self.messages.session_messages(session_id).await?;
        let latest_ai = match self.messages.latest_ai_message(lead.id).await {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(lead_id = lead.id, error = %e, "Could not load the last AI message");
                None
            }
        };

        let Some(extracted) = self
            .extractor
            .extract_from_session(&session, lead.status, latest_ai.as_ref().map(|m| m.content.as_str()))
            .await
        else {
            self.metrics.record_extraction_failure();
            tracing::debug!(lead_id = lead.id, %session_id, "Nothing extracted");
            return Ok(());
        };

        let now = self.clock.now();
        let mut changed = merge::merge(lead, &extracted);
        if changed {
            self.metrics.record_merge();
        }

        let mut attached = false;
        if let Some(address) = extracted.property_address() {
            let was_uncertain = lead.uncertain_interest;
            match self.matcher.match_and_attach(lead, address, now).await {
                Ok(true) => {
                    attached = true;
                    self.metrics.record_property_attached();
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(lead_id = lead.id, mention = address, error = %e, "Property matching failed");
                }
            }
            changed |= lead.uncertain_interest != was_uncertain;
        }

        if changed {
            lead.updated_at = now;
            self.leads.save_profile(lead).await?;
        }

        if changed || attached {
            self.advance(lead).await?;
        }

        Ok(())
    }

    /// Compose, send and log the reply for this turn
    async fn reply(&self, lead: &Lead, session_id: SessionId) -> Result<(String, bool)> {
        let context = self.load_context(lead).await.unwrap_or_else(|e| {
            tracing::warn!(lead_id = lead.id, error = %e, "Could not load lead context");
            LeadContext::default()
        });
        let missing = MissingInfo::for_lead(lead, &context, &self.funnel.default_scheduling_link);

        let mut history = self
            .messages
            .recent_messages(lead.id, self.funnel.history_limit)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(lead_id = lead.id, error = %e, "Could not load conversation history");
                Vec::new()
            });
        history.reverse();

        let reply = self.composer.compose(&history, &missing, Some(&context)).await;
        self.metrics.record_reply(reply.source.as_str());

        let delivered = self.deliver(lead, &reply.text, session_id).await?;
        Ok((reply.text, delivered))
    }

    async fn load_context(&self, lead: &Lead) -> Result<LeadContext> {
        let interests = self.leads.interests_for_lead(lead.id).await?;

        let property = match interests.last() {
            Some(interest) => self.catalog.get_property(interest.property_id).await?,
            None => None,
        };

        let available = if lead.uncertain_interest {
            self.catalog.available_properties(SUGGESTED_PROPERTIES).await?
        } else {
            Vec::new()
        };

        Ok(LeadContext {
            interest_count: interests.len(),
            property,
            available,
        })
    }

    /// Send an AI message and log it with its delivery outcome
    async fn deliver(&self, lead: &Lead, text: &str, session_id: SessionId) -> Result<bool> {
        let delivered = match self.transport.send(&lead.phone, text).await {
            Ok(receipt) => {
                tracing::debug!(lead_id = lead.id, provider_id = %receipt.provider_id, "Reply delivered");
                true
            }
            Err(e) => {
                tracing::error!(lead_id = lead.id, error = %e, "Failed to send reply");
                self.metrics.record_transport_failure();
                false
            }
        };

        let status = if delivered {
            MessageStatus::Sent
        } else {
            MessageStatus::Failed
        };
        self.messages
            .append_message(NewMessage::ai_reply(lead, text, session_id, status, self.clock.now()))
            .await?;

        Ok(delivered)
    }
}
