//! Status transition engine.
//!
//! A lead's funnel stage is derived from which facts are known about it. The
//! rule table below is evaluated highest requirement first; the first rule whose
//! fields are all satisfied is the best fit. Automatic transitions only move a
//! lead forward, so stages reached by hand are never undone.

use std::sync::Arc;

use crate::clock::Clock;
use crate::error::Result;
use crate::models::{Lead, LeadStatus};
use crate::repository::LeadStore;

/// A fact the funnel needs before a lead can advance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredField {
    Name,
    Email,
    PropertyInterest,
    IdVerified,
    ShowingDate,
}

impl RequiredField {
    /// Whether `lead` (with `interest_count` attached properties) has this fact
    #[must_use]
    pub fn is_satisfied(self, lead: &Lead, interest_count: usize) -> bool {
        match self {
            Self::Name => lead.display_name().is_some(),
            Self::Email => lead.email.as_deref().is_some_and(|e| !e.trim().is_empty()),
            Self::PropertyInterest => interest_count > 0,
            Self::IdVerified => {
                lead.id_verified || lead.id_document_ref.as_deref().is_some_and(|r| !r.trim().is_empty())
            }
            Self::ShowingDate => lead.scheduled_showing_at.is_some(),
        }
    }
}

/// One row of the rule table
#[derive(Debug, Clone, Copy)]
pub struct StatusRule {
    pub target: LeadStatus,
    pub requires: &'static [RequiredField],
}

/// Highest requirement first
pub const STATUS_RULES: [StatusRule; 5] = [
    StatusRule {
        target: LeadStatus::ShowingScheduled,
        requires: &[
            RequiredField::Name,
            RequiredField::PropertyInterest,
            RequiredField::IdVerified,
            RequiredField::ShowingDate,
        ],
    },
    StatusRule {
        target: LeadStatus::IdVerified,
        requires: &[RequiredField::Name, RequiredField::PropertyInterest, RequiredField::IdVerified],
    },
    StatusRule {
        target: LeadStatus::IdVerificationRequested,
        requires: &[RequiredField::Name, RequiredField::PropertyInterest],
    },
    StatusRule {
        target: LeadStatus::InterestedInShowing,
        requires: &[RequiredField::Name],
    },
    StatusRule {
        target: LeadStatus::New,
        requires: &[],
    },
];

/// The status the lead's facts support, ignoring its current status
#[must_use]
pub fn best_status(lead: &Lead, interest_count: usize) -> LeadStatus {
    STATUS_RULES
        .iter()
        .find(|rule| rule.requires.iter().all(|f| f.is_satisfied(lead, interest_count)))
        .map_or(LeadStatus::New, |rule| rule.target)
}

/// The status to move to, if the best fit is ahead of the current status
#[must_use]
pub fn next_status(lead: &Lead, interest_count: usize) -> Option<LeadStatus> {
    let best = best_status(lead, interest_count);
    (best > lead.status).then_some(best)
}

/// The first unmet requirement of the next stage the rule table can reach.
///
/// `None` once the lead is at or past the last automatic stage.
#[must_use]
pub fn missing_field(lead: &Lead, interest_count: usize) -> Option<RequiredField> {
    STATUS_RULES
        .iter()
        .rev()
        .filter(|rule| rule.target > lead.status)
        .find_map(|rule| {
            rule.requires
                .iter()
                .copied()
                .find(|f| !f.is_satisfied(lead, interest_count))
        })
}

/// Recomputes and persists lead status
#[derive(Clone)]
pub struct StatusEngine {
    leads: Arc<dyn LeadStore>,
    clock: Arc<dyn Clock>,
}

impl StatusEngine {
    pub fn new(leads: Arc<dyn LeadStore>, clock: Arc<dyn Clock>) -> Self {
        Self { leads, clock }
    }

    /// Move the lead forward if its facts allow. Returns whether the status changed.
    pub async fn advance(&self, lead: &mut Lead) -> Result<bool> {
        if lead.status.is_terminal() {
            return Ok(false);
        }

        let interests = self.leads.interests_for_lead(lead.id).await?;

        let Some(next) = next_status(lead, interests.len()) else {
            return Ok(false);
        };

        let now = self.clock.now();
        self.leads.set_status(lead.id, next, now).await?;

        tracing::info!(lead_id = lead.id, from = %lead.status, to = %next, "Lead status advanced");
        lead.status = next;
        lead.updated_at = now;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{InterestStatus, PropertyInterest};
    use crate::repository::MockLeadStore;
    use chrono::Utc;
    use mockall::predicate::eq;
    use proptest::prelude::*;

    fn lead() -> Lead {
        Lead::new(3, "+15551234567", Utc::now())
    }

    fn interest() -> PropertyInterest {
        PropertyInterest {
            id: 1,
            lead_id: 3,
            property_id: 9,
            status: InterestStatus::Interested,
            scheduled_showing: false,
            application_submitted: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_best_status_table() {
        let mut lead = lead();
        assert_eq!(best_status(&lead, 0), LeadStatus::New);

        lead.name = Some("unknown".to_string());
        assert_eq!(best_status(&lead, 1), LeadStatus::New);

        lead.name = Some("N/A".to_string());
        assert_eq!(best_status(&lead, 1), LeadStatus::New);

        lead.name = Some("Jane Doe".to_string());
        assert_eq!(best_status(&lead, 0), LeadStatus::InterestedInShowing);
        assert_eq!(best_status(&lead, 1), LeadStatus::IdVerificationRequested);

        lead.id_document_ref = Some("uploads/id-3.jpg".to_string());
        assert_eq!(best_status(&lead, 1), LeadStatus::IdVerified);

        lead.scheduled_showing_at = Some(Utc::now());
        assert_eq!(best_status(&lead, 1), LeadStatus::ShowingScheduled);
        assert_eq!(best_status(&lead, 0), LeadStatus::InterestedInShowing);
    }

    #[test]
    fn test_never_moves_backward() {
        let mut lead = lead();
        lead.status = LeadStatus::ApplicationSent;
        lead.name = Some("Jane Doe".to_string());
        assert_eq!(next_status(&lead, 1), None);

        lead.status = LeadStatus::Inactive;
        assert_eq!(next_status(&lead, 1), None);
    }

    #[test]
    fn test_missing_field_follows_next_rule() {
        let mut lead = lead();
        assert_eq!(missing_field(&lead, 0), Some(RequiredField::Name));

        lead.name = Some("Jane Doe".to_string());
        lead.status = LeadStatus::InterestedInShowing;
        assert_eq!(missing_field(&lead, 0), Some(RequiredField::PropertyInterest));

        lead.status = LeadStatus::IdVerificationRequested;
        assert_eq!(missing_field(&lead, 1), Some(RequiredField::IdVerified));

        lead.id_verified = true;
        lead.status = LeadStatus::IdVerified;
        assert_eq!(missing_field(&lead, 1), Some(RequiredField::ShowingDate));

        lead.status = LeadStatus::ShowingScheduled;
        assert_eq!(missing_field(&lead, 1), None);
    }

    #[tokio::test]
    async fn test_advance_persists_and_is_idempotent() {
        let mut store = MockLeadStore::new();
        store.expect_interests_for_lead().returning(|_| Ok(vec![interest()]));
        store
            .expect_set_status()
            .with(eq(3), eq(LeadStatus::IdVerificationRequested), mockall::predicate::always())
            .times(1)
            .returning(|_, _, _| Ok(()));

        let engine = StatusEngine::new(Arc::new(store), Arc::new(ManualClock::new(Utc::now())));
        let mut lead = lead();
        lead.name = Some("Jane Doe".to_string());

        assert!(engine.advance(&mut lead).await.unwrap());
        assert_eq!(lead.status, LeadStatus::IdVerificationRequested);
        assert!(!engine.advance(&mut lead).await.unwrap());
    }

    #[tokio::test]
    async fn test_terminal_leads_are_left_alone() {
        let mut store = MockLeadStore::new();
        store.expect_interests_for_lead().times(0);
        store.expect_set_status().times(0);

        let engine = StatusEngine::new(Arc::new(store), Arc::new(ManualClock::new(Utc::now())));
        for status in [LeadStatus::MovedIn, LeadStatus::Inactive] {
            let mut lead = lead();
            lead.name = Some("Jane Doe".to_string());
            lead.status = status;
            assert!(!engine.advance(&mut lead).await.unwrap());
            assert_eq!(lead.status, status);
        }
    }

    fn status() -> impl Strategy<Value = LeadStatus> {
        proptest::sample::select(LeadStatus::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_next_status_only_moves_forward(
            current in status(),
            named in any::<bool>(),
            verified in any::<bool>(),
            scheduled in any::<bool>(),
            interests in 0usize..3,
        ) {
            let mut lead = lead();
            lead.status = current;
            lead.name = named.then(|| "Jane".to_string());
            lead.id_verified = verified;
            lead.scheduled_showing_at = scheduled.then(Utc::now);

            if let Some(next) = next_status(&lead, interests) {
                prop_assert!(next > current);
                lead.status = next;
                prop_assert_eq!(next_status(&lead, interests), None);
            }
        }
    }
}
