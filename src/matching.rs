//! Matching a tenant's free-text property mention to the catalog.
//!
//! A cheap case-insensitive substring lookup runs first. Only when it misses is
//! the whole catalog scored with normalised Levenshtein similarity.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use strsim::normalized_levenshtein;
use unicode_normalization::UnicodeNormalization;

use crate::error::Result;
use crate::models::{Lead, Property};
use crate::repository::{LeadStore, PropertyCatalog};

/// NFKC, lowercase, punctuation stripped, whitespace collapsed
#[must_use]
pub fn normalize_address(text: &str) -> String {
    let cleaned: String = text
        .nfkc()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Best similarity between a mention and one property, in [0, 1]
fn similarity(mention: &str, property: &Property) -> f64 {
    let street = property.address.split(',').next().unwrap_or(&property.address);
    let full = property.full_address();

    [property.address.as_str(), street, full.as_str()]
        .into_iter()
        .map(|candidate| normalized_levenshtein(mention, &normalize_address(candidate)))
        .fold(0.0, f64::max)
}

/// Resolves property mentions and records lead interest
#[derive(Clone)]
pub struct PropertyMatcher {
    leads: Arc<dyn LeadStore>,
    catalog: Arc<dyn PropertyCatalog>,
    threshold: f64,
}

impl PropertyMatcher {
    pub fn new(leads: Arc<dyn LeadStore>, catalog: Arc<dyn PropertyCatalog>, threshold: f64) -> Self {
        Self {
            leads,
            catalog,
            threshold,
        }
    }

    /// Find the catalog property a mention refers to
    pub async fn find_property(&self, address_text: &str) -> Result<Option<Property>> {
        let mention = address_text.trim();
        if mention.is_empty() {
            return Ok(None);
        }

        if let Some(property) = self.catalog.find_by_address_fragment(mention).await? {
            tracing::debug!(property_id = property.id, mention, "Substring address match");
            return Ok(Some(property));
        }

        let normalized = normalize_address(mention);
        if normalized.is_empty() {
            return Ok(None);
        }

        let best = self
            .catalog
            .list_properties()
            .await?
            .into_iter()
            .map(|property| (similarity(&normalized, &property), property))
            .filter(|(score, _)| *score >= self.threshold)
            .max_by(|(a, _), (b, _)| a.total_cmp(b));

        Ok(best.map(|(score, property)| {
            tracing::debug!(property_id = property.id, mention, score, "Fuzzy address match");
            property
        }))
    }

    /// Attach the mentioned property to the lead.
    ///
    /// On a match the interest is created (if new) and `uncertain_interest` is
    /// cleared; otherwise the flag is set. Returns whether a new interest was
    /// created. The caller persists the flag.
    pub async fn match_and_attach(&self, lead: &mut Lead, address_text: &str, now: DateTime<Utc>) -> Result<bool> {
        let Some(property) = self.find_property(address_text).await? else {
            tracing::info!(lead_id = lead.id, mention = address_text, "No property matches mention");
            lead.uncertain_interest = true;
            return Ok(false);
        };

        lead.uncertain_interest = false;
        let attached = self.leads.attach_interest(lead.id, property.id, now).await?;
        if attached {
            tracing::info!(lead_id = lead.id, property_id = property.id, "Lead interested in property");
        }
        Ok(attached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PropertyStatus;
    use crate::repository::{MockLeadStore, MockPropertyCatalog};

    fn property(id: i64, address: &str) -> Property {
        Property {
            id,
            address: address.to_string(),
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            zip_code: "62701".to_string(),
            num_bedrooms: 2,
            num_bathrooms: 1,
            sqft: None,
            rent_price: 1500,
            status: PropertyStatus::Available,
            calendly_link: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_normalize_address() {
        assert_eq!(normalize_address("  123 Main St., Apt #4 "), "123 main st apt 4");
        assert_eq!(normalize_address("１２３ MAIN"), "123 main");
    }

    #[tokio::test]
    async fn test_substring_hit_skips_fuzzy_tier() {
        let mut catalog = MockPropertyCatalog::new();
        catalog
            .expect_find_by_address_fragment()
            .returning(|_| Ok(Some(property(1, "123 Main St"))));
        catalog.expect_list_properties().times(0);

        let mut leads = MockLeadStore::new();
        leads.expect_attach_interest().returning(|_, _, _| Ok(true));

        let matcher = PropertyMatcher::new(Arc::new(leads), Arc::new(catalog), 0.8);
        let mut lead = Lead::new(5, "+15551234567", Utc::now());
        lead.uncertain_interest = true;

        assert!(matcher.match_and_attach(&mut lead, "123 Main St", Utc::now()).await.unwrap());
        assert!(!lead.uncertain_interest);
    }

    #[tokio::test]
    async fn test_typo_matches_above_threshold() {
        let mut catalog = MockPropertyCatalog::new();
        catalog.expect_find_by_address_fragment().returning(|_| Ok(None));
        catalog
            .expect_list_properties()
            .returning(|| Ok(vec![property(1, "123 Main St"), property(2, "77 Oak Avenue")]));

        let matcher = PropertyMatcher::new(Arc::new(MockLeadStore::new()), Arc::new(catalog), 0.8);
        let found = matcher.find_property("123 Man St").await.unwrap();
        assert_eq!(found.map(|p| p.id), Some(1));
    }

    #[tokio::test]
    async fn test_no_match_sets_uncertain_interest() {
        let mut catalog = MockPropertyCatalog::new();
        catalog.expect_find_by_address_fragment().returning(|_| Ok(None));
        catalog
            .expect_list_properties()
            .returning(|| Ok(vec![property(1, "123 Main St")]));

        let mut leads = MockLeadStore::new();
        leads.expect_attach_interest().times(0);

        let matcher = PropertyMatcher::new(Arc::new(leads), Arc::new(catalog), 0.8);
        let mut lead = Lead::new(5, "+15551234567", Utc::now());

        assert!(!matcher.match_and_attach(&mut lead, "999 Elm Road", Utc::now()).await.unwrap());
        assert!(lead.uncertain_interest);
    }

    #[tokio::test]
    async fn test_existing_interest_is_not_new() {
        let mut catalog = MockPropertyCatalog::new();
        catalog
            .expect_find_by_address_fragment()
            .returning(|_| Ok(Some(property(1, "123 Main St"))));

        let mut leads = MockLeadStore::new();
        leads.expect_attach_interest().returning(|_, _, _| Ok(false));

        let matcher = PropertyMatcher::new(Arc::new(leads), Arc::new(catalog), 0.8);
        let mut lead = Lead::new(5, "+15551234567", Utc::now());

        assert!(!matcher.match_and_attach(&mut lead, "123 main st", Utc::now()).await.unwrap());
        assert!(!lead.uncertain_interest);
    }
}
