use chrono::Utc;
use uuid::Uuid;

use crate::errors::AppResult;
use crate::models::{Deal, DealDraft, DealFilter};
use crate::storage::KeyValueStore;

pub const DEALS_KEY: &str = "salesDeals_v1";
pub const FILTER_KEY: &str = "salesDeals_filter_v1";

/// Owns the deal collection and keeps its persisted slot in step with it.
///
/// Every mutation writes the whole collection back before returning. If that
/// write fails the in-memory change is undone, so memory and storage never
/// disagree.
pub struct DealStore<S> {
    storage: S,
    deals: Vec<Deal>,
}

impl<S: KeyValueStore> DealStore<S> {
    pub fn open(storage: S) -> Self {
        let deals = load_deals(&storage);
        tracing::debug!(count = deals.len(), "deal store opened");
        Self { storage, deals }
    }

    pub fn deals(&self) -> &[Deal] {
        &self.deals
    }

    pub fn get(&self, id: &str) -> Option<&Deal> {
        self.deals.iter().find(|deal| deal.id == id)
    }

    #[cfg(test)]
    pub(crate) fn storage(&self) -> &S {
        &self.storage
    }

    /// Re-reads the persisted collection without touching the in-memory one.
    pub fn load(&self) -> Vec<Deal> {
        load_deals(&self.storage)
    }

    pub fn save(&self) -> AppResult<()> {
        let raw = serde_json::to_string(&self.deals)?;
        self.storage.set(DEALS_KEY, &raw)
    }

    pub fn create(&mut self, draft: DealDraft) -> AppResult<Deal> {
        draft.validate()?;
        let now = Utc::now();
        let deal = Deal::from_draft(new_deal_id(), draft, Some(now), now);

        self.deals.push(deal.clone());
        if let Err(error) = self.save() {
            self.deals.pop();
            return Err(error);
        }

        tracing::info!(deal_id = %deal.id, stage = %deal.stage, "deal created");
        Ok(deal)
    }

    /// Replaces the deal in place. An id that no longer exists is stored as a
    /// new record under that id instead of failing.
    pub fn update(&mut self, id: &str, draft: DealDraft) -> AppResult<Deal> {
        draft.validate()?;
        let now = Utc::now();

        match self.deals.iter().position(|deal| deal.id == id) {
            Some(index) => {
                let created_at = self.deals[index].created_at;
                let deal = Deal::from_draft(id.to_string(), draft, created_at, now);
                let previous = std::mem::replace(&mut self.deals[index], deal.clone());
                if let Err(error) = self.save() {
                    self.deals[index] = previous;
                    return Err(error);
                }
                tracing::info!(deal_id = %id, stage = %deal.stage, "deal updated");
                Ok(deal)
            }
            None => {
                let deal = Deal::from_draft(id.to_string(), draft, Some(now), now);
                self.deals.push(deal.clone());
                if let Err(error) = self.save() {
                    self.deals.pop();
                    return Err(error);
                }
                tracing::info!(deal_id = %id, "update target missing; stored as new deal");
                Ok(deal)
            }
        }
    }

    /// Returns whether a deal was removed. Unknown ids leave the collection as is.
    pub fn delete(&mut self, id: &str) -> AppResult<bool> {
        let Some(index) = self.deals.iter().position(|deal| deal.id == id) else {
            tracing::debug!(deal_id = %id, "delete target missing");
            return Ok(false);
        };

        let removed = self.deals.remove(index);
        if let Err(error) = self.save() {
            self.deals.insert(index, removed);
            return Err(error);
        }

        tracing::info!(deal_id = %id, "deal deleted");
        Ok(true)
    }

    pub fn load_filter(&self) -> DealFilter {
        let raw = match self.storage.get(FILTER_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return DealFilter::default(),
            Err(error) => {
                tracing::warn!(error = %error, "failed to read stored filter");
                return DealFilter::default();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|error| {
            tracing::warn!(error = %error, "stored filter is malformed; using default");
            DealFilter::default()
        })
    }

    pub fn save_filter(&self, filter: &DealFilter) -> AppResult<()> {
        let raw = serde_json::to_string(filter)?;
        self.storage.set(FILTER_KEY, &raw)
    }
}

/// Reads the stored collection. Missing, unreadable or non-array data yields an
/// empty collection; a single record that does not parse is skipped.
pub fn load_deals(storage: &impl KeyValueStore) -> Vec<Deal> {
    let raw = match storage.get(DEALS_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Vec::new(),
        Err(error) => {
            tracing::warn!(error = %error, "failed to read stored deals");
            return Vec::new();
        }
    };

    let records = match serde_json::from_str::<Vec<serde_json::Value>>(&raw) {
        Ok(records) => records,
        Err(error) => {
            tracing::warn!(error = %error, "stored deals are malformed; starting empty");
            return Vec::new();
        }
    };

    records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match serde_json::from_value::<Deal>(record) {
            Ok(deal) => Some(deal),
            Err(error) => {
                tracing::warn!(index, error = %error, "skipping unreadable stored deal");
                None
            }
        })
        .collect()
}

fn new_deal_id() -> String {
    format!("deal_{}", Uuid::new_v4().simple())
}
