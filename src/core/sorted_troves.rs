//! Ordered trove index.
//!
//! Redemptions walk troves from the lowest interest rate upward. The engine
//! only needs the traversal and removal primitives in `SortedTroves`; hosts
//! with their own index implement the trait, others use
//! `InMemorySortedTroves`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::trove::TroveId;
use crate::error::{Error, Result};
use crate::utils::crypto::Address;

/// Ordered index of open, non-zombie troves
pub trait SortedTroves {
    /// Insert a standalone trove at `annual_interest_rate`
    fn insert(&mut self, id: TroveId, annual_interest_rate: u128) -> Result<()>;

    /// Insert a batch member at the batch rate
    fn insert_into_batch(&mut self, id: TroveId, manager: Address, annual_interest_rate: u128) -> Result<()>;

    /// Remove a standalone trove
    fn remove(&mut self, id: TroveId) -> Result<()>;

    /// Remove a batch member
    fn remove_from_batch(&mut self, id: TroveId) -> Result<()>;

    /// Trove with the lowest interest rate
    fn get_last(&self) -> Option<TroveId>;

    /// Next trove after `id` in ascending-rate order
    fn get_prev(&self, id: TroveId) -> Option<TroveId>;

    /// Check membership
    fn contains(&self, id: TroveId) -> bool;

    /// Number of indexed troves
    fn len(&self) -> usize;

    /// Check if the index is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Position of an entry: rate first, insertion sequence breaks ties
type SortKey = (u128, u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
struct Entry {
    key: SortKey,
    batch: Option<Address>,
}

/// `BTreeMap`-backed index ordered by rate then insertion order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InMemorySortedTroves {
    order: BTreeMap<SortKey, TroveId>,
    entries: BTreeMap<TroveId, Entry>,
    next_seq: u64,
}

impl InMemorySortedTroves {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids in traversal order (lowest rate first)
    pub fn ids(&self) -> Vec<TroveId> {
        self.order.values().copied().collect()
    }

    fn insert_entry(&mut self, id: TroveId, rate: u128, batch: Option<Address>) -> Result<()> {
        if self.entries.contains_key(&id) {
            return Err(Error::InvalidParameter {
                name: "trove_id".into(),
                reason: format!("trove {} already indexed", id),
            });
        }
        let key = (rate, self.next_seq);
        self.next_seq += 1;
        self.order.insert(key, id);
        self.entries.insert(id, Entry { key, batch });
        Ok(())
    }

    fn remove_entry(&mut self, id: TroveId, batched: bool) -> Result<()> {
        let entry = self.entries.get(&id).copied().ok_or(Error::TroveNotFound(id.0))?;
        match (entry.batch.is_some(), batched) {
            (true, false) => return Err(Error::TroveInBatch(id.0)),
            (false, true) => return Err(Error::TroveNotInBatch(id.0)),
            _ => {}
        }
        self.entries.remove(&id);
        self.order.remove(&entry.key);
        Ok(())
    }
}

impl SortedTroves for InMemorySortedTroves {
    fn insert(&mut self, id: TroveId, annual_interest_rate: u128) -> Result<()> {
        self.insert_entry(id, annual_interest_rate, None)
    }

    fn insert_into_batch(&mut self, id: TroveId, manager: Address, annual_interest_rate: u128) -> Result<()> {
        self.insert_entry(id, annual_interest_rate, Some(manager))
    }

    fn remove(&mut self, id: TroveId) -> Result<()> {
        self.remove_entry(id, false)
    }

    fn remove_from_batch(&mut self, id: TroveId) -> Result<()> {
        self.remove_entry(id, true)
    }

    fn get_last(&self) -> Option<TroveId> {
        self.order.values().next().copied()
    }

    fn get_prev(&self, id: TroveId) -> Option<TroveId> {
        let entry = self.entries.get(&id)?;
        self.order
            .range((std::ops::Bound::Excluded(entry.key), std::ops::Bound::Unbounded))
            .next()
            .map(|(_, id)| *id)
    }

    fn contains(&self, id: TroveId) -> bool {
        self.entries.contains_key(&id)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::math::percent;

    #[test]
    fn test_ascending_rate_order() {
        let mut sorted = InMemorySortedTroves::new();
        sorted.insert(TroveId(1), percent(5)).unwrap();
        sorted.insert(TroveId(2), percent(2)).unwrap();
        sorted.insert(TroveId(3), percent(9)).unwrap();

        assert_eq!(sorted.get_last(), Some(TroveId(2)));
        assert_eq!(sorted.get_prev(TroveId(2)), Some(TroveId(1)));
        assert_eq!(sorted.get_prev(TroveId(1)), Some(TroveId(3)));
        assert_eq!(sorted.get_prev(TroveId(3)), None);
    }

    #[test]
    fn test_ties_by_insertion_order() {
        let mut sorted = InMemorySortedTroves::new();
        sorted.insert(TroveId(7), percent(3)).unwrap();
        sorted.insert(TroveId(4), percent(3)).unwrap();
        assert_eq!(sorted.ids(), vec![TroveId(7), TroveId(4)]);
    }

    #[test]
    fn test_remove_requires_matching_kind() {
        let mut sorted = InMemorySortedTroves::new();
        let manager = Address::from_label("manager");
        sorted.insert(TroveId(1), percent(3)).unwrap();
        sorted.insert_into_batch(TroveId(2), manager, percent(4)).unwrap();

        assert!(matches!(sorted.remove(TroveId(2)), Err(Error::TroveInBatch(2))));
        assert!(matches!(sorted.remove_from_batch(TroveId(1)), Err(Error::TroveNotInBatch(1))));

        sorted.remove_from_batch(TroveId(2)).unwrap();
        sorted.remove(TroveId(1)).unwrap();
        assert!(sorted.is_empty());
        assert!(sorted.remove(TroveId(1)).is_err());
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut sorted = InMemorySortedTroves::new();
        sorted.insert(TroveId(1), percent(3)).unwrap();
        assert!(sorted.insert(TroveId(1), percent(4)).is_err());
        assert_eq!(sorted.len(), 1);
    }
}
