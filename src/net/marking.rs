//! 标识状态：每 (库所, 颜色) 的令牌计数与锁计数记账.
use std::collections::BTreeMap;

use thiserror::Error;

use crate::net::ids::{PlaceId, TokenId};
use crate::net::structure::Weight;
use crate::net::token::{TokenError, TokenRegistry};

/// Sparse nonzero count table, ordered for deterministic hashing.
pub(crate) type CountMap = BTreeMap<(PlaceId, TokenId), Weight>;

#[derive(Debug, Error)]
pub enum MarkingError {
    #[error(
        "marking for place {place:?}, token {token:?} would become negative: {current} {delta:+}"
    )]
    NegativeCount {
        place: PlaceId,
        token: TokenId,
        current: Weight,
        delta: i64,
    },
    #[error(transparent)]
    Token(#[from] TokenError),
}

/// Live per-place, per-color token counts of one simulation session.
///
/// Every count change goes through [`Marking::write_count`], the single
/// point that keeps token lock counts in step with the marking: a color
/// gains a lock when a place's count leaves zero and releases it when the
/// count returns to zero. A `clone` is a plain value copy and does not
/// duplicate lock ownership; exploration works on snapshots instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Marking {
    counts: CountMap,
}

impl Marking {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, place: PlaceId, token: TokenId) -> Weight {
        self.counts.get(&(place, token)).copied().unwrap_or(0)
    }

    /// Sets an exact count. The token must be defined; counts are unsigned
    /// so a negative value is unrepresentable here, `adjust` covers deltas.
    pub fn set(
        &mut self,
        registry: &mut TokenRegistry,
        place: PlaceId,
        token: TokenId,
        value: Weight,
    ) -> Result<(), MarkingError> {
        registry.get(token)?;
        self.write_count(registry, place, token, value);
        Ok(())
    }

    /// Administrative relative edit; rejects any delta that would take the
    /// count below zero.
    pub fn adjust(
        &mut self,
        registry: &mut TokenRegistry,
        place: PlaceId,
        token: TokenId,
        delta: i64,
    ) -> Result<Weight, MarkingError> {
        registry.get(token)?;
        let current = self.get(place, token);
        let next = current
            .checked_add_signed(delta)
            .ok_or(MarkingError::NegativeCount {
                place,
                token,
                current,
                delta,
            })?;
        self.write_count(registry, place, token, next);
        Ok(next)
    }

    /// Zeroes every count held at a place, releasing the color locks it
    /// held. Used when the place is removed from the topology.
    pub(crate) fn clear_place(&mut self, registry: &mut TokenRegistry, place: PlaceId) {
        let held: Vec<TokenId> = self
            .counts
            .range((place, TokenId::new(0))..=(place, TokenId::new(u32::MAX)))
            .map(|((_, token), _)| *token)
            .collect();
        for token in held {
            self.write_count(registry, place, token, 0);
        }
    }

    /// Replaces the whole count table, reconciling lock counts against the
    /// old one. This is the atomic commit path of the firing engine.
    pub(crate) fn replace_counts(&mut self, registry: &mut TokenRegistry, new: CountMap) {
        // Reconcile per key: release locks that dropped to zero, acquire
        // locks that left zero.
        for (&(place, token), &old) in &self.counts {
            let now = new.get(&(place, token)).copied().unwrap_or(0);
            if old > 0 && now == 0 {
                registry.decrement_lock(token);
            }
        }
        for (&(place, token), &now) in &new {
            let old = self.counts.get(&(place, token)).copied().unwrap_or(0);
            if old == 0 && now > 0 {
                registry.increment_lock(token);
            }
        }
        self.counts = new;
    }

    fn write_count(
        &mut self,
        registry: &mut TokenRegistry,
        place: PlaceId,
        token: TokenId,
        value: Weight,
    ) {
        let old = self.get(place, token);
        if old == 0 && value > 0 {
            registry.increment_lock(token);
        } else if old > 0 && value == 0 {
            registry.decrement_lock(token);
        }
        if value == 0 {
            self.counts.remove(&(place, token));
        } else {
            self.counts.insert((place, token), value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlaceId, TokenId, Weight)> + '_ {
        self.counts
            .iter()
            .map(|(&(place, token), &count)| (place, token, count))
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub(crate) fn counts(&self) -> &CountMap {
        &self.counts
    }

    /// Immutable copy for state-space hashing and deduplication.
    pub fn snapshot(&self) -> MarkingSnapshot {
        MarkingSnapshot::from_counts(self.counts.clone())
    }
}

/// Value snapshot of a marking; hashable and comparable so reachability
/// drivers can deduplicate visited states.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct MarkingSnapshot {
    counts: CountMap,
}

impl MarkingSnapshot {
    pub(crate) fn from_counts(mut counts: CountMap) -> Self {
        counts.retain(|_, count| *count > 0);
        Self { counts }
    }

    pub fn get(&self, place: PlaceId, token: TokenId) -> Weight {
        self.counts.get(&(place, token)).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlaceId, TokenId, Weight)> + '_ {
        self.counts
            .iter()
            .map(|(&(place, token), &count)| (place, token, count))
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub(crate) fn counts(&self) -> &CountMap {
        &self.counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::token::Rgb;

    fn registry_with(name: &str) -> (TokenRegistry, TokenId) {
        let mut registry = TokenRegistry::new();
        let token = registry.define(name, true, Rgb::BLACK).unwrap();
        (registry, token)
    }

    #[test]
    fn lock_count_follows_transitions_through_zero() {
        let (mut registry, token) = registry_with("Default");
        let mut marking = Marking::new();
        let p0 = PlaceId::new(0);
        let p1 = PlaceId::new(1);

        marking.set(&mut registry, p0, token, 2).unwrap();
        marking.set(&mut registry, p1, token, 1).unwrap();
        assert_eq!(registry.lock_count(token).unwrap(), 2);

        // Changing a nonzero count does not touch the lock.
        marking.set(&mut registry, p0, token, 5).unwrap();
        assert_eq!(registry.lock_count(token).unwrap(), 2);

        marking.set(&mut registry, p0, token, 0).unwrap();
        assert_eq!(registry.lock_count(token).unwrap(), 1);
        marking.set(&mut registry, p1, token, 0).unwrap();
        assert!(!registry.is_locked(token).unwrap());
    }

    #[test]
    fn adjust_rejects_negative_result() {
        let (mut registry, token) = registry_with("Default");
        let mut marking = Marking::new();
        let p0 = PlaceId::new(0);

        marking.set(&mut registry, p0, token, 1).unwrap();
        let err = marking.adjust(&mut registry, p0, token, -2).unwrap_err();
        assert!(matches!(err, MarkingError::NegativeCount { current: 1, .. }));
        // Count unchanged after the rejected edit.
        assert_eq!(marking.get(p0, token), 1);
    }

    #[test]
    fn snapshots_compare_by_value() {
        let (mut registry, token) = registry_with("Default");
        let p0 = PlaceId::new(0);

        let mut a = Marking::new();
        a.set(&mut registry, p0, token, 3).unwrap();
        let mut b = Marking::new();
        b.set(&mut registry, p0, token, 3).unwrap();

        assert_eq!(a.snapshot(), b.snapshot());
        b.set(&mut registry, p0, token, 2).unwrap();
        assert_ne!(a.snapshot(), b.snapshot());
    }

    #[test]
    fn clear_place_releases_locks() {
        let (mut registry, token) = registry_with("Default");
        let mut marking = Marking::new();
        let p0 = PlaceId::new(0);

        marking.set(&mut registry, p0, token, 4).unwrap();
        marking.clear_place(&mut registry, p0);
        assert_eq!(marking.get(p0, token), 0);
        assert!(!registry.is_locked(token).unwrap());
    }
}
