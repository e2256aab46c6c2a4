//! 关联矩阵构建器：按令牌颜色从拓扑图导出前向/后向/净/抑制矩阵并缓存.
use std::collections::HashMap;

use indexmap::IndexMap;
use log::debug;
use thiserror::Error;

use crate::net::ids::{PlaceId, TokenId, TransitionId};
use crate::net::incidence::{Incidence, IncidenceBool};
use crate::net::structure::{ArcKind, NodeRef, Topology, Weight};

/// Fatal builder/engine faults. These indicate a bug in matrix construction
/// or cache bookkeeping, never bad user input; callers should abort the
/// enclosing computation.
#[derive(Debug, Error)]
pub enum InvariantError {
    #[error("{0} missing from the captured matrix ordering")]
    IndexNotFound(String),
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Forward,
    Backward,
    Net,
    Inhibitor,
}

#[derive(Debug, Clone, Copy)]
struct Changed {
    forward: bool,
    backward: bool,
    net: bool,
    inhibitor: bool,
}

impl Changed {
    const ALL: Changed = Changed {
        forward: true,
        backward: true,
        net: true,
        inhibitor: true,
    };
}

/// The four per-color matrices plus the node ordering they were built
/// against. A variant is rebuilt only when read while its changed flag is
/// set; rebuilding against an unchanged topology is bit-identical.
#[derive(Debug, Clone)]
pub struct MatrixSet {
    token: TokenId,
    version: u64,
    place_order: Vec<PlaceId>,
    transition_order: Vec<TransitionId>,
    place_pos: HashMap<PlaceId, usize>,
    transition_pos: HashMap<TransitionId, usize>,
    forward: Incidence<Weight>,
    backward: Incidence<Weight>,
    net: Incidence<i64>,
    inhibitor: IncidenceBool,
    // Per-color inhibition thresholds, arc weight with 0 meaning 1. The
    // exposed inhibitor matrix stays boolean; only the engine reads this.
    thresholds: Incidence<Weight>,
    changed: Changed,
}

impl MatrixSet {
    fn new(token: TokenId, topology: &Topology) -> Self {
        let mut set = Self {
            token,
            version: topology.version(),
            place_order: Vec::new(),
            transition_order: Vec::new(),
            place_pos: HashMap::new(),
            transition_pos: HashMap::new(),
            forward: Incidence::new(0, 0, 0),
            backward: Incidence::new(0, 0, 0),
            net: Incidence::new(0, 0, 0),
            inhibitor: IncidenceBool::new(0, 0),
            thresholds: Incidence::new(0, 0, 0),
            changed: Changed::ALL,
        };
        set.capture_ordering(topology);
        set
    }

    fn capture_ordering(&mut self, topology: &Topology) {
        self.place_order = topology.places().map(|(id, _)| id).collect();
        self.transition_order = topology.transitions().map(|(id, _)| id).collect();
        self.place_pos = self
            .place_order
            .iter()
            .enumerate()
            .map(|(pos, id)| (*id, pos))
            .collect();
        self.transition_pos = self
            .transition_order
            .iter()
            .enumerate()
            .map(|(pos, id)| (*id, pos))
            .collect();
        self.version = topology.version();
        self.changed = Changed::ALL;
    }

    pub fn token(&self) -> TokenId {
        self.token
    }

    pub fn place_order(&self) -> &[PlaceId] {
        &self.place_order
    }

    pub fn transition_order(&self) -> &[TransitionId] {
        &self.transition_order
    }

    pub fn place_row(&self, place: PlaceId) -> Result<usize, InvariantError> {
        self.place_pos
            .get(&place)
            .copied()
            .ok_or_else(|| InvariantError::IndexNotFound(format!("{place:?}")))
    }

    pub fn transition_col(&self, transition: TransitionId) -> Result<usize, InvariantError> {
        self.transition_pos
            .get(&transition)
            .copied()
            .ok_or_else(|| InvariantError::IndexNotFound(format!("{transition:?}")))
    }

    pub fn forward(&self) -> &Incidence<Weight> {
        &self.forward
    }

    pub fn backward(&self) -> &Incidence<Weight> {
        &self.backward
    }

    pub fn net(&self) -> &Incidence<i64> {
        &self.net
    }

    pub fn inhibitor(&self) -> &IncidenceBool {
        &self.inhibitor
    }

    pub(crate) fn threshold(&self, row: usize, col: usize) -> Weight {
        *self.thresholds.get(row, col)
    }

    /// `weight == 0` stands for "at least one token must pass".
    fn effective_weight(&self, raw: Weight) -> Weight {
        if raw == 0 { 1 } else { raw }
    }

    fn rebuild_forward(&mut self, topology: &Topology) -> Result<(), InvariantError> {
        debug!(
            "rebuilding forward matrix for token {:?} at topology version {}",
            self.token, self.version
        );
        let mut forward = Incidence::new(self.place_order.len(), self.transition_order.len(), 0);
        for (_, arc) in topology.arcs() {
            if arc.kind != ArcKind::Normal {
                continue;
            }
            if let (NodeRef::Transition(transition), NodeRef::Place(place)) =
                (arc.source, arc.target)
            {
                let row = self.place_row(place)?;
                let col = self.transition_col(transition)?;
                let weight = self.effective_weight(arc.weight_for(self.token));
                // Parallel arcs between the same pair accumulate.
                forward.add_assign(row, col, weight);
            }
        }
        self.forward = forward;
        self.changed.forward = false;
        Ok(())
    }

    /// Consumption weights are the raw per-color arc weights; any
    /// infinite-server degree scaling happens at firing time, keeping the
    /// structural matrix independent of the marking.
    fn rebuild_backward(&mut self, topology: &Topology) -> Result<(), InvariantError> {
        debug!(
            "rebuilding backward matrix for token {:?} at topology version {}",
            self.token, self.version
        );
        let mut backward = Incidence::new(self.place_order.len(), self.transition_order.len(), 0);
        for (_, arc) in topology.arcs() {
            if arc.kind != ArcKind::Normal {
                continue;
            }
            if let (NodeRef::Place(place), NodeRef::Transition(transition)) =
                (arc.source, arc.target)
            {
                let row = self.place_row(place)?;
                let col = self.transition_col(transition)?;
                let weight = self.effective_weight(arc.weight_for(self.token));
                backward.add_assign(row, col, weight);
            }
        }
        self.backward = backward;
        self.changed.backward = false;
        Ok(())
    }

    fn rebuild_net(&mut self, topology: &Topology) -> Result<(), InvariantError> {
        if self.changed.forward {
            self.rebuild_forward(topology)?;
        }
        if self.changed.backward {
            self.rebuild_backward(topology)?;
        }
        self.net = self.forward.difference(&self.backward);
        self.changed.net = false;
        Ok(())
    }

    fn rebuild_inhibitor(&mut self, topology: &Topology) -> Result<(), InvariantError> {
        debug!(
            "rebuilding inhibitor matrix for token {:?} at topology version {}",
            self.token, self.version
        );
        let places = self.place_order.len();
        let transitions = self.transition_order.len();
        let mut inhibitor = IncidenceBool::new(places, transitions);
        let mut thresholds = Incidence::new(places, transitions, 0);
        for (_, arc) in topology.arcs() {
            if arc.kind != ArcKind::Inhibitor {
                continue;
            }
            if let (NodeRef::Place(place), NodeRef::Transition(transition)) =
                (arc.source, arc.target)
            {
                let row = self.place_row(place)?;
                let col = self.transition_col(transition)?;
                // Boolean matrix, exactly 1 regardless of weight.
                inhibitor.set(row, col, true);
                let threshold = self.effective_weight(arc.weight_for(self.token));
                let current = *thresholds.get(row, col);
                if current == 0 || threshold < current {
                    thresholds.set(row, col, threshold);
                }
            } else {
                return Err(InvariantError::Internal(format!(
                    "inhibitor arc with endpoints {:?} -> {:?} survived validation",
                    arc.source, arc.target
                )));
            }
        }
        self.inhibitor = inhibitor;
        self.thresholds = thresholds;
        self.changed.inhibitor = false;
        Ok(())
    }

    fn ensure(&mut self, topology: &Topology, variant: Variant) -> Result<(), InvariantError> {
        if self.version != topology.version() {
            self.capture_ordering(topology);
        }
        match variant {
            Variant::Forward if self.changed.forward => self.rebuild_forward(topology),
            Variant::Backward if self.changed.backward => self.rebuild_backward(topology),
            Variant::Net if self.changed.net => self.rebuild_net(topology),
            Variant::Inhibitor if self.changed.inhibitor => self.rebuild_inhibitor(topology),
            _ => Ok(()),
        }
    }

    fn mark_changed(&mut self) {
        self.changed = Changed::ALL;
    }
}

/// Per-color cache of matrix sets, invalidated by the owning net on
/// structural or token mutation.
#[derive(Debug, Clone, Default)]
pub struct MatrixCache {
    sets: IndexMap<TokenId, MatrixSet>,
}

impl MatrixCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn invalidate_token(&mut self, token: TokenId) {
        if let Some(set) = self.sets.get_mut(&token) {
            set.mark_changed();
        }
    }

    pub(crate) fn drop_token(&mut self, token: TokenId) {
        self.sets.shift_remove(&token);
    }

    /// Rebuild-if-stale access for a single variant.
    pub(crate) fn ensure(
        &mut self,
        topology: &Topology,
        token: TokenId,
        variant: Variant,
    ) -> Result<&MatrixSet, InvariantError> {
        let set = self
            .sets
            .entry(token)
            .or_insert_with(|| MatrixSet::new(token, topology));
        set.ensure(topology, variant)?;
        Ok(set)
    }

    /// Rebuilds every stale variant; the engine wants all four coherent.
    pub(crate) fn ensure_all(
        &mut self,
        topology: &Topology,
        token: TokenId,
    ) -> Result<&MatrixSet, InvariantError> {
        let set = self
            .sets
            .entry(token)
            .or_insert_with(|| MatrixSet::new(token, topology));
        for variant in [
            Variant::Forward,
            Variant::Backward,
            Variant::Net,
            Variant::Inhibitor,
        ] {
            set.ensure(topology, variant)?;
        }
        Ok(set)
    }

    pub(crate) fn get(&self, token: TokenId) -> Option<&MatrixSet> {
        self.sets.get(&token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::structure::{Place, Transition};
    use crate::net::token::{Rgb, TokenRegistry};
    use indexmap::IndexMap as Map;

    fn weights(token: TokenId, weight: Weight) -> Map<TokenId, Weight> {
        let mut map = Map::new();
        map.insert(token, weight);
        map
    }

    fn simple_net() -> (Topology, TokenId, PlaceId, TransitionId, PlaceId) {
        let mut registry = TokenRegistry::new();
        let token = registry.define("Default", true, Rgb::BLACK).unwrap();
        let mut topology = Topology::new();
        let p0 = topology.add_place(Place::new("p0"));
        let t0 = topology.add_transition(Transition::new("t0"));
        let p1 = topology.add_place(Place::new("p1"));
        topology
            .add_arc(
                NodeRef::Place(p0),
                NodeRef::Transition(t0),
                ArcKind::Normal,
                weights(token, 2),
            )
            .unwrap();
        topology
            .add_arc(
                NodeRef::Transition(t0),
                NodeRef::Place(p1),
                ArcKind::Normal,
                weights(token, 1),
            )
            .unwrap();
        (topology, token, p0, t0, p1)
    }

    #[test]
    fn net_is_forward_minus_backward() {
        let (topology, token, p0, t0, p1) = simple_net();
        let mut cache = MatrixCache::new();
        let set = cache.ensure_all(&topology, token).unwrap();

        let r0 = set.place_row(p0).unwrap();
        let r1 = set.place_row(p1).unwrap();
        let c0 = set.transition_col(t0).unwrap();

        assert_eq!(*set.backward().get(r0, c0), 2);
        assert_eq!(*set.forward().get(r1, c0), 1);
        assert_eq!(*set.net().get(r0, c0), -2);
        assert_eq!(*set.net().get(r1, c0), 1);
    }

    #[test]
    fn rebuild_without_change_is_idempotent() {
        let (topology, token, ..) = simple_net();
        let mut cache = MatrixCache::new();
        let first = cache.ensure_all(&topology, token).unwrap().clone();
        cache.invalidate_token(token);
        let second = cache.ensure_all(&topology, token).unwrap();
        assert_eq!(first.forward(), second.forward());
        assert_eq!(first.backward(), second.backward());
        assert_eq!(first.net(), second.net());
        assert_eq!(first.inhibitor(), second.inhibitor());
    }

    #[test]
    fn zero_weight_counts_as_one() {
        let mut registry = TokenRegistry::new();
        let token = registry.define("Default", true, Rgb::BLACK).unwrap();
        let mut topology = Topology::new();
        let p0 = topology.add_place(Place::new("p0"));
        let t0 = topology.add_transition(Transition::new("t0"));
        // Resolved weight of zero, and no entry at all for the color.
        topology
            .add_arc(
                NodeRef::Place(p0),
                NodeRef::Transition(t0),
                ArcKind::Normal,
                weights(token, 0),
            )
            .unwrap();
        topology
            .add_arc(
                NodeRef::Transition(t0),
                NodeRef::Place(p0),
                ArcKind::Normal,
                Map::new(),
            )
            .unwrap();

        let mut cache = MatrixCache::new();
        let set = cache.ensure_all(&topology, token).unwrap();
        let row = set.place_row(p0).unwrap();
        let col = set.transition_col(t0).unwrap();
        assert_eq!(*set.backward().get(row, col), 1);
        assert_eq!(*set.forward().get(row, col), 1);
    }

    #[test]
    fn parallel_arcs_accumulate() {
        let mut registry = TokenRegistry::new();
        let token = registry.define("Default", true, Rgb::BLACK).unwrap();
        let mut topology = Topology::new();
        let p0 = topology.add_place(Place::new("p0"));
        let t0 = topology.add_transition(Transition::new("t0"));
        for _ in 0..2 {
            topology
                .add_arc(
                    NodeRef::Transition(t0),
                    NodeRef::Place(p0),
                    ArcKind::Normal,
                    weights(token, 3),
                )
                .unwrap();
        }

        let mut cache = MatrixCache::new();
        let set = cache.ensure(&topology, token, Variant::Forward).unwrap();
        let row = set.place_row(p0).unwrap();
        let col = set.transition_col(t0).unwrap();
        assert_eq!(*set.forward().get(row, col), 6);
    }

    #[test]
    fn inhibitor_matrix_is_boolean_with_thresholds_aside() {
        let mut registry = TokenRegistry::new();
        let token = registry.define("Default", true, Rgb::BLACK).unwrap();
        let mut topology = Topology::new();
        let p0 = topology.add_place(Place::new("p0"));
        let t0 = topology.add_transition(Transition::new("t0"));
        topology
            .add_arc(
                NodeRef::Place(p0),
                NodeRef::Transition(t0),
                ArcKind::Inhibitor,
                weights(token, 4),
            )
            .unwrap();

        let mut cache = MatrixCache::new();
        let set = cache.ensure(&topology, token, Variant::Inhibitor).unwrap();
        let row = set.place_row(p0).unwrap();
        let col = set.transition_col(t0).unwrap();
        assert!(set.inhibitor().get(row, col));
        assert_eq!(set.threshold(row, col), 4);
    }

    #[test]
    fn topology_change_marks_matrices_stale() {
        let (mut topology, token, ..) = simple_net();
        let mut cache = MatrixCache::new();
        let before = cache.ensure_all(&topology, token).unwrap().clone();

        let p2 = topology.add_place(Place::new("p2"));
        let set = cache.ensure_all(&topology, token).unwrap();
        assert_eq!(set.place_order().len(), before.place_order().len() + 1);
        assert!(set.place_row(p2).is_ok());
    }

    #[test]
    fn lookup_outside_ordering_is_index_not_found() {
        let (topology, token, ..) = simple_net();
        let mut cache = MatrixCache::new();
        let set = cache.ensure_all(&topology, token).unwrap();
        let err = set.place_row(PlaceId::new(77)).unwrap_err();
        assert!(matches!(err, InvariantError::IndexNotFound(_)));
    }
}
