//! P/T 网静态结构元素：库所、迁移、弧与拓扑图.
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::ids::{ArcId, PlaceId, TokenId, TransitionId};

pub type Weight = u64;

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("normal arc must connect one place and one transition, got {src:?} -> {target:?}")]
    InvalidEndpoints { src: NodeRef, target: NodeRef },
    #[error("inhibitor arc must run from a place to a transition, got {src:?} -> {target:?}")]
    InvalidInhibitor { src: NodeRef, target: NodeRef },
    #[error("place {0:?} is not part of this topology")]
    UnknownPlace(PlaceId),
    #[error("transition {0:?} is not part of this topology")]
    UnknownTransition(TransitionId),
    #[error("arc {0:?} is not part of this topology")]
    UnknownArc(ArcId),
    #[error("arc weight references undefined token {0:?}")]
    UnknownToken(TokenId),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Place {
    pub name: String,
}

impl Place {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub name: String,
    /// 无限服务语义: 单步发射度可超过 1.
    pub infinite_server: bool,
    pub priority: u32,
    /// Stochastic rate parameter, carried as an opaque attached value.
    pub rate: Option<f64>,
}

impl Transition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            infinite_server: false,
            priority: 0,
            rate: None,
        }
    }

    pub fn new_infinite_server(name: impl Into<String>) -> Self {
        Self {
            infinite_server: true,
            ..Self::new(name)
        }
    }
}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transition").field(&self.name).finish()
    }
}

/// Tagged endpoint reference, matched exhaustively at arc validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRef {
    Place(PlaceId),
    Transition(TransitionId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArcKind {
    Normal,
    Inhibitor,
}

/// A weighted arc between one place and one transition. Weights are
/// per-token-color resolved integers; a missing or zero entry means
/// "at least one token must pass" when matrices are built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arc {
    pub source: NodeRef,
    pub target: NodeRef,
    pub kind: ArcKind,
    pub weights: IndexMap<TokenId, Weight>,
}

impl Arc {
    pub fn weight_for(&self, token: TokenId) -> Weight {
        self.weights.get(&token).copied().unwrap_or(0)
    }

    pub fn touches_place(&self, place: PlaceId) -> bool {
        self.source == NodeRef::Place(place) || self.target == NodeRef::Place(place)
    }

    pub fn touches_transition(&self, transition: TransitionId) -> bool {
        self.source == NodeRef::Transition(transition)
            || self.target == NodeRef::Transition(transition)
    }
}

/// Insertion-ordered structural graph. Ids are stable handles; the row and
/// column index of a node is its current position in insertion order, so any
/// mutation here invalidates matrices derived from an earlier state. The
/// `version` counter stamps that state for the matrix cache.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    places: IndexMap<PlaceId, Place>,
    transitions: IndexMap<TransitionId, Transition>,
    arcs: IndexMap<ArcId, Arc>,
    next_place: u32,
    next_transition: u32,
    next_arc: u32,
    version: u64,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn add_place(&mut self, place: Place) -> PlaceId {
        let id = PlaceId::new(self.next_place);
        self.next_place += 1;
        self.places.insert(id, place);
        self.version += 1;
        id
    }

    pub fn add_transition(&mut self, transition: Transition) -> TransitionId {
        let id = TransitionId::new(self.next_transition);
        self.next_transition += 1;
        self.transitions.insert(id, transition);
        self.version += 1;
        id
    }

    pub fn add_arc(
        &mut self,
        source: NodeRef,
        target: NodeRef,
        kind: ArcKind,
        weights: IndexMap<TokenId, Weight>,
    ) -> Result<ArcId, TopologyError> {
        self.check_endpoint(source)?;
        self.check_endpoint(target)?;
        match (kind, source, target) {
            (ArcKind::Normal, NodeRef::Place(_), NodeRef::Transition(_))
            | (ArcKind::Normal, NodeRef::Transition(_), NodeRef::Place(_)) => {}
            (ArcKind::Normal, _, _) => {
                return Err(TopologyError::InvalidEndpoints { src: source, target });
            }
            (ArcKind::Inhibitor, NodeRef::Place(_), NodeRef::Transition(_)) => {}
            (ArcKind::Inhibitor, _, _) => {
                return Err(TopologyError::InvalidInhibitor { src: source, target });
            }
        }
        let id = ArcId::new(self.next_arc);
        self.next_arc += 1;
        self.arcs.insert(
            id,
            Arc {
                source,
                target,
                kind,
                weights,
            },
        );
        self.version += 1;
        Ok(id)
    }

    fn check_endpoint(&self, endpoint: NodeRef) -> Result<(), TopologyError> {
        match endpoint {
            NodeRef::Place(place) if !self.places.contains_key(&place) => {
                Err(TopologyError::UnknownPlace(place))
            }
            NodeRef::Transition(transition) if !self.transitions.contains_key(&transition) => {
                Err(TopologyError::UnknownTransition(transition))
            }
            _ => Ok(()),
        }
    }

    /// Removes a place and every arc incident to it. `shift_remove` keeps
    /// the insertion order of the remaining nodes intact.
    pub fn remove_place(&mut self, place: PlaceId) -> Result<(Place, Vec<ArcId>), TopologyError> {
        let removed = self
            .places
            .shift_remove(&place)
            .ok_or(TopologyError::UnknownPlace(place))?;
        let incident: Vec<ArcId> = self
            .arcs
            .iter()
            .filter(|(_, arc)| arc.touches_place(place))
            .map(|(id, _)| *id)
            .collect();
        for id in &incident {
            self.arcs.shift_remove(id);
        }
        self.version += 1;
        Ok((removed, incident))
    }

    pub fn remove_transition(
        &mut self,
        transition: TransitionId,
    ) -> Result<(Transition, Vec<ArcId>), TopologyError> {
        let removed = self
            .transitions
            .shift_remove(&transition)
            .ok_or(TopologyError::UnknownTransition(transition))?;
        let incident: Vec<ArcId> = self
            .arcs
            .iter()
            .filter(|(_, arc)| arc.touches_transition(transition))
            .map(|(id, _)| *id)
            .collect();
        for id in &incident {
            self.arcs.shift_remove(id);
        }
        self.version += 1;
        Ok((removed, incident))
    }

    pub fn remove_arc(&mut self, arc: ArcId) -> Result<Arc, TopologyError> {
        let removed = self
            .arcs
            .shift_remove(&arc)
            .ok_or(TopologyError::UnknownArc(arc))?;
        self.version += 1;
        Ok(removed)
    }

    pub fn get_place(&self, place: PlaceId) -> Result<&Place, TopologyError> {
        self.places
            .get(&place)
            .ok_or(TopologyError::UnknownPlace(place))
    }

    pub fn get_transition(&self, transition: TransitionId) -> Result<&Transition, TopologyError> {
        self.transitions
            .get(&transition)
            .ok_or(TopologyError::UnknownTransition(transition))
    }

    pub fn get_arc(&self, arc: ArcId) -> Result<&Arc, TopologyError> {
        self.arcs.get(&arc).ok_or(TopologyError::UnknownArc(arc))
    }

    pub fn places(&self) -> impl Iterator<Item = (PlaceId, &Place)> {
        self.places.iter().map(|(id, place)| (*id, place))
    }

    pub fn transitions(&self) -> impl Iterator<Item = (TransitionId, &Transition)> {
        self.transitions.iter().map(|(id, t)| (*id, t))
    }

    pub fn arcs(&self) -> impl Iterator<Item = (ArcId, &Arc)> {
        self.arcs.iter().map(|(id, arc)| (*id, arc))
    }

    pub fn place_index(&self, place: PlaceId) -> Option<usize> {
        self.places.get_index_of(&place)
    }

    pub fn transition_index(&self, transition: TransitionId) -> Option<usize> {
        self.transitions.get_index_of(&transition)
    }

    pub fn places_len(&self) -> usize {
        self.places.len()
    }

    pub fn transitions_len(&self) -> usize {
        self.transitions.len()
    }

    pub fn arcs_len(&self) -> usize {
        self.arcs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_nodes() -> (Topology, PlaceId, TransitionId) {
        let mut topology = Topology::new();
        let p = topology.add_place(Place::new("p0"));
        let t = topology.add_transition(Transition::new("t0"));
        (topology, p, t)
    }

    #[test]
    fn normal_arc_rejects_same_kind_endpoints() {
        let (mut topology, p, _) = two_nodes();
        let q = topology.add_place(Place::new("p1"));
        let err = topology
            .add_arc(
                NodeRef::Place(p),
                NodeRef::Place(q),
                ArcKind::Normal,
                IndexMap::new(),
            )
            .unwrap_err();
        assert!(matches!(err, TopologyError::InvalidEndpoints { .. }));
    }

    #[test]
    fn inhibitor_arc_must_run_place_to_transition() {
        let (mut topology, p, t) = two_nodes();
        let err = topology
            .add_arc(
                NodeRef::Transition(t),
                NodeRef::Place(p),
                ArcKind::Inhibitor,
                IndexMap::new(),
            )
            .unwrap_err();
        assert!(matches!(err, TopologyError::InvalidInhibitor { .. }));
    }

    #[test]
    fn arc_endpoints_must_exist() {
        let (mut topology, p, _) = two_nodes();
        let ghost = TransitionId::new(99);
        let err = topology
            .add_arc(
                NodeRef::Place(p),
                NodeRef::Transition(ghost),
                ArcKind::Normal,
                IndexMap::new(),
            )
            .unwrap_err();
        assert!(matches!(err, TopologyError::UnknownTransition(_)));
    }

    #[test]
    fn removing_a_node_cascades_to_incident_arcs() {
        let (mut topology, p, t) = two_nodes();
        let arc = topology
            .add_arc(
                NodeRef::Place(p),
                NodeRef::Transition(t),
                ArcKind::Normal,
                IndexMap::new(),
            )
            .unwrap();

        let (_, cascaded) = topology.remove_place(p).unwrap();
        assert_eq!(cascaded, vec![arc]);
        assert_eq!(topology.arcs_len(), 0);
        assert!(matches!(
            topology.get_arc(arc),
            Err(TopologyError::UnknownArc(_))
        ));
    }

    #[test]
    fn removal_keeps_insertion_order_and_handles_stable() {
        let mut topology = Topology::new();
        let p0 = topology.add_place(Place::new("p0"));
        let p1 = topology.add_place(Place::new("p1"));
        let p2 = topology.add_place(Place::new("p2"));

        topology.remove_place(p1).unwrap();
        let order: Vec<PlaceId> = topology.places().map(|(id, _)| id).collect();
        assert_eq!(order, vec![p0, p2]);
        assert_eq!(topology.place_index(p2), Some(1));
        assert_eq!(topology.place_index(p1), None);
    }

    #[test]
    fn every_mutation_bumps_the_version() {
        let mut topology = Topology::new();
        let before = topology.version();
        let p = topology.add_place(Place::new("p0"));
        let t = topology.add_transition(Transition::new("t0"));
        topology
            .add_arc(
                NodeRef::Place(p),
                NodeRef::Transition(t),
                ArcKind::Normal,
                IndexMap::new(),
            )
            .unwrap();
        assert_eq!(topology.version(), before + 3);
    }
}
