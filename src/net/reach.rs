//! 可达性探索：基于使能/发射原语的有界 BFS 状态空间构造.
//!
//! 引擎自身不做冲突仲裁; 这里给出一个穷举驱动者, 对每个可激发迁移的每个
//! 可行发射度都展开一条边, 用标识快照去重.
use std::collections::{HashMap, VecDeque};

use log::debug;

use crate::net::core::Net;
use crate::net::engine::{self, Enabling, FireError};
use crate::net::ids::TransitionId;
use crate::net::marking::{Marking, MarkingSnapshot};
use crate::net::matrix::InvariantError;
use crate::net::structure::Weight;

#[derive(Debug, Clone, Copy)]
pub struct ExploreOptions {
    /// Hard cap on the number of distinct markings; exceeding it sets
    /// `truncated` instead of failing.
    pub max_states: usize,
}

impl Default for ExploreOptions {
    fn default() -> Self {
        Self { max_states: 10_000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReachabilityEdge {
    pub from: usize,
    pub to: usize,
    pub transition: TransitionId,
    pub degree: Weight,
}

/// State space reached from one initial marking. States are indices into
/// `states`; `deadlocks` lists states with no enabled transition.
#[derive(Debug, Clone, Default)]
pub struct ReachabilityGraph {
    pub states: Vec<MarkingSnapshot>,
    pub edges: Vec<ReachabilityEdge>,
    pub deadlocks: Vec<usize>,
    pub truncated: bool,
}

impl ReachabilityGraph {
    pub fn state_count(&self) -> usize {
        self.states.len()
    }
}

/// Breadth-first exploration from `initial`. Works on value snapshots, so
/// token lock counts are untouched; only the session marking owns locks.
pub fn explore(
    net: &mut Net,
    initial: &Marking,
    options: ExploreOptions,
) -> Result<ReachabilityGraph, InvariantError> {
    let transitions: Vec<(TransitionId, bool)> = net
        .topology()
        .transitions()
        .map(|(id, t)| (id, t.infinite_server))
        .collect();
    let sets = net.engine_sets()?;

    let mut graph = ReachabilityGraph::default();
    let mut index: HashMap<MarkingSnapshot, usize> = HashMap::new();
    let root = initial.snapshot();
    index.insert(root.clone(), 0);
    graph.states.push(root);

    let mut queue = VecDeque::from([0usize]);
    while let Some(current) = queue.pop_front() {
        let counts = graph.states[current].counts().clone();
        let mut any_enabled = false;

        for &(transition, infinite) in &transitions {
            let degree = match engine::enabling_in(&sets, transition, infinite, &counts)? {
                Enabling::Disabled => continue,
                Enabling::Enabled { degree } => degree,
            };
            any_enabled = true;

            for d in 1..=degree {
                let next =
                    engine::fire_in(&sets, transition, infinite, d, &counts).map_err(|err| {
                        match err {
                            FireError::Invariant(inner) => inner,
                            other => InvariantError::Internal(format!(
                                "exploration fired an inadmissible step: {other}"
                            )),
                        }
                    })?;
                let snapshot = MarkingSnapshot::from_counts(next);
                let to = match index.get(&snapshot) {
                    Some(existing) => *existing,
                    None => {
                        if graph.states.len() >= options.max_states {
                            graph.truncated = true;
                            continue;
                        }
                        let fresh = graph.states.len();
                        graph.states.push(snapshot.clone());
                        index.insert(snapshot, fresh);
                        queue.push_back(fresh);
                        fresh
                    }
                };
                graph.edges.push(ReachabilityEdge {
                    from: current,
                    to,
                    transition,
                    degree: d,
                });
            }
        }

        if !any_enabled {
            graph.deadlocks.push(current);
        }
    }

    debug!(
        "explored {} states, {} edges, {} deadlocks{}",
        graph.states.len(),
        graph.edges.len(),
        graph.deadlocks.len(),
        if graph.truncated { " (truncated)" } else { "" }
    );
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::ids::TokenId;
    use crate::net::structure::{ArcKind, NodeRef, Place, Transition};
    use crate::net::token::Rgb;
    use indexmap::IndexMap;

    fn weights_for(token: TokenId, weight: Weight) -> IndexMap<TokenId, Weight> {
        let mut map = IndexMap::new();
        map.insert(token, weight);
        map
    }

    #[test]
    fn confluent_paths_deduplicate() {
        // Two transitions both move the token from p0 to p1.
        let mut net = Net::new();
        let token = net.define_token("Default", true, Rgb::BLACK).unwrap();
        let p0 = net.add_place(Place::new("p0"));
        let p1 = net.add_place(Place::new("p1"));
        for name in ["ta", "tb"] {
            let t = net.add_transition(Transition::new(name));
            net.add_arc(
                NodeRef::Place(p0),
                NodeRef::Transition(t),
                ArcKind::Normal,
                weights_for(token, 1),
            )
            .unwrap();
            net.add_arc(
                NodeRef::Transition(t),
                NodeRef::Place(p1),
                ArcKind::Normal,
                weights_for(token, 1),
            )
            .unwrap();
        }

        let mut marking = Marking::new();
        net.set_marking(&mut marking, p0, token, 1).unwrap();
        let graph = explore(&mut net, &marking, ExploreOptions::default()).unwrap();

        assert_eq!(graph.state_count(), 2);
        assert_eq!(graph.edges.len(), 2);
        assert_eq!(graph.deadlocks, vec![1]);
        assert!(!graph.truncated);
    }

    #[test]
    fn infinite_server_expands_every_degree() {
        // One infinite-server sink consuming two tokens per firing.
        let mut net = Net::new();
        let token = net.define_token("Default", true, Rgb::BLACK).unwrap();
        let p0 = net.add_place(Place::new("p0"));
        let t = net.add_transition(Transition::new_infinite_server("t"));
        net.add_arc(
            NodeRef::Place(p0),
            NodeRef::Transition(t),
            ArcKind::Normal,
            weights_for(token, 2),
        )
        .unwrap();

        let mut marking = Marking::new();
        net.set_marking(&mut marking, p0, token, 4).unwrap();
        let graph = explore(&mut net, &marking, ExploreOptions::default()).unwrap();

        // {4} -d1-> {2}, {4} -d2-> {0}, {2} -d1-> {0}
        assert_eq!(graph.state_count(), 3);
        assert_eq!(graph.edges.len(), 3);
        assert_eq!(graph.deadlocks.len(), 1);
        assert!(
            graph
                .edges
                .iter()
                .any(|edge| edge.degree == 2 && edge.from == 0)
        );
    }

    #[test]
    fn unbounded_net_truncates_at_cap() {
        // A source transition with no input arc grows p0 forever.
        let mut net = Net::new();
        let token = net.define_token("Default", true, Rgb::BLACK).unwrap();
        let p0 = net.add_place(Place::new("p0"));
        let t = net.add_transition(Transition::new("t"));
        net.add_arc(
            NodeRef::Transition(t),
            NodeRef::Place(p0),
            ArcKind::Normal,
            weights_for(token, 1),
        )
        .unwrap();

        let marking = Marking::new();
        let graph = explore(&mut net, &marking, ExploreOptions { max_states: 8 }).unwrap();
        assert!(graph.truncated);
        assert_eq!(graph.state_count(), 8);
        assert!(graph.deadlocks.is_empty());
    }
}
