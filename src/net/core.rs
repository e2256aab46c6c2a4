//! 网核心门面：聚合拓扑图、令牌注册表与矩阵缓存, 暴露使能/发射原语.
use indexmap::IndexMap;
use log::{info, warn};

use crate::net::engine::{self, Enabling, FireError};
use crate::net::ids::{ArcId, PlaceId, TokenId, TransitionId};
use crate::net::incidence::{Incidence, IncidenceBool};
use crate::net::marking::{Marking, MarkingError, MarkingSnapshot};
use crate::net::matrix::{InvariantError, MatrixCache, MatrixSet, Variant};
use crate::net::structure::{
    Arc, ArcKind, NodeRef, Place, Topology, TopologyError, Transition, Weight,
};
use crate::net::token::{Rgb, TokenColor, TokenError, TokenRegistry};

/// 连通性诊断报告
#[derive(Debug, Clone, Default)]
pub struct DiagnosticReport {
    pub isolated_places: Vec<(PlaceId, String)>,
    pub isolated_transitions: Vec<(TransitionId, String)>,
    pub warnings: Vec<String>,
    pub total_places: usize,
    pub total_transitions: usize,
}

impl DiagnosticReport {
    pub fn has_issues(&self) -> bool {
        !self.isolated_places.is_empty()
            || !self.isolated_transitions.is_empty()
            || !self.warnings.is_empty()
    }
}

/// Aggregate over the structural graph, the token registry and the per-color
/// matrix cache. All mutation goes through this facade so cache invalidation
/// stays in one place; markings are session-owned and passed in explicitly.
///
/// Single-writer by construction: `&mut self` serializes structural mutation
/// and cache rebuilds, independent read-only sessions can share `&Net`.
#[derive(Debug, Clone, Default)]
pub struct Net {
    topology: Topology,
    tokens: TokenRegistry,
    matrices: MatrixCache,
}

impl Net {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn tokens(&self) -> &TokenRegistry {
        &self.tokens
    }

    // ---- token registry surface ----

    pub fn define_token(
        &mut self,
        name: impl Into<String>,
        enabled: bool,
        color: Rgb,
    ) -> Result<TokenId, TokenError> {
        self.tokens.define(name, enabled, color)
    }

    pub fn set_token_enabled(&mut self, token: TokenId, value: bool) -> Result<(), TokenError> {
        self.tokens.set_enabled(token, value)?;
        // The flag does not bump the topology version, so the cache must be
        // told about it directly.
        self.matrices.invalidate_token(token);
        Ok(())
    }

    /// Destroys a token color once nothing holds it: no marked place (lock
    /// count zero) and no arc weight entry.
    pub fn remove_token(&mut self, token: TokenId) -> Result<TokenColor, TokenError> {
        let color = self.tokens.get(token)?;
        if self
            .topology
            .arcs()
            .any(|(_, arc)| arc.weights.contains_key(&token))
        {
            return Err(TokenError::Referenced {
                name: color.name().to_owned(),
            });
        }
        let removed = self.tokens.remove(token)?;
        self.matrices.drop_token(token);
        Ok(removed)
    }

    pub fn is_token_locked(&self, token: TokenId) -> Result<bool, TokenError> {
        self.tokens.is_locked(token)
    }

    pub fn token_lock_count(&self, token: TokenId) -> Result<u32, TokenError> {
        self.tokens.lock_count(token)
    }

    // ---- topology surface ----
    //
    // Topology mutation bumps the graph version, which the cache treats as
    // stale for every color. With the zero-weight-means-one convention an
    // arc touches every color, so nothing finer is sound anyway.

    pub fn add_place(&mut self, place: Place) -> PlaceId {
        self.topology.add_place(place)
    }

    pub fn add_transition(&mut self, transition: Transition) -> TransitionId {
        self.topology.add_transition(transition)
    }

    pub fn add_arc(
        &mut self,
        source: NodeRef,
        target: NodeRef,
        kind: ArcKind,
        weights: IndexMap<TokenId, Weight>,
    ) -> Result<ArcId, TopologyError> {
        for token in weights.keys() {
            if self.tokens.get(*token).is_err() {
                return Err(TopologyError::UnknownToken(*token));
            }
        }
        self.topology.add_arc(source, target, kind, weights)
    }

    /// Removes a place, its incident arcs, and its marking. The marking is
    /// cleared first so every unit removed releases its color lock.
    pub fn remove_place(
        &mut self,
        marking: &mut Marking,
        place: PlaceId,
    ) -> Result<Place, TopologyError> {
        self.topology.get_place(place)?;
        marking.clear_place(&mut self.tokens, place);
        let (removed, _) = self.topology.remove_place(place)?;
        Ok(removed)
    }

    pub fn remove_transition(
        &mut self,
        transition: TransitionId,
    ) -> Result<Transition, TopologyError> {
        let (removed, _) = self.topology.remove_transition(transition)?;
        Ok(removed)
    }

    pub fn remove_arc(&mut self, arc: ArcId) -> Result<Arc, TopologyError> {
        self.topology.remove_arc(arc)
    }

    // ---- marking surface ----
    //
    // Markings are session-owned values, but every count change must route
    // through the registry's lock accounting, so edits go via the facade.

    pub fn set_marking(
        &mut self,
        marking: &mut Marking,
        place: PlaceId,
        token: TokenId,
        value: Weight,
    ) -> Result<(), MarkingError> {
        marking.set(&mut self.tokens, place, token, value)
    }

    pub fn adjust_marking(
        &mut self,
        marking: &mut Marking,
        place: PlaceId,
        token: TokenId,
        delta: i64,
    ) -> Result<Weight, MarkingError> {
        marking.adjust(&mut self.tokens, place, token, delta)
    }

    // ---- matrix surface (rebuild-if-stale) ----

    pub fn incidence_matrix(&mut self, token: TokenId) -> Result<&Incidence<i64>, InvariantError> {
        self.check_token(token)?;
        Ok(self
            .matrices
            .ensure(&self.topology, token, Variant::Net)?
            .net())
    }

    pub fn forward_matrix(&mut self, token: TokenId) -> Result<&Incidence<Weight>, InvariantError> {
        self.check_token(token)?;
        Ok(self
            .matrices
            .ensure(&self.topology, token, Variant::Forward)?
            .forward())
    }

    pub fn backward_matrix(
        &mut self,
        token: TokenId,
    ) -> Result<&Incidence<Weight>, InvariantError> {
        self.check_token(token)?;
        Ok(self
            .matrices
            .ensure(&self.topology, token, Variant::Backward)?
            .backward())
    }

    pub fn inhibitor_matrix(&mut self, token: TokenId) -> Result<&IncidenceBool, InvariantError> {
        self.check_token(token)?;
        Ok(self
            .matrices
            .ensure(&self.topology, token, Variant::Inhibitor)?
            .inhibitor())
    }

    /// Full matrix set for a color, with the node ordering it was built
    /// against. Rebuilds every stale variant.
    pub fn matrix_set(&mut self, token: TokenId) -> Result<&MatrixSet, InvariantError> {
        self.check_token(token)?;
        self.matrices.ensure_all(&self.topology, token)
    }

    fn check_token(&self, token: TokenId) -> Result<(), InvariantError> {
        if self.tokens.get(token).is_err() {
            return Err(InvariantError::IndexNotFound(format!("{token:?}")));
        }
        Ok(())
    }

    // ---- enabling & firing ----

    /// Rebuilds stale matrices for every enabled color and returns them in
    /// registry order.
    pub(crate) fn engine_sets(&mut self) -> Result<Vec<&MatrixSet>, InvariantError> {
        let enabled = self.tokens.enabled_tokens();
        for token in &enabled {
            self.matrices.ensure_all(&self.topology, *token)?;
        }
        enabled
            .iter()
            .map(|token| {
                self.matrices.get(*token).ok_or_else(|| {
                    InvariantError::Internal(format!("matrix set for {token:?} vanished"))
                })
            })
            .collect()
    }

    pub(crate) fn infinite_server(
        &self,
        transition: TransitionId,
    ) -> Result<bool, InvariantError> {
        self.topology
            .get_transition(transition)
            .map(|t| t.infinite_server)
            .map_err(|_| InvariantError::IndexNotFound(format!("{transition:?}")))
    }

    /// Is the transition enabled under `marking`, and with what degree.
    pub fn enabling_degree(
        &mut self,
        marking: &Marking,
        transition: TransitionId,
    ) -> Result<Enabling, InvariantError> {
        let infinite = self.infinite_server(transition)?;
        let sets = self.engine_sets()?;
        engine::enabling_in(&sets, transition, infinite, marking.counts())
    }

    /// Fires `transition` at `degree` against the session marking,
    /// atomically, and returns a snapshot of the successor marking. Lock
    /// counts follow every count that enters or leaves zero.
    pub fn fire(
        &mut self,
        marking: &mut Marking,
        transition: TransitionId,
        degree: Weight,
    ) -> Result<MarkingSnapshot, FireError> {
        let infinite = self.infinite_server(transition)?;
        let sets = self.engine_sets()?;
        let next = engine::fire_in(&sets, transition, infinite, degree, marking.counts())?;
        marking.replace_counts(&mut self.tokens, next);
        Ok(marking.snapshot())
    }

    // ---- diagnostics ----

    pub fn diagnose(&self) -> DiagnosticReport {
        let mut report = DiagnosticReport {
            total_places: self.topology.places_len(),
            total_transitions: self.topology.transitions_len(),
            ..Default::default()
        };

        for (place, data) in self.topology.places() {
            let connected = self
                .topology
                .arcs()
                .any(|(_, arc)| arc.touches_place(place));
            if !connected {
                report.isolated_places.push((place, data.name.clone()));
            }
        }

        for (transition, data) in self.topology.transitions() {
            let mut connected = false;
            let mut consuming = false;
            for (_, arc) in self.topology.arcs() {
                if !arc.touches_transition(transition) {
                    continue;
                }
                connected = true;
                if arc.kind == ArcKind::Normal && arc.source == NodeRef::Transition(transition) {
                    continue;
                }
                consuming = true;
            }
            if !connected {
                report
                    .isolated_transitions
                    .push((transition, data.name.clone()));
            } else if !consuming {
                report.warnings.push(format!(
                    "transition '{}' has no input arc and is enabled in every marking",
                    data.name
                ));
            }
        }

        report
    }

    pub fn log_diagnostics(&self) {
        let report = self.diagnose();
        if report.has_issues() {
            warn!(
                "net diagnostics: {} places, {} transitions",
                report.total_places, report.total_transitions
            );
            for (id, name) in &report.isolated_places {
                warn!("isolated place [{}] {}", id.raw(), name);
            }
            for (id, name) in &report.isolated_transitions {
                warn!("isolated transition [{}] {}", id.raw(), name);
            }
            for warning in &report.warnings {
                warn!("{warning}");
            }
        } else {
            info!(
                "net diagnostics clean: {} places, {} transitions",
                report.total_places, report.total_transitions
            );
        }
    }
}
