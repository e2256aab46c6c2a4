//! 网描述装载：JSON/RON 描述文件解析并装配为 (Net, Marking).
//!
//! 这是 §外部装载器 边界: 权重在进入核心前已解析为具体非负整数, 这里不做
//! 任何表达式求值. 未声明任何令牌颜色时装配出一个启用的 "Default" 颜色.
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::net::core::Net;
use crate::net::ids::{PlaceId, TokenId, TransitionId};
use crate::net::marking::{Marking, MarkingError};
use crate::net::structure::{ArcKind, NodeRef, Place, TopologyError, Transition, Weight};
use crate::net::token::{Rgb, TokenError};

#[derive(Debug, Error)]
pub enum IoError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ron error: {0}")]
    Ron(#[from] ron::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported description extension for {0:?}, expected .json or .ron")]
    UnknownFormat(String),
}

#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("duplicate place name {0:?}")]
    DuplicatePlace(String),
    #[error("duplicate transition name {0:?}")]
    DuplicateTransition(String),
    #[error("arc references unknown place {0:?}")]
    UnknownPlace(String),
    #[error("arc references unknown transition {0:?}")]
    UnknownTransition(String),
    #[error("unknown token color {0:?}")]
    UnknownToken(String),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error(transparent)]
    Marking(#[from] MarkingError),
}

fn default_enabled() -> bool {
    true
}

fn default_color() -> Rgb {
    Rgb::BLACK
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenDescription {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_color")]
    pub color: Rgb,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceDescription {
    pub name: String,
    /// Initial token counts by color name.
    #[serde(default)]
    pub marking: IndexMap<String, Weight>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionDescription {
    pub name: String,
    #[serde(default)]
    pub infinite_server: bool,
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub rate: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArcRole {
    /// Place -> transition consumption arc.
    Input,
    /// Transition -> place production arc.
    Output,
    Inhibitor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArcDescription {
    pub place: String,
    pub transition: String,
    pub kind: ArcRole,
    /// Resolved per-color weights; zero or absent means "at least one".
    #[serde(default)]
    pub weights: IndexMap<String, Weight>,
}

/// Flat serde description of a colored net, this crate's fixture format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetDescription {
    #[serde(default)]
    pub tokens: Vec<TokenDescription>,
    #[serde(default)]
    pub places: Vec<PlaceDescription>,
    #[serde(default)]
    pub transitions: Vec<TransitionDescription>,
    #[serde(default)]
    pub arcs: Vec<ArcDescription>,
}

impl NetDescription {
    /// Builds the net and its initial marking, validating as it goes.
    pub fn assemble(&self) -> Result<(Net, Marking), AssembleError> {
        if let Some(name) = self.places.iter().map(|p| &p.name).duplicates().next() {
            return Err(AssembleError::DuplicatePlace(name.clone()));
        }
        if let Some(name) = self.transitions.iter().map(|t| &t.name).duplicates().next() {
            return Err(AssembleError::DuplicateTransition(name.clone()));
        }

        let mut net = Net::new();

        for token in &self.tokens {
            net.define_token(token.name.clone(), token.enabled, token.color)?;
        }
        if self.tokens.is_empty() {
            net.define_token("Default", true, Rgb::BLACK)?;
        }

        let mut places: IndexMap<&str, PlaceId> = IndexMap::new();
        for place in &self.places {
            let id = net.add_place(Place::new(place.name.clone()));
            places.insert(place.name.as_str(), id);
        }

        let mut transitions: IndexMap<&str, TransitionId> = IndexMap::new();
        for transition in &self.transitions {
            let id = net.add_transition(Transition {
                name: transition.name.clone(),
                infinite_server: transition.infinite_server,
                priority: transition.priority,
                rate: transition.rate,
            });
            transitions.insert(transition.name.as_str(), id);
        }

        for arc in &self.arcs {
            let place = *places
                .get(arc.place.as_str())
                .ok_or_else(|| AssembleError::UnknownPlace(arc.place.clone()))?;
            let transition = *transitions
                .get(arc.transition.as_str())
                .ok_or_else(|| AssembleError::UnknownTransition(arc.transition.clone()))?;
            let weights = self.resolve_weights(&net, &arc.weights)?;
            let (source, target, kind) = match arc.kind {
                ArcRole::Input => (
                    NodeRef::Place(place),
                    NodeRef::Transition(transition),
                    ArcKind::Normal,
                ),
                ArcRole::Output => (
                    NodeRef::Transition(transition),
                    NodeRef::Place(place),
                    ArcKind::Normal,
                ),
                ArcRole::Inhibitor => (
                    NodeRef::Place(place),
                    NodeRef::Transition(transition),
                    ArcKind::Inhibitor,
                ),
            };
            net.add_arc(source, target, kind, weights)?;
        }

        let mut marking = Marking::new();
        for place in &self.places {
            let id = places[place.name.as_str()];
            for (token_name, count) in &place.marking {
                let token = net
                    .tokens()
                    .lookup(token_name)
                    .ok_or_else(|| AssembleError::UnknownToken(token_name.clone()))?;
                net.set_marking(&mut marking, id, token, *count)?;
            }
        }

        Ok((net, marking))
    }

    fn resolve_weights(
        &self,
        net: &Net,
        weights: &IndexMap<String, Weight>,
    ) -> Result<IndexMap<TokenId, Weight>, AssembleError> {
        let mut resolved = IndexMap::new();
        for (name, weight) in weights {
            let token = net
                .tokens()
                .lookup(name)
                .ok_or_else(|| AssembleError::UnknownToken(name.clone()))?;
            resolved.insert(token, *weight);
        }
        Ok(resolved)
    }
}

pub fn to_json_string<T>(value: &T) -> Result<String, IoError>
where
    T: Serialize,
{
    Ok(serde_json::to_string_pretty(value)?)
}

pub fn from_json_str<T>(s: &str) -> Result<T, IoError>
where
    T: DeserializeOwned,
{
    Ok(serde_json::from_str(s)?)
}

pub fn write_json<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<(), IoError> {
    let mut file = File::create(path)?;
    let content = to_json_string(value)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

pub fn read_json<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T, IoError> {
    let mut file = File::open(path)?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    from_json_str(&content)
}

pub fn to_ron_string<T>(value: &T) -> Result<String, IoError>
where
    T: Serialize,
{
    Ok(ron::ser::to_string_pretty(
        value,
        ron::ser::PrettyConfig::default(),
    )?)
}

pub fn from_ron_str<T>(s: &str) -> Result<T, IoError>
where
    T: DeserializeOwned,
{
    Ok(ron::from_str(s).map_err(ron::Error::from)?)
}

pub fn write_ron<P: AsRef<Path>, T: Serialize>(path: P, value: &T) -> Result<(), IoError> {
    let mut file = File::create(path)?;
    let content = to_ron_string(value)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

pub fn read_ron<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> Result<T, IoError> {
    let mut file = File::open(path)?;
    let mut content = String::new();
    file.read_to_string(&mut content)?;
    from_ron_str(&content)
}

/// Reads a net description, picking the format from the file extension.
pub fn read_description<P: AsRef<Path>>(path: P) -> Result<NetDescription, IoError> {
    let path = path.as_ref();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => read_json(path),
        Some("ron") => read_ron(path),
        _ => Err(IoError::UnknownFormat(path.display().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RELAY: &str = r#"{
        "tokens": [{ "name": "tokenA" }],
        "places": [
            { "name": "P0", "marking": { "tokenA": 2 } },
            { "name": "P1" }
        ],
        "transitions": [{ "name": "T0" }],
        "arcs": [
            { "place": "P0", "transition": "T0", "kind": "input", "weights": { "tokenA": 2 } },
            { "place": "P1", "transition": "T0", "kind": "output", "weights": { "tokenA": 1 } }
        ]
    }"#;

    #[test]
    fn assembles_a_relay_net() {
        let description: NetDescription = from_json_str(RELAY).unwrap();
        let (net, marking) = description.assemble().unwrap();

        assert_eq!(net.topology().places_len(), 2);
        assert_eq!(net.topology().transitions_len(), 1);
        assert_eq!(net.topology().arcs_len(), 2);

        let token = net.tokens().lookup("tokenA").unwrap();
        let p0 = net.topology().places().next().unwrap().0;
        assert_eq!(marking.get(p0, token), 2);
        // Initial marking acquires the color lock.
        assert_eq!(net.token_lock_count(token).unwrap(), 1);
    }

    #[test]
    fn declares_a_default_token_when_none_given() {
        let description: NetDescription = from_json_str(r#"{ "places": [] }"#).unwrap();
        let (net, _) = description.assemble().unwrap();
        let id = net.tokens().lookup("Default").unwrap();
        let color = net.tokens().get(id).unwrap();
        assert!(color.is_enabled());
        assert_eq!(color.color(), Rgb::BLACK);
    }

    #[test]
    fn rejects_duplicate_place_names() {
        let description: NetDescription =
            from_json_str(r#"{ "places": [{ "name": "P0" }, { "name": "P0" }] }"#).unwrap();
        assert!(matches!(
            description.assemble(),
            Err(AssembleError::DuplicatePlace(_))
        ));
    }

    #[test]
    fn rejects_arc_against_unknown_token() {
        let description: NetDescription = from_json_str(
            r#"{
                "places": [{ "name": "P0" }],
                "transitions": [{ "name": "T0" }],
                "arcs": [{ "place": "P0", "transition": "T0", "kind": "input",
                           "weights": { "ghost": 1 } }]
            }"#,
        )
        .unwrap();
        assert!(matches!(
            description.assemble(),
            Err(AssembleError::UnknownToken(_))
        ));
    }

    #[test]
    fn ron_round_trip_preserves_description() {
        let description: NetDescription = from_json_str(RELAY).unwrap();
        let text = to_ron_string(&description).unwrap();
        let back: NetDescription = from_ron_str(&text).unwrap();
        assert_eq!(back.places.len(), description.places.len());
        assert_eq!(back.arcs.len(), description.arcs.len());
    }
}
