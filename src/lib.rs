#![warn(non_snake_case)]

pub mod net;

pub use net::{
    ArcKind, Enabling, FireError, InvariantError, Marking, MarkingError, MarkingSnapshot, Net,
    NodeRef, TokenError, TopologyError, Weight,
};
