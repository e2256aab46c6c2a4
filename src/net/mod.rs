//! # 着色 Petri 网核心定义（Colored Place/Transition Net）
//!
//! 设库所集合 `P`、迁移集合 `T` 与启用的令牌颜色集合 `K`。对每个颜色
//! `c ∈ K` 维护四个结构矩阵：
//!
//! * 前向矩阵 `F_c ∈ ℕ^{|P|×|T|}`：迁移到库所的生产权重；
//! * 后向矩阵 `B_c ∈ ℕ^{|P|×|T|}`：库所到迁移的消耗权重；
//! * 净效应矩阵 `C_c = F_c - B_c ∈ ℤ^{|P|×|T|}`；
//! * 抑制矩阵 `H_c ∈ {0,1}^{|P|×|T|}`，阈值由弧权重给出。
//!
//! 弧上缺省或为零的颜色权重一律按 1 计（"至少一个令牌通过"约定）。对
//! 标识 `M ∈ ℕ^{|P|×|K|}`，迁移 `t` 在度 `d` 下可激发当且仅当对所有
//! `(p, c)` 有 `M[p, c] ≥ d·B_c[p, t]` 且所有抑制弧满足 `M[p, c] < θ`；
//! 发射后 `M'[p, c] = M[p, c] + d·C_c[p, t]`。单服务器迁移固定 `d = 1`，
//! 无穷服务器迁移的最大度为消耗对的最小整除比。
//!
//! 矩阵按颜色惰性构建并缓存；任何拓扑变更使全部缓存失效。持有非零
//! 标识的颜色被计数锁定, 锁定期间禁止重配置该颜色.
//!
//! ## 示例
//!
//! ```rust
//! use cpnet::net::*;
//! use indexmap::IndexMap;
//!
//! let mut net = Net::new();
//! let tok = net.define_token("Default", true, Rgb::BLACK).unwrap();
//! let p0 = net.add_place(Place::new("p0"));
//! let p1 = net.add_place(Place::new("p1"));
//! let t0 = net.add_transition(Transition::new("t0"));
//!
//! net.add_arc(
//!     NodeRef::Place(p0),
//!     NodeRef::Transition(t0),
//!     ArcKind::Normal,
//!     IndexMap::from([(tok, 1)]),
//! )
//! .unwrap();
//! net.add_arc(
//!     NodeRef::Transition(t0),
//!     NodeRef::Place(p1),
//!     ArcKind::Normal,
//!     IndexMap::from([(tok, 1)]),
//! )
//! .unwrap();
//!
//! let mut marking = Marking::new();
//! net.set_marking(&mut marking, p0, tok, 1).unwrap();
//! assert_eq!(
//!     net.enabling_degree(&marking, t0).unwrap(),
//!     Enabling::Enabled { degree: 1 }
//! );
//!
//! let next = net.fire(&mut marking, t0, 1).unwrap();
//! assert_eq!(next.get(p0, tok), 0);
//! assert_eq!(next.get(p1, tok), 1);
//! ```

pub mod core;
pub mod engine;
pub mod ids;
pub mod incidence;
pub mod io;
pub mod marking;
pub mod matrix;
pub mod reach;
pub mod structure;
pub mod token;

pub use self::core::{DiagnosticReport, Net};
pub use engine::{Enabling, FireError};
pub use ids::{ArcId, PlaceId, TokenId, TransitionId};
pub use incidence::{Incidence, IncidenceBool};
pub use io::{AssembleError, IoError, NetDescription};
pub use marking::{Marking, MarkingError, MarkingSnapshot};
pub use matrix::{InvariantError, MatrixSet, Variant};
pub use reach::{ExploreOptions, ReachabilityEdge, ReachabilityGraph, explore};
pub use structure::{Arc, ArcKind, NodeRef, Place, TopologyError, Transition, Weight};
pub use token::{Rgb, TokenColor, TokenError, TokenRegistry};
