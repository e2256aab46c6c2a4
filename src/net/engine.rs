//! 激发语义引擎：使能度计算与原子发射.
//!
//! 这里的函数是 (矩阵, 标识) 的纯函数, 不做调度仲裁; 多个可激发迁移之间
//! 的选择属于上层调用者 (见 `reach` 与 `cpn simulate`).
use thiserror::Error;

use crate::net::ids::TransitionId;
use crate::net::marking::CountMap;
use crate::net::matrix::{InvariantError, MatrixSet};
use crate::net::structure::Weight;

/// Answer of an enabling query. Queries never fail on account of the
/// marking; a fatal [`InvariantError`] means the matrices themselves are
/// malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enabling {
    Disabled,
    Enabled { degree: Weight },
}

impl Enabling {
    pub fn degree(self) -> Weight {
        match self {
            Enabling::Disabled => 0,
            Enabling::Enabled { degree } => degree,
        }
    }
}

#[derive(Debug, Error)]
pub enum FireError {
    #[error("firing degree must be at least 1")]
    ZeroDegree,
    #[error("transition {transition:?} is not enabled under the supplied marking")]
    NotEnabled { transition: TransitionId },
    #[error(
        "requested degree {requested} exceeds enabling degree {degree} of transition {transition:?}"
    )]
    ExceedsDegree {
        transition: TransitionId,
        requested: Weight,
        degree: Weight,
    },
    #[error(transparent)]
    Invariant(#[from] InvariantError),
}

/// Enabling degree of a transition over every participating token color.
///
/// Single-server transitions are enabled with degree 1 or not at all. An
/// infinite-server transition supports `min floor(marking / weight)` over
/// all consuming (place, color) pairs; one that consumes nothing supports
/// exactly one firing.
pub(crate) fn enabling_in(
    sets: &[&MatrixSet],
    transition: TransitionId,
    infinite_server: bool,
    counts: &CountMap,
) -> Result<Enabling, InvariantError> {
    let mut degree: Option<Weight> = None;
    for set in sets {
        let col = set.transition_col(transition)?;
        let token = set.token();
        for (row, place) in set.place_order().iter().enumerate() {
            let marking = counts.get(&(*place, token)).copied().unwrap_or(0);
            if set.inhibitor().get(row, col) && marking >= set.threshold(row, col) {
                return Ok(Enabling::Disabled);
            }
            let weight = *set.backward().get(row, col);
            if weight > 0 {
                if marking < weight {
                    return Ok(Enabling::Disabled);
                }
                if infinite_server {
                    let ratio = marking / weight;
                    degree = Some(degree.map_or(ratio, |d| d.min(ratio)));
                }
            }
        }
    }
    let degree = if infinite_server {
        degree.unwrap_or(1)
    } else {
        1
    };
    Ok(Enabling::Enabled { degree })
}

/// Applies one firing of `transition` at the requested degree and returns
/// the successor count table. All-or-nothing: the input table is never
/// modified, and a would-be negative count aborts with an invariant fault
/// since the degree computation is supposed to exclude it.
pub(crate) fn fire_in(
    sets: &[&MatrixSet],
    transition: TransitionId,
    infinite_server: bool,
    degree: Weight,
    counts: &CountMap,
) -> Result<CountMap, FireError> {
    if degree == 0 {
        return Err(FireError::ZeroDegree);
    }
    match enabling_in(sets, transition, infinite_server, counts)? {
        Enabling::Disabled => return Err(FireError::NotEnabled { transition }),
        Enabling::Enabled { degree: max } if degree > max => {
            return Err(FireError::ExceedsDegree {
                transition,
                requested: degree,
                degree: max,
            });
        }
        Enabling::Enabled { .. } => {}
    }

    let mut next = counts.clone();
    for set in sets {
        let col = set.transition_col(transition)?;
        let token = set.token();
        for (row, place) in set.place_order().iter().enumerate() {
            let consume = scaled(*set.backward().get(row, col), degree, transition)?;
            let produce = scaled(*set.forward().get(row, col), degree, transition)?;
            if consume == 0 && produce == 0 {
                continue;
            }
            let key = (*place, token);
            let current = next.get(&key).copied().unwrap_or(0);
            let after = current
                .checked_sub(consume)
                .ok_or_else(|| {
                    InvariantError::Internal(format!(
                        "firing {transition:?} at degree {degree} drives place {place:?} negative"
                    ))
                })?
                .checked_add(produce)
                .ok_or_else(|| {
                    InvariantError::Internal(format!(
                        "token count overflow at place {place:?} firing {transition:?}"
                    ))
                })?;
            if after == 0 {
                next.remove(&key);
            } else {
                next.insert(key, after);
            }
        }
    }
    Ok(next)
}

fn scaled(
    weight: Weight,
    degree: Weight,
    transition: TransitionId,
) -> Result<Weight, InvariantError> {
    weight.checked_mul(degree).ok_or_else(|| {
        InvariantError::Internal(format!(
            "weight overflow scaling {transition:?} to degree {degree}"
        ))
    })
}
