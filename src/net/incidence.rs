//! 稠密 [place × transition] 关联矩阵容器.
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

type SmallRow<T> = SmallVec<[T; 4]>;

/// Dense matrix with one row per place and one column per transition. Rows
/// and columns are positional; the owning matrix set maps node ids to
/// positions for a captured ordering.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Incidence<T> {
    rows: Vec<SmallRow<T>>,
    cols: usize,
}

impl<T> Incidence<T>
where
    T: Clone,
{
    pub fn new(places: usize, transitions: usize, default: T) -> Self {
        let rows = (0..places)
            .map(|_| SmallRow::from_elem(default.clone(), transitions))
            .collect();
        Self {
            rows,
            cols: transitions,
        }
    }

    pub fn places(&self) -> usize {
        self.rows.len()
    }

    pub fn transitions(&self) -> usize {
        self.cols
    }

    pub fn get(&self, place: usize, transition: usize) -> &T {
        &self.rows[place][transition]
    }

    pub fn set(&mut self, place: usize, transition: usize, value: T) {
        self.rows[place][transition] = value;
    }

    pub fn get_mut(&mut self, place: usize, transition: usize) -> &mut T {
        &mut self.rows[place][transition]
    }

    pub fn row(&self, place: usize) -> &[T] {
        &self.rows[place]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[T]> {
        self.rows.iter().map(|row| row.as_slice())
    }
}

impl<T> fmt::Debug for Incidence<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Incidence")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .finish()
    }
}

impl Incidence<u64> {
    pub fn add_assign(&mut self, place: usize, transition: usize, delta: u64) {
        let entry = self.get_mut(place, transition);
        *entry += delta;
    }

    /// Element-wise `self - other` into a signed matrix; this is how the
    /// net effect matrix is derived from forward and backward.
    pub fn difference(&self, other: &Self) -> Incidence<i64> {
        assert_eq!(self.places(), other.places());
        assert_eq!(self.transitions(), other.transitions());
        let rows = self
            .rows
            .iter()
            .zip(other.rows.iter())
            .map(|(left, right)| {
                left.iter()
                    .zip(right.iter())
                    .map(|(l, r)| *l as i64 - *r as i64)
                    .collect::<SmallRow<_>>()
            })
            .collect();
        Incidence {
            rows,
            cols: self.cols,
        }
    }
}

/// Boolean matrix for inhibitor arcs; an entry is set when the place
/// inhibits the transition, independent of any threshold.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IncidenceBool {
    rows: Vec<SmallRow<bool>>,
    cols: usize,
}

impl IncidenceBool {
    pub fn new(places: usize, transitions: usize) -> Self {
        let rows = (0..places)
            .map(|_| SmallRow::from_elem(false, transitions))
            .collect();
        Self {
            rows,
            cols: transitions,
        }
    }

    pub fn places(&self) -> usize {
        self.rows.len()
    }

    pub fn transitions(&self) -> usize {
        self.cols
    }

    pub fn get(&self, place: usize, transition: usize) -> bool {
        self.rows[place][transition]
    }

    pub fn set(&mut self, place: usize, transition: usize, value: bool) {
        self.rows[place][transition] = value;
    }

    pub fn rows(&self) -> impl Iterator<Item = &[bool]> {
        self.rows.iter().map(|row| row.as_slice())
    }
}

impl fmt::Debug for IncidenceBool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncidenceBool")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difference_is_element_wise() {
        let mut forward = Incidence::new(2, 2, 0u64);
        let mut backward = Incidence::new(2, 2, 0u64);
        forward.set(0, 1, 3);
        backward.set(0, 1, 5);
        backward.set(1, 0, 2);

        let net = forward.difference(&backward);
        assert_eq!(*net.get(0, 1), -2);
        assert_eq!(*net.get(1, 0), -2);
        assert_eq!(*net.get(0, 0), 0);
    }

    #[test]
    fn accumulation_is_additive() {
        let mut matrix = Incidence::new(1, 1, 0u64);
        matrix.add_assign(0, 0, 2);
        matrix.add_assign(0, 0, 3);
        assert_eq!(*matrix.get(0, 0), 5);
    }
}
