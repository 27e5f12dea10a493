//! Insertion-ordered store of snapshot pairs.

use std::collections::VecDeque;

use faer::Mat;

use crate::types::DmdError;
use crate::utils::{from_columns, validate_vector};

/// One observed state `x` and its successor `y`.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotPair {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// How many pairs a [`History`] may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    /// Grows without bound.
    Unbounded,
    /// Fixed-size ring; pushing beyond it evicts the oldest pair.
    Bounded(usize),
}

/// Ordered snapshot history.
///
/// The first pushed pair fixes the state dimension for the lifetime of the
/// buffer; every later pair must match it.
#[derive(Debug, Clone)]
pub struct History {
    pairs: VecDeque<SnapshotPair>,
    capacity: Capacity,
    dim: Option<usize>,
}

impl History {
    pub fn new(capacity: Capacity) -> Self {
        let pairs = match capacity {
            Capacity::Unbounded => VecDeque::new(),
            Capacity::Bounded(n) => VecDeque::with_capacity(n + 1),
        };
        Self {
            pairs,
            capacity,
            dim: None,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(Capacity::Unbounded)
    }

    pub fn bounded(max_len: usize) -> Self {
        Self::new(Capacity::Bounded(max_len))
    }

    /// Check a candidate pair against the fixed dimension without storing it.
    pub fn check(&self, x: &[f64], y: &[f64]) -> Result<(), DmdError> {
        validate_vector(x, self.dim, "x")?;
        validate_vector(y, Some(x.len()), "y")
    }

    /// Append a pair, returning the evicted oldest pair if the ring was full.
    pub fn push(&mut self, x: Vec<f64>, y: Vec<f64>) -> Result<Option<SnapshotPair>, DmdError> {
        self.check(&x, &y)?;
        self.dim.get_or_insert(x.len());
        self.pairs.push_back(SnapshotPair { x, y });
        let evicted = match self.capacity {
            Capacity::Bounded(max_len) if self.pairs.len() > max_len => self.pairs.pop_front(),
            _ => None,
        };
        Ok(evicted)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// State dimension, fixed by the first pair.
    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &SnapshotPair> {
        self.pairs.iter()
    }

    pub fn last(&self) -> Option<&SnapshotPair> {
        self.pairs.back()
    }

    /// Replace every stored pair by `f(pair)` and reset the fixed dimension.
    ///
    /// Used when the whole history is re-expressed in another basis.
    pub fn transform<F>(&mut self, new_dim: usize, mut f: F)
    where
        F: FnMut(&SnapshotPair) -> SnapshotPair,
    {
        for pair in self.pairs.iter_mut() {
            *pair = f(pair);
        }
        self.dim = Some(new_dim);
    }

    /// Matrix whose columns are the stored `x`s, oldest first.
    pub fn x_matrix(&self) -> Result<Mat<f64>, DmdError> {
        let n = self.require_dim()?;
        Ok(from_columns(n, self.pairs.iter().map(|p| p.x.as_slice())))
    }

    /// Matrix whose columns are the stored `y`s, oldest first.
    pub fn y_matrix(&self) -> Result<Mat<f64>, DmdError> {
        let n = self.require_dim()?;
        Ok(from_columns(n, self.pairs.iter().map(|p| p.y.as_slice())))
    }

    fn require_dim(&self) -> Result<usize, DmdError> {
        match self.dim {
            Some(n) if !self.pairs.is_empty() => Ok(n),
            _ => Err(DmdError::InsufficientData(
                "no snapshot pairs have been recorded".into(),
            )),
        }
    }
}
