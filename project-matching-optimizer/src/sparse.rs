use std::collections::BTreeMap;

/// A `(row, column)` keyed matrix where every absent entry reads as `default`.
///
/// Ranks and multiplicities default to 0, weights to 1. Storing the default
/// explicitly removes the entry, so `entries` only ever yields meaningful cells.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix<T> {
    default: T,
    entries: BTreeMap<(usize, usize), T>,
}

impl<T: Copy + PartialEq> SparseMatrix<T> {
    pub const fn new(default: T) -> Self {
        Self {
            default,
            entries: BTreeMap::new(),
        }
    }

    pub fn get(&self, row: usize, column: usize) -> T {
        self.entries
            .get(&(row, column))
            .copied()
            .unwrap_or(self.default)
    }

    pub fn set(&mut self, row: usize, column: usize, value: T) {
        if value == self.default {
            self.entries.remove(&(row, column));
        } else {
            self.entries.insert((row, column), value);
        }
    }

    /// Non-default cells in row-major order.
    pub fn entries(&self) -> impl Iterator<Item = ((usize, usize), T)> + '_ {
        self.entries.iter().map(|(key, value)| (*key, *value))
    }

    /// Non-default cells of one row.
    pub fn row(&self, row: usize) -> impl Iterator<Item = (usize, T)> + '_ {
        self.entries
            .range((row, 0)..=(row, usize::MAX))
            .map(|((_, column), value)| (*column, *value))
    }

    /// Non-default cells of one column, by ascending row.
    pub fn column(&self, column: usize) -> impl Iterator<Item = (usize, T)> + '_ {
        self.entries
            .iter()
            .filter(move |((_, c), _)| *c == column)
            .map(|((row, _), value)| (*row, *value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
