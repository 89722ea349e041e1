use std::collections::BTreeMap;

/// Bijection between entity ids and the dense indices `0..len` used by the model.
///
/// Built once per run and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DenseIndex<K> {
    ids: Vec<K>,
    positions: BTreeMap<K, usize>,
}

impl<K: Ord + Copy> DenseIndex<K> {
    /// Index the ids in the order given. Returns the first repeated id on failure.
    pub fn new(ids: Vec<K>) -> Result<Self, K> {
        let mut positions = BTreeMap::new();
        for (position, id) in ids.iter().enumerate() {
            if positions.insert(*id, position).is_some() {
                return Err(*id);
            }
        }
        Ok(Self { ids, positions })
    }

    /// Index the ids in ascending order, ignoring repeats.
    pub fn sorted<I: IntoIterator<Item = K>>(ids: I) -> Self {
        let positions: BTreeMap<K, usize> = ids.into_iter().map(|id| (id, 0)).collect();
        let ids: Vec<K> = positions.keys().copied().collect();
        let positions = ids
            .iter()
            .enumerate()
            .map(|(position, id)| (*id, position))
            .collect();
        Self { ids, positions }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn index_of(&self, id: K) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    #[must_use]
    pub fn contains(&self, id: K) -> bool {
        self.positions.contains_key(&id)
    }

    /// # Panics
    ///
    /// If `index` is out of range.
    #[must_use]
    pub fn id(&self, index: usize) -> K {
        self.ids[index]
    }

    #[must_use]
    pub fn ids(&self) -> &[K] {
        &self.ids
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, K)> + '_ {
        self.ids.iter().copied().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::DenseIndex;

    #[test]
    fn sorted_index_is_ascending_and_unique() {
        let index = DenseIndex::sorted([30, 10, 20, 10]);
        assert_eq!(index.ids(), &[10, 20, 30]);
        assert_eq!(index.index_of(20), Some(1));
        assert_eq!(index.id(2), 30);
        assert_eq!(index.index_of(40), None);
    }

    #[test]
    fn explicit_order_is_kept() {
        let index = DenseIndex::new(vec![7, 3, 5]).unwrap();
        assert_eq!(index.index_of(7), Some(0));
        assert_eq!(index.index_of(5), Some(2));
    }

    #[test]
    fn repeated_id_is_rejected() {
        assert_eq!(DenseIndex::new(vec![1, 2, 1]), Err(1));
    }
}
