/// Disjoint sets over dense ids, with path halving and union by size.
#[derive(Debug, Clone)]
pub(crate) struct UnionFind {
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl UnionFind {
    pub fn new(len: usize) -> Self {
        UnionFind {
            parent: (0..len).collect(),
            size: vec![1; len],
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    /// Grows the structure so that `len` ids exist, new ids are singletons.
    pub fn extend_to(&mut self, len: usize) {
        while self.parent.len() < len {
            self.parent.push(self.parent.len());
            self.size.push(1);
        }
    }

    pub fn find(&mut self, mut id: usize) -> usize {
        while self.parent[id] != id {
            self.parent[id] = self.parent[self.parent[id]];
            id = self.parent[id];
        }
        id
    }

    /// Returns `true` if the two ids were in different sets.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (mut a, mut b) = (self.find(a), self.find(b));
        if a == b {
            return false;
        }

        if self.size[a] < self.size[b] {
            std::mem::swap(&mut a, &mut b);
        }

        self.parent[b] = a;
        self.size[a] += self.size[b];

        true
    }

    pub fn connected(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }

    /// Number of distinct sets among `ids`.
    pub fn components_among(&mut self, ids: impl IntoIterator<Item = usize>) -> usize {
        let mut roots = ids.into_iter().map(|id| self.find(id)).collect::<Vec<_>>();
        roots.sort_unstable();
        roots.dedup();
        roots.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_union_merges_sets() {
        let mut uf = UnionFind::new(5);

        assert!(uf.union(0, 1));
        assert!(uf.union(3, 4));
        assert!(!uf.union(1, 0));

        assert!(uf.connected(0, 1));
        assert!(!uf.connected(1, 3));
        assert_eq!(uf.components_among(0..5), 3);

        assert!(uf.union(1, 4));
        assert_eq!(uf.components_among(0..5), 2);
        assert_eq!(uf.components_among([0, 3]), 1);
    }

    #[test]
    fn test_extend_adds_singletons() {
        let mut uf = UnionFind::new(2);
        uf.union(0, 1);
        uf.extend_to(4);

        assert_eq!(uf.len(), 4);
        assert_eq!(uf.components_among(0..4), 3);
    }
}
