//! Connected components of a k-NN graph.
//!
//! Two nodes belong to the same component iff they are joined, transitively,
//! by edges of non-zero weight. Labels are assigned in order of first
//! appearance so node 0 is always in component 0.

use log::debug;

use crate::knn::KnnGraph;

/// Disjoint-set forest with path compression and union by rank.
#[derive(Debug, Clone)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
    sets: usize,
}

impl UnionFind {
    pub fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
            sets: n,
        }
    }

    pub fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // compress
        let mut cur = x;
        while self.parent[cur] != root {
            let next = self.parent[cur];
            self.parent[cur] = root;
            cur = next;
        }
        root
    }

    /// Merge the sets of `a` and `b`. Returns false if they were already joined.
    pub fn union(&mut self, a: usize, b: usize) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return false;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
        self.sets -= 1;
        true
    }

    pub fn connected(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }

    /// Number of disjoint sets left.
    pub fn n_sets(&self) -> usize {
        self.sets
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Component id per node, numbered by first appearance.
    pub fn labels(&mut self) -> ComponentLabels {
        let n = self.len();
        let mut root_to_label = vec![usize::MAX; n];
        let mut labels = Vec::with_capacity(n);
        let mut next = 0;
        for i in 0..n {
            let r = self.find(i);
            if root_to_label[r] == usize::MAX {
                root_to_label[r] = next;
                next += 1;
            }
            labels.push(root_to_label[r]);
        }
        ComponentLabels {
            labels,
            n_components: next,
        }
    }
}

/// Component id of each node plus the component count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentLabels {
    pub labels: Vec<usize>,
    pub n_components: usize,
}

impl ComponentLabels {
    pub fn is_connected(&self) -> bool {
        self.n_components <= 1
    }

    /// Nodes of each component, indexed by component id.
    pub fn members(&self) -> Vec<Vec<usize>> {
        let mut groups = vec![Vec::new(); self.n_components];
        for (node, &c) in self.labels.iter().enumerate() {
            groups[c].push(node);
        }
        groups
    }
}

/// Union-find over every edge with non-zero weight.
pub fn union_find_of(graph: &KnnGraph) -> UnionFind {
    let mut uf = UnionFind::new(graph.nnodes);
    for (i, j, w) in graph.edges() {
        if w != 0.0 {
            uf.union(i, j);
        }
    }
    uf
}

pub fn connected_components(graph: &KnnGraph) -> ComponentLabels {
    let labels = union_find_of(graph).labels();
    debug!(
        "{} connected component(s) over {} nodes",
        labels.n_components, graph.nnodes
    );
    labels
}
