//! VF2-style backtracking substructure search.

use std::collections::BTreeSet;

use petgraph::graph::NodeIndex;

use crate::mol::{Atom, Bond, Molecule};

/// Pairs of `(pattern atom, structure atom)`.
pub type AtomMapping = Vec<(NodeIndex, NodeIndex)>;

/// True if `pattern` occurs anywhere in `structure`.
pub fn has_match(structure: &Molecule, pattern: &Molecule) -> bool {
    first_match(structure, pattern).is_some()
}

/// First embedding of `pattern` in `structure`.
pub fn first_match(structure: &Molecule, pattern: &Molecule) -> Option<AtomMapping> {
    let mut found = None;
    Vf2::new(structure, pattern).run(&mut |mapping: &[(NodeIndex, NodeIndex)]| {
        found = Some(mapping.to_vec());
        false
    });
    found
}

/// Every embedding of `pattern` in `structure`, including ones that differ
/// only by symmetry.
pub fn all_matches(structure: &Molecule, pattern: &Molecule) -> Vec<AtomMapping> {
    let mut found = Vec::new();
    Vf2::new(structure, pattern).run(&mut |mapping: &[(NodeIndex, NodeIndex)]| {
        found.push(mapping.to_vec());
        true
    });
    found
}

/// Number of distinct structure atom sets covered by an embedding. Symmetric
/// embeddings of one occurrence count once.
pub fn count_matches(structure: &Molecule, pattern: &Molecule) -> usize {
    let mut sets: BTreeSet<Vec<usize>> = BTreeSet::new();
    Vf2::new(structure, pattern).run(&mut |mapping: &[(NodeIndex, NodeIndex)]| {
        let mut atoms: Vec<usize> = mapping.iter().map(|(_, t)| t.index()).collect();
        atoms.sort_unstable();
        sets.insert(atoms);
        true
    });
    sets.len()
}

fn atom_matches(target: &Atom, query: &Atom) -> bool {
    if query.is_wildcard() {
        return true;
    }
    if target.atomic_num != query.atomic_num || target.aromatic != query.aromatic {
        return false;
    }
    match query.charge {
        Some(charge) => target.charge.unwrap_or(0) == charge,
        None => true,
    }
}

fn bond_matches(target: Bond, query: Bond) -> bool {
    match query {
        Bond::Implicit => matches!(target, Bond::Single | Bond::Aromatic | Bond::Implicit),
        explicit => target == explicit,
    }
}

struct Vf2<'a> {
    target: &'a Molecule,
    query: &'a Molecule,
    query_order: Vec<NodeIndex>,
    query_map: Vec<Option<NodeIndex>>,
    target_used: Vec<bool>,
    mapping: AtomMapping,
}

impl<'a> Vf2<'a> {
    fn new(target: &'a Molecule, query: &'a Molecule) -> Self {
        Self {
            target,
            query,
            query_order: connected_order(query),
            query_map: vec![None; query.atom_count()],
            target_used: vec![false; target.atom_count()],
            mapping: Vec::with_capacity(query.atom_count()),
        }
    }

    /// Walk every embedding, handing each to `visit`. `visit` returns false to
    /// stop the search.
    fn run(&mut self, visit: &mut dyn FnMut(&[(NodeIndex, NodeIndex)]) -> bool) {
        if self.query.atom_count() == 0 || self.query.atom_count() > self.target.atom_count() {
            return;
        }
        self.recurse(0, visit);
    }

    fn recurse(
        &mut self,
        depth: usize,
        visit: &mut dyn FnMut(&[(NodeIndex, NodeIndex)]) -> bool,
    ) -> bool {
        if depth == self.query_order.len() {
            return visit(&self.mapping);
        }

        let query_node = self.query_order[depth];

        for target_node in self.candidates(query_node) {
            if self.target_used[target_node.index()] || !self.is_feasible(query_node, target_node)
            {
                continue;
            }

            self.query_map[query_node.index()] = Some(target_node);
            self.target_used[target_node.index()] = true;
            self.mapping.push((query_node, target_node));

            let keep_going = self.recurse(depth + 1, visit);

            self.mapping.pop();
            self.query_map[query_node.index()] = None;
            self.target_used[target_node.index()] = false;

            if !keep_going {
                return false;
            }
        }

        true
    }

    /// Neighbors of an already-mapped neighbor's image when there is one,
    /// every structure atom otherwise.
    fn candidates(&self, query_node: NodeIndex) -> Vec<NodeIndex> {
        let anchor = self
            .query
            .neighbors(query_node)
            .find_map(|n| self.query_map[n.index()]);

        match anchor {
            Some(mapped) => self.target.neighbors(mapped).collect(),
            None => self.target.atoms().collect(),
        }
    }

    fn is_feasible(&self, query_node: NodeIndex, target_node: NodeIndex) -> bool {
        if !atom_matches(self.target.atom(target_node), self.query.atom(query_node)) {
            return false;
        }
        if self.target.degree(target_node) < self.query.degree(query_node) {
            return false;
        }

        for q_neighbor in self.query.neighbors(query_node) {
            let Some(t_mapped) = self.query_map[q_neighbor.index()] else {
                continue;
            };
            let Some(q_bond) = self.query.bond_between(query_node, q_neighbor) else {
                return false;
            };
            match self.target.bond_between(target_node, t_mapped) {
                Some(t_bond) => {
                    if !bond_matches(self.target.bond(t_bond), self.query.bond(q_bond)) {
                        return false;
                    }
                }
                None => return false,
            }
        }

        true
    }
}

/// Order pattern atoms so each one after the first of its component is bonded
/// to an earlier one, preferring high-degree atoms.
fn connected_order(query: &Molecule) -> Vec<NodeIndex> {
    let mut order = Vec::with_capacity(query.atom_count());
    let mut placed = vec![false; query.atom_count()];

    while order.len() < query.atom_count() {
        let frontier = query
            .atoms()
            .filter(|a| !placed[a.index()])
            .filter(|&a| query.neighbors(a).any(|n| placed[n.index()]))
            .max_by_key(|&a| (query.degree(a), std::cmp::Reverse(a.index())));

        let next = frontier.or_else(|| {
            query
                .atoms()
                .filter(|a| !placed[a.index()])
                .max_by_key(|&a| (query.degree(a), std::cmp::Reverse(a.index())))
        });

        match next {
            Some(atom) => {
                placed[atom.index()] = true;
                order.push(atom);
            }
            None => break,
        }
    }

    order
}
