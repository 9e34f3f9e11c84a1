//! Aromaticity perception for Kekulé-written rings.
//!
//! A ring is aromatic when every atom can take part in the pi system and the
//! ring holds 4n+2 pi electrons. Perceived rings get aromatic atoms and
//! aromatic bonds, so `C1=CC=CC=C1` and `c1ccccc1` build the same graph.

use std::collections::{BTreeSet, VecDeque};

use petgraph::graph::NodeIndex;

use crate::mol::{Bond, Molecule};

/// Elements that can be sp2 in a ring: B, C, N, O, P, S, As, Se, Te.
const SP2_CAPABLE: [u8; 9] = [5, 6, 7, 8, 15, 16, 33, 34, 52];

/// Mark every aromatic ring written in Kekulé form.
///
/// Rings that already contain an aromatic atom are left as written. Bonds
/// leaving a perceived ring keep their order.
pub fn perceive_aromaticity(mol: &mut Molecule) {
    let aromatic: Vec<Vec<NodeIndex>> = smallest_rings(mol)
        .into_iter()
        .filter(|ring| is_aromatic_ring(mol, ring))
        .collect();

    for ring in &aromatic {
        for (i, &atom) in ring.iter().enumerate() {
            mol.atom_mut(atom).aromatic = true;
            let next = ring[(i + 1) % ring.len()];
            if let Some(edge) = mol.bond_between(atom, next) {
                mol.set_bond(edge, Bond::Aromatic);
            }
        }
    }

    if !aromatic.is_empty() {
        tracing::trace!(rings = aromatic.len(), "Perceived aromatic rings");
    }
}

/// The smallest ring through each bond, deduplicated. Atoms are in ring order.
fn smallest_rings(mol: &Molecule) -> Vec<Vec<NodeIndex>> {
    let mut seen: BTreeSet<Vec<usize>> = BTreeSet::new();
    let mut rings = Vec::new();

    for edge in mol.bonds() {
        let Some((a, b)) = mol.bond_endpoints(edge) else {
            continue;
        };
        let Some(ring) = shortest_path_avoiding_edge(mol, a, b) else {
            continue;
        };
        let mut key: Vec<usize> = ring.iter().map(|n| n.index()).collect();
        key.sort_unstable();
        if seen.insert(key) {
            rings.push(ring);
        }
    }

    rings
}

/// Breadth-first path from `a` to `b` that does not use the `a-b` bond.
fn shortest_path_avoiding_edge(mol: &Molecule, a: NodeIndex, b: NodeIndex) -> Option<Vec<NodeIndex>> {
    let mut parent: Vec<Option<NodeIndex>> = vec![None; mol.atom_count()];
    let mut visited = vec![false; mol.atom_count()];
    let mut queue = VecDeque::from([a]);
    visited[a.index()] = true;

    while let Some(current) = queue.pop_front() {
        for next in mol.neighbors(current) {
            if current == a && next == b {
                continue;
            }
            if visited[next.index()] {
                continue;
            }
            visited[next.index()] = true;
            parent[next.index()] = Some(current);
            if next == b {
                let mut path = vec![b];
                let mut at = b;
                while let Some(p) = parent[at.index()] {
                    path.push(p);
                    at = p;
                }
                return Some(path);
            }
            queue.push_back(next);
        }
    }

    None
}

fn is_aromatic_ring(mol: &Molecule, ring: &[NodeIndex]) -> bool {
    if ring.len() < 3 {
        return false;
    }

    for &atom in ring {
        let atom = mol.atom(atom);
        if atom.aromatic || !SP2_CAPABLE.contains(&atom.atomic_num) {
            return false;
        }
    }

    for (i, &a) in ring.iter().enumerate() {
        let b = ring[(i + 1) % ring.len()];
        if let Some(edge) = mol.bond_between(a, b) {
            if mol.bond(edge) == Bond::Triple {
                return false;
            }
        }
    }

    let mut pi_total: u8 = 0;
    for (i, &atom) in ring.iter().enumerate() {
        match pi_electrons(mol, ring, i) {
            Some(e) => pi_total = pi_total.saturating_add(e),
            None => {
                tracing::trace!(atom = atom.index(), "Ring atom cannot join a pi system");
                return false;
            }
        }
    }

    pi_total >= 2 && (pi_total - 2) % 4 == 0
}

/// Pi electrons the atom at `ring[pos]` gives to the ring, `None` if it is sp3.
fn pi_electrons(mol: &Molecule, ring: &[NodeIndex], pos: usize) -> Option<u8> {
    let idx = ring[pos];
    let atom = mol.atom(idx);
    let charge = atom.charge.unwrap_or(0);

    let has_double = mol
        .neighbors(idx)
        .filter_map(|n| mol.bond_between(idx, n))
        .any(|e| mol.bond(e) == Bond::Double);

    let prev = ring[(pos + ring.len() - 1) % ring.len()];
    let next = ring[(pos + 1) % ring.len()];
    let has_double_in_ring = [prev, next]
        .iter()
        .filter_map(|&n| mol.bond_between(idx, n))
        .any(|e| mol.bond(e) == Bond::Double);

    let total_degree = mol.degree(idx) + usize::from(atom.hcount.unwrap_or(0));

    match (atom.atomic_num, charge) {
        (6, 0) => has_double.then_some(1),
        (6, -1) => Some(2),
        (6, 1) => Some(if has_double { 1 } else { 0 }),
        (7, 0) | (15, 0) | (33, 0) => {
            if has_double {
                Some(1)
            } else if total_degree <= 3 {
                Some(2)
            } else {
                None
            }
        }
        (7, 1) => has_double_in_ring.then_some(1),
        (8, _) | (16, _) | (34, _) | (52, _) => Some(if has_double_in_ring { 1 } else { 2 }),
        (5, _) => Some(if has_double { 1 } else { 0 }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::smiles::parse_smiles;

    fn perceived(smiles: &str) -> Molecule {
        let mut mol = parse_smiles(smiles).expect("valid SMILES");
        mol.resolve_implicit_bonds();
        perceive_aromaticity(&mut mol);
        mol
    }

    fn aromatic_atoms(mol: &Molecule) -> usize {
        mol.atoms().filter(|&a| mol.atom(a).aromatic).count()
    }

    fn aromatic_bonds(mol: &Molecule) -> usize {
        mol.bonds().filter(|&e| mol.bond(e) == Bond::Aromatic).count()
    }

    #[test]
    fn test_kekule_benzene_becomes_aromatic() {
        let mol = perceived("C1=CC=CC=C1");
        assert_eq!(aromatic_atoms(&mol), 6);
        assert_eq!(aromatic_bonds(&mol), 6);
    }

    #[test]
    fn test_substituent_bond_keeps_order() {
        let mol = perceived("CC1=CC=CC=C1");
        assert_eq!(aromatic_atoms(&mol), 6);
        assert_eq!(aromatic_bonds(&mol), 6);
        assert!(!mol.atom(NodeIndex::new(0)).aromatic);

        let mol = perceived("O=C1C=CC=CC1");
        assert_eq!(aromatic_atoms(&mol), 0);
    }

    #[test]
    fn test_fused_rings() {
        let mol = perceived("C1=CC=C2C=CC=CC2=C1");
        assert_eq!(aromatic_atoms(&mol), 10);
        assert_eq!(aromatic_bonds(&mol), 11);
    }

    #[test]
    fn test_heteroaromatic_rings() {
        assert_eq!(aromatic_atoms(&perceived("N1=CC=CC=C1")), 6);
        assert_eq!(aromatic_atoms(&perceived("O1C=CC=C1")), 5);
        assert_eq!(aromatic_atoms(&perceived("N1C=CC=C1")), 5);
        assert_eq!(aromatic_atoms(&perceived("S1C=CC=C1")), 5);
    }

    #[test]
    fn test_non_aromatic_rings() {
        assert_eq!(aromatic_atoms(&perceived("C1CCCCC1")), 0);
        assert_eq!(aromatic_atoms(&perceived("C1=CCCCC1")), 0);
        assert_eq!(aromatic_atoms(&perceived("C1=CC=CC1")), 0);
        assert_eq!(aromatic_atoms(&perceived("C1=CC=CC=CC=C1")), 0);
        assert_eq!(aromatic_atoms(&perceived("CCO")), 0);
    }

    #[test]
    fn test_aromatic_input_unchanged() {
        let mol = perceived("c1ccccc1O");
        assert_eq!(aromatic_atoms(&mol), 6);
        assert_eq!(aromatic_bonds(&mol), 6);
    }
}
