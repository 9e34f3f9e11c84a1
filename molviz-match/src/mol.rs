//! Molecular graph used by the matcher.

use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};

/// Element symbols indexed by atomic number minus one.
const SYMBOLS: [&str; 118] = [
    "H", "He", "Li", "Be", "B", "C", "N", "O", "F", "Ne", "Na", "Mg", "Al", "Si", "P", "S", "Cl",
    "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe", "Co", "Ni", "Cu", "Zn", "Ga", "Ge", "As",
    "Se", "Br", "Kr", "Rb", "Sr", "Y", "Zr", "Nb", "Mo", "Tc", "Ru", "Rh", "Pd", "Ag", "Cd", "In",
    "Sn", "Sb", "Te", "I", "Xe", "Cs", "Ba", "La", "Ce", "Pr", "Nd", "Pm", "Sm", "Eu", "Gd", "Tb",
    "Dy", "Ho", "Er", "Tm", "Yb", "Lu", "Hf", "Ta", "W", "Re", "Os", "Ir", "Pt", "Au", "Hg", "Tl",
    "Pb", "Bi", "Po", "At", "Rn", "Fr", "Ra", "Ac", "Th", "Pa", "U", "Np", "Pu", "Am", "Cm", "Bk",
    "Cf", "Es", "Fm", "Md", "No", "Lr", "Rf", "Db", "Sg", "Bh", "Hs", "Mt", "Ds", "Rg", "Cn", "Nh",
    "Fl", "Mc", "Lv", "Ts", "Og",
];

/// Atomic number for an element symbol, `None` if the symbol is unknown.
pub fn atomic_num(symbol: &str) -> Option<u8> {
    SYMBOLS
        .iter()
        .position(|s| *s == symbol)
        .map(|i| (i + 1) as u8)
}

/// Element symbol for an atomic number; `*` for the wildcard (0).
pub fn symbol(atomic_num: u8) -> &'static str {
    match atomic_num {
        0 => "*",
        n => SYMBOLS.get(n as usize - 1).copied().unwrap_or("?"),
    }
}

/// An atom. `atomic_num == 0` is the `*` wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Atom {
    pub atomic_num: u8,
    pub aromatic: bool,
    /// Formal charge, only known for bracket atoms.
    pub charge: Option<i8>,
    /// Explicit hydrogen count, only known for bracket atoms.
    pub hcount: Option<u8>,
    pub isotope: Option<u16>,
}

impl Atom {
    /// Organic-subset atom written without brackets.
    pub fn bare(atomic_num: u8, aromatic: bool) -> Self {
        Self {
            atomic_num,
            aromatic,
            charge: None,
            hcount: None,
            isotope: None,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.atomic_num == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bond {
    /// No bond symbol was written. In a pattern this means single-or-aromatic;
    /// in a parsed structure it is resolved to `Single` or `Aromatic`.
    Implicit,
    Single,
    Double,
    Triple,
    Aromatic,
}

/// Undirected molecular graph.
#[derive(Debug, Clone, Default)]
pub struct Molecule {
    graph: UnGraph<Atom, Bond>,
}

impl Molecule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_atom(&mut self, atom: Atom) -> NodeIndex {
        self.graph.add_node(atom)
    }

    pub fn add_bond(&mut self, a: NodeIndex, b: NodeIndex, bond: Bond) -> EdgeIndex {
        self.graph.add_edge(a, b, bond)
    }

    pub fn atom(&self, idx: NodeIndex) -> &Atom {
        &self.graph[idx]
    }

    pub fn atom_mut(&mut self, idx: NodeIndex) -> &mut Atom {
        &mut self.graph[idx]
    }

    pub fn bond(&self, idx: EdgeIndex) -> Bond {
        self.graph[idx]
    }

    pub fn set_bond(&mut self, idx: EdgeIndex, bond: Bond) {
        self.graph[idx] = bond;
    }

    pub fn bonds(&self) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.graph.edge_indices()
    }

    pub fn bond_endpoints(&self, idx: EdgeIndex) -> Option<(NodeIndex, NodeIndex)> {
        self.graph.edge_endpoints(idx)
    }

    pub fn atom_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn bond_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn atoms(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    pub fn neighbors(&self, idx: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors(idx)
    }

    pub fn degree(&self, idx: NodeIndex) -> usize {
        self.graph.neighbors(idx).count()
    }

    pub fn bond_between(&self, a: NodeIndex, b: NodeIndex) -> Option<EdgeIndex> {
        self.graph.find_edge(a, b)
    }

    /// Replace implicit bonds with the bond a structure actually has: aromatic
    /// between two aromatic atoms, single otherwise.
    pub fn resolve_implicit_bonds(&mut self) {
        let implicit: Vec<EdgeIndex> = self
            .graph
            .edge_indices()
            .filter(|&e| self.graph[e] == Bond::Implicit)
            .collect();

        for edge in implicit {
            if let Some((a, b)) = self.graph.edge_endpoints(edge) {
                self.graph[edge] = if self.graph[a].aromatic && self.graph[b].aromatic {
                    Bond::Aromatic
                } else {
                    Bond::Single
                };
            }
        }
    }
}
