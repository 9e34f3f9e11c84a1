//! molviz-match - SMILES Parsing and Substructure Matching
//!
//! Parses SMILES into a petgraph-backed molecular graph and answers
//! "which structures contain which fragments" for whole tables at once.
//!
//! ```
//! use molviz_match::{MatchEngine, MatchMode};
//!
//! let engine = MatchEngine::new();
//! let table = engine
//!     .match_all(&["c1ccccc1"], &["c1ccccc1O", "CCO"], MatchMode::Boolean)
//!     .unwrap();
//! assert_eq!(table.get("c1ccccc1O", "c1ccccc1"), Some(1));
//! assert_eq!(table.get("CCO", "c1ccccc1"), Some(0));
//! ```

pub mod aromaticity;
pub mod engine;
pub mod mol;
pub mod smiles;
pub mod substruct;

pub use aromaticity::perceive_aromaticity;
pub use engine::{
    parse_pattern, parse_structure, GraphMatcher, MatchEngine, MatchMemo, MatchMode, MatchTable,
    SubstructureMatcher,
};
pub use mol::{Atom, Bond, Molecule};
pub use smiles::{parse_smiles, SmilesError};
pub use substruct::{all_matches, count_matches, first_match, has_match, AtomMapping};
