//! SMILES reader.
//!
//! Covers what structure and fragment tables contain in practice: the organic
//! subset, aromatic lowercase atoms, bracket atoms, the `*` wildcard, branches,
//! ring closures (`1`-`9` and `%nn`), bond symbols `- = # : / \` and `.`.
//! Stereo marks are read and dropped. Text after the first whitespace is a
//! name and is ignored.

use std::collections::HashMap;

use petgraph::graph::NodeIndex;
use thiserror::Error;

use crate::mol::{atomic_num, Atom, Bond, Molecule};

/// Errors produced when reading a SMILES string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SmilesError {
    #[error("empty SMILES string")]
    EmptyInput,

    #[error("unexpected end of SMILES")]
    UnexpectedEnd,

    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { pos: usize, ch: char },

    #[error("invalid element '{text}' at position {pos}")]
    InvalidElement { pos: usize, text: String },

    #[error("unclosed bracket atom starting at position {pos}")]
    UnclosedBracket { pos: usize },

    #[error("unmatched parenthesis at position {pos}")]
    UnmatchedParen { pos: usize },

    #[error("unclosed ring {digit}")]
    UnclosedRing { digit: u16 },

    #[error("invalid ring bond {digit} at position {pos}")]
    InvalidRingBond { digit: u16, pos: usize },

    #[error("conflicting bond types on ring closure {digit}")]
    RingBondConflict { digit: u16 },

    #[error("number {text} out of range at position {pos}")]
    NumberOutOfRange { pos: usize, text: String },
}

/// Aromatic symbols accepted inside brackets.
const AROMATIC_BRACKET: [(&str, u8); 8] = [
    ("se", 34),
    ("as", 33),
    ("b", 5),
    ("c", 6),
    ("n", 7),
    ("o", 8),
    ("p", 15),
    ("s", 16),
];

const CHIRAL_CLASSES: [&str; 5] = ["TH", "AL", "SP", "TB", "OH"];

/// Parse SMILES into a molecule, keeping implicit bonds unresolved.
pub fn parse_smiles(input: &str) -> Result<Molecule, SmilesError> {
    let input = input.trim_start();
    let end = input
        .find(char::is_whitespace)
        .unwrap_or(input.len());
    Reader::new(&input[..end]).read()
}

struct OpenRing {
    atom: NodeIndex,
    bond: Option<Bond>,
}

struct Reader {
    chars: Vec<char>,
    pos: usize,
    mol: Molecule,
    prev: Option<NodeIndex>,
    pending_bond: Option<Bond>,
    branches: Vec<(Option<NodeIndex>, usize)>,
    rings: HashMap<u16, OpenRing>,
}

impl Reader {
    fn new(input: &str) -> Self {
        Self {
            chars: input.chars().collect(),
            pos: 0,
            mol: Molecule::new(),
            prev: None,
            pending_bond: None,
            branches: Vec::new(),
            rings: HashMap::new(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn read(mut self) -> Result<Molecule, SmilesError> {
        if self.chars.is_empty() {
            return Err(SmilesError::EmptyInput);
        }

        while let Some(ch) = self.peek() {
            match ch {
                '[' => {
                    let atom = self.read_bracket_atom()?;
                    self.push_atom(atom);
                }
                '*' => {
                    self.pos += 1;
                    self.push_atom(Atom::bare(0, false));
                }
                'B' | 'C' | 'N' | 'O' | 'P' | 'S' | 'F' | 'I' | 'b' | 'c' | 'n' | 'o' | 'p'
                | 's' => {
                    let atom = self.read_organic_atom(ch);
                    self.push_atom(atom);
                }
                '-' | '=' | '#' | ':' | '/' | '\\' => {
                    if self.prev.is_none() || self.pending_bond.is_some() {
                        return Err(SmilesError::UnexpectedChar { pos: self.pos, ch });
                    }
                    self.pending_bond = Some(bond_for(ch));
                    self.pos += 1;
                }
                '(' => {
                    if self.prev.is_none() || self.pending_bond.is_some() {
                        return Err(SmilesError::UnexpectedChar { pos: self.pos, ch });
                    }
                    self.branches.push((self.prev, self.pos));
                    self.pos += 1;
                }
                ')' => {
                    if self.pending_bond.is_some() {
                        return Err(SmilesError::UnexpectedChar { pos: self.pos, ch });
                    }
                    let (restored, _) = self
                        .branches
                        .pop()
                        .ok_or(SmilesError::UnmatchedParen { pos: self.pos })?;
                    self.prev = restored;
                    self.pos += 1;
                }
                '.' => {
                    if self.pending_bond.is_some() {
                        return Err(SmilesError::UnexpectedChar { pos: self.pos, ch });
                    }
                    self.prev = None;
                    self.pos += 1;
                }
                '0'..='9' | '%' => self.read_ring_closure()?,
                other => {
                    return Err(SmilesError::UnexpectedChar {
                        pos: self.pos,
                        ch: other,
                    })
                }
            }
        }

        if let Some(&(_, pos)) = self.branches.last() {
            return Err(SmilesError::UnmatchedParen { pos });
        }
        if let Some(&digit) = self.rings.keys().min() {
            return Err(SmilesError::UnclosedRing { digit });
        }
        if self.pending_bond.is_some() {
            return Err(SmilesError::UnexpectedEnd);
        }
        if self.mol.atom_count() == 0 {
            return Err(SmilesError::EmptyInput);
        }

        Ok(self.mol)
    }

    fn push_atom(&mut self, atom: Atom) {
        let idx = self.mol.add_atom(atom);
        if let Some(prev) = self.prev {
            let bond = self.pending_bond.take().unwrap_or(Bond::Implicit);
            self.mol.add_bond(prev, idx, bond);
        }
        self.prev = Some(idx);
    }

    fn read_organic_atom(&mut self, ch: char) -> Atom {
        self.pos += 1;
        match (ch, self.peek()) {
            ('B', Some('r')) => {
                self.pos += 1;
                Atom::bare(35, false)
            }
            ('C', Some('l')) => {
                self.pos += 1;
                Atom::bare(17, false)
            }
            ('B', _) => Atom::bare(5, false),
            ('C', _) => Atom::bare(6, false),
            ('N', _) => Atom::bare(7, false),
            ('O', _) => Atom::bare(8, false),
            ('P', _) => Atom::bare(15, false),
            ('S', _) => Atom::bare(16, false),
            ('F', _) => Atom::bare(9, false),
            ('I', _) => Atom::bare(53, false),
            ('b', _) => Atom::bare(5, true),
            ('c', _) => Atom::bare(6, true),
            ('n', _) => Atom::bare(7, true),
            ('o', _) => Atom::bare(8, true),
            ('p', _) => Atom::bare(15, true),
            _ => Atom::bare(16, true),
        }
    }

    fn read_bracket_atom(&mut self) -> Result<Atom, SmilesError> {
        let start = self.pos;
        self.pos += 1;

        let isotope: Option<u16> = self.read_bounded()?;
        let (atomic_num, aromatic) = self.read_bracket_symbol(start)?;

        // Chirality: @, @@, and the @TH1 / @SP2 style forms.
        if self.peek() == Some('@') {
            while self.peek() == Some('@') {
                self.pos += 1;
            }
            let class: String = [self.peek_at(0), self.peek_at(1)]
                .iter()
                .flatten()
                .collect();
            if CHIRAL_CLASSES.contains(&class.as_str()) {
                self.pos += 2;
                self.read_number();
            }
        }

        let hcount = if self.peek() == Some('H') {
            self.pos += 1;
            Some(self.read_bounded::<u8>()?.unwrap_or(1))
        } else {
            None
        };

        let charge = self.read_charge()?;

        if self.peek() == Some(':') {
            self.pos += 1;
            self.read_number();
        }

        match self.peek() {
            Some(']') => self.pos += 1,
            Some(ch) => return Err(SmilesError::UnexpectedChar { pos: self.pos, ch }),
            None => return Err(SmilesError::UnclosedBracket { pos: start }),
        }

        Ok(Atom {
            atomic_num,
            aromatic,
            charge: Some(charge),
            hcount,
            isotope,
        })
    }

    fn read_bracket_symbol(&mut self, start: usize) -> Result<(u8, bool), SmilesError> {
        let first = self
            .peek()
            .ok_or(SmilesError::UnclosedBracket { pos: start })?;

        if first == '*' {
            self.pos += 1;
            return Ok((0, false));
        }

        if first.is_ascii_uppercase() {
            if let Some(second) = self.peek_at(1).filter(|c| c.is_ascii_lowercase()) {
                let two: String = [first, second].iter().collect();
                if let Some(num) = atomic_num(&two) {
                    self.pos += 2;
                    return Ok((num, false));
                }
            }
            let one = first.to_string();
            return match atomic_num(&one) {
                Some(num) => {
                    self.pos += 1;
                    Ok((num, false))
                }
                None => Err(SmilesError::InvalidElement {
                    pos: self.pos,
                    text: one,
                }),
            };
        }

        for (text, num) in AROMATIC_BRACKET {
            let matches = text
                .chars()
                .enumerate()
                .all(|(i, c)| self.peek_at(i) == Some(c));
            if matches {
                self.pos += text.len();
                return Ok((num, true));
            }
        }

        Err(SmilesError::InvalidElement {
            pos: self.pos,
            text: first.to_string(),
        })
    }

    fn read_charge(&mut self) -> Result<i8, SmilesError> {
        let sign: i8 = match self.peek() {
            Some('+') => 1,
            Some('-') => -1,
            _ => return Ok(0),
        };
        let symbol = self.peek();
        self.pos += 1;

        if let Some(n) = self.read_bounded::<i8>()? {
            return Ok(sign * n);
        }

        let mut magnitude: i8 = 1;
        while self.peek() == symbol {
            self.pos += 1;
            magnitude = magnitude.saturating_add(1);
        }
        Ok(sign * magnitude)
    }

    /// Read a number that must fit in `T`.
    fn read_bounded<T: TryFrom<u32>>(&mut self) -> Result<Option<T>, SmilesError> {
        let start = self.pos;
        let Some(n) = self.read_number() else {
            return Ok(None);
        };
        T::try_from(n).map(Some).map_err(|_| SmilesError::NumberOutOfRange {
            pos: start,
            text: self.chars[start..self.pos].iter().collect(),
        })
    }

    fn read_number(&mut self) -> Option<u32> {
        let mut value: Option<u32> = None;
        while let Some(d) = self.peek().and_then(|c| c.to_digit(10)) {
            value = Some(value.unwrap_or(0).saturating_mul(10).saturating_add(d));
            self.pos += 1;
        }
        value
    }

    fn read_ring_closure(&mut self) -> Result<(), SmilesError> {
        let pos = self.pos;
        let digit = if self.peek() == Some('%') {
            let hi = self.peek_at(1).and_then(|c| c.to_digit(10));
            let lo = self.peek_at(2).and_then(|c| c.to_digit(10));
            match (hi, lo) {
                (Some(hi), Some(lo)) => {
                    self.pos += 3;
                    (hi * 10 + lo) as u16
                }
                _ => return Err(SmilesError::UnexpectedChar { pos, ch: '%' }),
            }
        } else {
            let d = self.peek().and_then(|c| c.to_digit(10)).unwrap_or(0);
            self.pos += 1;
            d as u16
        };

        let current = self.prev.ok_or(SmilesError::InvalidRingBond { digit, pos })?;
        let bond = self.pending_bond.take();

        match self.rings.remove(&digit) {
            None => {
                self.rings.insert(digit, OpenRing { atom: current, bond });
            }
            Some(open) => {
                let bond = match (open.bond, bond) {
                    (Some(a), Some(b)) if a != b => {
                        return Err(SmilesError::RingBondConflict { digit })
                    }
                    (Some(a), _) => a,
                    (None, Some(b)) => b,
                    (None, None) => Bond::Implicit,
                };
                if open.atom == current || self.mol.bond_between(open.atom, current).is_some() {
                    return Err(SmilesError::InvalidRingBond { digit, pos });
                }
                self.mol.add_bond(open.atom, current, bond);
            }
        }

        Ok(())
    }
}

fn bond_for(ch: char) -> Bond {
    match ch {
        '=' => Bond::Double,
        '#' => Bond::Triple,
        ':' => Bond::Aromatic,
        _ => Bond::Single,
    }
}
