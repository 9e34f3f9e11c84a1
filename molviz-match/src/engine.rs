//! Batch substructure matching over structure and pattern tables.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use molviz_core::{MatchError, MolvizConfig};

use crate::aromaticity::perceive_aromaticity;
use crate::mol::Molecule;
use crate::smiles::parse_smiles;
use crate::substruct::{count_matches, has_match};

/// How a pattern/structure pair is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MatchMode {
    /// 1 if the pattern occurs at least once, else 0.
    Boolean,
    /// Number of distinct occurrences.
    Count,
}

/// The substructure predicate behind [`MatchEngine`].
///
/// Inputs are compiled once per batch, so implementations can do their
/// parsing up front and keep `score` cheap.
pub trait SubstructureMatcher: Send + Sync {
    type Query: Send + Sync;
    type Target: Send + Sync;

    fn compile_pattern(&self, pattern: &str) -> Result<Self::Query, MatchError>;

    fn compile_structure(&self, structure: &str) -> Result<Self::Target, MatchError>;

    fn score(&self, target: &Self::Target, query: &Self::Query, mode: MatchMode) -> u32;
}

/// SMILES graph matcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphMatcher;

impl SubstructureMatcher for GraphMatcher {
    type Query = Molecule;
    type Target = Molecule;

    fn compile_pattern(&self, pattern: &str) -> Result<Molecule, MatchError> {
        parse_pattern(pattern)
    }

    fn compile_structure(&self, structure: &str) -> Result<Molecule, MatchError> {
        parse_structure(structure)
    }

    fn score(&self, target: &Molecule, query: &Molecule, mode: MatchMode) -> u32 {
        match mode {
            MatchMode::Boolean => u32::from(has_match(target, query)),
            MatchMode::Count => u32::try_from(count_matches(target, query)).unwrap_or(u32::MAX),
        }
    }
}

/// Parse a substructure pattern, keeping unwritten bonds as "single or aromatic".
/// Kekulé rings are perceived as aromatic.
pub fn parse_pattern(pattern: &str) -> Result<Molecule, MatchError> {
    let mut mol = parse_smiles(pattern).map_err(|e| MatchError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;
    perceive_aromaticity(&mut mol);
    Ok(mol)
}

/// Parse a structure, resolving unwritten bonds to single or aromatic, then
/// perceiving aromatic Kekulé rings.
pub fn parse_structure(structure: &str) -> Result<Molecule, MatchError> {
    let mut mol = parse_smiles(structure).map_err(|e| MatchError::InvalidStructure {
        structure: structure.to_string(),
        reason: e.to_string(),
    })?;
    mol.resolve_implicit_bonds();
    perceive_aromaticity(&mut mol);
    Ok(mol)
}

/// Result of a batch match: `structure -> pattern -> score`, plus the
/// structures that could not be parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchTable {
    rows: BTreeMap<String, BTreeMap<String, u32>>,
    failures: BTreeMap<String, MatchError>,
}

impl MatchTable {
    /// Score of one pair; `None` if the structure has no row.
    pub fn get(&self, structure: &str, pattern: &str) -> Option<u32> {
        self.rows.get(structure)?.get(pattern).copied()
    }

    pub fn row(&self, structure: &str) -> Option<&BTreeMap<String, u32>> {
        self.rows.get(structure)
    }

    pub fn rows(&self) -> &BTreeMap<String, BTreeMap<String, u32>> {
        &self.rows
    }

    /// True if any pattern scored above zero for `structure`.
    pub fn is_match(&self, structure: &str) -> bool {
        self.rows
            .get(structure)
            .is_some_and(|row| row.values().any(|&v| v > 0))
    }

    /// Structures with at least one matched pattern.
    pub fn matched_structures(&self) -> BTreeSet<String> {
        self.rows
            .iter()
            .filter(|(_, row)| row.values().any(|&v| v > 0))
            .map(|(structure, _)| structure.clone())
            .collect()
    }

    /// Structures skipped because they could not be parsed.
    pub fn failures(&self) -> &BTreeMap<String, MatchError> {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Bounded memo of computed scores.
///
/// Inserting into a full memo is a no-op; existing entries are never evicted.
#[derive(Debug)]
pub struct MatchMemo {
    entries: RwLock<HashMap<(MatchMode, String, String), u32>>,
    max_size: usize,
}

impl MatchMemo {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_size,
        }
    }

    pub fn get(&self, mode: MatchMode, pattern: &str, structure: &str) -> Option<u32> {
        self.entries
            .read()
            .ok()?
            .get(&(mode, pattern.to_string(), structure.to_string()))
            .copied()
    }

    pub fn insert(&self, mode: MatchMode, pattern: &str, structure: &str, score: u32) {
        if let Ok(mut entries) = self.entries.write() {
            if entries.len() < self.max_size {
                entries.insert((mode, pattern.to_string(), structure.to_string()), score);
            }
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs pattern tables against structure tables.
#[derive(Debug, Default)]
pub struct MatchEngine<M = GraphMatcher> {
    matcher: M,
    memo: Option<MatchMemo>,
}

impl MatchEngine<GraphMatcher> {
    pub fn new() -> Self {
        Self::with_matcher(GraphMatcher)
    }

    /// Engine with the memo sized from `match_memo_capacity` (0 disables it).
    pub fn from_config(config: &MolvizConfig) -> Self {
        Self::new().with_memo(config.match_memo_capacity)
    }
}

impl<M: SubstructureMatcher> MatchEngine<M> {
    pub fn with_matcher(matcher: M) -> Self {
        Self {
            matcher,
            memo: None,
        }
    }

    /// Enable memoization of up to `capacity` scores. Zero disables it.
    pub fn with_memo(mut self, capacity: usize) -> Self {
        self.memo = (capacity > 0).then(|| MatchMemo::new(capacity));
        self
    }

    pub fn memo(&self) -> Option<&MatchMemo> {
        self.memo.as_ref()
    }

    pub fn matcher(&self) -> &M {
        &self.matcher
    }

    /// Score every pattern against every structure.
    ///
    /// Each input is parsed once. An unparseable pattern fails the batch; an
    /// unparseable structure gets no row and is listed in
    /// [`MatchTable::failures`].
    pub fn match_all<P, S>(
        &self,
        patterns: &[P],
        structures: &[S],
        mode: MatchMode,
    ) -> Result<MatchTable, MatchError>
    where
        P: AsRef<str>,
        S: AsRef<str>,
    {
        let queries = patterns
            .iter()
            .map(|p| {
                let p = p.as_ref();
                self.matcher.compile_pattern(p).map(|q| (p, q))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut table = MatchTable::default();

        for structure in structures {
            let structure = structure.as_ref();
            if table.rows.contains_key(structure) || table.failures.contains_key(structure) {
                continue;
            }

            let target = match self.matcher.compile_structure(structure) {
                Ok(target) => target,
                Err(err) => {
                    tracing::warn!(structure = %structure, error = %err, "Skipping unparseable structure");
                    table.failures.insert(structure.to_string(), err);
                    continue;
                }
            };

            let row = queries
                .iter()
                .map(|(pattern, query)| {
                    let score = self.score_pair(pattern, structure, &target, query, mode);
                    (pattern.to_string(), score)
                })
                .collect();
            table.rows.insert(structure.to_string(), row);
        }

        tracing::debug!(
            patterns = queries.len(),
            structures = table.rows.len(),
            failures = table.failures.len(),
            ?mode,
            "Match table computed"
        );

        Ok(table)
    }

    /// Structures matching at least one pattern.
    pub fn select_matching<P, S>(
        &self,
        patterns: &[P],
        structures: &[S],
    ) -> Result<BTreeSet<String>, MatchError>
    where
        P: AsRef<str>,
        S: AsRef<str>,
    {
        Ok(self
            .match_all(patterns, structures, MatchMode::Boolean)?
            .matched_structures())
    }

    /// Like [`select_matching`](Self::select_matching) but keeps input order
    /// and duplicates.
    pub fn filter_matching<P, S>(
        &self,
        patterns: &[P],
        structures: &[S],
    ) -> Result<Vec<String>, MatchError>
    where
        P: AsRef<str>,
        S: AsRef<str>,
    {
        let table = self.match_all(patterns, structures, MatchMode::Boolean)?;
        Ok(structures
            .iter()
            .map(|s| s.as_ref())
            .filter(|s| table.is_match(s))
            .map(str::to_string)
            .collect())
    }

    /// Whether one pattern occurs in one structure. Both must parse.
    pub fn contains(&self, pattern: &str, structure: &str) -> Result<bool, MatchError> {
        let query = self.matcher.compile_pattern(pattern)?;
        let target = self.matcher.compile_structure(structure)?;
        Ok(self.score_pair(pattern, structure, &target, &query, MatchMode::Boolean) > 0)
    }

    fn score_pair(
        &self,
        pattern: &str,
        structure: &str,
        target: &M::Target,
        query: &M::Query,
        mode: MatchMode,
    ) -> u32 {
        if let Some(score) = self.memo.as_ref().and_then(|m| m.get(mode, pattern, structure)) {
            return score;
        }
        let score = self.matcher.score(target, query, mode);
        if let Some(memo) = &self.memo {
            memo.insert(mode, pattern, structure, score);
        }
        score
    }
}
