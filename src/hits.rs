//! Hit-list index for lookup-mode extraction.
//!
//! The index is built once, before the scan, from either a BLAST tabular
//! results file (two whitespace-separated columns per line: query ID, hit
//! ID) or a plain one-ID-per-line file. It is then shared read-only by all
//! workers; each worker keeps its own seen-counter vector (parallel to the
//! hit list) and the coordinator sums those element-wise after the scan.
//!
//! Hit IDs are stored in insertion order, deduplicated by linear scan (the
//! expected cardinality is tens of thousands), and clipped to
//! [`MAX_ID_BYTES`] so every worker matches the same bytes.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

/// Longest hit or query ID stored, in bytes. Longer IDs are clipped with a
/// warning; clipping is deterministic so workers and the not-found report
/// agree.
pub const MAX_ID_BYTES: usize = 63;

/// Errors from building the hit-list index.
#[derive(Debug)]
#[non_exhaustive]
pub enum HitListError {
    /// I/O error reading the source file.
    Io(io::Error),
    /// The source file is empty.
    EmptySource,
    /// A non-empty tabular line had fewer than two tokens.
    MissingHitColumn { line: usize },
}

impl fmt::Display for HitListError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HitListError::Io(err) => write!(f, "failed to read hit source: {err}"),
            HitListError::EmptySource => write!(f, "hit source file is empty"),
            HitListError::MissingHitColumn { line } => {
                write!(f, "line {line}: expected query and hit columns")
            }
        }
    }
}

impl std::error::Error for HitListError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HitListError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for HitListError {
    fn from(err: io::Error) -> Self {
        HitListError::Io(err)
    }
}

/// Ordered, deduplicated hit IDs, plus the query-ID list when the source
/// was a BLAST table.
#[derive(Debug, Default)]
pub struct HitList {
    ids: Vec<Box<[u8]>>,
    queries: Vec<Box<[u8]>>,
}

impl HitList {
    /// Builds the index from a BLAST tabular results file.
    ///
    /// Only the first two columns of each line are consulted. A hit equal
    /// to its own query contributes nothing; duplicate hits are elided.
    pub fn from_blast_table(path: &Path) -> Result<Self, HitListError> {
        let bytes = fs::read(path)?;
        if bytes.is_empty() {
            return Err(HitListError::EmptySource);
        }

        let mut list = HitList::default();
        for (idx, line) in bytes.split(|&b| b == b'\n').enumerate() {
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let mut tokens = line
                .split(|b: &u8| b.is_ascii_whitespace())
                .filter(|t| !t.is_empty());
            let query = tokens.next().ok_or(HitListError::MissingHitColumn {
                line: idx + 1,
            })?;
            let hit = tokens.next().ok_or(HitListError::MissingHitColumn {
                line: idx + 1,
            })?;

            let query = clip_id(query, "query");
            let hit = clip_id(hit, "hit");

            // Tables are grouped by query, so only the previous entry needs
            // checking to keep the query list deduplicated.
            if list.queries.last().map(Box::as_ref) != Some(query) {
                list.queries.push(query.into());
            }
            if hit != query && !list.contains(hit) {
                list.ids.push(hit.into());
            }
        }
        Ok(list)
    }

    /// Builds the index from a plain ID-per-line file. Empty lines are
    /// skipped; the remainder of each line is the ID.
    pub fn from_id_list(path: &Path) -> Result<Self, HitListError> {
        let bytes = fs::read(path)?;
        if bytes.is_empty() {
            return Err(HitListError::EmptySource);
        }

        let mut list = HitList::default();
        for line in bytes.split(|&b| b == b'\n') {
            if line.is_empty() {
                continue;
            }
            let id = clip_id(line, "search");
            if !list.contains(id) {
                list.ids.push(id.into());
            }
        }
        Ok(list)
    }

    /// Number of indexed hit IDs.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Hit ID at `index`, in insertion order.
    pub fn id(&self, index: usize) -> &[u8] {
        &self.ids[index]
    }

    /// Iterates hit IDs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.ids.iter().map(Box::as_ref)
    }

    /// Query IDs seen in the tabular source (empty for plain ID lists).
    pub fn queries(&self) -> impl Iterator<Item = &[u8]> {
        self.queries.iter().map(Box::as_ref)
    }

    /// A zeroed seen-counter vector parallel to the hit list.
    pub fn new_counters(&self) -> Vec<u64> {
        vec![0; self.ids.len()]
    }

    fn contains(&self, id: &[u8]) -> bool {
        self.ids.iter().any(|existing| existing.as_ref() == id)
    }
}

/// Clips an ID to [`MAX_ID_BYTES`], warning when bytes are dropped.
fn clip_id<'a>(id: &'a [u8], kind: &str) -> &'a [u8] {
    if id.len() > MAX_ID_BYTES {
        eprintln!(
            "warning: {} ID of {} bytes clipped to {} bytes",
            kind,
            id.len(),
            MAX_ID_BYTES
        );
        &id[..MAX_ID_BYTES]
    } else {
        id
    }
}
