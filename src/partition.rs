//! Record-aligned partitioning of the query file across workers.
//!
//! A partition is described by three numbers:
//!
//! - `page_offset`: a page-aligned file offset where the worker's mapping
//!   starts (mmap requires page alignment);
//! - `skew`: bytes between `page_offset` and the first record of the
//!   partition — `page_offset + skew` is a `>` starting a record (or file
//!   offset 0 for the first partition);
//! - `len`: the number of meaningful bytes owned by the partition, starting
//!   at `page_offset + skew`.
//!
//! Partition boundaries are found by reading single pages backward from each
//! partition's nominal end and searching them in reverse for a record start,
//! which bounds pre-scan I/O to at most one nominal partition per worker.
//! When the file is too small to give every worker at least one whole
//! record, the pool shrinks by one and planning restarts.
//!
//! # Invariants
//!
//! - Partition ranges are contiguous and their `len`s sum to the file size.
//! - Every `page_offset` is a multiple of the page size.
//! - Every partition but the first begins at a record start; every
//!   partition but the last ends immediately before one.

use std::fmt;
use std::fs::File;
use std::io;

use memchr::memrchr;

use crate::fasta::RECORD_START;
use crate::mapio;

/// One worker's byte range of the query file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Partition {
    /// Page-aligned mapping origin.
    pub page_offset: u64,
    /// Offset from `page_offset` to the partition's first record.
    pub skew: u64,
    /// Meaningful bytes starting at `page_offset + skew`.
    pub len: u64,
}

impl Partition {
    /// File offset of the partition's first meaningful byte.
    #[must_use]
    pub const fn start(&self) -> u64 {
        self.page_offset + self.skew
    }

    /// File offset one past the partition's last meaningful byte.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.page_offset + self.skew + self.len
    }
}

/// The full plan: one entry per surviving worker, in file-offset order.
#[derive(Clone, Debug)]
pub struct PartitionPlan {
    parts: Vec<Partition>,
}

impl PartitionPlan {
    /// Number of workers the plan was sized for.
    pub fn workers(&self) -> usize {
        self.parts.len()
    }

    pub fn get(&self, rank: usize) -> Partition {
        self.parts[rank]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Partition> {
        self.parts.iter()
    }
}

/// Errors from partition planning.
#[derive(Debug)]
#[non_exhaustive]
pub enum PartitionError {
    /// The query file has no bytes.
    EmptyFile,
    /// A worker count of zero was requested.
    NoWorkers,
    /// I/O error while probing partition boundaries.
    Io(io::Error),
    /// No record start was found within a partition's nominal window.
    NoRecordStart { partition: usize },
}

impl fmt::Display for PartitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartitionError::EmptyFile => write!(f, "query file is empty"),
            PartitionError::NoWorkers => write!(f, "worker count must be at least 1"),
            PartitionError::Io(err) => write!(f, "failed probing partition boundary: {err}"),
            PartitionError::NoRecordStart { partition } => write!(
                f,
                "no record start found within partition {partition} (malformed input?)"
            ),
        }
    }
}

impl std::error::Error for PartitionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PartitionError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for PartitionError {
    fn from(err: io::Error) -> Self {
        PartitionError::Io(err)
    }
}

/// Computes a partition plan for `file_size` bytes across up to `workers`
/// workers, with mappings aligned to `page_size`.
///
/// The returned plan may carry fewer entries than requested when the file
/// cannot feed every worker a non-empty, record-aligned range.
pub fn plan(
    file: &File,
    file_size: u64,
    workers: usize,
    page_size: u64,
) -> Result<PartitionPlan, PartitionError> {
    if file_size == 0 {
        return Err(PartitionError::EmptyFile);
    }
    if workers == 0 {
        return Err(PartitionError::NoWorkers);
    }
    assert!(page_size > 0 && page_size.is_power_of_two());

    let mut pool = workers;
    let mut page = vec![0u8; page_size as usize];

    'restart: loop {
        if pool == 1 {
            return Ok(PartitionPlan {
                parts: vec![Partition {
                    page_offset: 0,
                    skew: 0,
                    len: file_size,
                }],
            });
        }

        // Nominal per-worker share, rounded down to whole pages.
        let nominal = (file_size.div_ceil(pool as u64) / page_size) * page_size;
        if nominal == 0 {
            pool -= 1;
            eprintln!("warning: query file too small, shrinking worker pool to {pool}");
            continue 'restart;
        }

        let mut parts: Vec<Partition> = Vec::with_capacity(pool);
        for i in 0..pool {
            let (page_offset, skew) = match parts.last() {
                None => (0, 0),
                Some(prev) => {
                    let prev_end = prev.end();
                    let page_offset = (prev_end / page_size) * page_size;
                    (page_offset, prev_end - page_offset)
                }
            };

            if i == pool - 1 {
                parts.push(Partition {
                    page_offset,
                    skew,
                    len: file_size - (page_offset + skew),
                });
                continue;
            }

            let window_end = (page_offset + nominal).min(file_size);
            let found =
                last_record_start_in(file, page_offset, window_end, &mut page)?;
            match found {
                None => return Err(PartitionError::NoRecordStart { partition: i }),
                // The only record start in the window is this partition's
                // own first record: the range would be empty.
                Some(at) if at <= page_offset + skew => {
                    pool -= 1;
                    eprintln!(
                        "warning: query file too small, shrinking worker pool to {pool}"
                    );
                    continue 'restart;
                }
                Some(at) => parts.push(Partition {
                    page_offset,
                    skew,
                    len: at - (page_offset + skew),
                }),
            }
        }

        return Ok(PartitionPlan { parts });
    }
}

/// Finds the last record start in `[lo, hi)`, reading one page at a time
/// backward from `hi`.
fn last_record_start_in(
    file: &File,
    lo: u64,
    hi: u64,
    page: &mut [u8],
) -> Result<Option<u64>, PartitionError> {
    let page_size = page.len() as u64;
    let mut end = hi;
    while end > lo {
        let start = ((end - 1) / page_size * page_size).max(lo);
        let buf = &mut page[..(end - start) as usize];
        mapio::read_exact_at(file, buf, start)?;
        if let Some(idx) = memrchr(RECORD_START, buf) {
            return Ok(Some(start + idx as u64));
        }
        end = start;
    }
    Ok(None)
}
