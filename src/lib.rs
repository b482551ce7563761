//! Filtered subset extraction from large FASTA sequence databases.
//!
//! The extractor reads a FASTA file of any size through page-aligned memory
//! map windows and writes the records matching one of two mutually
//! exclusive predicates:
//!
//! - **filter mode** selects records by exact sequence length and/or
//!   inclusive length ranges (or everything, when neither is configured);
//! - **lookup mode** selects records whose header IDs appear in an external
//!   hit list, built from a BLAST tabular results file or a plain
//!   ID-per-line file. Hit IDs that match nothing are reported to a
//!   `.notFound` file.
//!
//! Output is byte-exact FASTA: an accepted record's bytes are emitted as a
//! contiguous prefix of its input bytes, optionally trimmed to a fixed
//! number of header annotation fields, under per-worker byte and record
//! budgets.
//!
//! # Architecture
//!
//! ```text
//! Config -> Partitioner -> per-worker { Scanner -> Selector -> output }
//!              |                            |
//!              '-- pool sizing              '-- hit-list index (shared)
//!                                  Coordinator: reduce seen-counts,
//!                                  .notFound report, optional combining
//! ```
//!
//! The partitioner carves the file into record-aligned, page-aligned byte
//! ranges (shrinking the worker pool when the file is too small); each
//! worker walks its range in mapped scan windows, stitching records that
//! straddle window boundaries through a carry buffer.

pub mod cli;
pub mod config;
pub mod fasta;
pub mod hits;
pub mod mapio;
pub mod partition;
pub mod run;
pub mod scan;
pub mod select;

pub use config::{AnnotMode, Config, ConfigError, HitSource, LengthFilter, Verbosity};
pub use hits::{HitList, HitListError};
pub use partition::{Partition, PartitionError, PartitionPlan};
pub use run::{run, RunError, RunSummary};
pub use scan::ScanError;
pub use select::{SelectStats, Selector};
