//! Validated run configuration.
//!
//! [`Config`] is assembled by the CLI layer and checked by
//! [`Config::validate`] before any file is touched. Cross-option rules live
//! here rather than in the parser so they are testable without a process.

use std::fmt;
use std::path::PathBuf;

/// Default output path when `--output` is not given.
pub const DEFAULT_OUTPUT: &str = "filter.out";

/// Most exact-length and range filters accepted; extras are ignored with a
/// warning.
pub const MAX_LENGTH_FILTERS: usize = 5;

/// Diagnostic output level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Verbose,
    Trace,
}

impl Verbosity {
    /// Progress output enabled.
    pub fn verbose(self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }

    /// Debug-level output enabled.
    pub fn trace(self) -> bool {
        matches!(self, Verbosity::Trace)
    }
}

/// What is written for each accepted record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnnotMode {
    /// Full header line and body, byte for byte.
    All,
    /// Body only; no header line.
    SequenceOnly,
    /// Header prefix covering the first `count` fields, then the body when
    /// `with_body` is set.
    Fields { count: u32, with_body: bool },
}

impl AnnotMode {
    /// Decodes the signed CLI encoding: `i32::MAX` keeps everything, zero
    /// keeps only the body, positive keeps the first N fields with the
    /// body, negative keeps them without. `i32::MIN` is reserved and
    /// rejected.
    pub fn from_raw(raw: i32) -> Result<Self, ConfigError> {
        match raw {
            i32::MIN => Err(ConfigError::AnnotSentinel),
            i32::MAX => Ok(AnnotMode::All),
            0 => Ok(AnnotMode::SequenceOnly),
            n if n > 0 => Ok(AnnotMode::Fields {
                count: n as u32,
                with_body: true,
            }),
            n => Ok(AnnotMode::Fields {
                count: n.unsigned_abs(),
                with_body: false,
            }),
        }
    }
}

/// Outcome of adding a length or range to the filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterPush {
    Added,
    /// Already present; silently dropped.
    Duplicate,
    /// The per-kind cap is full; the caller should warn.
    Full,
}

/// Accepted sequence lengths: exact values and inclusive ranges.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LengthFilter {
    exact: Vec<u64>,
    ranges: Vec<(u64, u64)>,
}

impl LengthFilter {
    pub fn push_exact(&mut self, len: u64) -> FilterPush {
        if self.exact.contains(&len) {
            return FilterPush::Duplicate;
        }
        if self.exact.len() >= MAX_LENGTH_FILTERS {
            return FilterPush::Full;
        }
        self.exact.push(len);
        FilterPush::Added
    }

    pub fn push_range(&mut self, lo: u64, hi: u64) -> FilterPush {
        if self.ranges.contains(&(lo, hi)) {
            return FilterPush::Duplicate;
        }
        if self.ranges.len() >= MAX_LENGTH_FILTERS {
            return FilterPush::Full;
        }
        self.ranges.push((lo, hi));
        FilterPush::Added
    }

    /// No lengths or ranges configured.
    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.ranges.is_empty()
    }

    /// Whether `len` satisfies any configured length or range.
    pub fn accepts(&self, len: u64) -> bool {
        self.exact.contains(&len) || self.ranges.iter().any(|&(lo, hi)| lo <= len && len <= hi)
    }
}

/// Where lookup-mode hit IDs come from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HitSource {
    /// BLAST tabular results file.
    BlastTable(PathBuf),
    /// Plain one-ID-per-line file.
    IdList(PathBuf),
}

impl HitSource {
    pub fn path(&self) -> &PathBuf {
        match self {
            HitSource::BlastTable(p) | HitSource::IdList(p) => p,
        }
    }
}

/// A full, validated extraction run.
#[derive(Clone, Debug)]
pub struct Config {
    pub query: PathBuf,
    pub output: PathBuf,
    /// Records to extract at most; `u64::MAX` means unlimited.
    pub max_records: u64,
    /// Per-worker output byte budget; `u64::MAX` means unlimited.
    pub byte_limit: u64,
    pub lengths: LengthFilter,
    pub annot: AnnotMode,
    pub hit_source: Option<HitSource>,
    pub workers: usize,
    /// Requested scan-window ceiling in bytes; normalized against the page
    /// size before scanning.
    pub window_bytes: u64,
    pub verbosity: Verbosity,
}

impl Config {
    /// A configuration with defaults for everything but the query path.
    pub fn new(query: PathBuf) -> Self {
        Self {
            query,
            output: PathBuf::from(DEFAULT_OUTPUT),
            max_records: u64::MAX,
            byte_limit: u64::MAX,
            lengths: LengthFilter::default(),
            annot: AnnotMode::All,
            hit_source: None,
            workers: 1,
            window_bytes: crate::scan::DEFAULT_WINDOW_BYTES,
            verbosity: Verbosity::Quiet,
        }
    }

    /// Cross-option validation; run before any file is created.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.query.as_os_str().is_empty() {
            return Err(ConfigError::MissingQuery);
        }
        if self.query == self.output {
            return Err(ConfigError::QueryIsOutput);
        }
        if let Some(source) = &self.hit_source {
            if source.path() == &self.query {
                return Err(ConfigError::QueryIsHitSource);
            }
            if source.path() == &self.output {
                return Err(ConfigError::HitSourceIsOutput);
            }
            if !self.lengths.is_empty() {
                return Err(ConfigError::LengthFilterWithLookup);
            }
        }
        if self.workers == 0 {
            return Err(ConfigError::InvalidWorkers);
        }
        Ok(())
    }
}

/// Configuration and option-parsing errors. All of them abort before any
/// output file exists.
#[derive(Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    MissingQuery,
    QueryIsOutput,
    QueryIsHitSource,
    HitSourceIsOutput,
    /// A BLAST table pipeline and an ID-list search were both requested.
    ConflictingHitSources,
    /// Length or range filters combined with a lookup source.
    LengthFilterWithLookup,
    /// Pipeline mode 1 without a BLAST table.
    MissingTable,
    /// The MUSCLE pipeline stage is not implemented.
    PipelineUnimplemented,
    InvalidPipeline(i64),
    /// The reserved annotation encoding (`i32::MIN`).
    AnnotSentinel,
    InvalidCount(i64),
    InvalidByteLimit(i64),
    InvalidRange { lo: u64, hi: u64 },
    InvalidWorkers,
    InvalidNumber { option: &'static str, value: String },
    InvalidSuffix(String),
    UnknownOption(String),
    MissingValue(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingQuery => write!(f, "missing query file"),
            ConfigError::QueryIsOutput => {
                write!(f, "query and output refer to the same file")
            }
            ConfigError::QueryIsHitSource => {
                write!(f, "query and hit source refer to the same file")
            }
            ConfigError::HitSourceIsOutput => {
                write!(f, "hit source and output refer to the same file")
            }
            ConfigError::ConflictingHitSources => {
                write!(f, "pipeline table and search file are mutually exclusive")
            }
            ConfigError::LengthFilterWithLookup => {
                write!(f, "length filters cannot be combined with a lookup source")
            }
            ConfigError::MissingTable => {
                write!(f, "pipeline mode requires a BLAST table file")
            }
            ConfigError::PipelineUnimplemented => {
                write!(f, "the MUSCLE pipeline is not implemented")
            }
            ConfigError::InvalidPipeline(v) => {
                write!(f, "invalid pipeline selector {v} (0 = none, 1 = HMMER, 2 = MUSCLE)")
            }
            ConfigError::AnnotSentinel => {
                write!(f, "annotation field count {} is reserved", i32::MIN)
            }
            ConfigError::InvalidCount(v) => {
                write!(f, "invalid record count {v} (must be 0 or greater)")
            }
            ConfigError::InvalidByteLimit(v) => {
                write!(f, "invalid byte limit {v} (must be 1 or greater)")
            }
            ConfigError::InvalidRange { lo, hi } => {
                write!(f, "invalid length range {lo}:{hi} (start must be below end)")
            }
            ConfigError::InvalidWorkers => write!(f, "worker count must be at least 1"),
            ConfigError::InvalidNumber { option, value } => {
                write!(f, "invalid value '{value}' for {option}")
            }
            ConfigError::InvalidSuffix(s) => {
                write!(f, "invalid byte limit suffix '{s}' (use KB, MB or GB)")
            }
            ConfigError::UnknownOption(opt) => write!(f, "unknown option '{opt}'"),
            ConfigError::MissingValue(option) => {
                write!(f, "missing value for {option}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
