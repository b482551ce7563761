//! Run coordination: pool sizing, worker scans, and post-scan reduction.
//!
//! Workers are scoped OS threads, one per partition-plan entry, and share
//! nothing while scanning: each opens its own read-only handle on the query
//! file and owns its output file, selector state, and seen-counter vector.
//! The coordinator:
//!
//! 1. sizes the pool via the partitioner (which may shrink it),
//! 2. runs the workers to completion — a worker failure never cancels its
//!    peers,
//! 3. sums the per-worker seen counters and writes the `<output>.notFound`
//!    report in lookup mode,
//! 4. optionally (feature `combine-output`) concatenates the per-rank
//!    files, in rank order, into the configured output path.
//!
//! With one worker the output path is used as-is; with more, each rank
//! writes `<output><rank>`. A rank whose scan selected nothing removes its
//! empty file at teardown.

use std::ffi::OsString;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread;

use crate::config::{Config, HitSource};
use crate::hits::{HitList, HitListError};
use crate::mapio;
use crate::partition::{self, PartitionError, PartitionPlan};
use crate::scan::{self, ScanError};
use crate::select::{SelectStats, Selector};

/// Output stream buffer size, and the copy-chunk size used when combining
/// per-rank files: 4 MiB.
pub const STREAM_BUF_BYTES: usize = 1 << 22;

/// Aggregate result of a successful run.
#[derive(Clone, Copy, Debug, Default)]
pub struct RunSummary {
    /// Workers that actually scanned (after any pool shrink).
    pub workers: usize,
    /// Records extracted across all workers.
    pub records_extracted: u64,
    /// Bytes written across all workers.
    pub bytes_written: u64,
    /// Hit IDs that matched no record (lookup mode only).
    pub hits_not_found: Option<u64>,
}

/// Errors that fail a run.
#[derive(Debug)]
#[non_exhaustive]
pub enum RunError {
    /// The query file could not be opened or examined.
    OpenQuery { path: PathBuf, source: io::Error },
    /// The query file has no bytes.
    EmptyQuery(PathBuf),
    /// Building the hit-list index failed.
    HitList(HitListError),
    /// Partition planning failed.
    Partition(PartitionError),
    /// A worker's output file could not be created.
    CreateOutput { path: PathBuf, source: io::Error },
    /// A worker's scan failed; peers ran to completion regardless.
    Worker { rank: usize, source: ScanError },
    /// Post-scan file plumbing (report or combining) failed.
    PostScan(io::Error),
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunError::OpenQuery { path, source } => {
                write!(f, "failed to open query file {}: {source}", path.display())
            }
            RunError::EmptyQuery(path) => {
                write!(f, "query file {} is empty", path.display())
            }
            RunError::HitList(err) => write!(f, "{err}"),
            RunError::Partition(err) => write!(f, "{err}"),
            RunError::CreateOutput { path, source } => {
                write!(
                    f,
                    "failed to create output file {}: {source}",
                    path.display()
                )
            }
            RunError::Worker { rank, source } => {
                write!(f, "worker {rank}: {source}")
            }
            RunError::PostScan(err) => write!(f, "post-scan output handling failed: {err}"),
        }
    }
}

impl std::error::Error for RunError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RunError::OpenQuery { source, .. } | RunError::CreateOutput { source, .. } => {
                Some(source)
            }
            RunError::EmptyQuery(_) => None,
            RunError::HitList(err) => Some(err),
            RunError::Partition(err) => Some(err),
            RunError::Worker { source, .. } => Some(source),
            RunError::PostScan(err) => Some(err),
        }
    }
}

impl From<HitListError> for RunError {
    fn from(err: HitListError) -> Self {
        RunError::HitList(err)
    }
}

impl From<PartitionError> for RunError {
    fn from(err: PartitionError) -> Self {
        RunError::Partition(err)
    }
}

/// What one worker brings back to the coordinator.
struct WorkerReport {
    rank: usize,
    stats: SelectStats,
    seen: Vec<u64>,
    error: Option<ScanError>,
}

/// Executes a validated configuration end to end.
pub fn run(cfg: &Config) -> Result<RunSummary, RunError> {
    let query = File::open(&cfg.query).map_err(|source| RunError::OpenQuery {
        path: cfg.query.clone(),
        source,
    })?;
    let query_len = query
        .metadata()
        .map_err(|source| RunError::OpenQuery {
            path: cfg.query.clone(),
            source,
        })?
        .len();
    if query_len == 0 {
        return Err(RunError::EmptyQuery(cfg.query.clone()));
    }

    let hits = match &cfg.hit_source {
        Some(HitSource::BlastTable(path)) => Some(HitList::from_blast_table(path)?),
        Some(HitSource::IdList(path)) => Some(HitList::from_id_list(path)?),
        None => None,
    };

    let page_size = mapio::page_size();
    let window_bytes = scan::effective_window(cfg.window_bytes, page_size);
    let plan = partition::plan(&query, query_len, cfg.workers, page_size)?;
    drop(query);

    let pool = plan.workers();
    if cfg.verbosity.verbose() && pool < cfg.workers {
        eprintln!("worker pool sized down from {} to {pool}", cfg.workers);
    }
    if cfg.verbosity.trace() {
        for (rank, part) in plan.iter().enumerate() {
            eprintln!(
                "partition {rank}: page_offset={} skew={} len={}",
                part.page_offset, part.skew, part.len
            );
        }
    }

    // Quotas are only meaningful when a single worker sees every record.
    // The selector also stops a single-worker lookup scan once every hit
    // ID has matched, tracked by distinct hits found — not by the record
    // count, which overcounts when several records match one hit.
    let record_quota = (pool == 1).then_some(cfg.max_records);

    let reports = run_workers(cfg, &plan, hits.as_ref(), window_bytes, record_quota)?;

    let mut summary = RunSummary {
        workers: pool,
        ..RunSummary::default()
    };
    let mut first_error: Option<RunError> = None;
    let mut seen_totals = hits.as_ref().map(|h| h.new_counters());
    for report in reports {
        summary.records_extracted = summary
            .records_extracted
            .saturating_add(report.stats.records_extracted);
        summary.bytes_written = summary
            .bytes_written
            .saturating_add(report.stats.bytes_written);
        if let Some(totals) = seen_totals.as_mut() {
            for (total, count) in totals.iter_mut().zip(&report.seen) {
                *total = total.saturating_add(*count);
            }
        }
        if let Some(source) = report.error {
            if first_error.is_none() {
                first_error = Some(RunError::Worker {
                    rank: report.rank,
                    source,
                });
            }
        }
        if cfg.verbosity.verbose() {
            eprintln!(
                "worker {}: extracted {} records ({} bytes)",
                report.rank, report.stats.records_extracted, report.stats.bytes_written
            );
        }
    }

    if let (Some(hits), Some(totals)) = (hits.as_ref(), seen_totals.as_ref()) {
        summary.hits_not_found =
            Some(write_not_found(&cfg.output, hits, totals).map_err(RunError::PostScan)?);
    }

    #[cfg(feature = "combine-output")]
    if pool > 1 && first_error.is_none() {
        combine_outputs(cfg, pool, summary.bytes_written).map_err(RunError::PostScan)?;
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(summary),
    }
}

/// Output path for one rank: the configured path alone for a single
/// worker, `<output><rank>` otherwise.
pub fn rank_output(output: &Path, pool: usize, rank: usize) -> PathBuf {
    if pool == 1 {
        return output.to_path_buf();
    }
    let mut name = OsString::from(output.as_os_str());
    name.push(rank.to_string());
    PathBuf::from(name)
}

/// The `.notFound` report path for an output file.
pub fn not_found_path(output: &Path) -> PathBuf {
    let mut name = OsString::from(output.as_os_str());
    name.push(".notFound");
    PathBuf::from(name)
}

fn run_workers(
    cfg: &Config,
    plan: &PartitionPlan,
    hits: Option<&HitList>,
    window_bytes: u64,
    record_quota: Option<u64>,
) -> Result<Vec<WorkerReport>, RunError> {
    let pool = plan.workers();
    let mut reports: Vec<WorkerReport> = Vec::with_capacity(pool);

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(pool);
        for rank in 0..pool {
            let part = plan.get(rank);
            let out_path = rank_output(&cfg.output, pool, rank);
            handles.push(scope.spawn(move || {
                run_one_worker(cfg, rank, part, out_path, hits, window_bytes, record_quota)
            }));
        }
        for handle in handles {
            reports.push(handle.join().expect("worker thread panicked")?);
        }
        Ok::<(), RunError>(())
    })?;

    Ok(reports)
}

/// One worker: own file handles, own selector, own teardown.
fn run_one_worker(
    cfg: &Config,
    rank: usize,
    part: crate::partition::Partition,
    out_path: PathBuf,
    hits: Option<&HitList>,
    window_bytes: u64,
    record_quota: Option<u64>,
) -> Result<WorkerReport, RunError> {
    let query = File::open(&cfg.query).map_err(|source| RunError::OpenQuery {
        path: cfg.query.clone(),
        source,
    })?;
    let out = File::create(&out_path).map_err(|source| RunError::CreateOutput {
        path: out_path.clone(),
        source,
    })?;
    let writer = BufWriter::with_capacity(STREAM_BUF_BYTES, out);

    let mut selector = Selector::new(
        cfg.annot,
        cfg.lengths.clone(),
        hits,
        cfg.byte_limit,
        record_quota,
        writer,
    );

    let mut error = scan::scan_partition(&query, part, window_bytes, &mut selector, cfg.verbosity)
        .err();

    let (mut writer, stats, seen) = selector.into_parts();
    if let Err(err) = writer.flush() {
        if error.is_none() {
            error = Some(ScanError::Write(err));
        }
    }
    drop(writer);

    if stats.bytes_written == 0 {
        if cfg.verbosity.verbose() {
            eprintln!("removing empty output file {}", out_path.display());
        }
        let _ = fs::remove_file(&out_path);
    }

    Ok(WorkerReport {
        rank,
        stats,
        seen,
        error,
    })
}

/// Writes the IDs whose summed seen-count is zero, one per line, removing
/// the report when every hit was found. Returns the not-found count.
fn write_not_found(output: &Path, hits: &HitList, totals: &[u64]) -> io::Result<u64> {
    let path = not_found_path(output);
    let file = File::create(&path)?;
    let mut writer = BufWriter::with_capacity(STREAM_BUF_BYTES, file);

    let mut missing = 0u64;
    for (i, total) in totals.iter().enumerate() {
        if *total == 0 {
            writer.write_all(hits.id(i))?;
            writer.write_all(b"\n")?;
            missing += 1;
        }
    }
    writer.flush()?;
    drop(writer);

    if missing == 0 {
        fs::remove_file(&path)?;
    }
    Ok(missing)
}

/// Concatenates per-rank outputs, in rank order, into the configured
/// output path. Ranks that removed their empty file contribute nothing.
#[cfg(feature = "combine-output")]
fn combine_outputs(cfg: &Config, pool: usize, total_bytes: u64) -> io::Result<()> {
    if total_bytes == 0 {
        eprintln!("warning: no output produced, skipping combined file");
        return Ok(());
    }

    let combined = File::create(&cfg.output)?;
    combined.set_len(total_bytes)?;
    let mut writer = BufWriter::with_capacity(STREAM_BUF_BYTES, combined);

    let mut buf = vec![0u8; STREAM_BUF_BYTES];
    for rank in 0..pool {
        let path = rank_output(&cfg.output, pool, rank);
        let mut part = match File::open(&path) {
            Ok(file) => file,
            // An empty rank removed its file at teardown.
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err),
        };
        let len = part.metadata()?.len();
        mapio::advise_file_range(&part, 0, len);

        use std::io::Read;
        loop {
            let n = part.read(&mut buf)?;
            if n == 0 {
                break;
            }
            writer.write_all(&buf[..n])?;
        }
    }
    writer.flush()
}
