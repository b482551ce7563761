//! Chunked mapped scan of one partition.
//!
//! The partition is walked in page-aligned *scan windows* of at most the
//! configured window size. Window `k` maps
//! `[page_offset + k·W, page_offset + k·W + skew + win_len)`, so its
//! meaningful bytes start at map offset `skew` and line up exactly with
//! where window `k − 1` stopped.
//!
//! Records that straddle a window boundary are reassembled in a small
//! owned *carry buffer*:
//!
//! - *end trim* (every window but the last): the window's logical region is
//!   cut back to the last record start it contains; the tail — the head of
//!   a possibly-straddling record — is copied into the carry buffer.
//! - *begin adjust* (every window but the first): bytes before the
//!   window's first record start belong to the carried record and are
//!   appended to it; the reassembled record is then scanned from the carry
//!   buffer before the window's own records.
//!
//! One record may straddle at most two windows; a window with no record
//! start at all (other than the final window, whose entire contents may be
//! the carried record's tail) means a record outgrew the window size and
//! the scan fails.
//!
//! Each window is advised for sequential access and imminent use, locked in
//! memory on a best-effort basis, and unmapped before the next window is
//! mapped.

use std::fmt;
use std::fs::File;
use std::io::{self, Write};

use crate::config::Verbosity;
use crate::fasta::{self, RecordError, Records};
use crate::mapio;
use crate::partition::Partition;
use crate::select::{Flow, Selector};

/// Default scan-window ceiling: 256 MiB.
pub const DEFAULT_WINDOW_BYTES: u64 = 1 << 28;

/// Normalizes a requested window size against the page size: anything
/// smaller than a page or off a page multiple falls back to 1024 pages.
pub fn effective_window(window_bytes: u64, page_size: u64) -> u64 {
    if window_bytes < page_size || window_bytes % page_size != 0 {
        page_size * 1024
    } else {
        window_bytes
    }
}

/// Errors that abort one worker's scan.
#[derive(Debug)]
#[non_exhaustive]
pub enum ScanError {
    /// Mapping a scan window failed.
    Map(io::Error),
    /// Writing an accepted record failed.
    Write(io::Error),
    /// A malformed record was encountered.
    Record(RecordError),
    /// A record continued across more than two scan windows.
    RecordSpansWindows,
    /// A window contained no record start at all.
    MissingRecordStart,
}

impl fmt::Display for ScanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScanError::Map(err) => write!(f, "failed to map scan window: {err}"),
            ScanError::Write(err) => write!(f, "failed to write output: {err}"),
            ScanError::Record(err) => write!(f, "{err}"),
            ScanError::RecordSpansWindows => {
                write!(f, "record larger than the scan window")
            }
            ScanError::MissingRecordStart => {
                write!(f, "no record start found in scan window")
            }
        }
    }
}

impl std::error::Error for ScanError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ScanError::Map(err) | ScanError::Write(err) => Some(err),
            ScanError::Record(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RecordError> for ScanError {
    fn from(err: RecordError) -> Self {
        ScanError::Record(err)
    }
}

/// Scans one partition window by window, feeding every record to the
/// selector. Returns early (successfully) when the selector reports a
/// satisfied budget or quota.
pub fn scan_partition<W: Write>(
    file: &File,
    part: Partition,
    window_bytes: u64,
    selector: &mut Selector<'_, W>,
    verbosity: Verbosity,
) -> Result<(), ScanError> {
    debug_assert!(window_bytes > 0);
    let windows = part.len.div_ceil(window_bytes);
    let mut carry: Vec<u8> = Vec::new();

    for k in 0..windows {
        let win_off = k * window_bytes;
        let win_len = window_bytes.min(part.len - win_off);
        let map_off = part.page_offset + win_off;
        let map_len = (part.skew + win_len) as usize;

        if verbosity.verbose() {
            eprintln!(
                "processing window {} of {} ({} bytes)",
                k + 1,
                windows,
                win_len
            );
        }

        mapio::advise_file_range(file, map_off, map_len as u64);
        let map = mapio::map_window(file, map_off, map_len).map_err(ScanError::Map)?;
        mapio::advise_map(&map);
        if !mapio::lock_map(&map) {
            eprintln!("warning: failed to lock scan window in memory");
        }

        let mut region: &[u8] = &map[part.skew as usize..];

        if k > 0 {
            match fasta::first_record_start(region) {
                Some(p) => {
                    carry.extend_from_slice(&region[..p]);
                    region = &region[p..];
                }
                None if k + 1 == windows => {
                    // The carried record runs to the end of the partition.
                    carry.extend_from_slice(region);
                    region = &[];
                }
                None => return Err(ScanError::RecordSpansWindows),
            }
            if verbosity.trace() {
                eprintln!("reassembled {} carried bytes", carry.len());
            }
            if drive(&carry, selector)? == Flow::Done {
                return Ok(());
            }
            carry.clear();
        }

        if k + 1 < windows && !region.is_empty() {
            match fasta::last_record_start(region) {
                Some(p) => {
                    carry.extend_from_slice(&region[p..]);
                    region = &region[..p];
                }
                None => return Err(ScanError::MissingRecordStart),
            }
        }

        if !region.is_empty() && drive(region, selector)? == Flow::Done {
            return Ok(());
        }
        // `map` unmaps here, before the next window is created.
    }

    Ok(())
}

/// Feeds every record of one contiguous region to the selector.
fn drive<W: Write>(region: &[u8], selector: &mut Selector<'_, W>) -> Result<Flow, ScanError> {
    for item in Records::new(region) {
        if selector.quota_reached() {
            return Ok(Flow::Done);
        }
        let record = item?;
        if selector.offer(&record).map_err(ScanError::Write)? == Flow::Done {
            return Ok(Flow::Done);
        }
    }
    Ok(Flow::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnnotMode, LengthFilter};
    use std::io::Write as _;

    fn temp_fasta(contents: &[u8]) -> (tempfile::NamedTempFile, File) {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents).unwrap();
        let file = f.reopen().unwrap();
        (f, file)
    }

    fn whole_file(len: u64) -> Partition {
        Partition {
            page_offset: 0,
            skew: 0,
            len,
        }
    }

    fn passthrough(
        file: &File,
        part: Partition,
        window_bytes: u64,
    ) -> Result<Vec<u8>, ScanError> {
        let mut selector = Selector::new(
            AnnotMode::All,
            LengthFilter::default(),
            None,
            u64::MAX,
            None,
            Vec::new(),
        );
        scan_partition(file, part, window_bytes, &mut selector, Verbosity::Quiet)?;
        let (out, ..) = selector.into_parts();
        Ok(out)
    }

    /// Records big enough that a one-page window puts boundaries inside
    /// headers and bodies alike.
    fn chunky_fasta(records: usize, body_len: usize) -> Vec<u8> {
        let mut out = Vec::new();
        for i in 0..records {
            out.extend_from_slice(format!(">record{i}|first|second\n").as_bytes());
            for line in 0..body_len.div_ceil(70) {
                let take = 70.min(body_len - line * 70);
                out.extend(std::iter::repeat(b"ACGT"[i % 4]).take(take));
                out.push(b'\n');
            }
        }
        out
    }

    #[test]
    fn single_window_passes_records_through() {
        let data = b">r1\nACGT\n>r2\nGG\nTT\n";
        let (_guard, file) = temp_fasta(data);
        let page = mapio::page_size();
        let out = passthrough(&file, whole_file(data.len() as u64), page).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn output_is_invariant_to_window_size() {
        let page = mapio::page_size();
        let data = chunky_fasta(9, page as usize * 3 / 2);
        let (_guard, file) = temp_fasta(&data);

        let one_page = passthrough(&file, whole_file(data.len() as u64), page).unwrap();
        let four_pages =
            passthrough(&file, whole_file(data.len() as u64), page * 4).unwrap();
        let one_window =
            passthrough(&file, whole_file(data.len() as u64), page * 1024).unwrap();

        assert_eq!(one_page, data);
        assert_eq!(four_pages, data);
        assert_eq!(one_window, data);
    }

    #[test]
    fn final_window_may_be_all_carry() {
        // Last record's body runs from window 0 into the whole of window 1.
        let page = mapio::page_size() as usize;
        let mut data = Vec::new();
        data.extend_from_slice(b">head|x\n");
        while data.len() < 2 * page - 1 {
            data.extend_from_slice(b"ACGTACGTAC\n");
        }
        data.truncate(2 * page - 1);
        data.push(b'\n');
        let (_guard, file) = temp_fasta(&data);

        let out = passthrough(&file, whole_file(data.len() as u64), page as u64).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn record_spanning_three_windows_is_an_error() {
        let page = mapio::page_size() as usize;
        let mut data = Vec::new();
        data.extend_from_slice(b">huge\n");
        while data.len() < 3 * page {
            data.extend_from_slice(b"AAAAAAAAAA\n");
        }
        data.extend_from_slice(b">tail\nACGT\n");
        let (_guard, file) = temp_fasta(&data);

        match passthrough(&file, whole_file(data.len() as u64), page as u64) {
            Err(ScanError::RecordSpansWindows) => {}
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn skewed_partition_scans_from_its_first_record() {
        // Build a file whose second record starts mid-page, then scan only
        // the partition covering it.
        let page = mapio::page_size();
        let mut data = Vec::new();
        data.extend_from_slice(b">first\n");
        while data.len() < page as usize + 100 {
            data.extend_from_slice(b"CCCCCCCCC\n");
        }
        let second_start = data.len() as u64;
        data.extend_from_slice(b">second\nACGT\n");
        let (_guard, file) = temp_fasta(&data);

        let part = Partition {
            page_offset: (second_start / page) * page,
            skew: second_start % page,
            len: data.len() as u64 - second_start,
        };
        let out = passthrough(&file, part, page * 1024).unwrap();
        assert_eq!(out, b">second\nACGT\n");
    }

    #[test]
    fn effective_window_rounds_to_pages() {
        assert_eq!(effective_window(8192, 4096), 8192);
        assert_eq!(effective_window(4096, 4096), 4096);
        assert_eq!(effective_window(5000, 4096), 4096 * 1024);
        assert_eq!(effective_window(0, 4096), 4096 * 1024);
        assert_eq!(effective_window(DEFAULT_WINDOW_BYTES, 4096), DEFAULT_WINDOW_BYTES);
    }
}
