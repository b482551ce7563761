//! Byte-level FASTA primitives.
//!
//! A record is a header line (leading `>`, terminated by `\n`) followed by
//! one or more body lines. Everything here operates on plain byte slices:
//! the scanner hands regions of a memory map (or a carry buffer) to
//! [`Records`], and each yielded [`Record`] borrows from that region.
//!
//! No format validation is performed beyond what parsing requires. Any byte
//! other than `>` is body data; a `>` anywhere terminates the current body.

use memchr::{memchr, memchr_iter, memrchr};

use std::fmt;

/// Byte that starts a record header.
pub const RECORD_START: u8 = b'>';
/// Header field delimiter: vertical bar.
pub const FIELD_SEP: u8 = b'|';
/// Header field delimiter that also joins alternative headers for one
/// record: SOH (0x01).
pub const ALT_SEP: u8 = 0x01;

/// Offset of the first record start in `hay`, if any.
#[inline]
pub fn first_record_start(hay: &[u8]) -> Option<usize> {
    memchr(RECORD_START, hay)
}

/// Offset of the last record start in `hay`, if any.
#[inline]
pub fn last_record_start(hay: &[u8]) -> Option<usize> {
    memrchr(RECORD_START, hay)
}

/// Logical sequence length of a body: bytes that are not line terminators.
pub fn sequence_len(body: &[u8]) -> u64 {
    let newlines = memchr_iter(b'\n', body).count();
    (body.len() - newlines) as u64
}

/// Offsets just past each SOH delimiter in a header, i.e. the start of each
/// alternative header chained onto the record.
pub fn alt_header_starts(header: &[u8]) -> impl Iterator<Item = usize> + '_ {
    memchr_iter(ALT_SEP, header).map(|p| p + 1)
}

/// Number of leading bytes of `rest` (a header with the `>` already
/// stripped) that cover the first `fields` annotation fields.
///
/// Returns the offset of the delimiter ending the last requested field, or
/// the full length when the header has fewer fields than requested.
pub fn annot_prefix_len(rest: &[u8], fields: u32) -> usize {
    debug_assert!(fields > 0);
    let mut remaining = fields;
    for (i, &b) in rest.iter().enumerate() {
        if b == FIELD_SEP || b == ALT_SEP {
            remaining -= 1;
            if remaining == 0 {
                return i;
            }
        }
    }
    rest.len()
}

/// One parsed record, borrowing from the scanned region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Record<'a> {
    /// Header line including the leading `>`, excluding the terminating
    /// `\n`.
    pub header: &'a [u8],
    /// Body bytes from just after the header's `\n` up to (not including)
    /// the next record start or the region end. Internal and trailing line
    /// terminators are kept.
    pub body: &'a [u8],
}

impl Record<'_> {
    /// Logical sequence length (body bytes minus line terminators).
    pub fn sequence_len(&self) -> u64 {
        sequence_len(self.body)
    }
}

/// Malformed-record conditions surfaced while iterating a region.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum RecordError {
    /// A header ran to the end of its region without a terminating `\n`.
    UnterminatedHeader,
    /// A record had no sequence bytes at all.
    EmptySequence,
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::UnterminatedHeader => {
                write!(f, "record header has no terminating newline")
            }
            RecordError::EmptySequence => write!(f, "record has no sequence data"),
        }
    }
}

impl std::error::Error for RecordError {}

/// Iterator over the records of one contiguous region.
///
/// Bytes before the first `>` are skipped; the scanner arranges regions so
/// that they normally begin at a record start.
pub struct Records<'a> {
    region: &'a [u8],
    pos: usize,
}

impl<'a> Records<'a> {
    pub fn new(region: &'a [u8]) -> Self {
        Self { region, pos: 0 }
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<Record<'a>, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.pos + first_record_start(&self.region[self.pos..])?;
        let rest = &self.region[start..];

        let header_end = match memchr(b'\n', rest) {
            Some(n) => n,
            None => {
                self.pos = self.region.len();
                return Some(Err(RecordError::UnterminatedHeader));
            }
        };

        let body_start = header_end + 1;
        let body_end = match memchr(RECORD_START, &rest[body_start..]) {
            Some(n) => body_start + n,
            None => rest.len(),
        };

        let record = Record {
            header: &rest[..header_end],
            body: &rest[body_start..body_end],
        };
        self.pos = start + body_end;

        if sequence_len(record.body) == 0 {
            return Some(Err(RecordError::EmptySequence));
        }
        Some(Ok(record))
    }
}
