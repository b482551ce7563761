//! Record selection and output emission.
//!
//! A [`Selector`] owns one worker's output stream and all per-worker
//! accounting: extracted-record and written-byte counters, the per-worker
//! byte budget, the optional record quota, and (in lookup mode) the
//! seen-counter vector parallel to the hit list.
//!
//! The byte cost of a record is computed exactly, under the active
//! annotation policy, *before* anything is written: a record that would
//! push the worker past its byte budget ends the scan with nothing emitted
//! for it. Partial records never reach the output.

use std::io::{self, Write};

use crate::config::{AnnotMode, LengthFilter};
use crate::fasta::{alt_header_starts, annot_prefix_len, Record};
use crate::hits::HitList;

/// Control flow signal from the selector back to the scan loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Keep scanning.
    Continue,
    /// A budget or quota is exhausted; stop the scan cleanly.
    Done,
}

/// Per-worker extraction counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct SelectStats {
    /// Records written in full.
    pub records_extracted: u64,
    /// Bytes written, accumulated toward the byte budget.
    pub bytes_written: u64,
}

enum Decision {
    Skip,
    /// Emit the record. For a lookup match on an SOH-joined alternative
    /// header, `alt` is the offset of that alternative within the header.
    Emit { alt: Option<usize> },
}

/// Applies the active predicate to records and writes accepted ones.
pub struct Selector<'h, W> {
    annot: AnnotMode,
    lengths: LengthFilter,
    hits: Option<&'h HitList>,
    seen: Vec<u64>,
    /// Hit IDs with a nonzero seen-count so far.
    hits_found: u64,
    byte_limit: u64,
    record_quota: Option<u64>,
    out: W,
    stats: SelectStats,
}

impl<'h, W: Write> Selector<'h, W> {
    /// Builds a selector for one worker.
    ///
    /// `hits` switches the predicate to lookup mode; otherwise the length
    /// filter applies (an empty filter accepts everything).
    /// `record_quota` is enforced only when given; the coordinator passes
    /// it in single-worker runs. The same flag arms the lookup-mode early
    /// stop, taken once every hit ID has matched at least one record.
    pub fn new(
        annot: AnnotMode,
        lengths: LengthFilter,
        hits: Option<&'h HitList>,
        byte_limit: u64,
        record_quota: Option<u64>,
        out: W,
    ) -> Self {
        let seen = hits.map(HitList::new_counters).unwrap_or_default();
        Self {
            annot,
            lengths,
            hits,
            seen,
            hits_found: 0,
            byte_limit,
            record_quota,
            out,
            stats: SelectStats::default(),
        }
    }

    /// True once a quota (when enforced) has been met: the record ceiling,
    /// or, in lookup mode, every hit ID having matched a record.
    pub fn quota_reached(&self) -> bool {
        let Some(quota) = self.record_quota else {
            return false;
        };
        if self.stats.records_extracted >= quota {
            return true;
        }
        match self.hits {
            Some(hits) => self.hits_found >= hits.len() as u64,
            None => false,
        }
    }

    /// Current counters.
    pub fn stats(&self) -> SelectStats {
        self.stats
    }

    /// Offers one record; writes it if the predicate accepts and it fits
    /// the byte budget.
    pub fn offer(&mut self, rec: &Record<'_>) -> io::Result<Flow> {
        let alt = match self.evaluate(rec) {
            Decision::Skip => return Ok(Flow::Continue),
            Decision::Emit { alt } => alt,
        };

        let body = rec.body;
        let cost = match self.annot {
            AnnotMode::All => {
                let cost = rec.header.len() as u64 + 1 + body.len() as u64;
                if self.overflows(cost) {
                    return Ok(Flow::Done);
                }
                self.out.write_all(rec.header)?;
                self.out.write_all(b"\n")?;
                self.out.write_all(body)?;
                cost
            }
            AnnotMode::SequenceOnly => {
                let cost = body.len() as u64;
                if self.overflows(cost) {
                    return Ok(Flow::Done);
                }
                self.out.write_all(body)?;
                cost
            }
            AnnotMode::Fields { count, with_body } => {
                // Header bytes after the logical `>`: a matched alternative
                // replaces the original header from its SOH onward.
                let rest = match alt {
                    Some(p) => &rec.header[p..],
                    None => &rec.header[1..],
                };
                let keep = annot_prefix_len(rest, count);
                if with_body {
                    let cost = 1 + keep as u64 + 1 + body.len() as u64;
                    if self.overflows(cost) {
                        return Ok(Flow::Done);
                    }
                    self.out.write_all(b">")?;
                    self.out.write_all(&rest[..keep])?;
                    self.out.write_all(b"\n")?;
                    self.out.write_all(body)?;
                    cost
                } else {
                    let cost = 1 + keep as u64;
                    if self.overflows(cost) {
                        return Ok(Flow::Done);
                    }
                    self.out.write_all(&rest[..keep])?;
                    self.out.write_all(b"\n")?;
                    cost
                }
            }
        };

        self.stats.records_extracted = self.stats.records_extracted.saturating_add(1);
        self.stats.bytes_written = self.stats.bytes_written.saturating_add(cost);
        Ok(Flow::Continue)
    }

    /// Tears the selector down, returning the stream, the counters, and the
    /// seen-counter vector for reduction.
    pub fn into_parts(self) -> (W, SelectStats, Vec<u64>) {
        (self.out, self.stats, self.seen)
    }

    fn overflows(&self, cost: u64) -> bool {
        self.stats.bytes_written.saturating_add(cost) > self.byte_limit
    }

    /// Bumps a hit's seen-count, tracking the first time it is matched.
    fn mark_seen(&mut self, i: usize) {
        if self.seen[i] == 0 {
            self.hits_found += 1;
        }
        self.seen[i] += 1;
    }

    fn evaluate(&mut self, rec: &Record<'_>) -> Decision {
        let Some(hits) = self.hits else {
            // Filter mode: no configured lengths accepts every record.
            if self.lengths.is_empty() || self.lengths.accepts(rec.sequence_len()) {
                return Decision::Emit { alt: None };
            }
            return Decision::Skip;
        };

        // Lookup mode. Every hit matching any of the record's header IDs
        // gets its seen-count bumped; the first match (hit-list order)
        // decides acceptance and which alternative leads the output header.
        let primary = &rec.header[1..];
        let mut selected: Option<Option<usize>> = None;
        for (i, id) in hits.iter().enumerate() {
            if primary.starts_with(id) {
                self.mark_seen(i);
                if selected.is_none() {
                    selected = Some(None);
                }
                continue;
            }
            for p in alt_header_starts(rec.header) {
                if rec.header[p..].starts_with(id) {
                    self.mark_seen(i);
                    if selected.is_none() {
                        selected = Some(Some(p));
                    }
                    break;
                }
            }
        }

        match selected {
            // The alternative rewrite only applies under a trimming policy;
            // ALL and sequence-only emit the record untouched.
            Some(alt) => Decision::Emit {
                alt: alt.filter(|_| matches!(self.annot, AnnotMode::Fields { .. })),
            },
            None => Decision::Skip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fasta::Records;
    use std::io::Write as _;

    fn record(region: &[u8]) -> Record<'_> {
        Records::new(region).next().unwrap().unwrap()
    }

    fn hit_list(lines: &[u8]) -> HitList {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(lines).unwrap();
        HitList::from_id_list(f.path()).unwrap()
    }

    fn no_hits() -> Option<&'static HitList> {
        None
    }

    #[test]
    fn all_mode_copies_the_record_verbatim() {
        let region = b">r1|alpha\nAC\nGT\n";
        let mut sel = Selector::new(
            AnnotMode::All,
            LengthFilter::default(),
            no_hits(),
            u64::MAX,
            None,
            Vec::new(),
        );
        assert_eq!(sel.offer(&record(region)).unwrap(), Flow::Continue);
        let (out, stats, _) = sel.into_parts();
        assert_eq!(out, region);
        assert_eq!(stats.records_extracted, 1);
        assert_eq!(stats.bytes_written, region.len() as u64);
    }

    #[test]
    fn sequence_only_strips_the_header() {
        let mut sel = Selector::new(
            AnnotMode::SequenceOnly,
            LengthFilter::default(),
            no_hits(),
            u64::MAX,
            None,
            Vec::new(),
        );
        sel.offer(&record(b">r1\nACGT\n")).unwrap();
        let (out, ..) = sel.into_parts();
        assert_eq!(out, b"ACGT\n");
    }

    #[test]
    fn field_trimming_keeps_the_requested_prefix() {
        let region = b">a|x|y\nAC\n";
        let mut sel = Selector::new(
            AnnotMode::Fields {
                count: 1,
                with_body: true,
            },
            LengthFilter::default(),
            no_hits(),
            u64::MAX,
            None,
            Vec::new(),
        );
        sel.offer(&record(region)).unwrap();
        let (out, stats, _) = sel.into_parts();
        assert_eq!(out, b">a\nAC\n");
        assert_eq!(stats.bytes_written, 6);
    }

    #[test]
    fn field_trimming_without_body_drops_the_marker() {
        let region = b">a|x|y\nAC\n";
        let mut sel = Selector::new(
            AnnotMode::Fields {
                count: 2,
                with_body: false,
            },
            LengthFilter::default(),
            no_hits(),
            u64::MAX,
            None,
            Vec::new(),
        );
        sel.offer(&record(region)).unwrap();
        let (out, stats, _) = sel.into_parts();
        assert_eq!(out, b"a|x\n");
        assert_eq!(stats.bytes_written, 4);
    }

    #[test]
    fn oversized_field_count_falls_back_to_the_full_header() {
        let region = b">a|x\nAC\n";
        let mut sel = Selector::new(
            AnnotMode::Fields {
                count: 7,
                with_body: true,
            },
            LengthFilter::default(),
            no_hits(),
            u64::MAX,
            None,
            Vec::new(),
        );
        sel.offer(&record(region)).unwrap();
        let (out, ..) = sel.into_parts();
        assert_eq!(out, region);
    }

    #[test]
    fn length_filter_gates_records() {
        let mut lengths = LengthFilter::default();
        lengths.push_exact(4);
        let mut sel = Selector::new(
            AnnotMode::All,
            lengths,
            no_hits(),
            u64::MAX,
            None,
            Vec::new(),
        );
        assert_eq!(sel.offer(&record(b">a\nACGT\n")).unwrap(), Flow::Continue);
        assert_eq!(sel.offer(&record(b">b\nACG\n")).unwrap(), Flow::Continue);
        let (out, stats, _) = sel.into_parts();
        assert_eq!(out, b">a\nACGT\n");
        assert_eq!(stats.records_extracted, 1);
    }

    #[test]
    fn byte_budget_stops_before_a_partial_record() {
        let mut sel = Selector::new(
            AnnotMode::All,
            LengthFilter::default(),
            no_hits(),
            10,
            None,
            Vec::new(),
        );
        assert_eq!(sel.offer(&record(b">a\nACGT\n")).unwrap(), Flow::Continue);
        assert_eq!(sel.offer(&record(b">b\nGGGG\n")).unwrap(), Flow::Done);
        let (out, stats, _) = sel.into_parts();
        assert_eq!(out, b">a\nACGT\n");
        assert_eq!(stats.bytes_written, 8);
        assert_eq!(stats.records_extracted, 1);
    }

    #[test]
    fn record_quota_is_observed() {
        let mut sel = Selector::new(
            AnnotMode::All,
            LengthFilter::default(),
            no_hits(),
            u64::MAX,
            Some(1),
            Vec::new(),
        );
        assert!(!sel.quota_reached());
        sel.offer(&record(b">a\nAC\n")).unwrap();
        assert!(sel.quota_reached());
    }

    #[test]
    fn lookup_matches_primary_ids_by_prefix() {
        let hits = hit_list(b"h1\nh9\n");
        let mut sel = Selector::new(
            AnnotMode::All,
            LengthFilter::default(),
            Some(&hits),
            u64::MAX,
            None,
            Vec::new(),
        );
        sel.offer(&record(b">h1|foo\nAC\n")).unwrap();
        sel.offer(&record(b">zz|bar\nGG\n")).unwrap();
        let (out, stats, seen) = sel.into_parts();
        assert_eq!(out, b">h1|foo\nAC\n");
        assert_eq!(stats.records_extracted, 1);
        assert_eq!(seen, vec![1, 0]);
    }

    #[test]
    fn lookup_rewrites_matched_alternative_under_trimming() {
        let hits = hit_list(b"h2\n");
        let mut sel = Selector::new(
            AnnotMode::Fields {
                count: 1,
                with_body: true,
            },
            LengthFilter::default(),
            Some(&hits),
            u64::MAX,
            None,
            Vec::new(),
        );
        sel.offer(&record(b">z|foo\x01h2|bar\nACGT\n")).unwrap();
        let (out, _, seen) = sel.into_parts();
        assert_eq!(out, b">h2\nACGT\n");
        assert_eq!(seen, vec![1]);
    }

    #[test]
    fn lookup_without_trimming_keeps_the_original_header() {
        let hits = hit_list(b"h2\n");
        let mut sel = Selector::new(
            AnnotMode::All,
            LengthFilter::default(),
            Some(&hits),
            u64::MAX,
            None,
            Vec::new(),
        );
        sel.offer(&record(b">z|foo\x01h2|bar\nACGT\n")).unwrap();
        let (out, ..) = sel.into_parts();
        assert_eq!(out, b">z|foo\x01h2|bar\nACGT\n");
    }

    #[test]
    fn lookup_early_stop_waits_for_every_distinct_hit() {
        let hits = hit_list(b"h1\nh2\n");
        let mut sel = Selector::new(
            AnnotMode::All,
            LengthFilter::default(),
            Some(&hits),
            u64::MAX,
            Some(u64::MAX),
            Vec::new(),
        );
        sel.offer(&record(b">h1|a\nAC\n")).unwrap();
        assert!(!sel.quota_reached());
        // A second h1 match raises the record count past the hit-list
        // length but finds nothing new.
        sel.offer(&record(b">h1|b\nGG\n")).unwrap();
        assert!(!sel.quota_reached());
        sel.offer(&record(b">h2|c\nTT\n")).unwrap();
        assert!(sel.quota_reached());
        let (_, stats, seen) = sel.into_parts();
        assert_eq!(stats.records_extracted, 3);
        assert_eq!(seen, vec![2, 1]);
    }

    #[test]
    fn every_matching_hit_is_counted_once_per_record() {
        let hits = hit_list(b"h1\nh2\n");
        let mut sel = Selector::new(
            AnnotMode::All,
            LengthFilter::default(),
            Some(&hits),
            u64::MAX,
            None,
            Vec::new(),
        );
        // Primary matches h1, an alternative matches h2.
        sel.offer(&record(b">h1|foo\x01h2|bar\nAC\n")).unwrap();
        let (_, stats, seen) = sel.into_parts();
        assert_eq!(stats.records_extracted, 1);
        assert_eq!(seen, vec![1, 1]);
    }
}
