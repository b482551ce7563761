//! Partition-plan invariants over arbitrary record shapes.
//!
//! For any synthetic FASTA input and any requested worker count, the plan
//! must cover the file exactly once with contiguous, page-aligned,
//! record-aligned ranges — or shrink the pool until it can.

use proptest::prelude::*;

use filterfasta::partition;

const PAGE: u64 = 4096;

/// Synthetic records: ASCII headers plus single-letter bodies of arbitrary
/// length, newline-wrapped every 61 bytes.
fn fasta_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec((0usize..3000, 0u8..4), 1..40).prop_map(|records| {
        let mut out = Vec::new();
        for (i, (body_len, base)) in records.into_iter().enumerate() {
            out.extend_from_slice(format!(">id{i}|gen\n").as_bytes());
            let body_len = body_len.max(1);
            let letter = b"ACGT"[base as usize];
            for chunk in 0..body_len.div_ceil(60) {
                let take = 60.min(body_len - chunk * 60);
                out.extend(std::iter::repeat(letter).take(take));
                out.push(b'\n');
            }
        }
        out
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn plans_cover_the_file_exactly_once(
        data in fasta_strategy(),
        workers in 1usize..9,
    ) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, &data).unwrap();
        let handle = file.reopen().unwrap();

        let plan = partition::plan(&handle, data.len() as u64, workers, PAGE).unwrap();
        prop_assert!(plan.workers() >= 1);
        prop_assert!(plan.workers() <= workers);

        let mut prev_end = 0u64;
        let mut covered = 0u64;
        for (i, part) in plan.iter().enumerate() {
            prop_assert_eq!(part.page_offset % PAGE, 0);
            prop_assert_eq!(part.start(), prev_end);
            prop_assert!(part.len > 0);
            if i > 0 {
                let at = part.start() as usize;
                prop_assert_eq!(data[at], b'>');
                prop_assert_eq!(data[at - 1], b'\n');
            }
            covered += part.len;
            prev_end = part.end();
        }
        prop_assert_eq!(covered, data.len() as u64);
    }
}
