//! Byte budgets are hard ceilings: a worker never writes more than its
//! budget, never writes a partial record, and its byte counter matches the
//! bytes that actually reached the output.

use proptest::prelude::*;

use filterfasta::config::{AnnotMode, LengthFilter};
use filterfasta::fasta::Records;
use filterfasta::select::{Flow, Selector};

fn fasta_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(1usize..120, 1..25).prop_map(|bodies| {
        let mut out = Vec::new();
        for (i, body_len) in bodies.into_iter().enumerate() {
            out.extend_from_slice(format!(">s{i}|a|b\n").as_bytes());
            out.extend(std::iter::repeat(b'G').take(body_len));
            out.push(b'\n');
        }
        out
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn bytes_written_never_exceed_the_budget(
        data in fasta_strategy(),
        budget in 0u64..600,
    ) {
        let mut selector = Selector::new(
            AnnotMode::All,
            LengthFilter::default(),
            None,
            budget,
            None,
            Vec::new(),
        );

        for item in Records::new(&data) {
            let record = item.unwrap();
            if selector.offer(&record).unwrap() == Flow::Done {
                break;
            }
        }

        let (out, stats, _) = selector.into_parts();
        prop_assert!(stats.bytes_written <= budget);
        prop_assert_eq!(out.len() as u64, stats.bytes_written);
        // Emitted bytes are a prefix of the input: whole leading records.
        prop_assert_eq!(&out[..], &data[..out.len()]);
    }
}
