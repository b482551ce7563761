//! The set of records a scan emits must not depend on the scan-window
//! size: splitting a partition into more, smaller windows only changes how
//! records are reassembled, never what is written.

use proptest::prelude::*;

use filterfasta::config::{AnnotMode, LengthFilter, Verbosity};
use filterfasta::mapio;
use filterfasta::partition::Partition;
use filterfasta::scan;
use filterfasta::select::Selector;

/// Records sized so that any of them can straddle a one-page window
/// boundary but none outgrows a single window.
fn fasta_strategy() -> impl Strategy<Value = Vec<u8>> {
    let max_body = mapio::page_size() as usize / 2;
    prop::collection::vec(1usize..max_body, 1..30).prop_map(|bodies| {
        let mut out = Vec::new();
        for (i, body_len) in bodies.into_iter().enumerate() {
            out.extend_from_slice(format!(">rec{i}|p|q\n").as_bytes());
            for chunk in 0..body_len.div_ceil(60) {
                let take = 60.min(body_len - chunk * 60);
                out.extend(std::iter::repeat(b'A').take(take));
                out.push(b'\n');
            }
        }
        out
    })
}

fn scan_with_window(data: &[u8], window: u64) -> Vec<u8> {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(&mut file, data).unwrap();
    let handle = file.reopen().unwrap();

    let mut selector = Selector::new(
        AnnotMode::All,
        LengthFilter::default(),
        None,
        u64::MAX,
        None,
        Vec::new(),
    );
    let part = Partition {
        page_offset: 0,
        skew: 0,
        len: data.len() as u64,
    };
    scan::scan_partition(&handle, part, window, &mut selector, Verbosity::Quiet).unwrap();
    selector.into_parts().0
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn emitted_bytes_are_window_size_invariant(data in fasta_strategy()) {
        let page = mapio::page_size();

        let one_page = scan_with_window(&data, page);
        let two_pages = scan_with_window(&data, page * 2);
        let whole = scan_with_window(&data, page * 1024);

        prop_assert_eq!(&one_page, &data);
        prop_assert_eq!(&two_pages, &data);
        prop_assert_eq!(&whole, &data);
    }
}
