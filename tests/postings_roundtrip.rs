//! Property test for the universal postings round-trip guarantee: `decode(encode(S)) == S`
//! for arbitrary row-id sets, across all three physical encodings.

use gin_index::postings::{self, PostingsBuilder, ARRAY_THRESHOLD, COMPRESS_THRESHOLD};
use gin_index::storage::ZstdCodec;
use proptest::prelude::*;

fn arb_rowid_set(max_len: usize) -> impl Strategy<Value = Vec<u32>> {
    proptest::collection::vec(0u32..=u32::MAX, 0..=max_len)
}

proptest! {
    #[test]
    fn array_encoding_round_trips(vals in arb_rowid_set(ARRAY_THRESHOLD as usize - 1)) {
        let mut builder = PostingsBuilder::new();
        for &v in &vals {
            builder.add(v);
        }
        let codec = ZstdCodec;
        let mut buf = Vec::new();
        builder.encode(&mut buf, &codec).unwrap();

        let mut cursor = &buf[..];
        let decoded = postings::decode(&mut cursor, &codec).unwrap();

        let mut expected: Vec<u32> = vals.clone();
        expected.sort_unstable();
        expected.dedup();
        let mut got: Vec<u32> = decoded.iter().collect();
        got.sort_unstable();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn roaring_encoding_round_trips(vals in arb_rowid_set(300)) {
        // Pad past ARRAY_THRESHOLD so every run exercises the roaring path.
        let mut builder = PostingsBuilder::new();
        for v in 0..ARRAY_THRESHOLD as u32 {
            builder.add(v);
        }
        for &v in &vals {
            builder.add(v);
        }
        let codec = ZstdCodec;
        let mut buf = Vec::new();
        builder.encode(&mut buf, &codec).unwrap();

        let mut cursor = &buf[..];
        let decoded = postings::decode(&mut cursor, &codec).unwrap();

        let mut expected: Vec<u32> = (0..ARRAY_THRESHOLD as u32).chain(vals.clone()).collect();
        expected.sort_unstable();
        expected.dedup();
        let mut got: Vec<u32> = decoded.iter().collect();
        got.sort_unstable();
        prop_assert_eq!(got, expected);
    }
}

#[test]
fn compression_boundary_round_trips_both_sides() {
    let codec = ZstdCodec;

    for cardinality in [COMPRESS_THRESHOLD as u32 - 1, COMPRESS_THRESHOLD as u32] {
        let mut builder = PostingsBuilder::new();
        for v in 0..cardinality {
            builder.add(v);
        }
        let mut buf = Vec::new();
        builder.encode(&mut buf, &codec).unwrap();

        let mut cursor = &buf[..];
        let decoded = postings::decode(&mut cursor, &codec).unwrap();
        assert_eq!(decoded.len(), cardinality as u64);
    }
}
