#[path = "common/mod.rs"]
mod common;

use common::allocations;
use memdb::histogram::{pow2_bucket, Histogram};
use proptest::prelude::*;
use test_case::test_case;

#[test_case(0, 0)]
#[test_case(1, 1)]
#[test_case(3, 4)]
#[test_case(16, 16)]
#[test_case(17, 32)]
#[test_case(1 << 40, 1 << 40)]
#[test_case((1 << 40) + 1, 1 << 41)]
fn bucket_table(size: u64, bucket: u64) {
    assert_eq!(pow2_bucket(size), bucket);
}

#[test]
fn bucketed_histogram_of_first_five_sizes() {
    let histogram = Histogram::build(&allocations(&[1, 2, 3, 4, 5]), true);
    let counts: Vec<(u64, usize)> = histogram
        .frequencies()
        .iter()
        .map(|(&k, &v)| (k, v))
        .collect();
    assert_eq!(counts, vec![(1, 1), (2, 1), (4, 2), (8, 1)]);
}

proptest! {
    #[test]
    fn bucket_is_power_of_two_upper_bound(size in 0u64..=(1 << 63)) {
        let bucket = pow2_bucket(size);
        prop_assert!(bucket >= size);
        prop_assert!(bucket == 0 || bucket.is_power_of_two());
        prop_assert_eq!(pow2_bucket(bucket), bucket, "bucketing is idempotent");
        if size > 0 {
            prop_assert!(bucket / 2 < size, "bucket is the smallest power of two");
        }
    }

    #[test]
    fn counts_add_up_to_allocations(sizes in proptest::collection::vec(1u64..4096, 0..64)) {
        let heap = allocations(&sizes);
        for use_buckets in [true, false] {
            let histogram = Histogram::build(&heap, use_buckets);
            let total: usize = histogram.frequencies().values().sum();
            prop_assert_eq!(total, sizes.len());
        }
    }
}
