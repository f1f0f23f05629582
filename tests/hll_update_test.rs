use hyperunique::error::ErrorKind;
use hyperunique::hash;
use hyperunique::hll::NUM_BUCKETS;
use hyperunique::HllSketch;

/// Craft a hashed value whose leading-one scan yields `position_of_1` and
/// whose trailing bytes select `bucket`.
fn hashed_for(bucket: u16, position_of_1: u8) -> [u8; 10] {
    assert!((1..=64).contains(&position_of_1));
    let mut hashed = [0u8; 10];
    let bit = usize::from(position_of_1) - 1;
    hashed[bit / 8] = 0x80 >> (bit % 8);
    hashed[8] = (bucket >> 8) as u8;
    hashed[9] = (bucket & 0xff) as u8;
    hashed
}

#[test]
fn test_empty_sketch() {
    let sketch = HllSketch::new();
    assert_eq!(sketch.estimate(), 0.0);
    assert_eq!(sketch.register_offset(), 0);
    assert_eq!(sketch.num_non_zero_registers(), 0);
    assert_eq!(sketch.max_overflow_value(), 0);
    assert!(sketch.is_dense());
}

#[test]
fn test_single_value() {
    let mut sketch = HllSketch::new();
    sketch.add_hashed(&hashed_for(5, 3)).unwrap();

    assert_eq!(sketch.num_non_zero_registers(), 1);
    let estimate = sketch.estimate();
    assert!(
        (estimate - 1.0).abs() < 0.01,
        "one distinct value should estimate close to 1, got {}",
        estimate
    );
}

#[test]
fn test_position_scan_skips_zero_bytes() {
    let mut sketch = HllSketch::new();
    // All 8 leading bytes zero: the scan contributes 8 per byte, value 64.
    let mut hashed = [0u8; 10];
    hashed[9] = 9;
    sketch.add_hashed(&hashed).unwrap();

    // 64 is far beyond the representable window, so it lands in the
    // overflow slot.
    assert_eq!(sketch.num_non_zero_registers(), 0);
    assert_eq!(sketch.max_overflow_value(), 64);
    assert_eq!(sketch.max_overflow_register(), 9);
}

#[test]
fn test_accuracy_10k() {
    let mut sketch = HllSketch::new();
    for i in 0..10_000u64 {
        sketch.add_hashed(&hash::hash_bytes(&i.to_le_bytes())).unwrap();
    }
    let estimate = sketch.estimate();
    let error = (estimate - 10_000.0).abs() / 10_000.0;
    // 2048 registers give ~2.3% relative error one sigma, plus raw-estimator
    // bias in this range.
    assert!(
        error < 0.06,
        "estimate {} has {:.2}% error",
        estimate,
        error * 100.0
    );
}

#[test]
fn test_accuracy_100k() {
    let mut sketch = HllSketch::new();
    for i in 0..100_000u64 {
        sketch.add_hashed(&hash::hash_bytes(&i.to_le_bytes())).unwrap();
    }
    let estimate = sketch.estimate();
    let error = (estimate - 100_000.0).abs() / 100_000.0;
    assert!(
        error < 0.05,
        "estimate {} has {:.2}% error",
        estimate,
        error * 100.0
    );
}

#[test]
fn test_duplicates_do_not_inflate() {
    let mut sketch = HllSketch::new();
    for _ in 0..10 {
        for i in 0..100u64 {
            sketch.add_hashed(&hash::hash_bytes(&i.to_le_bytes())).unwrap();
        }
    }
    let estimate = sketch.estimate();
    assert!(
        (estimate - 100.0).abs() < 10.0,
        "duplicates should not inflate the estimate, got {}",
        estimate
    );
}

#[test]
fn test_add_convenience_matches_add_hashed() {
    let mut direct = HllSketch::new();
    let mut hashed = HllSketch::new();
    for i in 0..1_000u32 {
        direct.add(&i);
        hashed.add_hashed(&hash::hash_of(&i)).unwrap();
    }
    assert_eq!(direct, hashed);
    assert_eq!(direct.estimate(), hashed.estimate());
}

#[test]
fn test_short_hashed_value_is_rejected() {
    let mut sketch = HllSketch::new();
    let err = sketch.add_hashed(&[0u8; 9]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    // Nothing was recorded.
    assert_eq!(sketch.num_non_zero_registers(), 0);
}

#[test]
fn test_estimate_is_cached_until_mutation() {
    let mut sketch = HllSketch::new();
    sketch.add_register(0, 3);
    let first = sketch.estimate();
    assert_eq!(sketch.estimate(), first);

    sketch.add_register(1, 3);
    let second = sketch.estimate();
    assert!(
        second > first,
        "estimate should move after mutation: {} -> {}",
        first,
        second
    );
}

#[test]
fn test_overflow_slot_keeps_strictly_larger_values() {
    let mut sketch = HllSketch::new();
    sketch.add_register(3, 40);
    assert_eq!(sketch.max_overflow_value(), 40);
    assert_eq!(sketch.max_overflow_register(), 3);

    // Smaller and equal overflow candidates are ignored.
    sketch.add_register(9, 30);
    sketch.add_register(9, 40);
    assert_eq!(sketch.max_overflow_value(), 40);
    assert_eq!(sketch.max_overflow_register(), 3);

    sketch.add_register(11, 41);
    assert_eq!(sketch.max_overflow_value(), 41);
    assert_eq!(sketch.max_overflow_register(), 11);

    // The overflowed register counts as one observed register.
    let estimate = sketch.estimate();
    assert!(
        (estimate - 1.0).abs() < 0.01,
        "single overflowed register should estimate close to 1, got {}",
        estimate
    );
}

#[test]
fn test_offset_slides_when_all_registers_fill() {
    let mut sketch = HllSketch::new();
    for bucket in 0..NUM_BUCKETS as u16 {
        sketch.add_register(bucket, 1);
    }

    // The 2048th register triggers the slide: the offset advances and
    // every nibble is decremented back to zero.
    assert_eq!(sketch.register_offset(), 1);
    assert_eq!(sketch.num_non_zero_registers(), 0);

    for bucket in 0..NUM_BUCKETS as u16 {
        sketch.add_register(bucket, 2);
    }
    assert_eq!(sketch.register_offset(), 2);
    assert_eq!(sketch.num_non_zero_registers(), 0);
}

#[test]
fn test_true_values_survive_the_slide() {
    let mut sketch = HllSketch::new();
    for bucket in 0..NUM_BUCKETS as u16 {
        sketch.add_register(bucket, 1);
    }
    assert_eq!(sketch.register_offset(), 1);

    // A register at true value 5 stores 5 - offset = 4.
    sketch.add_register(0, 5);
    let bytes = sketch.to_bytes();
    assert_eq!(bytes.len(), 7 + 3);
    assert_eq!(bytes[1], 1, "register offset");
    assert_eq!(u16::from_be_bytes([bytes[7], bytes[8]]), 7);
    assert_eq!(bytes[9], 0x40);
}

#[test]
fn test_recount_after_partial_slide() {
    let mut sketch = HllSketch::new();
    // Half the registers at 2, half at 1: after the slide the former keep
    // a non-zero nibble and the latter drop to zero.
    for bucket in 0..(NUM_BUCKETS / 2) as u16 {
        sketch.add_register(bucket, 2);
    }
    for bucket in (NUM_BUCKETS / 2) as u16..NUM_BUCKETS as u16 {
        sketch.add_register(bucket, 1);
    }
    assert_eq!(sketch.register_offset(), 1);
    assert_eq!(sketch.num_non_zero_registers(), (NUM_BUCKETS / 2) as u16);
}
