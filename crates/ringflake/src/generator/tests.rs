//! End-to-end generator scenarios: contiguous blocks, drained buffers,
//! concurrent uniqueness, and startup validation.

use std::collections::HashSet;
use std::sync::Mutex;
use std::thread::{self, scope};

use crate::bits::BitLayout;
use crate::error::Error;
use crate::generator::CachedGenerator;
use crate::generator::cached::next_ids_for_one_second;
use crate::time::current_second;
use crate::worker::FixedWorkerIdAssigner;

/// A layout with a 32-id second and a 64-slot ring keeps the fills cheap.
fn small_generator(worker_id: i64) -> CachedGenerator {
    CachedGenerator::builder()
        .bits(28, 30, 5)
        .boost_power(1)
        .build(&FixedWorkerIdAssigner::new(worker_id))
        .unwrap()
}

#[test]
fn first_block_is_contiguous_then_jumps_to_the_next_second() {
    let generator = small_generator(1);
    let max_sequence = generator.layout().max_sequence();

    let first = generator.next_id().unwrap();
    let parsed = generator.parse(first);
    assert_eq!(parsed.worker_id, 1);
    assert_eq!(parsed.sequence, 0);

    // sequence occupies the low bits, so one second's block is contiguous
    for offset in 1..=max_sequence {
        assert_eq!(generator.next_id().unwrap(), first + offset);
    }

    let next = generator.next_id().unwrap();
    let next_parsed = generator.parse(next);
    assert_eq!(next_parsed.sequence, 0);
    assert_eq!(next_parsed.timestamp, parsed.timestamp + 1);

    generator.shutdown();
}

#[test]
fn parse_recovers_the_packed_fields() {
    let generator = small_generator(7);

    for _ in 0..40 {
        let uid = generator.next_id().unwrap();
        assert!(uid >= 0, "sign bit must stay clear");

        let parsed = generator.parse(uid);
        assert_eq!(parsed.uid, uid);
        assert_eq!(parsed.worker_id, 7);
        let reallocated = generator.layout().allocate(
            parsed.timestamp - generator.epoch_seconds(),
            parsed.worker_id,
            parsed.sequence,
        );
        assert_eq!(reallocated, uid);
    }

    generator.shutdown();
}

#[test]
fn a_drained_generator_surfaces_buffer_empty() {
    let generator = small_generator(1);

    // freeze refills: neither async nor scheduled padding is honored any
    // more, only the cached remainder can be taken
    generator.shutdown();

    let buffer_size = generator.ring().buffer_size();
    let mut count = 0;
    loop {
        match generator.next_id() {
            Ok(_) => count += 1,
            Err(Error::BufferEmpty) => break,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!(count, buffer_size);
    assert!(matches!(generator.next_id(), Err(Error::BufferEmpty)));
}

#[test]
fn concurrent_consumers_never_see_a_duplicate() {
    const THREADS: usize = 8;
    const IDS_PER_THREAD: usize = 500;
    const TOTAL_IDS: usize = THREADS * IDS_PER_THREAD;

    let generator = small_generator(3);
    let seen = Mutex::new(HashSet::with_capacity(TOTAL_IDS));

    scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                let mut last = -1;
                for _ in 0..IDS_PER_THREAD {
                    loop {
                        match generator.next_id() {
                            Ok(uid) => {
                                // each consumer's view is strictly increasing
                                assert!(uid > last, "consumer saw {uid} after {last}");
                                last = uid;
                                assert!(seen.lock().unwrap().insert(uid), "duplicate {uid}");
                                break;
                            }
                            Err(Error::BufferEmpty) => thread::yield_now(),
                            Err(e) => panic!("unexpected error: {e}"),
                        }
                    }
                }
            });
        }
    });

    assert_eq!(seen.lock().unwrap().len(), TOTAL_IDS);
    generator.shutdown();
}

#[test]
fn timestamps_only_move_forward_across_refills() {
    let generator = small_generator(1);
    let mut last_uid = -1;
    let mut last_timestamp = 0;

    // several times the ring size, forcing many background refills
    for _ in 0..500 {
        let uid = loop {
            match generator.next_id() {
                Ok(uid) => break uid,
                Err(Error::BufferEmpty) => thread::yield_now(),
                Err(e) => panic!("unexpected error: {e}"),
            }
        };
        assert!(uid > last_uid);
        last_uid = uid;

        let timestamp = generator.parse(uid).timestamp;
        assert!(timestamp >= last_timestamp, "timestamp went backwards");
        last_timestamp = timestamp;
    }

    generator.shutdown();
}

#[test]
fn zero_sequence_bits_yield_one_id_per_second() {
    let generator = CachedGenerator::builder()
        .bits(41, 22, 0)
        .build(&FixedWorkerIdAssigner::new(2))
        .unwrap();

    let mut last_timestamp = None;
    for _ in 0..3 {
        let uid = generator.next_id().unwrap();
        let parsed = generator.parse(uid);
        assert_eq!(parsed.sequence, 0);
        if let Some(last) = last_timestamp {
            assert_eq!(parsed.timestamp, last + 1);
        }
        last_timestamp = Some(parsed.timestamp);
    }

    generator.shutdown();
}

#[test]
fn one_bit_timestamp_exhausts_after_two_logical_seconds() {
    let layout = BitLayout::new(1, 49, 13).unwrap();
    let epoch = 100;

    assert!(next_ids_for_one_second(layout, epoch, 1, 100).is_ok());
    assert!(next_ids_for_one_second(layout, epoch, 1, 101).is_ok());
    assert!(matches!(
        next_ids_for_one_second(layout, epoch, 1, 102),
        Err(Error::CapacityExhausted { .. })
    ));
}

#[test]
fn provider_mints_one_full_contiguous_second() {
    let layout = BitLayout::new(28, 30, 5).unwrap();
    let uids = next_ids_for_one_second(layout, 100, 3, 105).unwrap();

    assert_eq!(uids.len() as i64, layout.max_sequence() + 1);
    assert_eq!(uids[0], layout.allocate(5, 3, 0));
    for pair in uids.windows(2) {
        assert_eq!(pair[1], pair[0] + 1);
    }
}

#[test]
fn exhausted_timestamp_field_fails_the_initial_fill() {
    // a 1-bit timestamp holds two logical seconds in total; an epoch 100s
    // in the past is already beyond them
    let result = CachedGenerator::builder()
        .bits(1, 57, 5)
        .epoch_seconds(current_second() - 100)
        .build(&FixedWorkerIdAssigner::new(1));

    assert!(matches!(result, Err(Error::CapacityExhausted { .. })));
}

#[test]
fn builder_rejects_bad_configuration() {
    let assigner = FixedWorkerIdAssigner::new(0);

    // widths not summing to 64
    assert!(matches!(
        CachedGenerator::builder().bits(28, 22, 14).build(&assigner),
        Err(Error::InvalidConfig { .. })
    ));
    // zero boost power
    assert!(
        CachedGenerator::builder()
            .bits(28, 30, 5)
            .boost_power(0)
            .build(&assigner)
            .is_err()
    );
    // padding factor out of range
    assert!(
        CachedGenerator::builder()
            .bits(28, 30, 5)
            .padding_factor(0)
            .build(&assigner)
            .is_err()
    );
    assert!(
        CachedGenerator::builder()
            .bits(28, 30, 5)
            .padding_factor(100)
            .build(&assigner)
            .is_err()
    );
    // epoch in the future
    assert!(
        CachedGenerator::builder()
            .bits(28, 30, 5)
            .epoch_seconds(current_second() + 3600)
            .build(&assigner)
            .is_err()
    );
}

#[test]
fn builder_rejects_an_oversized_worker_id() {
    // two worker bits: ids 0..=3
    let result = CachedGenerator::builder()
        .bits(40, 2, 21)
        .build(&FixedWorkerIdAssigner::new(4));
    assert!(matches!(result, Err(Error::InvalidConfig { .. })));

    assert!(
        CachedGenerator::builder()
            .bits(40, 2, 21)
            .build(&FixedWorkerIdAssigner::new(-1))
            .is_err()
    );
}

#[test]
fn custom_rejection_handlers_are_wired_through() {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    let takes_rejected = Arc::new(AtomicUsize::new(0));
    let generator = CachedGenerator::builder()
        .bits(28, 30, 5)
        .boost_power(1)
        .rejected_take_handler(Box::new({
            let takes_rejected = Arc::clone(&takes_rejected);
            move |_ring| {
                takes_rejected.fetch_add(1, Ordering::SeqCst);
            }
        }))
        .build(&FixedWorkerIdAssigner::new(1))
        .unwrap();

    generator.shutdown();
    while generator.next_id().is_ok() {}
    assert_eq!(takes_rejected.load(Ordering::SeqCst), 1);
}
