use std::thread;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use stream_life::streamlife::{StreamLifeError, tile_queue};

const PAGE: usize = 8;

fn tile_for(seq: u32) -> [u8; PAGE] {
    let mut tile = [0u8; PAGE];
    tile[..4].copy_from_slice(&seq.to_le_bytes());
    tile[4..].copy_from_slice(&(!seq).to_le_bytes());
    tile
}

fn seq_of(tile: &[u8]) -> u32 {
    let seq = u32::from_le_bytes(tile[..4].try_into().unwrap());
    let check = u32::from_le_bytes(tile[4..].try_into().unwrap());
    assert_eq!(seq, !check, "torn tile");
    seq
}

fn maybe_pause(rng: &mut rand::rngs::StdRng) {
    match rng.random_range(0..10) {
        0 => thread::sleep(Duration::from_micros(rng.random_range(1..200))),
        1 | 2 => thread::yield_now(),
        _ => {}
    }
}

/// Stream `total` tiles with randomized batch sizes and pauses on both ends.
fn run_fifo_case(capacity: usize, total: u32, seed: u64) {
    let (mut tx, mut rx) = tile_queue("fifo", capacity, PAGE).unwrap();

    let producer = thread::spawn(move || {
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        let mut next = 0u32;
        while next < total {
            let remaining = (total - next) as usize;
            let n = rng.random_range(1..=capacity).min(remaining);
            tx.reserve_back(n).unwrap();
            let free = capacity - (tx.write_cursor() - tx.read_cursor()) as usize;
            assert!(free >= n, "reserve_back({n}) returned with {free} free");
            assert!(tx.occupancy() <= capacity);
            for k in 0..n {
                maybe_pause(&mut rng);
                tx.back_mut(k)
                    .unwrap()
                    .copy_from_slice(&tile_for(next + k as u32));
            }
            tx.publish_back(n).unwrap();
            next += n as u32;
        }
        tx.high_water()
    });

    let mut rng = rand::rngs::StdRng::seed_from_u64(seed ^ 0xFFFF);
    let mut expected = 0u32;
    while expected < total {
        let remaining = (total - expected) as usize;
        let n = rng.random_range(1..=capacity).min(remaining);
        rx.wait_front(n).unwrap();
        assert!(rx.occupancy() <= capacity);
        for k in 0..n {
            assert_eq!(seq_of(&rx.front(k).unwrap()), expected + k as u32);
        }
        maybe_pause(&mut rng);
        rx.pop_front(n).unwrap();
        expected += n as u32;
    }

    let high_water = producer.join().unwrap();
    assert!(high_water <= capacity, "high water {high_water} > {capacity}");
    assert_eq!(rx.write_cursor(), u64::from(total));
    assert_eq!(rx.read_cursor(), u64::from(total));
}

#[test]
fn fifo_double_buffered() {
    for seed in [1u64, 2, 3, 4] {
        run_fifo_case(2, 2_000, seed);
    }
}

#[test]
fn fifo_wider_queues() {
    run_fifo_case(3, 2_000, 0xA1);
    run_fifo_case(8, 4_000, 0xB2);
}

#[test]
fn fifo_single_slot() {
    run_fifo_case(1, 500, 0xC3);
}

#[test]
fn no_drops_or_duplicates_with_single_tile_helpers() {
    let (mut tx, mut rx) = tile_queue("helpers", 2, PAGE).unwrap();
    let producer = thread::spawn(move || {
        for seq in 0..1_000u32 {
            tx.push_tile(&tile_for(seq)).unwrap();
        }
    });
    let mut out = [0u8; PAGE];
    for seq in 0..1_000u32 {
        rx.pop_tile_into(&mut out).unwrap();
        assert_eq!(seq_of(&out), seq);
    }
    producer.join().unwrap();
    assert!(matches!(rx.wait_front(1), Err(StreamLifeError::Disconnected(_))));
}

#[test]
fn aborting_consumer_unblocks_full_producer() {
    let (mut tx, rx) = tile_queue("abort", 2, PAGE).unwrap();
    tx.push_tile(&tile_for(0)).unwrap();
    tx.push_tile(&tile_for(1)).unwrap();
    let producer = thread::spawn(move || tx.reserve_back(1));
    thread::sleep(Duration::from_millis(10));
    rx.abort();
    assert!(matches!(
        producer.join().unwrap(),
        Err(StreamLifeError::Aborted(_))
    ));
}
