use std::thread;
use std::time::Instant;
use stream_life::streamlife::tile_queue;

const TILES: usize = 200_000;

/// Push `TILES` pages through one queue on two threads; returns ms.
fn bench_queue(capacity: usize, page_size: usize) -> f64 {
    let (mut tx, mut rx) = tile_queue("bench", capacity, page_size).expect("queue");
    let start = Instant::now();
    let producer = thread::spawn(move || {
        for i in 0..TILES {
            tx.reserve_back(1).expect("reserve");
            tx.back_mut(0).expect("slot").fill(i as u8);
            tx.publish_back(1).expect("publish");
        }
    });
    let mut checksum = 0u64;
    for _ in 0..TILES {
        rx.wait_front(1).expect("wait");
        checksum += u64::from(rx.front(0).expect("front")[0]);
        rx.pop_front(1).expect("pop");
    }
    producer.join().expect("producer thread");
    std::hint::black_box(checksum);
    start.elapsed().as_secs_f64() * 1000.0
}

fn main() {
    let cases: &[(usize, usize)] = &[
        (2, 1024), // double-buffered 32x32 tiles
        (4, 1024),
        (8, 1024),
        (2, 4096), // 64x64 tiles
        (2, 64),   // tiny tiles: pure handoff cost
    ];

    println!(
        "{:<10} {:>10} {:>12} {:>12}",
        "Capacity", "Page(B)", "Total(ms)", "ns/tile"
    );
    println!("{}", "-".repeat(48));

    for &(capacity, page) in cases {
        let total_ms = bench_queue(capacity, page);
        let ns_per_tile = total_ms * 1e6 / TILES as f64;
        println!(
            "{:<10} {:>10} {:>12.1} {:>12.1}",
            capacity, page, total_ms, ns_per_tile
        );
    }
}
