use std::time::Instant;
use stream_life::seed::insert_random;
use stream_life::{FeedbackLoop, Grid, StreamLifeConfig};

fn bench_pipeline(size: usize, tile: usize, density: f64, generations: u64) -> (f64, u64, usize) {
    let config = StreamLifeConfig::default()
        .grid(size, size)
        .tile(tile, tile)
        .num_frames(generations);
    let mut grid = Grid::new(size, size);
    insert_random(&mut grid, density, 0x5EED_1234_ABCD_EF01);

    let mut life = FeedbackLoop::life(&config).expect("pipeline config");
    life.seed(&grid).expect("seed");
    let tiles = life.state().num_tiles;

    let start = Instant::now();
    life.run().expect("run");
    let duration = start.elapsed();

    (duration.as_secs_f64() * 1000.0, life.frame().population(), tiles)
}

fn main() {
    let scales: &[(usize, usize, u64)] = &[
        (64, 32, 2000),  // default host geometry
        (128, 32, 1000),
        (256, 32, 500),
        (256, 64, 500),  // fewer, larger tiles
        (512, 32, 100),
        (512, 16, 100),  // queue-bound: many small tiles
    ];

    println!(
        "{:<10} {:>6} {:>8} {:>8} {:>12} {:>10} {:>10}",
        "Grid", "Tile", "Tiles", "Gens", "Total(ms)", "Avg(ms)", "Pop"
    );
    println!("{}", "-".repeat(70));

    for &(size, tile, gens) in scales {
        let (total_ms, pop, tiles) = bench_pipeline(size, tile, 0.42, gens);
        let avg_ms = total_ms / gens as f64;
        println!(
            "{:<10} {:>6} {:>8} {:>8} {:>12.1} {:>10.4} {:>10}",
            format!("{}x{}", size, size),
            tile,
            tiles,
            gens,
            total_ms,
            avg_ms,
            pop
        );
    }
}
