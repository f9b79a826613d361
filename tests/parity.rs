use std::collections::HashSet;

use rand::RngCore;
use rand::SeedableRng;
use stream_life::streamlife::{FeedbackLoop, Grid, Rule, StreamLifeConfig};

/// Reference stepper on a bounded grid; everything outside is dead.
fn step_naive(
    cells: &HashSet<(i64, i64)>,
    width: i64,
    height: i64,
    rule: Rule,
) -> HashSet<(i64, i64)> {
    let mut next = HashSet::new();
    let mut candidates = HashSet::new();
    for &(x, y) in cells {
        for dy in -1..=1 {
            for dx in -1..=1 {
                candidates.insert((x + dx, y + dy));
            }
        }
    }

    for (x, y) in candidates {
        if x < 0 || y < 0 || x >= width || y >= height {
            continue;
        }
        let mut neighbors = 0u8;
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                if cells.contains(&(x + dx, y + dy)) {
                    neighbors += 1;
                }
            }
        }
        if rule.next_state(cells.contains(&(x, y)), neighbors) {
            next.insert((x, y));
        }
    }

    next
}

fn collect_live(grid: &Grid) -> HashSet<(i64, i64)> {
    grid.live_cells().map(|(x, y)| (x as i64, y as i64)).collect()
}

fn run_parity_case(
    width: usize,
    height: usize,
    tile: (usize, usize),
    density: f64,
    steps: u64,
    seed: u64,
    rule: Rule,
) {
    let config = StreamLifeConfig::default()
        .grid(width, height)
        .tile(tile.0, tile.1)
        .num_frames(steps)
        .rule(rule);
    let mut grid = Grid::new(width, height);
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let threshold = (u64::MAX as f64 * density) as u64;
    for y in 0..height {
        for x in 0..width {
            if rng.next_u64() <= threshold {
                grid.set(x, y, true);
            }
        }
    }

    let mut life = FeedbackLoop::life(&config).unwrap();
    life.seed(&grid).unwrap();
    let mut expected = collect_live(&grid);

    for generation in 1..=steps {
        let frame = life.advance().unwrap().expect("frame limit not reached");
        let population = frame.population();
        let live = collect_live(frame);
        expected = step_naive(&expected, width as i64, height as i64, rule);
        assert_eq!(
            live, expected,
            "live-set mismatch at generation {generation} for {width}x{height} tile {tile:?} seed {seed}"
        );
        let stats = life.last_stats().unwrap();
        assert_eq!(stats.population, population);
        assert_eq!(population, expected.len() as u64);
    }
    assert!(life.advance().unwrap().is_none());
}

#[test]
fn parity_aligned_grids() {
    run_parity_case(64, 64, (32, 32), 0.42, 6, 0xA1, Rule::conway());
    run_parity_case(48, 32, (8, 8), 0.35, 8, 0xB2, Rule::conway());
}

#[test]
fn parity_padded_grids() {
    run_parity_case(37, 29, (8, 4), 0.40, 6, 0xC3, Rule::conway());
    run_parity_case(10, 9, (5, 3), 0.50, 8, 0xD4, Rule::conway());
    run_parity_case(33, 1, (4, 4), 0.60, 4, 0xE5, Rule::conway());
}

#[test]
fn parity_multiple_seeds() {
    for seed in [11u64, 22, 33, 44] {
        run_parity_case(24, 24, (4, 4), 0.35, 7, seed, Rule::conway());
    }
}

#[test]
fn parity_highlife() {
    let rule: Rule = "B36/S23".parse().unwrap();
    run_parity_case(32, 32, (8, 8), 0.30, 6, 0xF6, rule);
}

#[test]
fn glider_translates_across_tiles() {
    let config = StreamLifeConfig::default().grid(16, 16).tile(4, 4).num_frames(8);
    let mut life = FeedbackLoop::life(&config).unwrap();
    let glider = [(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)];
    let mut grid = Grid::new(16, 16);
    for (x, y) in glider {
        grid.set(x + 2, y + 2, true);
    }
    life.seed(&grid).unwrap();
    assert_eq!(life.run().unwrap(), 8);

    let expected: HashSet<(i64, i64)> = glider
        .iter()
        .map(|&(x, y)| (x as i64 + 4, y as i64 + 4))
        .collect();
    assert_eq!(collect_live(life.frame()), expected);
}
