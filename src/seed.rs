//! Initial-state seeding: named patterns and random density fills.
//!
//! The pipeline only ever sees the resulting `Grid`; the pattern table is a
//! plain value handed to the seeding helpers.

use std::collections::BTreeMap;

use rand::{RngCore, SeedableRng};
use tracing::{debug, warn};

use crate::streamlife::Grid;

pub const DEFAULT_DENSITY: f64 = 0.42;
pub const DEFAULT_SEED: u64 = 0x5EED_1234_ABCD_EF01;

/// Name to cell-offset mapping for seed patterns.
#[derive(Clone, Debug, Default)]
pub struct Lexicon {
    patterns: BTreeMap<String, Vec<(usize, usize)>>,
}

impl Lexicon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Glider and lightweight spaceship.
    pub fn standard() -> Self {
        let mut lexicon = Self::new();
        lexicon.insert("glider", vec![(1, 0), (2, 1), (0, 2), (1, 2), (2, 2)]);
        lexicon.insert(
            "lwss",
            vec![
                (0, 0),
                (3, 0),
                (4, 1),
                (0, 2),
                (4, 2),
                (1, 3),
                (2, 3),
                (3, 3),
                (4, 3),
            ],
        );
        lexicon
    }

    pub fn insert(&mut self, name: &str, cells: Vec<(usize, usize)>) {
        self.patterns.insert(name.to_owned(), cells);
    }

    pub fn get(&self, name: &str) -> Option<&[(usize, usize)]> {
        self.patterns.get(name).map(Vec::as_slice)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.patterns.keys().map(String::as_str)
    }
}

/// Stamp `name` near the centre of `grid`.
///
/// Each offset is shifted back by half the pattern's cell count. Cells that
/// land outside the grid are skipped. An unknown name leaves the grid as it
/// was and returns `false`.
pub fn insert_pattern(grid: &mut Grid, lexicon: &Lexicon, name: &str) -> bool {
    let Some(cells) = lexicon.get(name) else {
        warn!(pattern = name, "unknown seed pattern, grid left unset");
        return false;
    };
    let shift = cells.len() / 2;
    let (cx, cy) = (grid.width() / 2, grid.height() / 2);
    for &(dx, dy) in cells {
        let (Some(x), Some(y)) = ((cx + dx).checked_sub(shift), (cy + dy).checked_sub(shift))
        else {
            continue;
        };
        grid.set(x, y, true);
    }
    debug!(pattern = name, cells = cells.len(), "seed pattern placed");
    true
}

/// Set each cell alive with probability `density`, reproducibly from `seed`.
pub fn insert_random(grid: &mut Grid, density: f64, seed: u64) {
    if density <= 0.0 {
        return;
    }
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    let threshold = (u64::MAX as f64 * density.min(1.0)) as u64;
    for y in 0..grid.height() {
        for x in 0..grid.width() {
            if rng.next_u64() <= threshold {
                grid.set(x, y, true);
            }
        }
    }
    debug!(density, seed, population = grid.population(), "random seed placed");
}

/// How the binary seeds generation zero.
#[derive(Clone, Debug, PartialEq)]
pub enum SeedSpec {
    Random { density: f64, seed: u64 },
    Pattern(String),
}

impl Default for SeedSpec {
    fn default() -> Self {
        SeedSpec::Random {
            density: DEFAULT_DENSITY,
            seed: DEFAULT_SEED,
        }
    }
}

impl SeedSpec {
    /// Apply to `grid`; returns `false` only for an unknown pattern name.
    pub fn apply(&self, grid: &mut Grid, lexicon: &Lexicon) -> bool {
        match self {
            SeedSpec::Random { density, seed } => {
                insert_random(grid, *density, *seed);
                true
            }
            SeedSpec::Pattern(name) => insert_pattern(grid, lexicon, name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Lexicon, SeedSpec, insert_pattern, insert_random};
    use crate::streamlife::{FeedbackLoop, Grid, StreamLifeConfig};

    #[test]
    fn glider_is_centred_by_half_its_length() {
        let mut grid = Grid::new(10, 10);
        assert!(insert_pattern(&mut grid, &Lexicon::standard(), "glider"));
        // Centre (5, 5) shifted back by 5 / 2 = 2.
        let mut live: Vec<_> = grid.live_cells().collect();
        live.sort();
        let mut expected = vec![(4, 3), (5, 4), (3, 5), (4, 5), (5, 5)];
        expected.sort();
        assert_eq!(live, expected);
    }

    #[test]
    fn unknown_pattern_leaves_grid_untouched() {
        let mut grid = Grid::new(8, 8);
        grid.set(1, 1, true);
        let before = grid.clone();
        assert!(!insert_pattern(&mut grid, &Lexicon::standard(), "pulsar"));
        assert_eq!(grid, before);
    }

    #[test]
    fn random_fill_is_reproducible_and_tracks_density() {
        let mut a = Grid::new(64, 64);
        let mut b = Grid::new(64, 64);
        insert_random(&mut a, 0.5, 7);
        insert_random(&mut b, 0.5, 7);
        assert_eq!(a, b);
        let pop = a.population();
        assert!(pop > 1500 && pop < 2600, "population {pop}");

        let mut empty = Grid::new(16, 16);
        insert_random(&mut empty, 0.0, 7);
        assert_eq!(empty.population(), 0);
    }

    #[test]
    fn pattern_centre_follows_the_logical_grid_not_the_padding() {
        // 10x10 with 8x8 tiles pads to 16x16; the glider still sits at (5, 5).
        let config = StreamLifeConfig::default().grid(10, 10).tile(8, 8).num_frames(4);
        let mut life = FeedbackLoop::life(&config).unwrap();
        assert!(life.state().was_padded());

        let mut grid = Grid::new(10, 10);
        assert!(insert_pattern(&mut grid, &Lexicon::standard(), "glider"));
        life.seed(&grid).unwrap();
        assert_eq!(life.frame(), &grid);

        // One glider period later it has moved one cell down and right.
        assert_eq!(life.run().unwrap(), 4);
        let mut live: Vec<_> = life.frame().live_cells().collect();
        live.sort();
        let mut expected = vec![(5, 4), (6, 5), (4, 6), (5, 6), (6, 6)];
        expected.sort();
        assert_eq!(live, expected);
    }

    #[test]
    fn standard_lexicon_names() {
        let binding = Lexicon::standard();
        let names: Vec<&str> = binding.names().collect();
        assert_eq!(names, vec!["glider", "lwss"]);
    }

    #[test]
    fn lwss_fits_in_a_small_grid() {
        let mut grid = Grid::new(8, 8);
        let spec = SeedSpec::Pattern("lwss".into());
        assert!(spec.apply(&mut grid, &Lexicon::standard()));
        assert_eq!(grid.population(), 9);
    }
}
