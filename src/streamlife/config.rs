//! Startup configuration for the pipeline and feedback loop.

use super::error::{Result, StreamLifeError};
use super::graph::MIN_STREAM_CAPACITY;
use super::rules::Rule;
use super::tile::{GridShape, TileShape};

pub const DEFAULT_GRID_SIDE: usize = 64;
pub const DEFAULT_BANK_COUNT: usize = 8;
pub const DEFAULT_BANK_CAPACITY: usize = 64 << 20;
pub const DEFAULT_NUM_FRAMES: u64 = 5000;

/// Configuration for a pipeline instance.
///
/// Use `StreamLifeConfig::default()` for the stock 64x64 grid with 32x32
/// tiles, or adjust individual knobs via the builder methods. Values are
/// checked by [`validate`](Self::validate) when the pipeline is built.
#[derive(Clone, Debug)]
pub struct StreamLifeConfig {
    /// Logical grid size. Padded up to tile multiples internally.
    pub grid: GridShape,
    pub tile: TileShape,
    /// Banks every buffer is interleaved across.
    pub bank_count: usize,
    /// Bytes available in each bank.
    pub bank_capacity: usize,
    /// Slots in each streamed queue; at least 2.
    pub stream_capacity: usize,
    /// Generations to run. `None` runs until the stop signal is raised.
    pub num_frames: Option<u64>,
    pub rule: Rule,
    /// Stop once a generation changes no cells.
    pub stop_when_stable: bool,
}

impl Default for StreamLifeConfig {
    fn default() -> Self {
        Self {
            grid: GridShape::new(DEFAULT_GRID_SIDE, DEFAULT_GRID_SIDE),
            tile: TileShape::default(),
            bank_count: DEFAULT_BANK_COUNT,
            bank_capacity: DEFAULT_BANK_CAPACITY,
            stream_capacity: MIN_STREAM_CAPACITY,
            num_frames: Some(DEFAULT_NUM_FRAMES),
            rule: Rule::conway(),
            stop_when_stable: false,
        }
    }
}

impl StreamLifeConfig {
    pub fn grid(mut self, width: usize, height: usize) -> Self {
        self.grid = GridShape::new(width, height);
        self
    }

    pub fn tile(mut self, width: usize, height: usize) -> Self {
        self.tile = TileShape::new(width, height);
        self
    }

    pub fn bank_count(mut self, n: usize) -> Self {
        self.bank_count = n;
        self
    }

    pub fn bank_capacity(mut self, bytes: usize) -> Self {
        self.bank_capacity = bytes;
        self
    }

    pub fn stream_capacity(mut self, slots: usize) -> Self {
        self.stream_capacity = slots;
        self
    }

    pub fn num_frames(mut self, frames: u64) -> Self {
        self.num_frames = Some(frames);
        self
    }

    /// Run until stopped externally.
    pub fn unbounded(mut self) -> Self {
        self.num_frames = None;
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rule = rule;
        self
    }

    pub fn stop_when_stable(mut self, enabled: bool) -> Self {
        self.stop_when_stable = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.tile.width == 0 || self.tile.height == 0 {
            return Err(StreamLifeError::InvalidConfig(format!(
                "tile shape {}x{} has a zero edge",
                self.tile.width, self.tile.height
            )));
        }
        if self.grid.width == 0 || self.grid.height == 0 {
            return Err(StreamLifeError::InvalidConfig(format!(
                "grid {}x{} is empty",
                self.grid.width, self.grid.height
            )));
        }
        if self.padded_extent().is_none() {
            return Err(StreamLifeError::InvalidConfig(format!(
                "grid {}x{} with {}x{} tiles is too large to address",
                self.grid.width, self.grid.height, self.tile.width, self.tile.height
            )));
        }
        if self.bank_count == 0 {
            return Err(StreamLifeError::InvalidConfig(
                "bank count must be at least 1".into(),
            ));
        }
        if self.stream_capacity < MIN_STREAM_CAPACITY {
            return Err(StreamLifeError::CapacityMisconfigured {
                queue: "stream".into(),
                capacity: self.stream_capacity,
                minimum: MIN_STREAM_CAPACITY,
            });
        }
        Ok(())
    }

    /// Cell count of the padded grid, if every derived size fits in `usize`.
    fn padded_extent(&self) -> Option<usize> {
        self.tile.width.checked_mul(self.tile.height)?;
        let width = self.grid.width.checked_next_multiple_of(self.tile.width)?;
        let height = self.grid.height.checked_next_multiple_of(self.tile.height)?;
        width.checked_mul(height.div_ceil(2))?;
        width.checked_mul(height)
    }
}
