//! Closed-loop driver: each generation's output seeds the next.
//!
//! Every `advance` is one synchronous invocation followed by copy-back. The
//! output tiles are reassembled into the padded grid, whose first
//! `half_rows` rows become the top history page and the rest the bottom
//! page; the same tiles are written to the previous-output region. Nothing
//! is written back until `await_completion` has returned successfully.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info};

use super::config::StreamLifeConfig;
use super::error::{Result, StreamLifeError};
use super::grid::Grid;
use super::kernel::{LifeKernel, TileKernel};
use super::scheduler::{GenerationStats, PipelineScheduler, PipelineSpec, StoreSet};
use super::tile::PipelineState;

/// Cloneable stop flag, observed between invocations only.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Why `advance` stopped producing generations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    FrameLimit,
    Signalled,
    Stable,
    Failed,
}

pub struct FeedbackLoop {
    scheduler: PipelineScheduler,
    num_frames: Option<u64>,
    stop_when_stable: bool,
    stop: StopSignal,
    generation: u64,
    last_stats: Option<GenerationStats>,
    failed: bool,
    frame: Grid,
    padded: Vec<u8>,
    tile_buf: Vec<u8>,
    history_buf: Vec<u8>,
}

impl FeedbackLoop {
    pub fn new(config: &StreamLifeConfig, kernel: Arc<dyn TileKernel>) -> Result<Self> {
        let scheduler = PipelineScheduler::new(config, kernel)?;
        let state = *scheduler.state();
        if state.was_padded() {
            debug!(
                width = config.grid.width,
                height = config.grid.height,
                padded_width = state.padded_width,
                padded_height = state.padded_height,
                "grid padded to tile multiple"
            );
        }
        Ok(Self {
            scheduler,
            num_frames: config.num_frames,
            stop_when_stable: config.stop_when_stable,
            stop: StopSignal::new(),
            generation: 0,
            last_stats: None,
            failed: false,
            frame: Grid::with_shape(config.grid),
            padded: vec![0; state.padded_width * state.padded_height],
            tile_buf: vec![0; state.tile.page_size()],
            history_buf: vec![0; state.history_page_size()],
        })
    }

    /// Loop running the configured B/S rule.
    pub fn life(config: &StreamLifeConfig) -> Result<Self> {
        Self::new(config, Arc::new(LifeKernel::new(config.rule)))
    }

    /// Share an existing stop flag instead of the loop's own.
    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Completed generations since construction.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[inline]
    pub fn last_stats(&self) -> Option<GenerationStats> {
        self.last_stats
    }

    /// Most recent generation at logical size.
    #[inline]
    pub fn frame(&self) -> &Grid {
        &self.frame
    }

    #[inline]
    pub fn state(&self) -> &PipelineState {
        self.scheduler.state()
    }

    #[inline]
    pub fn scheduler(&self) -> &PipelineScheduler {
        &self.scheduler
    }

    /// Write `grid` as the prior generation of the next invocation.
    pub fn seed(&mut self, grid: &Grid) -> Result<()> {
        let state = *self.scheduler.state();
        if grid.shape() != state.grid {
            return Err(StreamLifeError::InvalidConfig(format!(
                "seed grid is {}x{}, pipeline expects {}x{}",
                grid.width(),
                grid.height(),
                state.grid.width,
                state.grid.height
            )));
        }
        grid.write_padded(&state, &mut self.padded);
        let stores = self.scheduler.stores_mut()?;
        store_generation(
            &state,
            &self.padded,
            stores,
            &mut self.tile_buf,
            &mut self.history_buf,
        )?;
        self.frame = grid.clone();
        self.last_stats = None;
        self.failed = false;
        debug!(population = grid.population(), "pipeline seeded");
        Ok(())
    }

    /// The condition that ends the loop, if one holds right now.
    pub fn stop_reason(&self) -> Option<StopReason> {
        if self.failed {
            return Some(StopReason::Failed);
        }
        if self.stop.is_stopped() {
            return Some(StopReason::Signalled);
        }
        if self.num_frames.is_some_and(|limit| self.generation >= limit) {
            return Some(StopReason::FrameLimit);
        }
        if self.stop_when_stable && self.last_stats.is_some_and(|s| s.changed_cells == 0) {
            return Some(StopReason::Stable);
        }
        None
    }

    /// Run one generation and feed it back.
    ///
    /// Returns `Ok(None)` once a stop condition holds. A failed invocation
    /// is returned as an error and ends the loop; its output is not fed
    /// back.
    pub fn advance(&mut self) -> Result<Option<&Grid>> {
        if let Some(reason) = self.stop_reason() {
            debug!(?reason, generation = self.generation, "feedback loop stopped");
            return Ok(None);
        }

        let spec = PipelineSpec::full(self.scheduler.state());
        let stats = match self.scheduler.invoke(&spec) {
            Ok(stats) => stats,
            Err(err) => {
                self.failed = true;
                error!(
                    generation = self.generation + 1,
                    fatal = err.is_fatal(),
                    error = %err,
                    "generation failed"
                );
                return Err(err);
            }
        };
        if let Err(err) = self.copy_back() {
            self.failed = true;
            error!(generation = self.generation + 1, error = %err, "copy-back failed");
            return Err(err);
        }

        self.generation += 1;
        self.last_stats = Some(stats);
        info!(
            generation = self.generation,
            population = stats.population,
            changed = stats.changed_cells,
            "generation complete"
        );
        Ok(Some(&self.frame))
    }

    /// Advance until a stop condition; returns generations completed.
    pub fn run(&mut self) -> Result<u64> {
        let start = self.generation;
        while self.advance()?.is_some() {}
        Ok(self.generation - start)
    }

    fn copy_back(&mut self) -> Result<()> {
        let state = *self.scheduler.state();
        let stores = self.scheduler.stores_mut()?;
        for index in 0..state.num_tiles {
            scatter_tile(&state, stores.output.read_tile(index)?, index, &mut self.padded);
        }
        store_generation(
            &state,
            &self.padded,
            stores,
            &mut self.tile_buf,
            &mut self.history_buf,
        )?;
        self.frame.read_padded(&state, &self.padded);
        Ok(())
    }
}

/// Split `padded` into the history pages and tile it into `previous`.
fn store_generation(
    state: &PipelineState,
    padded: &[u8],
    stores: &mut StoreSet,
    tile_buf: &mut [u8],
    history_buf: &mut [u8],
) -> Result<()> {
    let split = (state.half_rows * state.padded_width).min(padded.len());
    let (top, bottom) = padded.split_at(split);

    history_buf.fill(0);
    history_buf[..top.len()].copy_from_slice(top);
    stores.top.write_tile(0, history_buf)?;

    history_buf.fill(0);
    history_buf[..bottom.len()].copy_from_slice(bottom);
    stores.bottom.write_tile(0, history_buf)?;

    for index in 0..state.num_tiles {
        gather_tile(state, padded, index, tile_buf);
        stores.previous.write_tile(index, tile_buf)?;
    }
    Ok(())
}

fn gather_tile(state: &PipelineState, padded: &[u8], index: usize, tile: &mut [u8]) {
    let (ox, oy) = state.tile_origin(index);
    let width = state.tile.width;
    for (ly, row) in tile.chunks_exact_mut(width).enumerate() {
        let start = (oy + ly) * state.padded_width + ox;
        row.copy_from_slice(&padded[start..start + width]);
    }
}

fn scatter_tile(state: &PipelineState, tile: &[u8], index: usize, padded: &mut [u8]) {
    let (ox, oy) = state.tile_origin(index);
    let width = state.tile.width;
    for (ly, row) in tile.chunks_exact(width).enumerate() {
        let start = (oy + ly) * state.padded_width + ox;
        padded[start..start + width].copy_from_slice(row);
    }
}
