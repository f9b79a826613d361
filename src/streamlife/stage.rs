//! Streaming stages: source, compute and sink.
//!
//! Each stage owns its queue endpoints and runs to completion of its tile
//! count, blocking only inside queue operations. Launch parameters arrive
//! positionally; buffers are resolved from the addresses in those
//! parameters against the stores lent for the invocation.

use std::sync::Arc;

use tracing::{debug, trace};

use super::arena::TileStore;
use super::args::{RuntimeArgs, StoreBindings};
use super::error::{Result, StreamLifeError};
use super::graph::StageKind;
use super::kernel::{HistoryView, TileKernel};
use super::queue::{TileConsumer, TileProducer};
use super::tile::PipelineState;

/// What a stage accomplished in one invocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StageStats {
    pub tiles: usize,
    pub live: u64,
    pub changed: u64,
}

pub trait Stage: Send {
    fn kind(&self) -> StageKind;

    fn run(&mut self, args: &RuntimeArgs, bindings: &mut StoreBindings) -> Result<StageStats>;

    /// Tear down every queue this stage touches so peers stop waiting.
    fn abort(&self);
}

fn copy_into(slot: &mut [u8], tile: &[u8]) -> Result<()> {
    if slot.len() != tile.len() {
        return Err(StreamLifeError::PageSizeMismatch {
            expected: slot.len(),
            actual: tile.len(),
        });
    }
    slot.copy_from_slice(tile);
    Ok(())
}

fn num_tiles_arg(args: &RuntimeArgs, position: usize) -> Result<usize> {
    Ok(args.get(position)? as usize)
}

/// Seeds the history queues, then streams the previous-output region.
///
/// Launch parameters: `[top_addr, top_bank, num_tiles, bottom_addr,
/// bottom_bank, stream_addr, stream_bank]`.
pub struct SourceStage {
    top: TileProducer,
    bottom: TileProducer,
    stream: TileProducer,
}

impl SourceStage {
    pub const ARG_COUNT: usize = 7;

    pub fn new(top: TileProducer, bottom: TileProducer, stream: TileProducer) -> Self {
        Self {
            top,
            bottom,
            stream,
        }
    }

    /// Place tile 0 of each history region into its queue and publish both.
    ///
    /// History queues are expected to be empty; priming on top of an
    /// unconsumed seed fails with `CapacityExceeded`.
    pub fn prime(&mut self, top: &TileStore, bottom: &TileStore) -> Result<()> {
        debug!(stage = "source", "priming history queues");
        self.top.try_reserve_back(1)?;
        self.bottom.try_reserve_back(1)?;
        copy_into(&mut self.top.back_mut(0)?, top.read_tile(0)?)?;
        copy_into(&mut self.bottom.back_mut(0)?, bottom.read_tile(0)?)?;
        self.top.publish_back(1)?;
        self.bottom.publish_back(1)?;
        Ok(())
    }

    /// Stream tiles `0..num_tiles` in order.
    pub fn stream(&mut self, store: &TileStore, num_tiles: usize) -> Result<usize> {
        for index in 0..num_tiles {
            trace!(stage = "source", index, "reserving stream slot");
            self.stream.reserve_back(1)?;
            store.read_tile_into(index, &mut self.stream.back_mut(0)?)?;
            self.stream.publish_back(1)?;
        }
        Ok(num_tiles)
    }
}

impl Stage for SourceStage {
    fn kind(&self) -> StageKind {
        StageKind::Source
    }

    fn run(&mut self, args: &RuntimeArgs, bindings: &mut StoreBindings) -> Result<StageStats> {
        args.expect_len(Self::ARG_COUNT)?;
        let num_tiles = num_tiles_arg(args, 2)?;
        let top = bindings.resolve(args.get(0)?, args.get(1)?)?;
        let bottom = bindings.resolve(args.get(3)?, args.get(4)?)?;
        let stream = bindings.resolve(args.get(5)?, args.get(6)?)?;

        self.prime(top, bottom)?;
        let tiles = self.stream(stream, num_tiles)?;
        debug!(stage = "source", tiles, "finished");
        Ok(StageStats {
            tiles,
            ..StageStats::default()
        })
    }

    fn abort(&self) {
        self.top.abort();
        self.bottom.abort();
        self.stream.abort();
    }
}

/// Applies the kernel to every streamed tile.
///
/// Launch parameters: `[num_tiles]`.
pub struct ComputeStage {
    top: TileConsumer,
    bottom: TileConsumer,
    input: TileConsumer,
    output: TileProducer,
    kernel: Arc<dyn TileKernel>,
    state: PipelineState,
}

impl ComputeStage {
    pub const ARG_COUNT: usize = 1;

    pub fn new(
        top: TileConsumer,
        bottom: TileConsumer,
        input: TileConsumer,
        output: TileProducer,
        kernel: Arc<dyn TileKernel>,
        state: PipelineState,
    ) -> Self {
        Self {
            top,
            bottom,
            input,
            output,
            kernel,
            state,
        }
    }

    fn check_pages(&self) -> Result<()> {
        let history = self.state.history_page_size();
        let tile = self.state.tile.page_size();
        for (actual, expected) in [
            (self.top.page_size(), history),
            (self.bottom.page_size(), history),
            (self.input.page_size(), tile),
            (self.output.page_size(), tile),
        ] {
            if actual != expected {
                return Err(StreamLifeError::PageSizeMismatch { expected, actual });
            }
        }
        Ok(())
    }
}

impl Stage for ComputeStage {
    fn kind(&self) -> StageKind {
        StageKind::Compute
    }

    fn run(&mut self, args: &RuntimeArgs, _bindings: &mut StoreBindings) -> Result<StageStats> {
        args.expect_len(Self::ARG_COUNT)?;
        let num_tiles = num_tiles_arg(args, 0)?;
        if num_tiles > self.state.num_tiles {
            return Err(StreamLifeError::OutOfRange {
                buffer: 0,
                index: num_tiles.saturating_sub(1),
                tile_count: self.state.num_tiles,
            });
        }
        self.check_pages()?;

        debug!(stage = "compute", "waiting for history");
        self.top.wait_front(1)?;
        self.bottom.wait_front(1)?;

        let mut stats = StageStats::default();
        {
            let top = self.top.front(0)?;
            let bottom = self.bottom.front(0)?;
            let view = HistoryView::new(&self.state, &top, &bottom);
            for index in 0..num_tiles {
                self.input.wait_front(1)?;
                self.output.reserve_back(1)?;
                let report = {
                    let previous = self.input.front(0)?;
                    let mut out = self.output.back_mut(0)?;
                    self.kernel.compute_tile(&view, index, &previous, &mut out)
                };
                self.output.publish_back(1)?;
                self.input.pop_front(1)?;
                trace!(stage = "compute", index, live = report.live, "tile computed");
                stats.tiles += 1;
                stats.live += u64::from(report.live);
                stats.changed += u64::from(report.changed);
            }
        }
        self.top.pop_front(1)?;
        self.bottom.pop_front(1)?;
        debug!(stage = "compute", tiles = stats.tiles, live = stats.live, "finished");
        Ok(stats)
    }

    fn abort(&self) {
        self.top.abort();
        self.bottom.abort();
        self.input.abort();
        self.output.abort();
    }
}

/// Drains output tiles into the output region, in stream order.
///
/// Launch parameters: `[out_addr, out_bank, num_tiles]`.
pub struct SinkStage {
    input: TileConsumer,
}

impl SinkStage {
    pub const ARG_COUNT: usize = 3;

    pub fn new(input: TileConsumer) -> Self {
        Self { input }
    }

    /// Write tiles `0..num_tiles` from the queue into `store`.
    pub fn drain(&mut self, store: &mut TileStore, num_tiles: usize) -> Result<usize> {
        for index in 0..num_tiles {
            self.input.wait_front(1)?;
            {
                let tile = self.input.front(0)?;
                store.write_tile(index, &tile)?;
            }
            self.input.pop_front(1)?;
            trace!(stage = "sink", index, "tile stored");
        }
        Ok(num_tiles)
    }
}

impl Stage for SinkStage {
    fn kind(&self) -> StageKind {
        StageKind::Sink
    }

    fn run(&mut self, args: &RuntimeArgs, bindings: &mut StoreBindings) -> Result<StageStats> {
        args.expect_len(Self::ARG_COUNT)?;
        let num_tiles = num_tiles_arg(args, 2)?;
        let store = bindings.resolve_mut(args.get(0)?, args.get(1)?)?;
        let tiles = self.drain(store, num_tiles)?;
        debug!(stage = "sink", tiles, "finished");
        Ok(StageStats {
            tiles,
            ..StageStats::default()
        })
    }

    fn abort(&self) {
        self.input.abort();
    }
}
