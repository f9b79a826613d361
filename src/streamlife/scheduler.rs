//! Host-side orchestration of one pipeline invocation.
//!
//! The scheduler owns every `TileStore` between invocations. `launch` wires
//! fresh queues from the validated graph, lends each stage the stores its
//! launch arguments name, and spawns all three stages on a dedicated rayon
//! pool with one thread per stage. `await_completion` is the barrier: it
//! collects one report per stage, takes the stores back, and fails the
//! invocation if any stage failed.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::time::{Duration, Instant};

use tracing::{Span, debug, error, info_span, warn};

use super::arena::{BufferAddress, StorageArena, TileStore};
use super::args::{RuntimeArgs, StoreBindings};
use super::config::StreamLifeConfig;
use super::error::{Result, StreamLifeError};
use super::graph::{
    HISTORY_BOTTOM, HISTORY_TOP, PipelineGraph, QueueRole, STREAM_IN, STREAM_OUT, StageKind,
};
use super::kernel::TileKernel;
use super::queue::{TileConsumer, TileProducer, tile_queue};
use super::stage::{ComputeStage, SinkStage, SourceStage, Stage, StageStats};
use super::tile::PipelineState;

/// Per-invocation parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineSpec {
    pub num_tiles: usize,
}

impl PipelineSpec {
    /// Stream every tile of the padded grid.
    pub fn full(state: &PipelineState) -> Self {
        Self {
            num_tiles: state.num_tiles,
        }
    }
}

/// Outcome of a completed invocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GenerationStats {
    /// Tiles the source pushed onto the indexed stream.
    pub tiles_streamed: usize,
    /// Tiles the sink wrote to the output region.
    pub tiles_stored: usize,
    pub population: u64,
    pub changed_cells: u64,
    pub elapsed: Duration,
}

/// The four regions a pipeline instance works on.
#[derive(Debug)]
pub struct StoreSet {
    /// Rows `[0, half_rows)` of the prior generation, one page.
    pub top: TileStore,
    /// Remaining rows of the prior generation, one page.
    pub bottom: TileStore,
    /// Prior generation, tiled; the third compute input.
    pub previous: TileStore,
    /// Sink destination.
    pub output: TileStore,
}

struct StoreAddresses {
    top: BufferAddress,
    bottom: BufferAddress,
    previous: BufferAddress,
    output: BufferAddress,
}

impl StoreSet {
    fn addresses(&self) -> StoreAddresses {
        StoreAddresses {
            top: self.top.base_address(),
            bottom: self.bottom.base_address(),
            previous: self.previous.base_address(),
            output: self.output.base_address(),
        }
    }

    fn reassemble(addresses: &StoreAddresses, stores: Vec<TileStore>) -> Option<Self> {
        let (mut top, mut bottom, mut previous, mut output) = (None, None, None, None);
        for store in stores {
            let address = store.base_address();
            let slot = if address == addresses.top {
                &mut top
            } else if address == addresses.bottom {
                &mut bottom
            } else if address == addresses.previous {
                &mut previous
            } else if address == addresses.output {
                &mut output
            } else {
                continue;
            };
            *slot = Some(store);
        }
        Some(Self {
            top: top?,
            bottom: bottom?,
            previous: previous?,
            output: output?,
        })
    }
}

struct StageReport {
    kind: StageKind,
    result: Result<StageStats>,
    stores: Vec<TileStore>,
}

struct InFlight {
    receiver: Receiver<StageReport>,
    stages: usize,
    started: Instant,
    span: Span,
}

pub struct PipelineScheduler {
    graph: PipelineGraph,
    state: PipelineState,
    kernel: Arc<dyn TileKernel>,
    pool: rayon::ThreadPool,
    addresses: StoreAddresses,
    stores: Option<StoreSet>,
    in_flight: Option<InFlight>,
    launches: u64,
}

impl PipelineScheduler {
    pub fn new(config: &StreamLifeConfig, kernel: Arc<dyn TileKernel>) -> Result<Self> {
        config.validate()?;
        let state = PipelineState::new(config.grid, config.tile);
        let graph = PipelineGraph::life(config.stream_capacity);
        graph.validate()?;

        let mut arena = StorageArena::new(config.bank_count, config.bank_capacity)?;
        let history_page = state.history_page_size();
        let tile_page = state.tile.page_size();
        let stores = StoreSet {
            top: arena.allocate(history_page, 1)?,
            bottom: arena.allocate(history_page, 1)?,
            previous: arena.allocate(tile_page, state.num_tiles)?,
            output: arena.allocate(tile_page, state.num_tiles)?,
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(graph.stages().len())
            .thread_name(|i| format!("stream-life-stage-{i}"))
            .build()
            .map_err(|err| StreamLifeError::ThreadPool(err.to_string()))?;

        debug!(
            width = state.padded_width,
            height = state.padded_height,
            tiles = state.num_tiles,
            banks = arena.bank_count(),
            "pipeline storage allocated"
        );

        Ok(Self {
            graph,
            state,
            kernel,
            pool,
            addresses: stores.addresses(),
            stores: Some(stores),
            in_flight: None,
            launches: 0,
        })
    }

    #[inline]
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    #[inline]
    pub fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    /// Number of invocations started since construction.
    #[inline]
    pub fn launch_count(&self) -> u64 {
        self.launches
    }

    #[inline]
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Stores are only reachable between invocations.
    pub fn stores(&self) -> Result<&StoreSet> {
        self.stores.as_ref().ok_or(StreamLifeError::InvocationInFlight)
    }

    pub fn stores_mut(&mut self) -> Result<&mut StoreSet> {
        self.stores.as_mut().ok_or(StreamLifeError::InvocationInFlight)
    }

    fn endpoints(&self, name: &str) -> Result<(TileProducer, TileConsumer)> {
        let queue = self
            .graph
            .queue_named(name)
            .ok_or_else(|| StreamLifeError::InvalidGraph(format!("missing queue `{name}`")))?;
        let page_size = match queue.role {
            QueueRole::History => self.state.history_page_size(),
            QueueRole::Stream => self.state.tile.page_size(),
        };
        tile_queue(queue.name.clone(), queue.capacity, page_size)
    }

    /// Start every stage for one invocation and return immediately.
    pub fn launch(&mut self, spec: &PipelineSpec) -> Result<()> {
        if self.in_flight.is_some() {
            return Err(StreamLifeError::InvocationInFlight);
        }
        let capacity = self.stores()?.output.tile_count();
        if spec.num_tiles > capacity {
            return Err(StreamLifeError::OutOfRange {
                buffer: self.addresses.output.0,
                index: spec.num_tiles - 1,
                tile_count: capacity,
            });
        }
        let num_tiles = u32::try_from(spec.num_tiles).map_err(|_| {
            StreamLifeError::InvalidConfig(format!("tile count {} exceeds u32", spec.num_tiles))
        })?;

        let (top_tx, top_rx) = self.endpoints(HISTORY_TOP)?;
        let (bottom_tx, bottom_rx) = self.endpoints(HISTORY_BOTTOM)?;
        let (in_tx, in_rx) = self.endpoints(STREAM_IN)?;
        let (out_tx, out_rx) = self.endpoints(STREAM_OUT)?;
        let stores = self.stores.take().ok_or(StreamLifeError::InvocationInFlight)?;

        let mut source_args = RuntimeArgs::default();
        source_args.push_buffer(&stores.top);
        source_args.push(num_tiles);
        source_args.push_buffer(&stores.bottom);
        source_args.push_buffer(&stores.previous);
        let compute_args = RuntimeArgs::new(vec![num_tiles]);
        let mut sink_args = RuntimeArgs::default();
        sink_args.push_buffer(&stores.output);
        sink_args.push(num_tiles);

        let StoreSet {
            top,
            bottom,
            previous,
            output,
        } = stores;
        let stages: Vec<(Box<dyn Stage>, RuntimeArgs, StoreBindings)> = vec![
            (
                Box::new(SourceStage::new(top_tx, bottom_tx, in_tx)) as Box<dyn Stage>,
                source_args,
                StoreBindings::new(vec![top, bottom, previous]),
            ),
            (
                Box::new(ComputeStage::new(
                    top_rx,
                    bottom_rx,
                    in_rx,
                    out_tx,
                    Arc::clone(&self.kernel),
                    self.state,
                )) as Box<dyn Stage>,
                compute_args,
                StoreBindings::default(),
            ),
            (
                Box::new(SinkStage::new(out_rx)) as Box<dyn Stage>,
                sink_args,
                StoreBindings::new(vec![output]),
            ),
        ];

        self.launches += 1;
        let span = info_span!("invocation", launch = self.launches, num_tiles = spec.num_tiles);
        let (sender, receiver) = mpsc::channel();
        let count = stages.len();
        for (stage, args, bindings) in stages {
            let sender = sender.clone();
            let span = span.clone();
            self.pool.spawn(move || {
                let report = span.in_scope(|| run_stage(stage, args, bindings));
                let _ = sender.send(report);
            });
        }
        span.in_scope(|| debug!(stages = count, "stages launched"));

        self.in_flight = Some(InFlight {
            receiver,
            stages: count,
            started: Instant::now(),
            span,
        });
        Ok(())
    }

    /// Block until every stage of the current invocation has reported.
    ///
    /// On failure the output region is cleared before the error is
    /// returned, so no partial generation is ever visible.
    pub fn await_completion(&mut self) -> Result<GenerationStats> {
        let in_flight = self.in_flight.take().ok_or(StreamLifeError::NoInvocation)?;
        let _entered = in_flight.span.enter();

        let mut reports = Vec::with_capacity(in_flight.stages);
        for _ in 0..in_flight.stages {
            match in_flight.receiver.recv() {
                Ok(report) => reports.push(report),
                Err(_) => break,
            }
        }
        let received = reports.len();

        let mut returned = Vec::new();
        let mut stats = GenerationStats {
            elapsed: in_flight.started.elapsed(),
            ..GenerationStats::default()
        };
        let mut failure: Option<StreamLifeError> = None;
        for report in reports {
            returned.extend(report.stores);
            match report.result {
                Ok(stage) => match report.kind {
                    StageKind::Source => stats.tiles_streamed = stage.tiles,
                    StageKind::Compute => {
                        stats.population = stage.live;
                        stats.changed_cells = stage.changed;
                    }
                    StageKind::Sink => stats.tiles_stored = stage.tiles,
                },
                Err(err) => {
                    let err = StreamLifeError::StageFailed {
                        stage: report.kind,
                        source: Box::new(err),
                    };
                    // Keep the root cause over the aborts it triggered.
                    let replace = match &failure {
                        None => true,
                        Some(current) => current.is_abort() && !err.is_abort(),
                    };
                    if replace {
                        failure = Some(err);
                    }
                }
            }
        }

        match StoreSet::reassemble(&self.addresses, returned) {
            Some(stores) => self.stores = Some(stores),
            None => {
                error!(expected = in_flight.stages, received, "stage stores were not returned");
                return Err(StreamLifeError::StageLost {
                    expected: in_flight.stages,
                    received,
                });
            }
        }
        if failure.is_none() && received < in_flight.stages {
            failure = Some(StreamLifeError::StageLost {
                expected: in_flight.stages,
                received,
            });
        }

        if let Some(err) = failure {
            error!(error = %err, fatal = err.is_fatal(), "invocation failed, discarding output");
            if let Some(stores) = self.stores.as_mut() {
                stores.output.fill(0);
            }
            return Err(err);
        }

        debug!(
            tiles = stats.tiles_stored,
            population = stats.population,
            elapsed_us = stats.elapsed.as_micros() as u64,
            "invocation complete"
        );
        Ok(stats)
    }

    /// `launch` followed by `await_completion`.
    pub fn invoke(&mut self, spec: &PipelineSpec) -> Result<GenerationStats> {
        self.launch(spec)?;
        self.await_completion()
    }
}

fn run_stage(
    mut stage: Box<dyn Stage>,
    args: RuntimeArgs,
    mut bindings: StoreBindings,
) -> StageReport {
    let kind = stage.kind();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| stage.run(&args, &mut bindings)));
    let result = outcome.unwrap_or(Err(StreamLifeError::StagePanicked(kind)));
    if let Err(err) = &result {
        if err.is_abort() {
            debug!(stage = ?kind, error = %err, "stage aborted");
        } else if err.is_fatal() {
            error!(stage = ?kind, error = %err, "stage hit a fatal fault");
        } else {
            warn!(stage = ?kind, error = %err, "stage failed");
        }
        stage.abort();
    }
    StageReport {
        kind,
        result,
        stores: bindings.into_stores(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{PipelineScheduler, PipelineSpec};
    use crate::streamlife::config::StreamLifeConfig;
    use crate::streamlife::error::StreamLifeError;
    use crate::streamlife::kernel::LifeKernel;

    fn small() -> PipelineScheduler {
        let config = StreamLifeConfig::default().grid(4, 4).tile(2, 2).bank_count(2);
        PipelineScheduler::new(&config, Arc::new(LifeKernel::default())).unwrap()
    }

    #[test]
    fn second_launch_while_in_flight_is_rejected() {
        let mut scheduler = small();
        assert!(!scheduler.is_in_flight());
        scheduler.launch(&PipelineSpec { num_tiles: 4 }).unwrap();
        assert!(scheduler.is_in_flight());
        assert!(matches!(
            scheduler.launch(&PipelineSpec { num_tiles: 4 }),
            Err(StreamLifeError::InvocationInFlight)
        ));
        assert!(matches!(scheduler.stores(), Err(StreamLifeError::InvocationInFlight)));
        scheduler.await_completion().unwrap();
        assert!(!scheduler.is_in_flight());
        assert!(scheduler.stores().is_ok());
        assert_eq!(scheduler.launch_count(), 1);
    }

    #[test]
    fn oversized_tile_count_is_rejected_before_launch() {
        let mut scheduler = small();
        let err = scheduler.launch(&PipelineSpec { num_tiles: 5 }).unwrap_err();
        assert!(matches!(err, StreamLifeError::OutOfRange { tile_count: 4, .. }));
        assert_eq!(scheduler.launch_count(), 0);
        assert!(scheduler.stores().is_ok());
    }

    #[test]
    fn graph_has_one_pool_thread_per_stage() {
        let scheduler = small();
        assert_eq!(scheduler.graph().stages().len(), 3);
        assert_eq!(scheduler.pool.current_num_threads(), 3);
    }

    #[test]
    fn await_without_launch_fails() {
        let mut scheduler = small();
        assert!(matches!(
            scheduler.await_completion(),
            Err(StreamLifeError::NoInvocation)
        ));
    }
}
