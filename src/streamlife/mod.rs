//! Tile-streaming pipeline: storage, queues, stages, and the feedback loop.

mod arena;
mod args;
mod config;
mod error;
mod feedback;
mod graph;
mod grid;
mod kernel;
mod queue;
mod rules;
mod scheduler;
mod stage;
mod tile;

pub use arena::{BankId, BufferAddress, PAGE_ALIGNMENT, StorageArena, TileStore};
pub use args::{RuntimeArgs, StoreBindings};
pub use config::StreamLifeConfig;
pub use error::{Result, StreamLifeError};
pub use feedback::{FeedbackLoop, StopReason, StopSignal};
pub use graph::{
    HISTORY_CAPACITY, MIN_STREAM_CAPACITY, PipelineGraph, QueueDescriptor, QueueRole,
    StageDescriptor, StageKind,
};
pub use grid::Grid;
pub use kernel::{HistoryView, LifeKernel, TileKernel, TileReport};
pub use queue::{SlotMut, SlotRef, TileConsumer, TileProducer, tile_queue};
pub use rules::Rule;
pub use scheduler::{GenerationStats, PipelineScheduler, PipelineSpec, StoreSet};
pub use stage::{ComputeStage, SinkStage, SourceStage, Stage, StageStats};
pub use tile::{GridShape, PipelineState, TILE_HEIGHT, TILE_WIDTH, TileShape};
