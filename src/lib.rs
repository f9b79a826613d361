//! Conway's Game of Life streamed tile-by-tile through a three-stage
//! bounded-queue pipeline, with each generation fed back as the next seed.

pub mod logging;
pub mod seed;
pub mod streamlife;

pub use seed::{Lexicon, SeedSpec};
pub use streamlife::{
    FeedbackLoop, Grid, LifeKernel, PipelineScheduler, PipelineSpec, Rule, StopSignal,
    StreamLifeConfig, StreamLifeError, TileKernel,
};
