//! Error types for the tile pipeline.

use super::graph::StageKind;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, StreamLifeError>;

/// Errors raised by storage, queues, stages, and the host driver.
#[derive(Debug, thiserror::Error)]
pub enum StreamLifeError {
    /// Tile index beyond the store's tile count.
    #[error("tile index {index} out of range for buffer {buffer:#x} ({tile_count} tiles)")]
    OutOfRange {
        buffer: u32,
        index: usize,
        tile_count: usize,
    },

    /// Tile payload does not match the store or queue page size.
    #[error("page size mismatch: expected {expected} bytes, got {actual}")]
    PageSizeMismatch { expected: usize, actual: usize },

    /// The storage arena cannot fit the requested buffer.
    #[error("storage exhausted: need {requested} bytes per bank, {available} available")]
    StorageExhausted { requested: usize, available: usize },

    /// A scalar configuration value is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A queue was declared below the minimum its role requires.
    #[error("queue `{queue}` capacity {capacity} is below the minimum of {minimum}")]
    CapacityMisconfigured {
        queue: String,
        capacity: usize,
        minimum: usize,
    },

    /// A reservation can not be satisfied without exceeding capacity.
    #[error("queue `{queue}`: cannot reserve {requested} slots, {free} free of {capacity}")]
    CapacityExceeded {
        queue: String,
        requested: usize,
        free: usize,
        capacity: usize,
    },

    /// `publish_back` or `back_mut` beyond the reserved slots.
    #[error("queue `{queue}`: {requested} slots requested but only {reserved} reserved")]
    NotReserved {
        queue: String,
        requested: usize,
        reserved: usize,
    },

    /// `pop_front` or `front` beyond the published slots.
    #[error("queue `{queue}`: {requested} slots requested but only {published} published")]
    NotPublished {
        queue: String,
        requested: usize,
        published: usize,
    },

    /// The peer stage failed and tore the queue down.
    #[error("queue `{0}` aborted")]
    Aborted(String),

    /// The peer endpoint was dropped while slots were still expected.
    #[error("queue `{0}` disconnected")]
    Disconnected(String),

    #[error("launch argument {position} missing ({len} supplied)")]
    MissingArg { position: usize, len: usize },

    #[error("stage expects {expected} launch arguments, got {actual}")]
    ArgCount { expected: usize, actual: usize },

    #[error("no buffer bound at address {0:#x}")]
    UnknownBuffer(u32),

    #[error("buffer {buffer:#x} starts at bank {expected}, launch argument says {actual}")]
    BankMismatch {
        buffer: u32,
        expected: u32,
        actual: u32,
    },

    /// Topology rejected before any stage started.
    #[error("invalid pipeline graph: {0}")]
    InvalidGraph(String),

    #[error("an invocation is already in flight")]
    InvocationInFlight,

    #[error("no invocation in flight")]
    NoInvocation,

    /// A stage returned an error; the invocation was aborted.
    #[error("{stage:?} stage failed: {source}")]
    StageFailed {
        stage: StageKind,
        #[source]
        source: Box<StreamLifeError>,
    },

    #[error("{0:?} stage panicked")]
    StagePanicked(StageKind),

    #[error("{expected} stages launched but only {received} reported back")]
    StageLost { expected: usize, received: usize },

    #[error("invalid rule `{0}`")]
    InvalidRule(String),

    #[error("failed to build stage thread pool: {0}")]
    ThreadPool(String),
}

impl StreamLifeError {
    /// Whether the error is a fatal resource fault: a tile index out of
    /// range, a queue capacity breach or misconfiguration, exhausted
    /// storage, or a stage that died outright.
    ///
    /// Everything else is a protocol or configuration error, or the abort
    /// another stage's fault caused.
    pub fn is_fatal(&self) -> bool {
        match self {
            StreamLifeError::OutOfRange { .. }
            | StreamLifeError::CapacityMisconfigured { .. }
            | StreamLifeError::CapacityExceeded { .. }
            | StreamLifeError::StorageExhausted { .. }
            | StreamLifeError::StagePanicked(_)
            | StreamLifeError::StageLost { .. } => true,
            StreamLifeError::StageFailed { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    /// Whether the error is a consequence of another stage failing.
    pub fn is_abort(&self) -> bool {
        match self {
            StreamLifeError::Aborted(_) | StreamLifeError::Disconnected(_) => true,
            StreamLifeError::StageFailed { source, .. } => source.is_abort(),
            _ => false,
        }
    }
}
