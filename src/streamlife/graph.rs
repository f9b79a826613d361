//! Stage graph: stages are nodes, queues are edges.
//!
//! The topology is fixed, but it is built as data and validated before any
//! stage starts so wiring mistakes surface as errors instead of deadlocks.

use std::collections::HashSet;

use super::error::{Result, StreamLifeError};

/// Minimum slots for a streamed queue (double buffering).
pub const MIN_STREAM_CAPACITY: usize = 2;
/// History queues hold one resident seed tile for the whole invocation.
pub const HISTORY_CAPACITY: usize = 1;

pub const HISTORY_TOP: &str = "history_top";
pub const HISTORY_BOTTOM: &str = "history_bottom";
pub const STREAM_IN: &str = "stream_in";
pub const STREAM_OUT: &str = "stream_out";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageKind {
    Source,
    Compute,
    Sink,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueRole {
    /// Carries one seed tile per invocation.
    History,
    /// Carries the indexed tile stream.
    Stream,
}

impl QueueRole {
    #[inline]
    pub fn min_capacity(self) -> usize {
        match self {
            QueueRole::History => HISTORY_CAPACITY,
            QueueRole::Stream => MIN_STREAM_CAPACITY,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StageDescriptor {
    pub name: String,
    pub kind: StageKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueDescriptor {
    pub name: String,
    pub producer: String,
    pub consumer: String,
    pub role: QueueRole,
    pub capacity: usize,
}

#[derive(Clone, Debug, Default)]
pub struct PipelineGraph {
    stages: Vec<StageDescriptor>,
    queues: Vec<QueueDescriptor>,
}

impl PipelineGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// The source → compute → sink topology with two history queues.
    pub fn life(stream_capacity: usize) -> Self {
        let mut graph = Self::new();
        graph
            .stage("source", StageKind::Source)
            .stage("compute", StageKind::Compute)
            .stage("sink", StageKind::Sink)
            .queue(HISTORY_TOP, "source", "compute", QueueRole::History, HISTORY_CAPACITY)
            .queue(HISTORY_BOTTOM, "source", "compute", QueueRole::History, HISTORY_CAPACITY)
            .queue(STREAM_IN, "source", "compute", QueueRole::Stream, stream_capacity)
            .queue(STREAM_OUT, "compute", "sink", QueueRole::Stream, stream_capacity);
        graph
    }

    pub fn stage(&mut self, name: &str, kind: StageKind) -> &mut Self {
        self.stages.push(StageDescriptor {
            name: name.to_owned(),
            kind,
        });
        self
    }

    pub fn queue(
        &mut self,
        name: &str,
        producer: &str,
        consumer: &str,
        role: QueueRole,
        capacity: usize,
    ) -> &mut Self {
        self.queues.push(QueueDescriptor {
            name: name.to_owned(),
            producer: producer.to_owned(),
            consumer: consumer.to_owned(),
            role,
            capacity,
        });
        self
    }

    #[inline]
    pub fn stages(&self) -> &[StageDescriptor] {
        &self.stages
    }

    #[inline]
    pub fn queues(&self) -> &[QueueDescriptor] {
        &self.queues
    }

    pub fn queue_named(&self, name: &str) -> Option<&QueueDescriptor> {
        self.queues.iter().find(|queue| queue.name == name)
    }

    pub fn validate(&self) -> Result<()> {
        let mut stage_names = HashSet::new();
        for stage in &self.stages {
            if !stage_names.insert(stage.name.as_str()) {
                return Err(invalid(format!("duplicate stage `{}`", stage.name)));
            }
        }
        for kind in [StageKind::Source, StageKind::Compute, StageKind::Sink] {
            let count = self.stages.iter().filter(|s| s.kind == kind).count();
            if count != 1 {
                return Err(invalid(format!("expected one {kind:?} stage, found {count}")));
            }
        }

        let mut queue_names = HashSet::new();
        let mut connected = HashSet::new();
        for queue in &self.queues {
            if !queue_names.insert(queue.name.as_str()) {
                return Err(invalid(format!("duplicate queue `{}`", queue.name)));
            }
            for endpoint in [&queue.producer, &queue.consumer] {
                if !stage_names.contains(endpoint.as_str()) {
                    return Err(invalid(format!(
                        "queue `{}` references unknown stage `{endpoint}`",
                        queue.name
                    )));
                }
                connected.insert(endpoint.as_str());
            }
            if queue.producer == queue.consumer {
                return Err(invalid(format!("queue `{}` loops back on itself", queue.name)));
            }
            let minimum = queue.role.min_capacity();
            if queue.capacity < minimum {
                return Err(StreamLifeError::CapacityMisconfigured {
                    queue: queue.name.clone(),
                    capacity: queue.capacity,
                    minimum,
                });
            }
        }

        for name in [HISTORY_TOP, HISTORY_BOTTOM, STREAM_IN, STREAM_OUT] {
            if !queue_names.contains(name) {
                return Err(invalid(format!("missing queue `{name}`")));
            }
        }
        if let Some(stage) = self
            .stages
            .iter()
            .find(|stage| !connected.contains(stage.name.as_str()))
        {
            return Err(invalid(format!("stage `{}` is not connected", stage.name)));
        }
        Ok(())
    }
}

fn invalid(message: String) -> StreamLifeError {
    StreamLifeError::InvalidGraph(message)
}
