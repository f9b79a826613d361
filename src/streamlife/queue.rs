//! Bounded single-producer/single-consumer tile queue.
//!
//! A circular buffer of `capacity` page-sized slots with two monotonically
//! advancing cursors. The producer reserves space at the back, fills the
//! reserved slots in place, then publishes them; the consumer waits for
//! published slots at the front, reads them in place, then pops them.
//!
//! Invariant: `write_cursor + reserved - read_cursor <= capacity`.
//!
//! Reservation is a window, not a counter: `reserve_back(n)` guarantees that
//! the `n` slots after `write_cursor` belong to the producer, and calling it
//! again before publishing re-checks the same window.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{Condvar, MappedMutexGuard, Mutex, MutexGuard};
use tracing::trace;

use super::error::{Result, StreamLifeError};

struct QueueState {
    write_cursor: u64,
    read_cursor: u64,
    reserved: usize,
    high_water: usize,
    aborted: bool,
    producer_alive: bool,
    consumer_alive: bool,
}

impl QueueState {
    #[inline]
    fn published(&self) -> usize {
        (self.write_cursor - self.read_cursor) as usize
    }
}

struct Shared {
    name: String,
    capacity: usize,
    page_size: usize,
    state: Mutex<QueueState>,
    changed: Condvar,
    slots: Box<[Mutex<Box<[u8]>>]>,
}

impl Shared {
    #[inline]
    fn slot(&self, cursor: u64) -> &Mutex<Box<[u8]>> {
        &self.slots[(cursor % self.capacity as u64) as usize]
    }

    fn check_request(&self, requested: usize, free: usize) -> Result<()> {
        if requested > self.capacity {
            return Err(StreamLifeError::CapacityExceeded {
                queue: self.name.clone(),
                requested,
                free,
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    fn abort(&self) {
        let mut state = self.state.lock();
        state.aborted = true;
        self.changed.notify_all();
    }

    fn aborted(&self) -> StreamLifeError {
        StreamLifeError::Aborted(self.name.clone())
    }

    fn disconnected(&self) -> StreamLifeError {
        StreamLifeError::Disconnected(self.name.clone())
    }
}

/// Create a queue and split it into its two endpoints.
///
/// `capacity` must be at least 1; role-specific minimums are enforced by
/// [`PipelineGraph::validate`](super::graph::PipelineGraph::validate).
pub fn tile_queue(
    name: impl Into<String>,
    capacity: usize,
    page_size: usize,
) -> Result<(TileProducer, TileConsumer)> {
    let name = name.into();
    if capacity == 0 {
        return Err(StreamLifeError::CapacityMisconfigured {
            queue: name,
            capacity,
            minimum: 1,
        });
    }
    let slots = (0..capacity)
        .map(|_| Mutex::new(vec![0u8; page_size].into_boxed_slice()))
        .collect();
    let shared = Arc::new(Shared {
        name,
        capacity,
        page_size,
        state: Mutex::new(QueueState {
            write_cursor: 0,
            read_cursor: 0,
            reserved: 0,
            high_water: 0,
            aborted: false,
            producer_alive: true,
            consumer_alive: true,
        }),
        changed: Condvar::new(),
        slots,
    });
    Ok((
        TileProducer {
            shared: Arc::clone(&shared),
        },
        TileConsumer { shared },
    ))
}

/// Read-only view of a published slot.
pub struct SlotRef<'a>(MappedMutexGuard<'a, [u8]>);

impl Deref for SlotRef<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

/// Writable view of a reserved slot.
pub struct SlotMut<'a>(MappedMutexGuard<'a, [u8]>);

impl Deref for SlotMut<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl DerefMut for SlotMut<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

/// Queue diagnostics shared by both endpoints.
macro_rules! queue_diagnostics {
    ($ty:ty) => {
        impl $ty {
            #[inline]
            pub fn name(&self) -> &str {
                &self.shared.name
            }

            #[inline]
            pub fn capacity(&self) -> usize {
                self.shared.capacity
            }

            #[inline]
            pub fn page_size(&self) -> usize {
                self.shared.page_size
            }

            pub fn write_cursor(&self) -> u64 {
                self.shared.state.lock().write_cursor
            }

            pub fn read_cursor(&self) -> u64 {
                self.shared.state.lock().read_cursor
            }

            /// Published plus reserved slots.
            pub fn occupancy(&self) -> usize {
                let state = self.shared.state.lock();
                state.published() + state.reserved
            }

            /// Largest occupancy ever observed.
            pub fn high_water(&self) -> usize {
                self.shared.state.lock().high_water
            }

            /// Tear the queue down, waking the peer with `Aborted`.
            pub fn abort(&self) {
                self.shared.abort();
            }
        }
    };
}

pub struct TileProducer {
    shared: Arc<Shared>,
}

queue_diagnostics!(TileProducer);

impl TileProducer {
    fn grant(&self, state: &mut MutexGuard<'_, QueueState>, n: usize) {
        state.reserved = state.reserved.max(n);
        let occupancy = state.published() + state.reserved;
        debug_assert!(occupancy <= self.shared.capacity);
        state.high_water = state.high_water.max(occupancy);
    }

    /// Block until `n` slots past the write cursor are free, then own them.
    pub fn reserve_back(&mut self, n: usize) -> Result<()> {
        let shared = &*self.shared;
        shared.check_request(n, 0)?;
        let mut state = shared.state.lock();
        loop {
            if state.aborted {
                return Err(shared.aborted());
            }
            if shared.capacity - state.published() >= n {
                self.grant(&mut state, n);
                return Ok(());
            }
            if !state.consumer_alive {
                return Err(shared.disconnected());
            }
            trace!(queue = %shared.name, n, "reserve_back waiting");
            shared.changed.wait(&mut state);
        }
    }

    /// Reserve without blocking; fails with `CapacityExceeded` when full.
    pub fn try_reserve_back(&mut self, n: usize) -> Result<()> {
        let shared = &*self.shared;
        let mut state = shared.state.lock();
        if state.aborted {
            return Err(shared.aborted());
        }
        let free = shared.capacity - state.published();
        shared.check_request(n, free)?;
        if free < n {
            return Err(StreamLifeError::CapacityExceeded {
                queue: shared.name.clone(),
                requested: n,
                free,
                capacity: shared.capacity,
            });
        }
        self.grant(&mut state, n);
        Ok(())
    }

    /// The `k`-th reserved slot, for filling before publication.
    pub fn back_mut(&self, k: usize) -> Result<SlotMut<'_>> {
        let shared = &*self.shared;
        let cursor = {
            let state = shared.state.lock();
            if k >= state.reserved {
                return Err(StreamLifeError::NotReserved {
                    queue: shared.name.clone(),
                    requested: k + 1,
                    reserved: state.reserved,
                });
            }
            state.write_cursor + k as u64
        };
        let guard = shared.slot(cursor).lock();
        Ok(SlotMut(MutexGuard::map(guard, |slot| &mut slot[..])))
    }

    /// Make the oldest `n` reserved slots visible to the consumer.
    pub fn publish_back(&mut self, n: usize) -> Result<()> {
        let shared = &*self.shared;
        let mut state = shared.state.lock();
        if state.aborted {
            return Err(shared.aborted());
        }
        if n > state.reserved {
            return Err(StreamLifeError::NotReserved {
                queue: shared.name.clone(),
                requested: n,
                reserved: state.reserved,
            });
        }
        state.write_cursor += n as u64;
        state.reserved -= n;
        shared.changed.notify_all();
        Ok(())
    }

    /// Reserve, fill and publish one slot.
    pub fn push_tile(&mut self, tile: &[u8]) -> Result<()> {
        if tile.len() != self.shared.page_size {
            return Err(StreamLifeError::PageSizeMismatch {
                expected: self.shared.page_size,
                actual: tile.len(),
            });
        }
        self.reserve_back(1)?;
        self.back_mut(0)?.copy_from_slice(tile);
        self.publish_back(1)
    }
}

impl Drop for TileProducer {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.producer_alive = false;
        self.shared.changed.notify_all();
    }
}

pub struct TileConsumer {
    shared: Arc<Shared>,
}

queue_diagnostics!(TileConsumer);

impl TileConsumer {
    /// Block until at least `n` published slots are available.
    pub fn wait_front(&mut self, n: usize) -> Result<()> {
        let shared = &*self.shared;
        shared.check_request(n, 0)?;
        let mut state = shared.state.lock();
        loop {
            if state.aborted {
                return Err(shared.aborted());
            }
            if state.published() >= n {
                return Ok(());
            }
            if !state.producer_alive {
                return Err(shared.disconnected());
            }
            trace!(queue = %shared.name, n, "wait_front waiting");
            shared.changed.wait(&mut state);
        }
    }

    /// The `k`-th published slot from the front.
    pub fn front(&self, k: usize) -> Result<SlotRef<'_>> {
        let shared = &*self.shared;
        let cursor = {
            let state = shared.state.lock();
            if k >= state.published() {
                return Err(StreamLifeError::NotPublished {
                    queue: shared.name.clone(),
                    requested: k + 1,
                    published: state.published(),
                });
            }
            state.read_cursor + k as u64
        };
        let guard = shared.slot(cursor).lock();
        Ok(SlotRef(MutexGuard::map(guard, |slot| &mut slot[..])))
    }

    /// Release the oldest `n` slots back to the producer.
    pub fn pop_front(&mut self, n: usize) -> Result<()> {
        let shared = &*self.shared;
        let mut state = shared.state.lock();
        if state.aborted {
            return Err(shared.aborted());
        }
        if n > state.published() {
            return Err(StreamLifeError::NotPublished {
                queue: shared.name.clone(),
                requested: n,
                published: state.published(),
            });
        }
        state.read_cursor += n as u64;
        shared.changed.notify_all();
        Ok(())
    }

    /// Wait for, copy out and pop one slot.
    pub fn pop_tile_into(&mut self, out: &mut [u8]) -> Result<()> {
        self.wait_front(1)?;
        {
            let slot = self.front(0)?;
            if out.len() != slot.len() {
                return Err(StreamLifeError::PageSizeMismatch {
                    expected: slot.len(),
                    actual: out.len(),
                });
            }
            out.copy_from_slice(&slot);
        }
        self.pop_front(1)
    }
}

impl Drop for TileConsumer {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.consumer_alive = false;
        self.shared.changed.notify_all();
    }
}
