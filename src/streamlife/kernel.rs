//! Compute-stage kernel interface and the default Life kernel.
//!
//! A kernel turns the prior generation (visible through the two history
//! tiles) into one output tile at a time. The third input, `previous`, is the
//! prior generation of the same tile index; the Life kernel only uses it to
//! count changed cells.

use super::rules::Rule;
use super::tile::{Half, PipelineState};

/// Per-tile result reported back to the compute stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TileReport {
    pub live: u32,
    pub changed: u32,
}

/// Read-only view of the prior generation split across the history halves.
#[derive(Clone, Copy)]
pub struct HistoryView<'a> {
    state: &'a PipelineState,
    top: &'a [u8],
    bottom: &'a [u8],
}

impl<'a> HistoryView<'a> {
    pub fn new(state: &'a PipelineState, top: &'a [u8], bottom: &'a [u8]) -> Self {
        debug_assert_eq!(top.len(), state.history_page_size());
        debug_assert_eq!(bottom.len(), state.history_page_size());
        Self { state, top, bottom }
    }

    #[inline]
    pub fn state(&self) -> &PipelineState {
        self.state
    }

    /// Cell at padded coordinates; anything outside the logical grid is dead.
    #[inline(always)]
    pub fn cell(&self, x: isize, y: isize) -> u8 {
        if x < 0 || y < 0 {
            return 0;
        }
        let (x, y) = (x as usize, y as usize);
        if !self.state.in_logical_grid(x, y) {
            return 0;
        }
        let (half, row) = self.state.history_location(y);
        let page = match half {
            Half::Top => self.top,
            Half::Bottom => self.bottom,
        };
        page[row * self.state.padded_width + x] & 1
    }
}

pub trait TileKernel: Send + Sync {
    /// Write output tile `index` into `out` (one page, row-major).
    fn compute_tile(
        &self,
        history: &HistoryView<'_>,
        index: usize,
        previous: &[u8],
        out: &mut [u8],
    ) -> TileReport;
}

/// Outer-totalistic rule over the Moore neighbourhood, dead boundary.
#[derive(Clone, Debug)]
pub struct LifeKernel {
    table: [u8; 32],
}

impl Default for LifeKernel {
    fn default() -> Self {
        Self::new(Rule::conway())
    }
}

impl LifeKernel {
    pub fn new(rule: Rule) -> Self {
        Self {
            table: rule.table(),
        }
    }
}

impl TileKernel for LifeKernel {
    fn compute_tile(
        &self,
        history: &HistoryView<'_>,
        index: usize,
        previous: &[u8],
        out: &mut [u8],
    ) -> TileReport {
        let state = history.state();
        let tile = state.tile;
        let (ox, oy) = state.tile_origin(index);
        let mut report = TileReport::default();

        for ly in 0..tile.height {
            let gy = oy + ly;
            for lx in 0..tile.width {
                let gx = ox + lx;
                let offset = ly * tile.width + lx;
                let next = if state.in_logical_grid(gx, gy) {
                    let (x, y) = (gx as isize, gy as isize);
                    let mut neighbors = 0u8;
                    for dy in -1..=1 {
                        for dx in -1..=1 {
                            if dx != 0 || dy != 0 {
                                neighbors += history.cell(x + dx, y + dy);
                            }
                        }
                    }
                    let alive = history.cell(x, y) as usize;
                    self.table[alive * 16 + neighbors as usize]
                } else {
                    0
                };
                out[offset] = next;
                report.live += next as u32;
                report.changed += (next != (previous[offset] & 1)) as u32;
            }
        }
        report
    }
}
